//! Length-prefixed frame reading and writing.
//!
//! Every frame starts with an 8-byte big-endian length pair
//! (`head_len`, `body_len`). [`read_frame`] reads the pair, then exactly
//! `head_len + body_len - 8` further bytes, and returns the full frame
//! including the prefix so the message codecs can decode it uniformly.
//! Partial reads are expected on TCP; reads loop until the requested
//! count is satisfied.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, RpcError};

/// Size of the leading length pair.
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Read one complete frame from `reader`.
///
/// Fails with `ConnectionClosed` on EOF before any byte of the prefix,
/// `Truncated` on EOF mid-frame and `FrameTooLarge` when the announced
/// total exceeds `max_frame`.
pub async fn read_frame<R>(reader: &mut R, max_frame: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    read_full(reader, &mut prefix).await?;

    let head_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    let body_len = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;
    if head_len < LENGTH_PREFIX_LEN {
        return Err(RpcError::MalformedFrame(format!(
            "head_len {head_len} cannot contain the length prefix"
        )));
    }
    let total = head_len
        .checked_add(body_len)
        .ok_or_else(|| RpcError::MalformedFrame("frame length overflow".into()))?;
    if total > max_frame {
        return Err(RpcError::FrameTooLarge {
            size: total,
            limit: max_frame,
        });
    }

    let mut frame = vec![0u8; total];
    frame[..LENGTH_PREFIX_LEN].copy_from_slice(&prefix);
    reader
        .read_exact(&mut frame[LENGTH_PREFIX_LEN..])
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => RpcError::Truncated,
            _ => RpcError::Io(e),
        })?;
    Ok(frame)
}

/// Write one already-encoded frame in a single contiguous write.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Fill `buf` completely, distinguishing a clean EOF from a torn one.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                RpcError::ConnectionClosed
            } else {
                RpcError::Truncated
            });
        }
        filled += n;
    }
    Ok(())
}
