//! Bounded TCP connection pool.
//!
//! Connections are created on demand up to `max_cap`, reused FIFO, and
//! parked back on release. A saturated pool blocks `get` until a lease
//! is released, honouring the caller's deadline and cancellation. Idle
//! connections past `idle_timeout` are closed lazily on the next `get`;
//! a release that would exceed `max_idle` closes the connection instead
//! of parking it.
//!
//! Leases release through `Drop`, so a connection is returned (or
//! closed) on every exit path. A lease marked broken is always closed:
//! a socket with unknown stream state must never be handed to another
//! caller.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::context::CallContext;
use crate::error::{Result, RpcError};

/// Sizing and lifetime knobs for [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections created eagerly at construction.
    pub initial_cap: usize,
    /// Hard ceiling on live connections (idle + leased).
    pub max_cap: usize,
    /// Most idle connections kept parked; overflow releases close.
    pub max_idle: usize,
    /// Idle connections older than this are closed on the next `get`.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_cap: 1,
            max_cap: 8,
            max_idle: 4,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

struct IdleConn {
    stream: TcpStream,
    last_used: Instant,
}

struct PoolState {
    idle: VecDeque<IdleConn>,
    /// Connections in existence: parked plus leased.
    live: usize,
    closed: bool,
}

struct Shared {
    addr: String,
    config: PoolConfig,
    state: Mutex<PoolState>,
    released: Notify,
}

/// Pool of reusable TCP connections to one address.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    /// Build a pool for `addr`, eagerly opening `initial_cap`
    /// connections. Fails with `PoolInit` if the config is inconsistent
    /// or any eager connection cannot be established.
    pub async fn connect(addr: impl Into<String>, config: PoolConfig) -> Result<Self> {
        let addr = addr.into();
        if config.max_cap == 0 || config.initial_cap > config.max_cap {
            return Err(RpcError::PoolInit(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "initial_cap {} must fit within max_cap {}",
                    config.initial_cap, config.max_cap
                ),
            )));
        }

        let mut idle = VecDeque::with_capacity(config.initial_cap);
        for _ in 0..config.initial_cap {
            let stream = TcpStream::connect(&addr).await.map_err(RpcError::PoolInit)?;
            idle.push_back(IdleConn {
                stream,
                last_used: Instant::now(),
            });
        }

        let live = idle.len();
        Ok(Self {
            shared: Arc::new(Shared {
                addr,
                config,
                state: Mutex::new(PoolState {
                    idle,
                    live,
                    closed: false,
                }),
                released: Notify::new(),
            }),
        })
    }

    /// Lease a connection.
    ///
    /// Reuses the oldest parked connection, creates a new one while
    /// under `max_cap`, and otherwise waits for a release. Waiting is
    /// cancellation-aware: when `ctx` is done first, `get` returns the
    /// context's error instead of blocking indefinitely.
    pub async fn get(&self, ctx: &CallContext) -> Result<PooledConn> {
        loop {
            let connect_slot = {
                let mut state = self.shared.state.lock().expect("pool state lock poisoned");
                if state.closed {
                    return Err(RpcError::PoolClosed);
                }

                // Oldest entries sit at the front; evict until fresh.
                while let Some(front) = state.idle.front() {
                    if front.last_used.elapsed() >= self.shared.config.idle_timeout {
                        state.idle.pop_front();
                        state.live -= 1;
                    } else {
                        break;
                    }
                }

                if let Some(conn) = state.idle.pop_front() {
                    return Ok(PooledConn::new(conn.stream, self.shared.clone()));
                }

                if state.live < self.shared.config.max_cap {
                    state.live += 1;
                    true
                } else {
                    false
                }
            };

            if connect_slot {
                match TcpStream::connect(&self.shared.addr).await {
                    Ok(stream) => return Ok(PooledConn::new(stream, self.shared.clone())),
                    Err(e) => {
                        let mut state =
                            self.shared.state.lock().expect("pool state lock poisoned");
                        state.live -= 1;
                        self.shared.released.notify_one();
                        return Err(RpcError::Io(e));
                    }
                }
            }

            tokio::select! {
                _ = self.shared.released.notified() => {}
                _ = ctx.done() => return Err(ctx.error()),
            }
        }
    }

    /// Close all parked connections and refuse further leases.
    /// Outstanding leases close their connections on release.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock().expect("pool state lock poisoned");
        state.closed = true;
        let parked = state.idle.len();
        state.live -= parked;
        state.idle.clear();
        self.shared.released.notify_waiters();
    }

    /// Parked connections right now.
    pub fn idle_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .expect("pool state lock poisoned")
            .idle
            .len()
    }

    /// Live connections right now (parked plus leased).
    pub fn live_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .expect("pool state lock poisoned")
            .live
    }
}

/// A leased connection. Dropping the lease returns the connection to
/// the pool, or closes it when broken, past `max_idle`, or after
/// shutdown.
pub struct PooledConn {
    stream: Option<TcpStream>,
    shared: Arc<Shared>,
    broken: bool,
}

impl PooledConn {
    fn new(stream: TcpStream, shared: Arc<Shared>) -> Self {
        Self {
            stream: Some(stream),
            shared,
            broken: false,
        }
    }

    /// The leased socket.
    pub fn stream(&mut self) -> &mut TcpStream {
        self.stream.as_mut().expect("stream present until drop")
    }

    /// Flag the connection as unusable; it will be closed on release
    /// instead of parked.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        let mut state = self.shared.state.lock().expect("pool state lock poisoned");
        if self.broken || state.closed || state.idle.len() >= self.shared.config.max_idle {
            // Dropping the stream closes it; exactly once, here.
            drop(stream);
            state.live -= 1;
        } else {
            state.idle.push_back(IdleConn {
                stream,
                last_used: Instant::now(),
            });
        }
        drop(state);
        self.shared.released.notify_one();
    }
}
