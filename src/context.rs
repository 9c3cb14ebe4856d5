//! Call context: deadline, one-way flag, cancellation, user meta.
//!
//! [`CallContext`] is the options record accompanying every call. On the
//! client it feeds the reserved request meta keys (`deadline` as unix
//! milliseconds, `oneway` as the literal `"true"`) and bounds the socket
//! work; on the server it is rebuilt from the incoming meta and enforced
//! around synchronous invocations. User-defined meta entries ride along
//! untouched in both directions.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RpcError};
use crate::message::{META_DEADLINE, META_ONEWAY};

/// A deadline pinned in both clocks: monotonic for local waiting,
/// wall-clock milliseconds for the wire.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    instant: Instant,
    unix_millis: u64,
}

/// Options attached to a single call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Deadline>,
    oneway: bool,
    cancel: Option<CancellationToken>,
    meta: BTreeMap<String, String>,
}

impl CallContext {
    /// Context with no deadline, no cancellation and no meta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the call to `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let unix_millis = unix_millis_now().saturating_add(timeout.as_millis() as u64);
        self.deadline = Some(Deadline {
            instant: Instant::now() + timeout,
            unix_millis,
        });
        self
    }

    /// Bound the call to an absolute wall-clock deadline in unix
    /// milliseconds. Used by the server to adopt a caller's deadline; an
    /// already-passed deadline yields a context that is immediately due.
    pub fn with_deadline_millis(mut self, unix_millis: u64) -> Self {
        let remaining = Duration::from_millis(unix_millis.saturating_sub(unix_millis_now()));
        self.deadline = Some(Deadline {
            instant: Instant::now() + remaining,
            unix_millis,
        });
        self
    }

    /// Flag the call as one-way: the server executes it without writing
    /// a response and the client returns a synthetic one.
    pub fn oneway(mut self) -> Self {
        self.oneway = true;
        self
    }

    /// Attach a cooperative cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attach a user meta entry to outgoing requests.
    ///
    /// The reserved keys are owned by the context's typed fields and
    /// overwrite any same-named entry set here.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Whether this context flags a one-way call.
    pub fn is_oneway(&self) -> bool {
        self.oneway
    }

    /// Monotonic deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|d| d.instant)
    }

    /// Wall-clock deadline in unix milliseconds, if any.
    pub fn deadline_millis(&self) -> Option<u64> {
        self.deadline.map(|d| d.unix_millis)
    }

    /// User meta entries attached to this context.
    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    /// Fail fast when the context is already cancelled or past its
    /// deadline.
    pub fn check(&self) -> Result<()> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(RpcError::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline.instant {
                return Err(RpcError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Resolve once the context is done: cancelled or past its deadline.
    /// Pends forever on a context with neither.
    pub async fn done(&self) {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d.instant).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = cancelled => {}
            _ = expired => {}
        }
    }

    /// The error explaining why the context is done. Cancellation wins
    /// over an expired deadline.
    pub fn error(&self) -> RpcError {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return RpcError::Cancelled;
            }
        }
        RpcError::DeadlineExceeded
    }

    /// Drop the deadline, keeping everything else. One-way invocations
    /// run to completion regardless of the caller's deadline.
    pub(crate) fn without_deadline(mut self) -> Self {
        self.deadline = None;
        self
    }

    /// Copy the context into request meta: user entries first, then the
    /// reserved keys so the typed fields always win.
    pub(crate) fn apply_to_meta(&self, meta: &mut BTreeMap<String, String>) {
        for (k, v) in &self.meta {
            meta.insert(k.clone(), v.clone());
        }
        if let Some(millis) = self.deadline_millis() {
            meta.insert(META_DEADLINE.to_string(), millis.to_string());
        }
        if self.oneway {
            meta.insert(META_ONEWAY.to_string(), "true".to_string());
        }
    }

    /// Rebuild a context from incoming request meta.
    ///
    /// An unparsable `deadline` value is logged and ignored; the request
    /// still runs, just unbounded.
    pub(crate) fn from_meta(meta: &BTreeMap<String, String>) -> Self {
        let mut ctx = Self::new();
        for (k, v) in meta {
            if k != META_DEADLINE && k != META_ONEWAY {
                ctx.meta.insert(k.clone(), v.clone());
            }
        }
        if let Some(raw) = meta.get(META_DEADLINE) {
            match raw.parse::<u64>() {
                Ok(millis) => ctx = ctx.with_deadline_millis(millis),
                Err(_) => tracing::warn!(deadline = %raw, "ignoring unparsable deadline meta"),
            }
        }
        if meta.get(META_ONEWAY).map(String::as_str) == Some("true") {
            ctx.oneway = true;
        }
        ctx
    }
}

fn unix_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
