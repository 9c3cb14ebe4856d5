//! RPC client: builder, call engine and typed invocation.
//!
//! The [`Client`] owns a [`ConnectionPool`] plus the codecs chosen at
//! build time. [`Client::call`] is the generic engine: it leases a
//! connection, writes the request as one contiguous frame and reads one
//! response frame, all on a background task so the caller's await stays
//! interruptible by its [`CallContext`]. [`Client::invoke`] layers the
//! typed pipeline on top (marshal, compress, build request, call,
//! surface remote errors, unmarshal), and [`service_client!`] expands a
//! declared service shape into a stub struct of such invocations.
//!
//! # Example
//!
//! ```ignore
//! let client = Arc::new(
//!     Client::builder("127.0.0.1:8081")
//!         .serializer(Serializer::Json)
//!         .build()
//!         .await?,
//! );
//! let greeter = GreeterClient::new(client);
//! let resp = greeter.say_hello(&CallContext::new(), &HelloReq { .. }).await?;
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::compress::{Compressor, Identity};
use crate::context::CallContext;
use crate::error::{Result, RpcError};
use crate::framing::{read_frame, write_frame};
use crate::message::{Request, Response, MAX_FRAME_SIZE};
use crate::pool::{ConnectionPool, PoolConfig, PooledConn};
use crate::serialize::Serializer;

/// Builder for configuring and connecting a [`Client`].
pub struct ClientBuilder {
    addr: String,
    pool_config: PoolConfig,
    serializer: Serializer,
    compressor: Arc<dyn Compressor>,
    max_frame_size: usize,
}

impl ClientBuilder {
    /// Builder targeting `addr` with JSON serialization, identity
    /// compression and default pool sizing.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            pool_config: PoolConfig::default(),
            serializer: Serializer::default(),
            compressor: Arc::new(Identity),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Serialization format for request bodies built by `invoke`.
    pub fn serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Compressor for request bodies built by `invoke`. The server must
    /// have the same code registered.
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Connection pool sizing and lifetimes.
    pub fn pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = pool_config;
        self
    }

    /// Override the maximum accepted response frame size.
    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Connect the pool and build the client.
    pub async fn build(self) -> Result<Client> {
        let pool = ConnectionPool::connect(self.addr, self.pool_config).await?;
        Ok(Client {
            pool,
            serializer: self.serializer,
            compressor: self.compressor,
            max_frame_size: self.max_frame_size,
            next_id: AtomicU32::new(1),
        })
    }
}

/// RPC client over a pooled set of TCP connections.
pub struct Client {
    pool: ConnectionPool,
    serializer: Serializer,
    compressor: Arc<dyn Compressor>,
    max_frame_size: usize,
    next_id: AtomicU32,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(addr: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(addr)
    }

    /// Perform one call with an already-built request.
    ///
    /// The context's reserved meta keys are injected before encoding
    /// (user meta entries are preserved; the typed deadline/one-way
    /// fields win over same-named keys). A one-way call writes the
    /// request and returns a synthetic response without reading.
    ///
    /// Cancellation is cooperative: a context firing first interrupts
    /// this await, while the background task finishes its socket work
    /// bounded by the deadline and releases the connection either way.
    pub async fn call(&self, ctx: &CallContext, mut req: Request) -> Result<Response> {
        ctx.check()?;

        ctx.apply_to_meta(&mut req.meta);
        req.set_length();
        let frame = req.encode()?;
        let message_id = req.message_id;
        let oneway = ctx.is_oneway();

        let pool = self.pool.clone();
        let max_frame = self.max_frame_size;
        let task_ctx = ctx.clone();
        let mut task = tokio::spawn(async move {
            let mut lease = pool.get(&task_ctx).await?;
            let round = round_trip(&mut lease, &frame, oneway, message_id, max_frame);
            let result = match task_ctx.deadline() {
                Some(at) => match tokio::time::timeout_at(at, round).await {
                    Ok(result) => result,
                    Err(_) => Err(RpcError::DeadlineExceeded),
                },
                None => round.await,
            };
            if result.is_err() {
                // The stream state is unknown; never park this socket.
                lease.mark_broken();
            }
            result
        });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(e) => Err(RpcError::CallTask(e)),
            },
            // The task is left running: it still owns the lease and
            // returns it on completion.
            _ = ctx.done() => Err(ctx.error()),
        }
    }

    /// Typed invocation of `service.method` with the client's codecs.
    ///
    /// A non-empty `Response.err` surfaces as [`RpcError::Remote`]; an
    /// empty body yields `Out::default()` (void success).
    pub async fn invoke<In, Out>(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        arg: &In,
    ) -> Result<Out>
    where
        In: Serialize + ?Sized,
        Out: DeserializeOwned + Default,
    {
        let serialized = self.serializer.marshal(arg)?;
        let resp = self.invoke_raw(ctx, service, method, serialized).await?;
        if resp.body_len > 0 {
            // Response bodies are raw serialized bytes; no decompression.
            self.serializer.unmarshal(&resp.body)
        } else {
            Ok(Out::default())
        }
    }

    /// Typed invocation for protobuf payloads.
    ///
    /// The prost counterpart of [`Client::invoke`]: the argument and
    /// result cross the wire as protobuf messages, so the client must
    /// be built with [`Serializer::Protobuf`] or the call fails with
    /// `UnsupportedPayload` before any I/O.
    pub async fn invoke_proto<In, Out>(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        arg: &In,
    ) -> Result<Out>
    where
        In: prost::Message,
        Out: prost::Message + Default,
    {
        let serialized = self.serializer.marshal_message(arg)?;
        let resp = self.invoke_raw(ctx, service, method, serialized).await?;
        if resp.body_len > 0 {
            self.serializer.unmarshal_message(&resp.body)
        } else {
            Ok(Out::default())
        }
    }

    /// Shared tail of the typed invocations: compress the serialized
    /// body, build the request, call, surface `Response.err`.
    async fn invoke_raw(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        serialized: Vec<u8>,
    ) -> Result<Response> {
        let body = self.compressor.compress(&serialized)?;

        let mut req = Request::new(service, method, body);
        req.message_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        req.compressor = self.compressor.code();
        req.serializer = self.serializer.code();

        let resp = self.call(ctx, req).await?;
        if !resp.err.is_empty() {
            return Err(RpcError::Remote(
                String::from_utf8_lossy(&resp.err).into_owned(),
            ));
        }
        Ok(resp)
    }

    /// Close parked connections and refuse further calls.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

/// Socket round trip on a leased connection: one contiguous write, then
/// one frame read unless the call is one-way.
async fn round_trip(
    lease: &mut PooledConn,
    frame: &[u8],
    oneway: bool,
    message_id: u32,
    max_frame: usize,
) -> Result<Response> {
    write_frame(lease.stream(), frame).await?;
    if oneway {
        let mut resp = Response::new(message_id);
        resp.set_length();
        return Ok(resp);
    }
    let bytes = read_frame(lease.stream(), max_frame).await?;
    Response::decode(&bytes)
}

/// Materialise a client stub for a declared service shape.
///
/// Each `fn name(In) -> Out;` line becomes an async method
/// `name(&self, ctx, arg: &In) -> Result<Out>` that invokes
/// `service.name` through the wrapped [`Client`]; the declared
/// identifier is the wire method name. Prefix the argument type with
/// `proto` to route the method through the protobuf payload path
/// ([`Client::invoke_proto`]).
///
/// ```ignore
/// service_client! {
///     /// Stub for the greeter service.
///     pub struct GreeterClient: "greeter" {
///         fn say_hello(HelloReq) -> HelloResp;
///         fn say_hello_proto(proto HelloProtoReq) -> HelloProtoResp;
///     }
/// }
/// ```
#[macro_export]
macro_rules! service_client {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident : $service:literal {
            $($methods:tt)*
        }
    ) => {
        $(#[$attr])*
        $vis struct $name {
            client: ::std::sync::Arc<$crate::Client>,
        }

        impl $name {
            /// Wrap a connected client.
            $vis fn new(client: ::std::sync::Arc<$crate::Client>) -> Self {
                Self { client }
            }

            /// Service name used on the wire.
            $vis const fn service_name() -> &'static str {
                $service
            }

            $crate::__service_client_methods! { ($vis) $service; $($methods)* }
        }
    };
}

/// Method expansion for [`service_client!`]; not public API.
#[doc(hidden)]
#[macro_export]
macro_rules! __service_client_methods {
    ( ($vis:vis) $service:literal; ) => {};
    (
        ($vis:vis) $service:literal;
        $(#[$m_attr:meta])* fn $method:ident(proto $in:ty) -> $out:ty;
        $($rest:tt)*
    ) => {
        $(#[$m_attr])*
        $vis async fn $method(
            &self,
            ctx: &$crate::CallContext,
            arg: &$in,
        ) -> $crate::Result<$out> {
            self.client
                .invoke_proto(ctx, $service, stringify!($method), arg)
                .await
        }

        $crate::__service_client_methods! { ($vis) $service; $($rest)* }
    };
    (
        ($vis:vis) $service:literal;
        $(#[$m_attr:meta])* fn $method:ident($in:ty) -> $out:ty;
        $($rest:tt)*
    ) => {
        $(#[$m_attr])*
        $vis async fn $method(
            &self,
            ctx: &$crate::CallContext,
            arg: &$in,
        ) -> $crate::Result<$out> {
            self.client
                .invoke(ctx, $service, stringify!($method), arg)
                .await
        }

        $crate::__service_client_methods! { ($vis) $service; $($rest)* }
    };
}
