//! RPC server: accept loop, per-connection request loop, dispatch.
//!
//! One task per accepted connection; each connection handles requests
//! strictly sequentially, so responses leave in completion order and
//! the client's write-then-read discipline holds. Registration happens
//! before [`Server::start`]; the service table is read-only while
//! serving.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::compress::{Compressor, CompressorRegistry, Gzip};
use crate::context::CallContext;
use crate::error::{Result, RpcError};
use crate::framing::{read_frame, write_frame};
use crate::message::{Request, Response, MAX_FRAME_SIZE};
use crate::serialize::Serializer;
use crate::service::ServiceDispatcher;

/// RPC server over TCP.
///
/// # Example
///
/// ```ignore
/// let mut server = Server::new();
/// server.register_service(greeter);
/// server.start("127.0.0.1:8081").await?;
/// ```
pub struct Server {
    services: HashMap<String, ServiceDispatcher>,
    compressors: CompressorRegistry,
    max_frame_size: usize,
}

impl Server {
    /// Server with the built-in compressors (identity, gzip) and no
    /// services.
    pub fn new() -> Self {
        let mut compressors = CompressorRegistry::new();
        compressors.register(Arc::new(Gzip));
        Self {
            services: HashMap::new(),
            compressors,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Register a service dispatcher under its own name, replacing any
    /// previous registration.
    pub fn register_service(&mut self, service: ServiceDispatcher) {
        self.services.insert(service.name().to_string(), service);
    }

    /// Register an additional compressor.
    pub fn register_compressor(&mut self, compressor: Arc<dyn Compressor>) {
        self.compressors.register(compressor);
    }

    /// Override the maximum accepted frame size.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    /// Bind `addr` and serve until the task is dropped.
    pub async fn start(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "serving");
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    ///
    /// Accept failures are logged and the loop continues; only dropping
    /// the serving task stops it.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let server = Arc::new(self);
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "accepted connection");
                    let server = server.clone();
                    tokio::spawn(async move {
                        match server.handle_conn(stream).await {
                            Ok(()) => tracing::debug!(%peer, "connection closed"),
                            Err(e) => tracing::debug!(%peer, error = %e, "connection dropped"),
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Sequential request loop for one connection.
    ///
    /// Read, decode and write errors terminate the loop and close the
    /// connection; dispatch-level failures travel back as error
    /// responses and the loop continues.
    async fn handle_conn(self: Arc<Self>, mut stream: TcpStream) -> Result<()> {
        loop {
            let frame = match read_frame(&mut stream, self.max_frame_size).await {
                Ok(frame) => frame,
                Err(RpcError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };
            let req = Request::decode(&frame)?;
            let ctx = CallContext::from_meta(&req.meta);

            if ctx.is_oneway() {
                // Fire and forget: no response frame, and the deadline
                // does not cut the invocation short.
                let server = self.clone();
                let ctx = ctx.without_deadline();
                tokio::spawn(async move {
                    if let Err(e) = server.execute(ctx, &req).await {
                        tracing::debug!(
                            service = %req.service,
                            method = %req.method,
                            error = %e,
                            "one-way invocation failed"
                        );
                    }
                });
                continue;
            }

            let response = self.respond(ctx, &req).await;
            write_frame(&mut stream, &response.encode()).await?;
        }
    }

    /// Turn a request into a response, folding dispatch errors into
    /// `Response.err`. The message id is echoed in every case.
    async fn respond(&self, ctx: CallContext, req: &Request) -> Response {
        let mut resp = Response::new(req.message_id);
        match self.execute(ctx, req).await {
            Ok(body) => resp.body = body,
            Err(e) => resp.err = e.to_string().into_bytes(),
        }
        resp.set_length();
        resp
    }

    /// Dispatch: service, compressor, decompress, serializer, method,
    /// invoke. Synchronous invocations are bounded by the rebuilt
    /// deadline.
    async fn execute(&self, ctx: CallContext, req: &Request) -> Result<Vec<u8>> {
        let service = self
            .services
            .get(&req.service)
            .ok_or_else(|| RpcError::ServiceNotFound(req.service.clone()))?;
        let compressor = self.compressors.get(req.compressor)?;
        let raw = compressor.decompress(&req.body)?;
        let serializer = Serializer::from_code(req.serializer)?;

        let deadline = ctx.deadline();
        let invocation = service.dispatch(ctx, serializer, &req.method, raw)?;
        match deadline {
            Some(at) => tokio::time::timeout_at(at, invocation)
                .await
                .map_err(|_| RpcError::DeadlineExceeded)?,
            None => invocation.await,
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Echo {
        text: String,
    }

    fn echo_server() -> Server {
        let mut server = Server::new();
        server.register_service(ServiceDispatcher::new("echo").method(
            "say",
            |_ctx, req: Echo| async move { Ok(Echo { text: req.text }) },
        ));
        server
    }

    fn request_for(service: &str, method: &str, body: Vec<u8>) -> Request {
        let mut req = Request::new(service, method, body);
        req.message_id = 17;
        req.serializer = Serializer::Json.code();
        req.set_length();
        req
    }

    #[tokio::test]
    async fn respond_echoes_message_id_on_success_and_error() {
        let server = echo_server();
        let body = Serializer::Json
            .marshal(&Echo {
                text: "hi".to_string(),
            })
            .unwrap();

        let ok = server
            .respond(CallContext::new(), &request_for("echo", "say", body))
            .await;
        assert_eq!(ok.message_id, 17);
        assert!(ok.err.is_empty());

        let missing = server
            .respond(CallContext::new(), &request_for("nope", "say", Vec::new()))
            .await;
        assert_eq!(missing.message_id, 17);
        assert_eq!(missing.err, b"service nope not found");
        assert_eq!(missing.body_len, 0);
    }

    #[tokio::test]
    async fn unsupported_codes_become_error_responses() {
        let server = echo_server();

        let mut req = request_for("echo", "say", Vec::new());
        req.compressor = 9;
        req.set_length();
        let resp = server.respond(CallContext::new(), &req).await;
        assert_eq!(resp.err, b"unsupported compressor 9");

        let mut req = request_for("echo", "say", Vec::new());
        req.serializer = 9;
        req.set_length();
        let resp = server.respond(CallContext::new(), &req).await;
        assert_eq!(resp.err, b"unsupported serializer 9");
    }

    #[tokio::test]
    async fn unknown_method_becomes_error_response() {
        let server = echo_server();
        let resp = server
            .respond(CallContext::new(), &request_for("echo", "shout", Vec::new()))
            .await;
        assert_eq!(resp.err, b"method shout not found");
    }

    #[tokio::test]
    async fn expired_deadline_bounds_invocation() {
        let mut server = Server::new();
        server.register_service(ServiceDispatcher::new("slow").method(
            "nap",
            |_ctx, req: Echo| async move {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(req)
            },
        ));

        let body = Serializer::Json
            .marshal(&Echo {
                text: "zzz".to_string(),
            })
            .unwrap();
        let ctx = CallContext::new().with_timeout(std::time::Duration::from_millis(20));
        let resp = server.respond(ctx, &request_for("slow", "nap", body)).await;
        assert_eq!(resp.err, b"deadline exceeded");
    }
}
