//! # wirecall
//!
//! Lightweight RPC over TCP with a compact binary framing protocol.
//!
//! Requests carry a variable-length header (service, method and a small
//! string-to-string meta map) plus an opaque body that has been
//! serialized and optionally compressed; responses echo the request's
//! message id alongside an error string or a result body. The client
//! leases sockets from a bounded pool and performs each call as one
//! write-then-read; the server runs one task per connection and
//! dispatches into explicitly registered, typed method handlers.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use wirecall::{CallContext, Client, Server, ServiceDispatcher};
//!
//! #[derive(Serialize, Deserialize, Default)]
//! struct HelloReq { name: String }
//! #[derive(Serialize, Deserialize, Default)]
//! struct HelloResp { msg: String }
//!
//! wirecall::service_client! {
//!     pub struct GreeterClient: "greeter" {
//!         fn say_hello(HelloReq) -> HelloResp;
//!     }
//! }
//!
//! # async fn run() -> wirecall::Result<()> {
//! let mut server = Server::new();
//! server.register_service(ServiceDispatcher::new("greeter").method(
//!     "say_hello",
//!     |_ctx, req: HelloReq| async move {
//!         Ok(HelloResp { msg: format!("hello {}", req.name) })
//!     },
//! ));
//! tokio::spawn(server.start("127.0.0.1:8081"));
//!
//! let client = Arc::new(Client::builder("127.0.0.1:8081").build().await?);
//! let greeter = GreeterClient::new(client);
//! let resp = greeter
//!     .say_hello(&CallContext::new(), &HelloReq { name: "ada".into() })
//!     .await?;
//! assert_eq!(resp.msg, "hello ada");
//! # Ok(())
//! # }
//! ```

pub mod compress;
pub mod context;
pub mod discovery;
pub mod error;
pub mod framing;
pub mod message;
pub mod pool;
pub mod serialize;
pub mod server;
pub mod service;

mod client;

pub use client::{Client, ClientBuilder};
pub use context::CallContext;
pub use error::{Result, RpcError};
pub use message::{Request, Response};
pub use pool::{ConnectionPool, PoolConfig};
pub use serialize::Serializer;
pub use server::Server;
pub use service::ServiceDispatcher;
