//! Echo server demo.
//!
//! Run with:
//!
//! ```text
//! cargo run --example echo_server
//! ```
//!
//! then point `echo_client` at it.

use serde::{Deserialize, Serialize};
use wirecall::{Server, ServiceDispatcher};

#[derive(Deserialize)]
struct EchoReq {
    name: String,
}

#[derive(Serialize)]
struct EchoResp {
    msg: String,
}

#[tokio::main]
async fn main() -> wirecall::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,wirecall=debug")),
        )
        .init();

    let mut server = Server::new();
    server.register_service(ServiceDispatcher::new("greeter").method(
        "say_hello",
        |_ctx, req: EchoReq| async move {
            Ok(EchoResp {
                msg: format!("hello {}", req.name),
            })
        },
    ));

    server.start("127.0.0.1:8081").await
}
