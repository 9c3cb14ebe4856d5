//! Echo client demo, counterpart of `echo_server`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wirecall::{CallContext, Client};

#[derive(Serialize, Default)]
struct EchoReq {
    name: String,
}

#[derive(Deserialize, Default, Debug)]
struct EchoResp {
    msg: String,
}

wirecall::service_client! {
    /// Stub for the demo greeter service.
    struct GreeterClient: "greeter" {
        fn say_hello(EchoReq) -> EchoResp;
    }
}

#[tokio::main]
async fn main() -> wirecall::Result<()> {
    tracing_subscriber::fmt().init();

    let client = Arc::new(Client::builder("127.0.0.1:8081").build().await?);
    let greeter = GreeterClient::new(client);

    let ctx = CallContext::new().with_timeout(Duration::from_secs(2));
    let resp = greeter
        .say_hello(
            &ctx,
            &EchoReq {
                name: "wirecall".into(),
            },
        )
        .await?;
    println!("{}", resp.msg);
    Ok(())
}
