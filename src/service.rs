//! Server-side service dispatch.
//!
//! A [`ServiceDispatcher`] maps method names to handlers for one
//! service. Each registered handler owns its typed pipeline: unmarshal
//! the argument with the request's serializer, invoke the user closure,
//! marshal the result with the same serializer. Registration is
//! explicit: the dispatch table is the only source of callable methods.
//!
//! # Example
//!
//! ```ignore
//! let greeter = ServiceDispatcher::new("greeter")
//!     .method("say_hello", |_ctx, req: HelloReq| async move {
//!         Ok(HelloResp { msg: format!("hello {}", req.name) })
//!     });
//! server.register_service(greeter);
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::CallContext;
use crate::error::{Result, RpcError};
use crate::serialize::Serializer;

/// Boxed future returned by method handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe bridge between wire bytes and a typed method.
trait MethodHandler: Send + Sync {
    fn call(
        &self,
        ctx: CallContext,
        serializer: Serializer,
        body: Vec<u8>,
    ) -> BoxFuture<'static, Result<Vec<u8>>>;
}

/// Wrapper binding a typed closure to the wire pipeline.
struct TypedMethod<F, In, Out, Fut> {
    handler: F,
    _marker: PhantomData<fn(In) -> (Out, Fut)>,
}

impl<F, In, Out, Fut> MethodHandler for TypedMethod<F, In, Out, Fut>
where
    F: Fn(CallContext, In) -> Fut + Send + Sync + 'static,
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
    Fut: Future<Output = Result<Out>> + Send + 'static,
{
    fn call(
        &self,
        ctx: CallContext,
        serializer: Serializer,
        body: Vec<u8>,
    ) -> BoxFuture<'static, Result<Vec<u8>>> {
        let arg: In = match serializer.unmarshal(&body) {
            Ok(arg) => arg,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        let fut = (self.handler)(ctx, arg);
        Box::pin(async move {
            let out = fut.await?;
            serializer.marshal(&out)
        })
    }
}

/// Wrapper binding a prost-typed closure to the wire pipeline.
struct ProtoMethod<F, In, Out, Fut> {
    handler: F,
    _marker: PhantomData<fn(In) -> (Out, Fut)>,
}

impl<F, In, Out, Fut> MethodHandler for ProtoMethod<F, In, Out, Fut>
where
    F: Fn(CallContext, In) -> Fut + Send + Sync + 'static,
    In: prost::Message + Default + 'static,
    Out: prost::Message + 'static,
    Fut: Future<Output = Result<Out>> + Send + 'static,
{
    fn call(
        &self,
        ctx: CallContext,
        serializer: Serializer,
        body: Vec<u8>,
    ) -> BoxFuture<'static, Result<Vec<u8>>> {
        let arg: In = match serializer.unmarshal_message(&body) {
            Ok(arg) => arg,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        let fut = (self.handler)(ctx, arg);
        Box::pin(async move {
            let out = fut.await?;
            serializer.marshal_message(&out)
        })
    }
}

/// Dispatch table for one named service.
pub struct ServiceDispatcher {
    name: String,
    methods: HashMap<String, Box<dyn MethodHandler>>,
}

impl ServiceDispatcher {
    /// Empty dispatcher for the service called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Service name as it appears in request headers.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register `handler` under `method`, replacing any previous entry.
    ///
    /// The handler takes the rebuilt [`CallContext`] and a deserialized
    /// argument, and returns the typed result or an error whose message
    /// is surfaced to the caller through `Response.err`.
    pub fn method<F, In, Out, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(CallContext, In) -> Fut + Send + Sync + 'static,
        In: DeserializeOwned + Send + 'static,
        Out: Serialize + Send + 'static,
        Fut: Future<Output = Result<Out>> + Send + 'static,
    {
        self.methods.insert(
            method.to_string(),
            Box::new(TypedMethod {
                handler,
                _marker: PhantomData,
            }),
        );
        self
    }

    /// Register a protobuf-typed `handler` under `method`, replacing
    /// any previous entry.
    ///
    /// The prost counterpart of [`ServiceDispatcher::method`]:
    /// arguments and results cross the wire as protobuf messages, so
    /// callers must select the protobuf serializer. A request arriving
    /// with a serde format fails dispatch with `UnsupportedPayload`.
    pub fn proto_method<F, In, Out, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(CallContext, In) -> Fut + Send + Sync + 'static,
        In: prost::Message + Default + 'static,
        Out: prost::Message + 'static,
        Fut: Future<Output = Result<Out>> + Send + 'static,
    {
        self.methods.insert(
            method.to_string(),
            Box::new(ProtoMethod {
                handler,
                _marker: PhantomData,
            }),
        );
        self
    }

    /// Registered method names, for diagnostics.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Run `method` against `body`.
    ///
    /// The returned future is `'static`, so one-way invocations can be
    /// spawned past the life of the request loop iteration.
    pub(crate) fn dispatch(
        &self,
        ctx: CallContext,
        serializer: Serializer,
        method: &str,
        body: Vec<u8>,
    ) -> Result<BoxFuture<'static, Result<Vec<u8>>>> {
        let handler = self
            .methods
            .get(method)
            .ok_or_else(|| RpcError::MethodNotFound(method.to_string()))?;
        Ok(handler.call(ctx, serializer, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct AddReq {
        a: i64,
        b: i64,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct AddResp {
        sum: i64,
    }

    fn calculator() -> ServiceDispatcher {
        ServiceDispatcher::new("calculator")
            .method("add", |_ctx, req: AddReq| async move {
                Ok(AddResp { sum: req.a + req.b })
            })
            .method("fail", |_ctx, _req: AddReq| async move {
                Err::<AddResp, _>(RpcError::handler("mock error"))
            })
    }

    #[tokio::test]
    async fn dispatches_registered_method() {
        let svc = calculator();
        let body = Serializer::Json.marshal(&AddReq { a: 2, b: 3 }).unwrap();

        let fut = svc
            .dispatch(CallContext::new(), Serializer::Json, "add", body)
            .unwrap();
        let out = fut.await.unwrap();

        let resp: AddResp = Serializer::Json.unmarshal(&out).unwrap();
        assert_eq!(resp, AddResp { sum: 5 });
    }

    #[tokio::test]
    async fn result_uses_request_serializer() {
        let svc = calculator();
        let body = Serializer::MsgPack.marshal(&AddReq { a: 1, b: 1 }).unwrap();

        let fut = svc
            .dispatch(CallContext::new(), Serializer::MsgPack, "add", body)
            .unwrap();
        let out = fut.await.unwrap();

        let resp: AddResp = Serializer::MsgPack.unmarshal(&out).unwrap();
        assert_eq!(resp.sum, 2);
    }

    #[test]
    fn unknown_method_is_reported() {
        let svc = calculator();
        let result = svc.dispatch(CallContext::new(), Serializer::Json, "divide", Vec::new());
        assert!(matches!(result, Err(RpcError::MethodNotFound(m)) if m == "divide"));
    }

    #[tokio::test]
    async fn handler_error_propagates() {
        let svc = calculator();
        let body = Serializer::Json.marshal(&AddReq { a: 0, b: 0 }).unwrap();

        let fut = svc
            .dispatch(CallContext::new(), Serializer::Json, "fail", body)
            .unwrap();
        let err = fut.await.unwrap_err();
        assert_eq!(err.to_string(), "mock error");
    }

    #[tokio::test]
    async fn malformed_argument_is_a_serialization_error() {
        let svc = calculator();
        let fut = svc
            .dispatch(
                CallContext::new(),
                Serializer::Json,
                "add",
                b"not json".to_vec(),
            )
            .unwrap();
        assert!(matches!(fut.await, Err(RpcError::Json(_))));
    }

    #[test]
    fn method_names_lists_registrations() {
        let svc = calculator();
        let mut names: Vec<_> = svc.method_names().collect();
        names.sort_unstable();
        assert_eq!(names, ["add", "fail"]);
    }

    #[derive(Clone, PartialEq, prost::Message)]
    struct ProtoAdd {
        #[prost(int64, tag = "1")]
        a: i64,
        #[prost(int64, tag = "2")]
        b: i64,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    struct ProtoSum {
        #[prost(int64, tag = "1")]
        sum: i64,
    }

    fn proto_calculator() -> ServiceDispatcher {
        ServiceDispatcher::new("calculator").proto_method(
            "add",
            |_ctx, req: ProtoAdd| async move { Ok(ProtoSum { sum: req.a + req.b }) },
        )
    }

    #[tokio::test]
    async fn dispatches_proto_method() {
        let svc = proto_calculator();
        let body = Serializer::Protobuf
            .marshal_message(&ProtoAdd { a: 20, b: 22 })
            .unwrap();

        let fut = svc
            .dispatch(CallContext::new(), Serializer::Protobuf, "add", body)
            .unwrap();
        let out = fut.await.unwrap();

        let resp: ProtoSum = Serializer::Protobuf.unmarshal_message(&out).unwrap();
        assert_eq!(resp, ProtoSum { sum: 42 });
    }

    #[tokio::test]
    async fn serde_request_to_proto_method_is_rejected() {
        let svc = proto_calculator();
        let fut = svc
            .dispatch(CallContext::new(), Serializer::Json, "add", b"{}".to_vec())
            .unwrap();
        assert!(matches!(
            fut.await,
            Err(RpcError::UnsupportedPayload(1))
        ));
    }
}
