use crate::core::frame::Body;
use crate::core::serialization::SerializationFormat;
use crate::error::{RpcError, Result};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// A decoded call, ready to run: resolves to the encoded reply.
pub type Invocation = BoxFuture<'static, Result<Body>>;

type BindFn = dyn Fn(SerializationFormat, &Body) -> Result<Invocation> + Send + Sync + 'static;

/// Typed method table keyed by `Type.Method`.
///
/// Each entry knows its own argument and reply types, so decoding a request
/// body is an explicit, per-method step rather than a guess at runtime.
/// Built up front and shared read-only by every connection.
#[derive(Default)]
pub struct ServiceRegistry {
    methods: HashMap<Cow<'static, str>, Box<BindFn>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `method`.
    ///
    /// The argument is decoded into `A` and the reply encoded from `R` with the
    /// connection's format. A handler error becomes the response's `Error`
    /// text.
    pub fn register<A, R, E, F, Fut>(&mut self, method: &str, handler: F) -> Result<&mut Self>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        split_method(method)?;
        if self.methods.contains_key(method) {
            return Err(RpcError::DuplicateMethod(method.to_string()));
        }

        let handler = Arc::new(handler);
        let bind = move |format: SerializationFormat, args: &Body| -> Result<Invocation> {
            let arg: A = format.decode_body(args)?;
            let handler = Arc::clone(&handler);
            Ok(Box::pin(async move {
                let reply = (*handler)(arg)
                    .await
                    .map_err(|e| RpcError::Service(e.to_string()))?;
                format.encode_body(&reply)
            }))
        };

        self.methods
            .insert(Cow::Owned(method.to_string()), Box::new(bind));
        Ok(self)
    }

    /// Resolve `method` and decode `args` into its argument type.
    ///
    /// Fails on an ill-formed or unknown name, or when the body does not
    /// decode; nothing runs until the returned invocation is awaited.
    pub fn bind(
        &self,
        method: &str,
        format: SerializationFormat,
        args: &Body,
    ) -> Result<Invocation> {
        split_method(method)?;
        let bind = self
            .methods
            .get(method)
            .ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;
        bind(format, args)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().map(|m| m.to_string()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

/// Split `Type.Method` into its halves.
pub fn split_method(method: &str) -> Result<(&str, &str)> {
    match method.split_once('.') {
        Some((service, name)) if !service.is_empty() && !name.is_empty() && !name.contains('.') => {
            Ok((service, name))
        }
        _ => Err(RpcError::MalformedMethod(method.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Args {
        a: i64,
        b: i64,
    }

    fn arith() -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        registry
            .register("Arith.Sum", |args: Args| async move {
                Ok::<_, String>(args.a + args.b)
            })
            .unwrap()
            .register("Arith.Div", |args: Args| async move {
                if args.b == 0 {
                    Err("divide by zero".to_string())
                } else {
                    Ok(args.a / args.b)
                }
            })
            .unwrap();
        registry
    }

    #[test]
    fn test_split_method() {
        assert_eq!(split_method("Foo.Sum").unwrap(), ("Foo", "Sum"));
        for bad in ["FooSum", ".Sum", "Foo.", "Foo.Sum.Extra", ""] {
            assert!(
                matches!(split_method(bad), Err(RpcError::MalformedMethod(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_bind_and_invoke() {
        let registry = arith();
        for format in SerializationFormat::ALL {
            let args = format.encode_body(&Args { a: 2, b: 3 }).unwrap();
            let reply = registry.bind("Arith.Sum", format, &args).unwrap().await.unwrap();
            let sum: i64 = format.decode_body(&reply).unwrap();
            assert_eq!(sum, 5, "format {format}");
        }
    }

    #[tokio::test]
    async fn test_handler_error_becomes_service_error() {
        let registry = arith();
        let format = SerializationFormat::Json;
        let args = format.encode_body(&Args { a: 1, b: 0 }).unwrap();

        let err = registry.bind("Arith.Div", format, &args).unwrap().await.unwrap_err();
        assert_eq!(err.to_string(), "divide by zero");
    }

    #[test]
    fn test_bind_rejects_undecodable_body() {
        let registry = arith();
        let format = SerializationFormat::Json;
        let args = format.encode_body("not an Args").unwrap();

        let result = registry.bind("Arith.Sum", format, &args);
        assert!(matches!(result, Err(RpcError::DeserializeError(_))));
    }

    #[test]
    fn test_bind_unknown_and_malformed_methods() {
        let registry = arith();
        let body = SerializationFormat::Json.sentinel_body();

        assert!(matches!(
            registry.bind("Arith.Mul", SerializationFormat::Json, &body),
            Err(RpcError::UnknownMethod(_))
        ));
        assert!(matches!(
            registry.bind("ArithMul", SerializationFormat::Json, &body),
            Err(RpcError::MalformedMethod(_))
        ));
    }

    #[test]
    fn test_duplicate_and_malformed_registration() {
        let mut registry = arith();
        let dup = registry.register("Arith.Sum", |x: i64| async move { Ok::<_, String>(x) });
        assert!(matches!(dup, Err(RpcError::DuplicateMethod(_))));

        let bad = registry.register("Sum", |x: i64| async move { Ok::<_, String>(x) });
        assert!(matches!(bad, Err(RpcError::MalformedMethod(_))));

        assert_eq!(registry.methods(), vec!["Arith.Div", "Arith.Sum"]);
    }
}
