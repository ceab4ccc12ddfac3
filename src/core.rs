//! Tool modeling: tool definitions, typed tool sugar, and the name router
//!
//! A tool is a Tower service from `ToolInvocation` to `ToolOutput`. Agents own
//! a `ToolRouter` that dispatches by name.

use std::collections::HashMap;
use std::{future::Future, pin::Pin, sync::Arc};

use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::{util::BoxCloneService, BoxError, Service};

use crate::provider::ToolSpec;

// =============================
// Tool service modeling
// =============================

/// Uniform tool invocation passed to routed tool services.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,   // tool_call_id
    pub name: String, // function name
    pub arguments: Value,
}

/// Uniform tool output produced by tool services.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub id: String, // same as invocation.id
    pub result: Value,
}

/// Boxed tool service type alias.
pub type ToolSvc = BoxCloneService<ToolInvocation, ToolOutput, BoxError>;

type JsonHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync + 'static>;

/// Definition of a tool: what the model sees plus the service that runs it.
#[derive(Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
    pub service: ToolSvc,
}

impl ToolDef {
    /// Create a tool definition from a handler that takes JSON args and returns JSON.
    pub fn from_handler(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        handler: JsonHandler,
    ) -> Self {
        let name = name.into();
        let expected = name.clone();
        let svc = tower::service_fn(move |inv: ToolInvocation| {
            let handler = handler.clone();
            let expected = expected.clone();
            async move {
                if inv.name != expected {
                    return Err::<ToolOutput, BoxError>(
                        format!("routed to wrong tool: expected={}, got={}", expected, inv.name)
                            .into(),
                    );
                }
                let out = (handler)(inv.arguments).await?;
                Ok(ToolOutput {
                    id: inv.id,
                    result: out,
                })
            }
        });
        Self {
            name,
            description: description.into(),
            parameters_schema,
            service: BoxCloneService::new(svc),
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema.clone(),
        }
    }
}

/// Create a tool from a typed handler.
/// - `A` is the input args struct (Deserialize + JsonSchema)
/// - `R` is the output type (Serialize)
pub fn tool_typed<A, H, Fut, R>(
    name: impl Into<String>,
    description: impl Into<String>,
    handler: H,
) -> ToolDef
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
    R: serde::Serialize + Send + 'static,
    H: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
{
    let schema = schemars::schema_for!(A);
    let params_value =
        serde_json::to_value(schema.schema).unwrap_or_else(|_| json!({ "type": "object" }));
    let handler = Arc::new(handler);
    let json_handler: JsonHandler = Arc::new(move |raw: Value| {
        let h = handler.clone();
        Box::pin(async move {
            let args: A = serde_json::from_value(raw)?;
            let out: R = (h.as_ref())(args).await?;
            Ok(serde_json::to_value(out)?)
        })
    });
    ToolDef::from_handler(name, description, params_value, json_handler)
}

/// Router service over tools using a name → index table.
#[derive(Clone)]
pub struct ToolRouter {
    name_to_index: HashMap<String, usize>,
    services: Vec<ToolSvc>, // index 0 is the unknown-tool fallback
}

impl ToolRouter {
    pub fn new(tools: Vec<ToolDef>) -> (Self, Vec<ToolSpec>) {
        let unknown = BoxCloneService::new(tower::service_fn(|inv: ToolInvocation| async move {
            Err::<ToolOutput, BoxError>(format!("unknown tool: {}", inv.name).into())
        }));

        let mut services: Vec<ToolSvc> = vec![unknown];
        let mut specs: Vec<ToolSpec> = Vec::with_capacity(tools.len());
        let mut name_to_index: HashMap<String, usize> = HashMap::new();

        for (i, td) in tools.into_iter().enumerate() {
            specs.push(td.spec());
            name_to_index.insert(td.name, i + 1);
            services.push(td.service);
        }

        (
            Self {
                name_to_index,
                services,
            },
            specs,
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }
}

impl Service<ToolInvocation> for ToolRouter {
    type Response = ToolOutput;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ToolInvocation) -> Self::Future {
        let idx = self
            .name_to_index
            .get(req.name.as_str())
            .copied()
            .unwrap_or(0);

        // index 0 is always present
        let svc: &mut ToolSvc = &mut self.services[idx];
        Box::pin(svc.call(req))
    }
}

// =============================
// Sharing
// =============================

/// Makes a `Clone` but `!Sync` service shareable between tasks.
///
/// Callers take a private clone per call, so no lock is held while the
/// service runs.
pub struct SharedService<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Clone> SharedService<S> {
    pub fn new(service: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    pub async fn handle(&self) -> S {
        self.inner.lock().await.clone()
    }
}

/// Text placed in the tool-result message for a tool's JSON output.
pub fn render_tool_result(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Deserialize, JsonSchema)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    fn add_tool() -> ToolDef {
        tool_typed("add", "Add two integers", |args: AddArgs| async move {
            Ok::<_, BoxError>(args.a + args.b)
        })
    }

    #[tokio::test]
    async fn router_dispatches_by_name() {
        let (router, specs) = ToolRouter::new(vec![add_tool()]);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "add");
        assert!(specs[0].parameters["properties"]["a"].is_object());

        let out = router
            .oneshot(ToolInvocation {
                id: "call_1".into(),
                name: "add".into(),
                arguments: json!({"a": 2, "b": 3}),
            })
            .await
            .unwrap();
        assert_eq!(out.id, "call_1");
        assert_eq!(out.result, json!(5));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let (router, _) = ToolRouter::new(vec![add_tool()]);
        let err = router
            .oneshot(ToolInvocation {
                id: "call_2".into(),
                name: "subtract".into(),
                arguments: json!({}),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: subtract");
    }

    #[tokio::test]
    async fn bad_arguments_surface_as_errors() {
        let (router, _) = ToolRouter::new(vec![add_tool()]);
        let res = router
            .oneshot(ToolInvocation {
                id: "call_3".into(),
                name: "add".into(),
                arguments: json!({"a": "two"}),
            })
            .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn shared_service_hands_out_clones() {
        let (router, _) = ToolRouter::new(vec![add_tool()]);
        let shared = SharedService::new(router);
        let a = shared.handle().await;
        let b = shared.clone().handle().await;
        assert!(a.contains("add"));
        assert!(b.contains("add"));
    }

    #[test]
    fn string_results_render_verbatim() {
        assert_eq!(render_tool_result(&json!("Microwave stopped.")), "Microwave stopped.");
        assert_eq!(render_tool_result(&json!(true)), "true");
        assert_eq!(render_tool_result(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
