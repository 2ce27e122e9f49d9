//! Dispatch seam between the queue and the code that runs a job.
//!
//! The queue only knows a job's `group-method` command and its data. A
//! [`Dispatcher`] resolves that into actual work. [`HandlerRegistry`] is the
//! in-process implementation for programs that embed rq.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::QueueError;

/// Separator between routing group and method in a job command
pub const ROUTE_SEPARATOR: char = '-';

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No handler for group: {0}")]
    UnknownGroup(String),

    #[error("Method not callable: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Failed(String),
}

/// Routing group plus method name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub group: String,
    pub method: String,
}

impl Route {
    pub fn new(group: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            method: method.into(),
        }
    }

    /// Split `group-method` at the first separator.
    pub fn parse(cmd: &str) -> Result<Self, QueueError> {
        match cmd.split_once(ROUTE_SEPARATOR) {
            Some((group, method)) => Ok(Self::new(group, method)),
            None => Err(QueueError::MalformedJob(format!(
                "command [{cmd}] has no group separator"
            ))),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.group, ROUTE_SEPARATOR, self.method)
    }
}

/// Executes jobs on behalf of a worker.
///
/// A call succeeds only if it returns `Value::Null` or `Value::Bool(true)`;
/// the executor records anything else as a failure.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Routes that must run before any method of `group` (constructors,
    /// pre-hooks). Empty by default.
    async fn dependencies(&self, _group: &str) -> Result<Vec<Route>, DispatchError> {
        Ok(Vec::new())
    }

    /// Invoke one route with the job's data.
    async fn execute(&self, route: &Route, data: &Map<String, Value>) -> Result<Value, DispatchError>;
}

/// Handles every method of one routing group
#[async_trait]
pub trait GroupHandler: Send + Sync {
    /// Whether `method` may be invoked from a queued job
    fn exposes(&self, method: &str) -> bool;

    async fn call(&self, method: &str, data: &Map<String, Value>) -> Result<Value, DispatchError>;
}

/// Registry of group handlers (group -> handler), built before workers start.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn GroupHandler>>,
    dependencies: HashMap<String, Vec<Route>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a group, replacing any previous one
    pub fn register(&mut self, group: &str, handler: Arc<dyn GroupHandler>) -> &mut Self {
        self.handlers.insert(group.to_string(), handler);
        self
    }

    /// Declare a route that runs before every job of `group`
    pub fn depends_on(&mut self, group: &str, route: Route) -> &mut Self {
        self.dependencies
            .entry(group.to_string())
            .or_default()
            .push(route);
        self
    }

    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        groups.sort_unstable();
        groups
    }
}

#[async_trait]
impl Dispatcher for HandlerRegistry {
    async fn dependencies(&self, group: &str) -> Result<Vec<Route>, DispatchError> {
        Ok(self.dependencies.get(group).cloned().unwrap_or_default())
    }

    async fn execute(&self, route: &Route, data: &Map<String, Value>) -> Result<Value, DispatchError> {
        let handler = self
            .handlers
            .get(&route.group)
            .ok_or_else(|| DispatchError::UnknownGroup(route.group.clone()))?;

        if !handler.exposes(&route.method) {
            return Err(DispatchError::Forbidden(route.to_string()));
        }

        handler.call(&route.method, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl GroupHandler for EchoHandler {
        fn exposes(&self, method: &str) -> bool {
            method != "internal"
        }

        async fn call(&self, method: &str, data: &Map<String, Value>) -> Result<Value, DispatchError> {
            Ok(json!({ "method": method, "data": data }))
        }
    }

    #[test]
    fn test_route_parse() {
        let route = Route::parse("orders-create").unwrap();
        assert_eq!(route, Route::new("orders", "create"));
        assert_eq!(route.to_string(), "orders-create");

        // Only the first separator splits
        let route = Route::parse("reports-build-daily").unwrap();
        assert_eq!(route.method, "build-daily");

        assert!(matches!(
            Route::parse("orders"),
            Err(QueueError::MalformedJob(msg)) if msg.contains("[orders]")
        ));
    }

    #[tokio::test]
    async fn test_registry_dispatches_to_group() {
        let mut registry = HandlerRegistry::new();
        registry.register("orders", Arc::new(EchoHandler));

        let data = json!({"id": 1}).as_object().cloned().unwrap();
        let result = registry
            .execute(&Route::new("orders", "create"), &data)
            .await
            .unwrap();
        assert_eq!(result["method"], "create");
        assert_eq!(result["data"]["id"], 1);
    }

    #[tokio::test]
    async fn test_registry_rejects_unknown_and_hidden() {
        let mut registry = HandlerRegistry::new();
        registry.register("orders", Arc::new(EchoHandler));
        let data = Map::new();

        let err = registry
            .execute(&Route::new("billing", "charge"), &data)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownGroup(g) if g == "billing"));

        let err = registry
            .execute(&Route::new("orders", "internal"), &data)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_registry_reports_dependencies() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("orders", Arc::new(EchoHandler))
            .depends_on("orders", Route::new("auth", "check"));

        assert_eq!(
            registry.dependencies("orders").await.unwrap(),
            vec![Route::new("auth", "check")]
        );
        assert!(registry.dependencies("billing").await.unwrap().is_empty());
        assert_eq!(registry.groups(), vec!["orders"]);
    }
}
