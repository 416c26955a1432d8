//! Handler registry keyed by task kind
//!
//! A task's kind is the string value of its input's `"kind"` field. Tasks
//! whose kind has no registered handler (or that carry no kind) fall back
//! to the default handler when one is set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{HandlerError, TaskHandler};
use crate::persistence::Task;

/// Input field holding the handler key
pub const KIND_FIELD: &str = "kind";

/// Registry of task handlers
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    default: Option<Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for tasks whose input `kind` equals `kind`
    pub fn register(mut self, kind: impl Into<String>, handler: impl TaskHandler) -> Self {
        self.handlers.insert(kind.into(), Arc::new(handler));
        self
    }

    /// Handler used when no kind-specific handler matches
    pub fn with_default(mut self, handler: impl TaskHandler) -> Self {
        self.default = Some(Arc::new(handler));
        self
    }

    /// Number of handlers, the default included
    pub fn len(&self) -> usize {
        self.handlers.len() + usize::from(self.default.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Kind of a task, if its input names one
    pub fn kind_of(task: &Task) -> Option<&str> {
        task.input.get(KIND_FIELD).and_then(|v| v.as_str())
    }

    /// Find the handler for a task
    pub fn resolve(&self, task: &Task) -> Result<Arc<dyn TaskHandler>, HandlerError> {
        let kind = Self::kind_of(task);
        kind.and_then(|k| self.handlers.get(k))
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| {
                HandlerError::failed(format!(
                    "no handler registered for kind={}",
                    kind.unwrap_or("<none>")
                ))
            })
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use chrono::Utc;
    use serde_json::json;

    fn task(input: serde_json::Value) -> Task {
        Task::new("o1", input, Utc::now())
    }

    #[test]
    fn test_resolve_by_kind_then_default() {
        let registry = HandlerRegistry::new()
            .register("enrich", handler_fn("enrich", |_, _| async { Ok(json!({})) }))
            .with_default(handler_fn("fallback", |_, _| async { Ok(json!({})) }));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.kinds(), vec!["enrich"]);

        let enrich = registry.resolve(&task(json!({"kind": "enrich"}))).unwrap();
        assert_eq!(enrich.name(), "enrich");

        let other = registry.resolve(&task(json!({"kind": "scan"}))).unwrap();
        assert_eq!(other.name(), "fallback");

        let untagged = registry.resolve(&task(json!({"k": "v"}))).unwrap();
        assert_eq!(untagged.name(), "fallback");
    }

    #[test]
    fn test_resolve_without_default() {
        let registry = HandlerRegistry::new()
            .register("enrich", handler_fn("enrich", |_, _| async { Ok(json!({})) }));

        let err = match registry.resolve(&task(json!({"kind": "scan"}))) {
            Err(e) => e,
            Ok(_) => panic!("expected no handler"),
        };
        assert_eq!(err.to_string(), "no handler registered for kind=scan");

        assert!(registry.resolve(&task(json!({}))).is_err());
        assert!(HandlerRegistry::new().is_empty());
    }
}
