//! Testing utilities for `jobqueue-core`.
//!
//! The production resolver is an injected capability outside this
//! workspace's scope (spec.md §4.4); [`FnRegistry`] is a minimal in-memory
//! stand-in so `Worker` can be exercised in tests without a real
//! function-registration mechanism.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use jobqueue_core::{JobFunction, JobOutcome, Resolver};
use serde_json::Value as Json;

/// An in-memory `function_identifier -> callable` table.
#[derive(Default)]
pub struct FnRegistry {
    functions: RwLock<HashMap<String, Arc<dyn JobFunction>>>,
}

impl FnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async closure under `name`. Later registrations under
    /// the same name replace earlier ones.
    pub fn register<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Json) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobOutcome> + Send + 'static,
    {
        self.functions
            .write()
            .expect("FnRegistry lock poisoned")
            .insert(name.into(), Arc::new(ClosureFn(f)));
    }
}

#[async_trait]
impl Resolver for FnRegistry {
    async fn resolve(&self, function_identifier: &str) -> Result<Arc<dyn JobFunction>, String> {
        self.functions
            .read()
            .expect("FnRegistry lock poisoned")
            .get(function_identifier)
            .cloned()
            .ok_or_else(|| format!("no function registered for '{function_identifier}'"))
    }
}

struct ClosureFn<F>(F);

#[async_trait]
impl<F, Fut> JobFunction for ClosureFn<F>
where
    F: Fn(Json) -> Fut + Send + Sync,
    Fut: Future<Output = JobOutcome> + Send,
{
    async fn call(&self, parameters: Json) -> JobOutcome {
        (self.0)(parameters).await
    }
}

/// Builds a [`JobOutcome::Ok`] from anything serializable, for concise
/// assertions in test function bodies.
pub fn ok(value: impl serde::Serialize) -> JobOutcome {
    JobOutcome::Ok(serde_json::to_value(value).expect("test value must serialize"))
}

/// Builds a [`JobOutcome::Err`] from a message.
pub fn err(message: impl Into<String>) -> JobOutcome {
    JobOutcome::Err(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_registered_function() {
        let registry = FnRegistry::new();
        registry.register("echo", |params: Json| async move { ok(params) });

        let function = registry.resolve("echo").await.unwrap();
        let outcome = function.call(json!({"a": 1})).await;
        match outcome {
            JobOutcome::Ok(value) => assert_eq!(value, json!({"a": 1})),
            JobOutcome::Err(message) => panic!("unexpected error: {message}"),
        }
    }

    #[tokio::test]
    async fn unresolved_function_is_a_string_error() {
        let registry = FnRegistry::new();
        let result = registry.resolve("missing").await;
        assert!(result.is_err());
    }
}
