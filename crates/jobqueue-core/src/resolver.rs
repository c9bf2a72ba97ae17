//! The resolver: an injected capability that maps a job's persisted
//! `function_identifier` back to executable code. Out of scope as a
//! concrete implementation (spec.md §1) — the core only depends on this
//! trait and on the sum-type outcome a resolved call produces.

use async_trait::async_trait;
use serde_json::Value as Json;

/// The outcome of one execution attempt, replacing exceptions-for-control-
/// flow (spec.md §9): the worker never catches a panic from user code as
/// its primary failure path, it matches on this sum type.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Ok(Json),
    Err(String),
}

/// A callable resolved from a job's `function_identifier`.
#[async_trait]
pub trait JobFunction: Send + Sync {
    async fn call(&self, parameters: Json) -> JobOutcome;
}

/// Maps a textual function identifier to a callable. Fallible: an
/// unresolvable identifier is recorded as the job's error and counts
/// toward its retry budget exactly like a `JobExecutionFailure`.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(
        &self,
        function_identifier: &str,
    ) -> Result<std::sync::Arc<dyn JobFunction>, String>;
}
