//! Abstraction over per-thread/per-task store sessions.
//!
//! Per spec.md §9's design notes, per-thread mutable state for store
//! sessions must not leak into the core: the core obtains sessions from an
//! injected factory and never migrates one across a concurrency boundary.
//! `jobqueue-sqlite::SqliteSessionFactory` is the only implementation, and
//! wraps a `sqlx::SqlitePool` — pool checkout already gives each task an
//! affine connection for the lifetime of one transaction.

use async_trait::async_trait;

use crate::error::Result;

/// Capability that yields durable store sessions and owns schema
/// application/process-lifecycle (the "global convenience entry points"
/// spec.md §9 asks to avoid as module-level globals).
#[async_trait]
pub trait StoreSessionFactory: Send + Sync {
    /// Applies the schema if it is not already present.
    async fn apply_schema(&self) -> Result<()>;

    /// Releases any resources the factory owns (e.g. closes pooled
    /// connections). Safe to call more than once.
    async fn close(&self);
}
