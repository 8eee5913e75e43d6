//! Storycrawl Pool
//!
//! This crate provides the bounded worker-pool [`ExecutionService`] used by
//! storycrawl to render stories. It is agnostic to what a task or an outcome
//! contains: the caller supplies the workers, the tasks, and an `apply`
//! function that binds a task and returns a job to run against a worker.
//!
//! # Architecture
//!
//! ```text
//!            tasks[0..M]                       claim cursor (AtomicUsize)
//!                 │                                      │
//!                 ▼                                      ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ExecutionService                       │
//! │  lane 0 ── worker 0 ── claim → apply(task)(worker) → record │
//! │  lane 1 ── worker 1 ── claim → apply(task)(worker) → record │
//! │  ...                                                        │
//! │  lane N-1 ─ worker N-1                                      │
//! └─────────────────────────────────────────────────────────────┘
//!                               │  JoinSet (counting join)
//!                               ▼
//!                  outcomes[0..M] in task order
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let service = ExecutionService::boot(4, |slot| Preview::boot(&connection, slot)).await?;
//!
//! let result = service
//!   .execute(stories, |story: &Story| {
//!     let story = story.clone();
//!     move |worker: Arc<Preview>| async move { worker.render(&story).await }
//!   }, CancellationToken::new())
//!   .await;
//!
//! service.shutdown().await?;
//! let outcomes = result?;
//! ```

mod error;
mod service;
mod worker;

pub use error::ExecutionError;
pub use service::ExecutionService;
pub use worker::Worker;
