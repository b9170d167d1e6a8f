//! # Controller
//!
//! Core controller modules for the AppInstance controller.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `builders`: Expected managed resources, one pure builder per kind
//! - `diff`: Drift detection and create/update/recreate/delete decisions
//! - `error`: Reconciler error type and classification
//! - `merge`: Template inheritance resolution
//! - `mutex_registry`: Per-resource async locks
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks
//! - `state_cache`: Spec hash debounce gate and per-object backoff
//! - `store`: Cluster API seam (Kubernetes and in-memory)

pub mod backoff;
pub mod builders;
pub mod diff;
pub mod error;
pub mod merge;
pub mod mutex_registry;
pub mod reconciler;
pub mod server;
pub mod state_cache;
pub mod store;
