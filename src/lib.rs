//! AppInstance Controller Library
//!
//! This library provides the core functionality for the AppInstance controller:
//! template resolution, the reconcile state cache, the diff & upsert engine and the
//! reconcilers built on top of them.
//!
//! ## Quick Start
//!
//! ```rust
//! use app_bundle_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
