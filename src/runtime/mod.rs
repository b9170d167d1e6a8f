//! # Runtime
//!
//! Process wiring: initialization, the controller watch loops and their error
//! policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
