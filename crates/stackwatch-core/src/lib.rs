//! # stackwatch-core
//!
//! Shared types for the stackwatch process supervisor: launch specifications,
//! output lines, lifecycle states, exit outcomes, the console-line grammars
//! that recognize server startup signals, and supervisor configuration.
//!
//! Everything here is synchronous and side-effect free; the async machinery
//! lives in the `stackwatch` crate.

pub mod classify;
pub mod config;
pub mod error;
pub mod types;

pub use classify::{BracketedLogClassifier, FreeTextClassifier, LineClassifier, Severity};
pub use config::{SupervisorConfig, TimeoutPolicy};
pub use error::{Error, Result};
pub use types::*;
