//! # stackwatch
//!
//! Supervision for long-running server processes: spawn the binary, merge
//! its stdout and stderr into one per-line event stream, recognize the
//! product's "accepting requests" signal in that stream, enforce a bounded
//! startup window, and tear the process down cleanly (or forcibly) on stop.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stackwatch::{launch::KibanaLaunch, sink::ConsoleSink, ProcessSupervisor};
//! use stackwatch_core::{FreeTextClassifier, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> stackwatch_core::Result<()> {
//! let supervisor = ProcessSupervisor::new(
//! 	SupervisorConfig::default(),
//! 	Arc::new(KibanaLaunch::new("/opt/kibana")),
//! 	Arc::new(FreeTextClassifier),
//! 	Arc::new(ConsoleSink),
//! );
//!
//! supervisor.start().await?;
//! let outcome = supervisor.wait().await?;
//! println!("server exited with {}", outcome.exit_code);
//! # Ok(())
//! # }
//! ```

pub mod launch;
pub mod launcher;
pub mod sink;
pub mod supervisor;

pub use launcher::{ChildProcessLauncher, OutputEvent};
pub use sink::{ConsoleSink, MemorySink, NullSink, OutputSink};
pub use supervisor::{LaunchSpecProvider, ProcessSupervisor};
