//! Process adapter for stagehand.
//!
//! Turns a [`ModuleManager`](stagehand::ModuleManager) into the core of a
//! process: initialize on start, destroy on SIGINT/SIGTERM/SIGHUP.
//!
//! ```rust,no_run
//! use stagehand::{ManagerConfig, ModuleManager};
//! use stagehand_process::run_as_application_core;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let manager = ModuleManager::new(ManagerConfig::new());
//!     // manager.register(...)
//!     let cause = run_as_application_core(&manager).await?;
//!     std::process::exit(cause.exit_code());
//! }
//! ```

pub mod signals;

pub use signals::{run_as_application_core, run_until, ShutdownSignals, TerminationCause};
