//! Stagehand - in-process module lifecycle manager.
//!
//! Register modules (init step, optional destroy step, environment
//! requirements, one exported service, imported services), then:
//!
//! - `init()` validates the environment and initializes modules one at a
//!   time, in registration order. If one fails, the modules that already
//!   completed are destroyed in reverse before the error is returned.
//! - `destroy()` destroys every module in reverse registration order, logging
//!   and skipping destroy errors.
//!
//! Both run at most once per manager.
//!
//! ```rust
//! use stagehand::{EnvDeclaration, ManagerConfig, ModuleDescriptor, ModuleManager};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> stagehand::Result<()> {
//! let manager = ModuleManager::new(ManagerConfig::new().with_name("hello"));
//!
//! manager.register(
//!     ModuleDescriptor::new("greeter")
//!         .env(EnvDeclaration::new("GREETING").with_default("Hello world!"))
//!         .init_sync(|ctx| {
//!             if let Some(greeting) = ctx.env().get("GREETING") {
//!                 ctx.logger().info(&greeting.to_string());
//!             }
//!             Ok(None)
//!         }),
//! )?;
//!
//! manager.init().await?;
//! manager.destroy().await;
//! # Ok(())
//! # }
//! ```
//!
//! Signal handling lives in the `stagehand-process` crate.

mod catalog;
pub mod config;
mod context;
pub mod env;
mod lifecycle;
pub mod logging;
pub mod manager;
pub mod module_types;
mod registry;

// Re-export main types for easy use
pub use config::{LogFormat, LoggingConfig, ManagerConfig, Settings};
pub use context::Context;
pub use env::{EnvDeclaration, EnvValue, Environment};
pub use logging::{Logger, LoggerFactory, TracingLogger};
pub use manager::{InitState, ModuleManager};
pub use module_types::{ModuleDescriptor, ModuleDestroy, ModuleInit, Value};
pub use stagehand_common::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
