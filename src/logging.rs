//! Logging capability handed to the manager and to every module.
//!
//! The manager never writes to stdout directly. It asks a [`LoggerFactory`]
//! for a [`Logger`] scoped to a name (the manager's own name, or a module's
//! name) and reports through `info`/`error`.
//!
//! The default factory produces [`TracingLogger`]s, which turn each call into a
//! `tracing` event with a `scope` field. [`init_tracing`] installs a subscriber
//! for binaries that don't bring their own.

use std::sync::Arc;

use anyhow::anyhow;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Sink for diagnostics produced by the manager and by modules.
pub trait Logger: Send + Sync {
    /// Reports an informational message.
    fn info(&self, msg: &str);

    /// Reports an error message.
    fn error(&self, msg: &str);
}

/// Creates a [`Logger`] scoped to the given name.
pub type LoggerFactory = Arc<dyn Fn(&str) -> Arc<dyn Logger> + Send + Sync>;

/// Logger that forwards to `tracing`.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    scope: String,
}

impl TracingLogger {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Logger for TracingLogger {
    fn info(&self, msg: &str) {
        tracing::info!(scope = %self.scope, "{}", msg);
    }

    fn error(&self, msg: &str) {
        tracing::error!(scope = %self.scope, "{}", msg);
    }
}

/// The default logger factory: one [`TracingLogger`] per scope.
pub fn tracing_logger_factory() -> LoggerFactory {
    Arc::new(|scope: &str| Arc::new(TracingLogger::new(scope)) as Arc<dyn Logger>)
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured level when it is set. Fails (instead
/// of panicking) if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", config.level, e))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    };

    result.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
