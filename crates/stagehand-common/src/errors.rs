//! Error types for the stagehand lifecycle manager.
//!
//! # Rust Learning Note
//!
//! Module code reports failures as `anyhow::Error` (any error type, with
//! context). The manager wraps those causes into the typed [`Error`] below so
//! callers can pattern match on *what phase* failed:
//!
//! ```rust
//! use stagehand_common::Error;
//!
//! fn describe(err: &Error) -> &'static str {
//!     match err {
//!         Error::Registration { .. } => "bad descriptor",
//!         Error::Environment { .. } => "missing or invalid variables",
//!         Error::ContractViolation { .. } => "export not produced",
//!         Error::Initialization { .. } => "module init failed",
//!         Error::Cancelled { .. } => "init dropped before it finished",
//!         Error::Teardown { .. } => "module destroy failed",
//!         Error::Config { .. } => "bad settings",
//!     }
//! }
//! ```
//!
//! ## Why `Clone`?
//!
//! The outcome of `init()` is computed once and handed to every caller, so the
//! error has to be clonable. Causes are kept behind `Arc<anyhow::Error>`,
//! which makes cloning a reference count bump.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for stagehand operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stagehand operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A descriptor or env declaration was rejected by `register`.
    #[error("{message}")]
    Registration {
        message: String,
    },

    /// One or more environment requirements were not met.
    ///
    /// Every violation is kept; the display form joins them with newlines.
    #[error("{}", .messages.join("\n"))]
    Environment {
        messages: Vec<String>,
    },

    /// A module declared an export but its init produced nothing.
    #[error("Module {module} broke contract and did not export service {service}")]
    ContractViolation {
        module: String,
        service: String,
    },

    /// A module's own init step failed.
    #[error("Module {module} failed to initialize: {cause}")]
    Initialization {
        module: String,
        cause: Arc<anyhow::Error>,
    },

    /// The first `init()` future was dropped before it finished. Later calls
    /// report this instead of starting the modules a second time.
    #[error("Initialization of {manager} was cancelled before it completed")]
    Cancelled {
        manager: String,
    },

    /// A module's destroy step failed. Logged, never returned to callers.
    #[error("Error destroying {module}: {cause}")]
    Teardown {
        module: String,
        cause: Arc<anyhow::Error>,
    },

    /// Settings could not be loaded or did not validate.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

impl Error {
    /// Creates a Registration error.
    pub fn registration(message: impl Into<String>) -> Self {
        Self::Registration {
            message: message.into(),
        }
    }

    /// Creates an Environment error from the collected violations.
    pub fn environment(messages: Vec<String>) -> Self {
        Self::Environment { messages }
    }

    /// Creates a ContractViolation error.
    pub fn contract_violation(module: impl Into<String>, service: impl Into<String>) -> Self {
        Self::ContractViolation {
            module: module.into(),
            service: service.into(),
        }
    }

    /// Wraps the failure of a module's init step.
    pub fn initialization(module: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Initialization {
            module: module.into(),
            cause: Arc::new(cause),
        }
    }

    /// Creates a Cancelled error.
    pub fn cancelled(manager: impl Into<String>) -> Self {
        Self::Cancelled {
            manager: manager.into(),
        }
    }

    /// Wraps the failure of a module's destroy step.
    pub fn teardown(module: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Teardown {
            module: module.into(),
            cause: Arc::new(cause),
        }
    }

    /// Creates a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Name of the module the error is about, if it concerns a single module.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::ContractViolation { module, .. }
            | Self::Initialization { module, .. }
            | Self::Teardown { module, .. } => Some(module),
            _ => None,
        }
    }
}
