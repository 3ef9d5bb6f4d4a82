//! Signal wiring for a process whose core is a [`ModuleManager`].
//!
//! # Flow
//!
//! ```text
//! run_as_application_core(manager)
//!     ↓
//! 1. Install SIGINT / SIGTERM / SIGHUP listeners and a panic hook
//! 2. manager.init()
//!    ├── failed   → InitFailed (exit 1), rollback already ran
//!    └── panicked → manager.destroy() → Panic (exit 3)
//! 3. Wait for the first signal or a panic anywhere in the process
//! 4. manager.destroy()
//! 5. Return the cause; the caller exits with cause.exit_code()
//! ```
//!
//! Listeners are installed before `init()` so a signal that arrives while
//! modules are still starting is buffered and handled as soon as init
//! completes.
//!
//! # Rust Learning Note
//!
//! The core crate never touches signals or calls `std::process::exit`. This
//! adapter returns a [`TerminationCause`] and leaves exiting to `main`, which
//! keeps destructors and test harnesses working.
//!
//! ## Panics
//!
//! A panic inside a module's init unwinds through `manager.init()`.
//! `FutureExt::catch_unwind` turns it back into a value here. The dropped
//! `init()` future leaves the manager in the cancelled state, so the
//! following `destroy()` only tears down modules whose init completed.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use stagehand::ModuleManager;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Why the process is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// SIGINT or Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGHUP: the controlling terminal went away.
    Hangup,
    /// `init()` failed; modules were rolled back.
    InitFailed,
    /// A panic occurred, either in a module or in another task.
    Panic,
}

impl TerminationCause {
    /// Process exit code for this cause.
    pub fn exit_code(self) -> i32 {
        match self {
            TerminationCause::Interrupt | TerminationCause::Terminate => 0,
            TerminationCause::InitFailed => 1,
            TerminationCause::Hangup => 2,
            TerminationCause::Panic => 3,
        }
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationCause::Interrupt => "SIGINT",
            TerminationCause::Terminate => "SIGTERM",
            TerminationCause::Hangup => "SIGHUP",
            TerminationCause::InitFailed => "init failure",
            TerminationCause::Panic => "panic",
        };
        f.write_str(name)
    }
}

/// Listeners for the events that end the process.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    panics: mpsc::UnboundedReceiver<()>,
}

impl ShutdownSignals {
    /// Starts listening. Signals received from now on are not lost.
    ///
    /// Also installs a process-wide panic hook that runs the previous hook
    /// and then reports the panic to [`ShutdownSignals::recv`].
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
            panics: watch_panics(),
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            panics: watch_panics(),
        })
    }

    /// Waits for the first signal or panic.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> io::Result<TerminationCause> {
        let cause = tokio::select! {
            _ = self.interrupt.recv() => TerminationCause::Interrupt,
            _ = self.terminate.recv() => TerminationCause::Terminate,
            _ = self.hangup.recv() => TerminationCause::Hangup,
            Some(()) = self.panics.recv() => TerminationCause::Panic,
        };
        Ok(cause)
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> io::Result<TerminationCause> {
        // On non-Unix systems, just use Ctrl+C
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok(TerminationCause::Interrupt)
            }
            Some(()) = self.panics.recv() => Ok(TerminationCause::Panic),
        }
    }
}

fn watch_panics() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        let _ = tx.send(());
    }));
    rx
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic payload"
    }
}

/// Runs `manager` as the core of the process until a termination signal.
///
/// Returns an error only if the signal listeners cannot be installed or
/// stop working; in the latter case the manager is still destroyed.
pub async fn run_as_application_core(manager: &ModuleManager) -> io::Result<TerminationCause> {
    info!(
        manager = manager.name(),
        "Registering signal handlers (SIGINT, SIGTERM, SIGHUP)"
    );
    let mut signals = ShutdownSignals::install()?;
    run_until(manager, signals.recv()).await
}

/// Initializes `manager`, waits for `shutdown`, then destroys it.
///
/// `shutdown` is only awaited after a successful init. A failed init returns
/// [`TerminationCause::InitFailed`] without destroying anything more: the
/// manager already rolled back the modules that had started. A panic during
/// init destroys the modules that completed and returns
/// [`TerminationCause::Panic`].
pub async fn run_until<F>(manager: &ModuleManager, shutdown: F) -> io::Result<TerminationCause>
where
    F: Future<Output = io::Result<TerminationCause>>,
{
    match AssertUnwindSafe(manager.init()).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(manager = manager.name(), "Initialization failed: {}", e);
            return Ok(TerminationCause::InitFailed);
        }
        Err(payload) => {
            error!(
                manager = manager.name(),
                "Panic during initialization: {}",
                panic_message(payload.as_ref())
            );
            manager.destroy().await;
            return Ok(TerminationCause::Panic);
        }
    }

    let cause = shutdown.await;
    match &cause {
        Ok(cause) => info!(manager = manager.name(), "Received {}...", cause),
        Err(e) => error!(manager = manager.name(), "Failed to wait for shutdown signal: {}", e),
    }

    manager.destroy().await;
    cause
}
