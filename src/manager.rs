//! Module manager - the public façade.
//!
//! # Architecture
//!
//! ```text
//! ModuleManager
//!     ├── Registry         (register → validated, ordered modules)
//!     ├── LifecycleEngine  (env, catalog, init values)
//!     ├── init outcome     (OnceCell, computed once)
//!     └── teardown outcome (OnceCell, shared by rollback and destroy)
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! register()* ──► init() ──► Succeeded ──► destroy()
//!                   │                         ▲
//!                   └──► Failed ──► rollback ─┘ (same teardown, runs once)
//! ```
//!
//! # Rust Learning Note
//!
//! ## Memoized outcomes with `tokio::sync::OnceCell`
//!
//! `init()` and `destroy()` may be called any number of times, from any
//! number of tasks. `OnceCell::get_or_init` runs the initializer for the first
//! caller; every other caller awaits the same result. That gives the
//! "computed at most once" guarantee without a hand-written state machine.

use std::fmt;
use std::sync::{Arc, Mutex};

use stagehand_common::{Error, Result};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::ManagerConfig;
use crate::context::ContextBuilder;
use crate::env::EnvValue;
use crate::lifecycle::{lock, LifecycleEngine};
use crate::logging::Logger;
use crate::module_types::ModuleDescriptor;
use crate::registry::{RegisteredModule, Registry};

/// Observable progress of `init()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// `init()` has not been called.
    Pending,
    /// Modules are being initialized.
    Running,
    /// Every module initialized.
    Succeeded,
    /// Environment validation or a module failed; rollback has run.
    Failed,
}

/// Registers modules, initializes them in order and destroys them in reverse.
///
/// # Example
///
/// ```rust
/// use stagehand::{ManagerConfig, ModuleDescriptor, ModuleManager, Value};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> stagehand::Result<()> {
/// let manager = ModuleManager::new(ManagerConfig::new().with_name("app"));
///
/// manager
///     .register(
///         ModuleDescriptor::new("one")
///             .export("symbolFromOne")
///             .init_sync(|_ctx| Ok(Some(Value::new("Message from one")))),
///     )?
///     .register(
///         ModuleDescriptor::new("two")
///             .imports(["symbolFromOne"])
///             .init_sync(|ctx| {
///                 let message = ctx.import_as::<&str>("symbolFromOne");
///                 ctx.logger().info(&format!("{:?}", message));
///                 Ok(None)
///             }),
///     )?;
///
/// manager.init().await?;
/// manager.destroy().await;
/// # Ok(())
/// # }
/// ```
pub struct ModuleManager {
    name: String,
    logger: Arc<dyn Logger>,
    registry: Mutex<Registry>,
    engine: LifecycleEngine,
    state: Mutex<InitState>,
    /// Modules whose init completed, in completion order.
    completed: Mutex<Vec<Arc<RegisteredModule>>>,
    init_outcome: OnceCell<Result<()>>,
    teardown: OnceCell<()>,
}

impl ModuleManager {
    /// Creates a manager from `config`.
    pub fn new(config: ManagerConfig) -> Self {
        let ManagerConfig {
            name,
            logger_factory,
            env,
        } = config;

        let logger = logger_factory(&name);
        let engine = LifecycleEngine::new(
            name.clone(),
            Arc::clone(&logger),
            ContextBuilder::new(logger_factory),
            env,
        );

        debug!(manager = %name, "Creating module manager");

        Self {
            name,
            logger,
            registry: Mutex::new(Registry::new()),
            engine,
            state: Mutex::new(InitState::Pending),
            completed: Mutex::new(Vec::new()),
            init_outcome: OnceCell::new(),
            teardown: OnceCell::new(),
        }
    }

    /// Validates and appends a module.
    ///
    /// Returns the manager so registrations can be chained with `?`.
    /// Rejected once `init()` has started running. The registry is sealed
    /// when the `init()` future is first polled, so a module registered
    /// between creating that future and awaiting it is still initialized.
    pub fn register(&self, descriptor: ModuleDescriptor) -> Result<&Self> {
        lock(&self.registry).register(descriptor, &self.name)?;
        Ok(self)
    }

    /// Initializes every registered module in registration order.
    ///
    /// Runs once. Later and concurrent calls get the first call's outcome.
    /// On failure, modules that completed are destroyed in reverse before the
    /// error is returned.
    ///
    /// If the first `init()` future is dropped before it finishes, no module
    /// is initialized a second time: the next call rolls back the modules that
    /// completed and fails with [`Error::Cancelled`].
    pub async fn init(&self) -> Result<()> {
        self.init_outcome
            .get_or_init(|| self.run_init())
            .await
            .clone()
    }

    async fn run_init(&self) -> Result<()> {
        let interrupted = {
            let mut state = lock(&self.state);
            let interrupted = *state == InitState::Running;
            *state = InitState::Running;
            interrupted
        };
        let modules = {
            let mut registry = lock(&self.registry);
            registry.seal();
            registry.snapshot()
        };

        if interrupted {
            return self.roll_back(&modules, Error::cancelled(&self.name)).await;
        }
        debug!(manager = %self.name, modules = modules.len(), "Registry sealed");

        if let Err(err) = self.engine.validate_environment(&modules) {
            self.set_state(InitState::Failed);
            return Err(err);
        }

        match self.engine.initialize(&modules, &self.completed).await {
            Ok(()) => {
                self.set_state(InitState::Succeeded);
                Ok(())
            }
            Err(err) => self.roll_back(&modules, err).await,
        }
    }

    /// Destroys the modules that completed init, newest first, and returns
    /// `err`.
    async fn roll_back(&self, modules: &[Arc<RegisteredModule>], err: Error) -> Result<()> {
        let completed = lock(&self.completed).clone();
        let failed = modules
            .get(completed.len())
            .map(|m| m.name.as_str())
            .unwrap_or_default();
        let reason = match &err {
            Error::Initialization { cause, .. } => format!("{:#}", cause),
            other => other.to_string(),
        };
        self.logger
            .error(&format!("Could not initialize module {}: {}", failed, reason));
        self.logger
            .error("Attempting to shutdown already initialized modules gracefully!");

        self.teardown
            .get_or_init(|| self.engine.teardown(completed.into_iter().rev()))
            .await;

        self.set_state(InitState::Failed);
        Err(err)
    }

    /// Destroys every registered module in reverse registration order.
    ///
    /// Runs once and never fails; destroy errors are logged. If `init()` is in
    /// progress this waits for its outcome first. After a failed `init()` the
    /// rollback already counts as the teardown, so nothing runs again. Never
    /// starts a module's init step.
    pub async fn destroy(&self) {
        let sealed = lock(&self.registry).is_sealed();
        if sealed {
            // The outcome itself was already reported to the init caller.
            let _ = self.init().await;
        }

        self.teardown
            .get_or_init(|| async {
                let modules = lock(&self.registry).snapshot();
                self.engine.teardown(modules.into_iter().rev()).await;
            })
            .await;
    }

    fn set_state(&self, state: InitState) {
        *lock(&self.state) = state;
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_count(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Registered module names, in registration order.
    pub fn module_names(&self) -> Vec<String> {
        lock(&self.registry).names()
    }

    pub fn init_state(&self) -> InitState {
        *lock(&self.state)
    }

    /// Name of the module that exports `service`.
    pub fn service_owner(&self, service: &str) -> Option<String> {
        lock(&self.registry).owner_of(service).map(str::to_string)
    }

    /// Current value of a variable in the manager's environment, including
    /// defaults written during `init()`.
    pub fn env_value(&self, name: &str) -> Option<EnvValue> {
        self.engine.env_value(name)
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleManager")
            .field("name", &self.name)
            .field("modules", &self.module_names())
            .field("state", &self.init_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvDeclaration, Environment};
    use crate::logging::LoggerFactory;
    use crate::module_types::Value;
    use anyhow::anyhow;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Records every log line and every lifecycle call, in order.
    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<String>>,
    }

    impl Journal {
        fn push(&self, entry: impl Into<String>) {
            self.entries.lock().unwrap().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.entries.lock().unwrap().clone()
        }

        /// Entries with the given prefix, prefix stripped.
        fn calls(&self, prefix: &str) -> Vec<String> {
            self.entries()
                .iter()
                .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
                .collect()
        }
    }

    impl Logger for Journal {
        fn info(&self, msg: &str) {
            self.push(format!("info: {}", msg));
        }

        fn error(&self, msg: &str) {
            self.push(format!("error: {}", msg));
        }
    }

    fn manager_with_env(journal: &Arc<Journal>, env: Environment) -> ModuleManager {
        let journal = Arc::clone(journal);
        let factory: LoggerFactory = Arc::new(move |_: &str| journal.clone() as Arc<dyn Logger>);
        ModuleManager::new(
            ManagerConfig::new()
                .with_name("test")
                .with_logger_factory(factory)
                .with_env(env),
        )
    }

    fn manager(journal: &Arc<Journal>) -> ModuleManager {
        manager_with_env(journal, Environment::new())
    }

    /// A module that records its init and destroy calls.
    fn tracked(journal: &Arc<Journal>, name: &str) -> ModuleDescriptor {
        let on_init = Arc::clone(journal);
        let on_destroy = Arc::clone(journal);
        ModuleDescriptor::new(name)
            .init_sync(move |ctx| {
                on_init.push(format!("init {}", ctx.module_name()));
                Ok(None)
            })
            .destroy_sync(move |ctx, _| {
                on_destroy.push(format!("destroy {}", ctx.module_name()));
                Ok(())
            })
    }

    fn failing(journal: &Arc<Journal>, name: &str) -> ModuleDescriptor {
        let on_init = Arc::clone(journal);
        let on_destroy = Arc::clone(journal);
        ModuleDescriptor::new(name)
            .init(move |ctx| {
                let journal = Arc::clone(&on_init);
                async move {
                    journal.push(format!("init {}", ctx.module_name()));
                    Err(anyhow!("boom"))
                }
            })
            .destroy_sync(move |ctx, _| {
                on_destroy.push(format!("destroy {}", ctx.module_name()));
                Ok(())
            })
    }

    #[tokio::test]
    async fn test_init_in_registration_order_destroy_in_reverse() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager
            .register(tracked(&journal, "a"))
            .unwrap()
            .register(tracked(&journal, "b"))
            .unwrap()
            .register(tracked(&journal, "c"))
            .unwrap();

        manager.init().await.unwrap();
        manager.destroy().await;

        let calls: Vec<String> = journal
            .entries()
            .into_iter()
            .filter(|e| e.starts_with("init ") || e.starts_with("destroy "))
            .collect();
        assert_eq!(
            calls,
            vec!["init a", "init b", "init c", "destroy c", "destroy b", "destroy a"]
        );
        assert_eq!(manager.module_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_completed_modules() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager.register(tracked(&journal, "a")).unwrap();
        manager.register(failing(&journal, "b")).unwrap();
        manager.register(tracked(&journal, "c")).unwrap();

        let err = manager.init().await.unwrap_err();
        manager.destroy().await;

        match &err {
            Error::Initialization { module, cause } => {
                assert_eq!(module, "b");
                assert_eq!(cause.to_string(), "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(journal.calls("init "), vec!["a", "b"]);
        assert_eq!(journal.calls("destroy "), vec!["a"]);
        assert_eq!(manager.init_state(), InitState::Failed);

        let entries = journal.entries();
        assert!(entries.contains(&"error: Could not initialize module b: boom".to_string()));
        assert!(entries.contains(
            &"error: Attempting to shutdown already initialized modules gracefully!".to_string()
        ));
        let destroyed_all = entries
            .iter()
            .filter(|e| *e == "info: Destroyed all modules for <test>")
            .count();
        assert_eq!(destroyed_all, 1);
    }

    #[tokio::test]
    async fn test_destroy_receives_init_value() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        let produced = Value::new(String::from("connection"));
        let received: Arc<Mutex<Option<Value>>> = Arc::default();

        let to_return = produced.clone();
        let sink = Arc::clone(&received);
        manager
            .register(
                ModuleDescriptor::new("db")
                    .init_sync(move |_ctx| Ok(Some(to_return.clone())))
                    .destroy_sync(move |_ctx, value| {
                        *sink.lock().unwrap() = value;
                        Ok(())
                    }),
            )
            .unwrap();

        manager.init().await.unwrap();
        manager.destroy().await;

        let received = received.lock().unwrap().clone().expect("destroy got a value");
        assert!(Value::ptr_eq(&produced, &received));
    }

    #[tokio::test]
    async fn test_destroy_without_init_value_gets_none() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        let saw_none = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&saw_none);
        manager
            .register(
                ModuleDescriptor::new("m")
                    .init_sync(|_ctx| Ok(None))
                    .destroy_sync(move |_ctx, value| {
                        *flag.lock().unwrap() = value.is_none();
                        Ok(())
                    }),
            )
            .unwrap();

        manager.init().await.unwrap();
        manager.destroy().await;

        assert!(*saw_none.lock().unwrap());
    }

    #[tokio::test]
    async fn test_init_and_destroy_run_once() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager.register(tracked(&journal, "only")).unwrap();

        manager.init().await.unwrap();
        manager.init().await.unwrap();
        manager.destroy().await;
        manager.destroy().await;

        assert_eq!(journal.calls("init "), vec!["only"]);
        assert_eq!(journal.calls("destroy "), vec!["only"]);
    }

    #[tokio::test]
    async fn test_failed_init_outcome_is_shared() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager.register(failing(&journal, "f")).unwrap();

        let first = manager.init().await.unwrap_err();
        let second = manager.init().await.unwrap_err();

        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(journal.calls("init "), vec!["f"]);
    }

    #[tokio::test]
    async fn test_concurrent_init_runs_once() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        let on_init = Arc::clone(&journal);
        manager
            .register(ModuleDescriptor::new("slow").init(move |_ctx| {
                let journal = Arc::clone(&on_init);
                async move {
                    tokio::task::yield_now().await;
                    journal.push("init slow");
                    Ok(None)
                }
            }))
            .unwrap();

        let (a, b) = tokio::join!(manager.init(), manager.init());

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(journal.calls("init "), vec!["slow"]);
    }

    #[tokio::test]
    async fn test_destroy_waits_for_running_init() {
        let journal = Arc::new(Journal::default());
        let manager = Arc::new(manager(&journal));
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let gates = Arc::new(Mutex::new(Some((started_tx, release_rx))));

        let on_init = Arc::clone(&journal);
        let on_destroy = Arc::clone(&journal);
        manager
            .register(
                ModuleDescriptor::new("slow")
                    .init(move |_ctx| {
                        let journal = Arc::clone(&on_init);
                        let gates = gates.lock().unwrap().take();
                        async move {
                            if let Some((started, release)) = gates {
                                let _ = started.send(());
                                let _ = release.await;
                            }
                            journal.push("init slow done");
                            Ok(None)
                        }
                    })
                    .destroy_sync(move |_ctx, _| {
                        on_destroy.push("destroy slow");
                        Ok(())
                    }),
            )
            .unwrap();

        let init_task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.init().await }
        });
        started_rx.await.unwrap();
        assert_eq!(manager.init_state(), InitState::Running);

        let destroy_task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.destroy().await }
        });
        release_tx.send(()).unwrap();

        destroy_task.await.unwrap();
        init_task.await.unwrap().unwrap();

        let calls: Vec<String> = journal
            .entries()
            .into_iter()
            .filter(|e| e == "init slow done" || e == "destroy slow")
            .collect();
        assert_eq!(calls, vec!["init slow done", "destroy slow"]);
    }

    #[tokio::test]
    async fn test_cancelled_init_is_not_restarted() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager.register(tracked(&journal, "fast")).unwrap();
        let on_init = Arc::clone(&journal);
        let on_destroy = Arc::clone(&journal);
        manager
            .register(
                ModuleDescriptor::new("stuck")
                    .init(move |ctx| {
                        let journal = Arc::clone(&on_init);
                        async move {
                            journal.push(format!("init {}", ctx.module_name()));
                            std::future::pending::<()>().await;
                            Ok(None)
                        }
                    })
                    .destroy_sync(move |ctx, _| {
                        on_destroy.push(format!("destroy {}", ctx.module_name()));
                        Ok(())
                    }),
            )
            .unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(20), manager.init()).await;
        assert!(timed_out.is_err());
        assert_eq!(manager.init_state(), InitState::Running);

        manager.destroy().await;
        let err = manager.init().await.unwrap_err();

        assert!(matches!(err, Error::Cancelled { .. }));
        assert_eq!(journal.calls("init "), vec!["fast", "stuck"]);
        assert_eq!(journal.calls("destroy "), vec!["fast"]);
        assert_eq!(manager.init_state(), InitState::Failed);
        assert!(journal.entries().contains(
            &"error: Could not initialize module stuck: Initialization of test was cancelled before it completed"
                .to_string()
        ));
    }

    #[tokio::test]
    async fn test_register_before_first_poll_is_initialized() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager.register(tracked(&journal, "early")).unwrap();

        let pending = manager.init();
        manager.register(tracked(&journal, "late")).unwrap();
        pending.await.unwrap();

        assert_eq!(journal.calls("init "), vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_contract_violation() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager.register(tracked(&journal, "before")).unwrap();
        manager
            .register(ModuleDescriptor::new("lazy").export("svc").init_sync(|_ctx| Ok(None)))
            .unwrap();

        let err = manager.init().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Module lazy broke contract and did not export service svc"
        );
        assert_eq!(journal.calls("destroy "), vec!["before"]);
        assert!(journal.entries().contains(
            &"error: Could not initialize module lazy: Module lazy broke contract and did not export service svc"
                .to_string()
        ));
    }

    #[tokio::test]
    async fn test_import_scenario() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager
            .register(
                ModuleDescriptor::new("one")
                    .export("symbolFromOne")
                    .init_sync(|_ctx| Ok(Some(Value::new("Message from one".to_string())))),
            )
            .unwrap()
            .register(
                ModuleDescriptor::new("two")
                    .imports(["symbolFromOne"])
                    .init_sync(|ctx| {
                        let message = ctx
                            .import_as::<String>("symbolFromOne")
                            .ok_or_else(|| anyhow!("symbolFromOne not imported"))?;
                        ctx.logger().info(&format!("two received: {}", message));
                        Ok(None)
                    }),
            )
            .unwrap();

        manager.init().await.unwrap();

        let entries = journal.entries();
        assert!(entries.contains(&"info: Initializing module <one>() -> [symbolFromOne]".to_string()));
        assert!(entries.contains(&"info: Initializing module <two>(symbolFromOne) -> []".to_string()));
        assert!(entries.contains(&"info: two received: Message from one".to_string()));
        assert!(entries.contains(
            &"info: Initialization of all registered modules completed successfully for <test>".to_string()
        ));
        assert_eq!(manager.service_owner("symbolFromOne").as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn test_registration_errors() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager
            .register(ModuleDescriptor::new("first").export("svc").init_sync(|_ctx| Ok(Some(Value::new(1u8)))))
            .unwrap();

        let missing = manager
            .register(ModuleDescriptor::new("consumer").imports(["nope"]).init_sync(|_ctx| Ok(None)))
            .unwrap_err();
        assert_eq!(
            missing.to_string(),
            "Refusing to register module consumer which wants to import missing services [nope]"
        );

        let duplicate = manager
            .register(ModuleDescriptor::new("second").export("svc").init_sync(|_ctx| Ok(Some(Value::new(2u8)))))
            .unwrap_err();
        let message = duplicate.to_string();
        assert!(message.contains("first") && message.contains("second"));

        assert_eq!(manager.module_count(), 1);
    }

    #[tokio::test]
    async fn test_register_after_init_rejected() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager.init().await.unwrap();

        let err = manager.register(tracked(&journal, "late")).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Refusing to register a module late after test.init() has been called"
        );
    }

    #[tokio::test]
    async fn test_init_state_transitions() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        assert_eq!(manager.init_state(), InitState::Pending);

        manager.register(tracked(&journal, "m")).unwrap();
        manager.init().await.unwrap();

        assert_eq!(manager.init_state(), InitState::Succeeded);
    }

    #[tokio::test]
    async fn test_env_missing_with_hint() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager
            .register(
                tracked(&journal, "db")
                    .env(EnvDeclaration::new("DB_URL").with_hint("postgres connection string"))
                    .env(EnvDeclaration::new("DB_USER")),
            )
            .unwrap();

        let err = manager.init().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Module db needs environment variable <DB_URL>: postgres connection string\n\
             Module db needs environment variable <DB_USER>"
        );
        assert!(journal.calls("init ").is_empty());
        assert!(journal.entries().contains(
            &"error: Module db needs environment variable <DB_URL>: postgres connection string".to_string()
        ));
        assert_eq!(manager.init_state(), InitState::Failed);
    }

    #[tokio::test]
    async fn test_env_default_visible_in_context() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        manager
            .register(
                ModuleDescriptor::new("web")
                    .env(EnvDeclaration::new("PORT").with_default(8080))
                    .init_sync(move |ctx| {
                        *sink.lock().unwrap() = ctx.env().get("PORT").cloned();
                        Ok(None)
                    }),
            )
            .unwrap();

        manager.init().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(EnvValue::from(8080)));
        assert_eq!(manager.env_value("PORT"), Some(EnvValue::from(8080)));
        assert!(journal
            .entries()
            .contains(&"info: Module web env[PORT] := <8080>".to_string()));
    }

    #[tokio::test]
    async fn test_env_explicit_value_beats_default() {
        let journal = Arc::new(Journal::default());
        let env: Environment = [("PORT", "9000")].into_iter().collect();
        let manager = manager_with_env(&journal, env);
        manager
            .register(tracked(&journal, "web").env(EnvDeclaration::new("PORT").with_default(8080)))
            .unwrap();

        manager.init().await.unwrap();

        assert_eq!(manager.env_value("PORT").unwrap(), "9000");
    }

    #[tokio::test]
    async fn test_env_predicate_rejection() {
        let journal = Arc::new(Journal::default());
        let env: Environment = [("MODE", "chaos")].into_iter().collect();
        let manager = manager_with_env(&journal, env);
        manager
            .register(tracked(&journal, "svc").env(
                EnvDeclaration::new("MODE").with_valid(|v| matches!(v.as_str(), Some("dev" | "prod"))),
            ))
            .unwrap();

        let err = manager.init().await.unwrap_err();

        assert!(matches!(err, Error::Environment { .. }));
        assert_eq!(
            err.to_string(),
            "Module svc has variable <MODE> which was rejected by 'valid' predicate"
        );
    }

    #[tokio::test]
    async fn test_env_report_masks_hidden_values() {
        let journal = Arc::new(Journal::default());
        let env: Environment = [("API_KEY", "s3cr3t")].into_iter().collect();
        let manager = manager_with_env(&journal, env);
        manager
            .register(tracked(&journal, "api").env(EnvDeclaration::new("API_KEY").with_show_value(false)))
            .unwrap();

        manager.init().await.unwrap();

        let entries = journal.entries();
        assert!(entries.contains(&"info: Module api env[API_KEY] := <**** NOT SHOWN ****>".to_string()));
        assert!(!entries.iter().any(|e| e.contains("s3cr3t")));
    }

    #[tokio::test]
    async fn test_destroy_after_env_failure_destroys_all() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager.register(tracked(&journal, "a")).unwrap();
        manager
            .register(tracked(&journal, "b").env(EnvDeclaration::new("NEEDED")))
            .unwrap();

        assert!(manager.init().await.is_err());
        manager.destroy().await;

        assert!(journal.calls("init ").is_empty());
        assert_eq!(journal.calls("destroy "), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_destroy_error_does_not_stop_teardown() {
        let journal = Arc::new(Journal::default());
        let manager = manager(&journal);
        manager.register(tracked(&journal, "a")).unwrap();
        manager
            .register(
                ModuleDescriptor::new("b")
                    .init_sync(|_ctx| Ok(None))
                    .destroy_sync(|_ctx, _| Err(anyhow!("socket already closed"))),
            )
            .unwrap();

        manager.init().await.unwrap();
        manager.destroy().await;

        assert_eq!(journal.calls("destroy "), vec!["a"]);
        assert!(journal
            .entries()
            .contains(&"error: Error destroying b: socket already closed".to_string()));
    }

    #[test]
    fn test_futures_are_send() {
        fn assert_send<T: Send>(_: T) {}
        let manager = ModuleManager::new(ManagerConfig::new().with_env(Environment::new()));
        assert_send(manager.init());
        assert_send(manager.destroy());
    }
}
