//! Lifecycle engine: sequential init with rollback, reverse teardown.
//!
//! # Architecture
//!
//! ```text
//! initialize(modules)                      teardown(modules, reversed)
//! ├── for each module, in order            ├── for each module
//! │   ├── build context (catalog, env)     │   ├── log "Destroying module m"
//! │   ├── init(ctx).await                  │   ├── build context
//! │   ├── store init value                 │   ├── destroy(ctx, value).await
//! │   ├── publish export (or fail)         │   └── on error: log, continue
//! │   └── push onto undo list              └── log "Destroyed all modules"
//! └── first failure stops the loop
//! ```
//!
//! The engine does not decide *when* to roll back. It reports the failure and
//! leaves the undo list with the modules that completed; the manager routes
//! both through its memoized teardown. The undo list lives behind a mutex owned
//! by the manager, so it survives an `init()` future that is dropped part way.
//!
//! Each module is destroyed at most once, even if a teardown is interrupted
//! and started again.
//!
//! # Rust Learning Note
//!
//! ## Locks and `.await`
//!
//! Environment, catalog and init values sit behind `std::sync::Mutex`. Every
//! lock is taken inside a small block that ends before the next `.await`, so
//! no guard lives across a suspension point and the returned futures stay
//! `Send`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stagehand_common::{Error, Result};
use tracing::debug;

use crate::catalog::ServiceCatalog;
use crate::context::{Context, ContextBuilder};
use crate::env::{self, EnvRequirement, Environment};
use crate::logging::Logger;
use crate::module_types::Value;
use crate::registry::RegisteredModule;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run-time state shared by init and teardown.
pub(crate) struct LifecycleEngine {
    manager_name: String,
    logger: Arc<dyn Logger>,
    contexts: ContextBuilder,
    env: Mutex<Environment>,
    catalog: Mutex<ServiceCatalog>,
    /// Registration index → value returned by that module's init.
    init_values: Mutex<HashMap<usize, Value>>,
    /// Registration indices whose destroy step has been started.
    destroyed: Mutex<HashSet<usize>>,
}

impl LifecycleEngine {
    pub(crate) fn new(
        manager_name: String,
        logger: Arc<dyn Logger>,
        contexts: ContextBuilder,
        env: Environment,
    ) -> Self {
        Self {
            manager_name,
            logger,
            contexts,
            env: Mutex::new(env),
            catalog: Mutex::new(ServiceCatalog::new()),
            init_values: Mutex::new(HashMap::new()),
            destroyed: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn env_value(&self, name: &str) -> Option<env::EnvValue> {
        lock(&self.env).get(name).cloned()
    }

    #[cfg(test)]
    pub(crate) fn published_services(&self) -> usize {
        lock(&self.catalog).len()
    }

    fn context_for(&self, module: &RegisteredModule) -> Context {
        let env = lock(&self.env);
        let catalog = lock(&self.catalog);
        self.contexts.build(&module.name, &module.imports, &env, &catalog)
    }

    /// Checks every env requirement of `modules`, writing defaults into the
    /// manager's environment. On success the report is logged.
    pub(crate) fn validate_environment(&self, modules: &[Arc<RegisteredModule>]) -> Result<()> {
        let declared = || {
            modules
                .iter()
                .map(|m| (m.name.as_str(), m.env.as_slice() as &[EnvRequirement]))
        };

        let mut env = lock(&self.env);
        let errors = env::check_environment(declared(), &mut env, self.logger.as_ref());
        if !errors.is_empty() {
            return Err(Error::environment(errors));
        }

        for line in env::env_report(declared(), &env) {
            self.logger.info(&line);
        }
        Ok(())
    }

    /// Initializes `modules` in order, pushing each one that completes onto
    /// `undo`. Stops at the first failure and returns it.
    pub(crate) async fn initialize(
        &self,
        modules: &[Arc<RegisteredModule>],
        undo: &Mutex<Vec<Arc<RegisteredModule>>>,
    ) -> Result<()> {
        for module in modules {
            let ctx = self.context_for(module);
            self.logger.info(&format!(
                "Initializing module <{}>({}) -> [{}]",
                module.name,
                module.imports.join(", "),
                module.export.as_deref().unwrap_or_default()
            ));

            let value = module
                .init
                .init(ctx)
                .await
                .map_err(|cause| Error::initialization(&module.name, cause))?;

            if let Some(value) = &value {
                lock(&self.init_values).insert(module.index, value.clone());
            }

            if let Some(service) = &module.export {
                match value {
                    Some(value) => lock(&self.catalog).publish(service, value),
                    None => return Err(Error::contract_violation(&module.name, service)),
                }
            }

            debug!(module = %module.name, "Module initialized");
            lock(undo).push(Arc::clone(module));
        }

        self.logger.info(&format!(
            "Initialization of all registered modules completed successfully for <{}>",
            self.manager_name
        ));
        Ok(())
    }

    /// Destroys `modules` in the order given. Errors are logged and skipped.
    pub(crate) async fn teardown<I>(&self, modules: I)
    where
        I: IntoIterator<Item = Arc<RegisteredModule>>,
        I::IntoIter: Send,
    {
        for module in modules {
            if !lock(&self.destroyed).insert(module.index) {
                continue;
            }
            self.logger.info(&format!("Destroying module {}", module.name));

            let ctx = self.context_for(&module);
            let value = lock(&self.init_values).get(&module.index).cloned();

            if let Err(cause) = module.destroy.destroy(ctx, value).await {
                // Continue destroying the remaining modules
                let err = Error::teardown(&module.name, cause);
                self.logger.error(&err.to_string());
            }
        }

        self.logger.info(&format!(
            "Destroyed all modules for <{}>",
            self.manager_name
        ));
    }
}
