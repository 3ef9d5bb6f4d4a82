//! Module registry - validated module storage.
//!
//! # Architecture
//!
//! ```text
//! register(descriptor)
//! ├── sealed?                 → reject (init already started)
//! ├── name / init present?    → reject otherwise
//! ├── export / imports shape  → reject otherwise
//! ├── normalize env           → reject bad declarations
//! ├── imports all claimed?    → reject missing services
//! ├── export unclaimed?       → reject duplicate owner
//! └── append RegisteredModule, claim export
//! ```
//!
//! Every check runs before anything is stored, so a rejected descriptor
//! leaves the registry exactly as it was.
//!
//! # Rust Learning Note
//!
//! The registry belongs to one manager instance. There is no global
//! `lazy_static!` map; two managers never see each other's modules.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use stagehand_common::{Error, Result};
use tracing::debug;

use crate::env::{self, EnvRequirement};
use crate::module_types::{ModuleDescriptor, ModuleDestroy, ModuleInit, NoopDestroy};

/// A descriptor that passed validation.
pub(crate) struct RegisteredModule {
    /// Position in registration order.
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) init: Arc<dyn ModuleInit>,
    pub(crate) destroy: Arc<dyn ModuleDestroy>,
    pub(crate) export: Option<String>,
    pub(crate) imports: Vec<String>,
    pub(crate) env: Vec<EnvRequirement>,
}

/// Ordered modules plus the export claims they made.
#[derive(Default)]
pub(crate) struct Registry {
    modules: Vec<Arc<RegisteredModule>>,
    /// Export name → index of the owning module.
    claimed: HashMap<String, usize>,
    sealed: bool,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Validates `descriptor` and appends it.
    ///
    /// `manager_name` only appears in the "after init" rejection message.
    pub(crate) fn register(&mut self, descriptor: ModuleDescriptor, manager_name: &str) -> Result<()> {
        let ModuleDescriptor {
            name,
            init,
            destroy,
            export,
            imports,
            env,
        } = descriptor;

        if self.sealed {
            return Err(Error::registration(format!(
                "Refusing to register a module {} after {}.init() has been called",
                name, manager_name
            )));
        }

        if name.is_empty() {
            return Err(Error::registration("Refusing to register module w/o name attribute"));
        }

        let init = init.ok_or_else(|| {
            Error::registration(format!("Refusing to register module {} w/o init method", name))
        })?;

        if export.as_deref().is_some_and(str::is_empty) {
            return Err(Error::registration(format!(
                "Refusing to register module {} which has an empty export attribute",
                name
            )));
        }

        let imports = imports.unwrap_or_default();
        let mut seen = HashSet::new();
        if !imports.iter().all(|service| !service.is_empty() && seen.insert(service.as_str())) {
            return Err(Error::registration(format!(
                "Refusing to register module {} which has an imports attribute which is not a list of distinct service names",
                name
            )));
        }

        let env = match env {
            Some(declarations) => env::normalize(&name, &declarations)?,
            None => Vec::new(),
        };

        let missing: Vec<&str> = imports
            .iter()
            .filter(|service| !self.claimed.contains_key(service.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::registration(format!(
                "Refusing to register module {} which wants to import missing services [{}]",
                name,
                missing.join(", ")
            )));
        }

        if let Some(service) = &export {
            if let Some(&owner) = self.claimed.get(service) {
                return Err(Error::registration(format!(
                    "Refusing to register service {} from module {} but module {} registered it already",
                    service, name, self.modules[owner].name
                )));
            }
        }

        let index = self.modules.len();
        if let Some(service) = &export {
            self.claimed.insert(service.clone(), index);
        }

        let destroy: Arc<dyn ModuleDestroy> = match destroy {
            Some(destroy) => destroy,
            None => Arc::new(NoopDestroy),
        };

        debug!(module = %name, index, "Module registered");
        self.modules.push(Arc::new(RegisteredModule {
            index,
            name,
            init,
            destroy,
            export,
            imports,
            env,
        }));

        Ok(())
    }

    /// Rejects all further registrations.
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Modules in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<RegisteredModule>> {
        self.modules.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.modules.len()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }

    /// Name of the module that claimed `service`.
    pub(crate) fn owner_of(&self, service: &str) -> Option<&str> {
        self.claimed
            .get(service)
            .map(|&index| self.modules[index].name.as_str())
    }
}
