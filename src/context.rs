//! Context handed to a module's init and destroy steps.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::catalog::ServiceCatalog;
use crate::env::Environment;
use crate::logging::{Logger, LoggerFactory};
use crate::module_types::Value;

/// Capabilities available to one module.
///
/// A context is built fresh every time a module step runs:
/// - a logger scoped to the module's name,
/// - a copy of the manager's environment taken at build time (later changes
///   to the manager's environment are not visible through it),
/// - the current value of every service the module imports.
#[derive(Clone)]
pub struct Context {
    module_name: String,
    logger: Arc<dyn Logger>,
    env: Environment,
    imports: HashMap<String, Value>,
}

impl Context {
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Value of an imported service.
    ///
    /// `None` if the name wasn't imported or the exporting module hasn't
    /// produced it.
    pub fn import(&self, service: &str) -> Option<&Value> {
        self.imports.get(service)
    }

    /// Imported service downcast to `T`.
    pub fn import_as<T: std::any::Any + Send + Sync>(&self, service: &str) -> Option<Arc<T>> {
        self.import(service).and_then(Value::downcast::<T>)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut imports: Vec<&str> = self.imports.keys().map(String::as_str).collect();
        imports.sort_unstable();
        f.debug_struct("Context")
            .field("module_name", &self.module_name)
            .field("env", &self.env.len())
            .field("imports", &imports)
            .finish_non_exhaustive()
    }
}

/// Builds contexts from the manager's logger factory.
#[derive(Clone)]
pub(crate) struct ContextBuilder {
    logger_factory: LoggerFactory,
}

impl ContextBuilder {
    pub(crate) fn new(logger_factory: LoggerFactory) -> Self {
        Self { logger_factory }
    }

    pub(crate) fn build(
        &self,
        module_name: &str,
        imports: &[String],
        env: &Environment,
        catalog: &ServiceCatalog,
    ) -> Context {
        let imports = imports
            .iter()
            .filter_map(|service| Some((service.clone(), catalog.get(service)?.clone())))
            .collect();

        Context {
            module_name: module_name.to_string(),
            logger: (self.logger_factory)(module_name),
            env: env.clone(),
            imports,
        }
    }
}
