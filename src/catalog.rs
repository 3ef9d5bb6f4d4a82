//! Service catalog: export name → value produced by the exporting module.
//!
//! Written only by the lifecycle engine, once per export, right after the
//! exporting module's init step succeeds. Read when building contexts for
//! the modules that import the service.

use std::collections::HashMap;

use tracing::trace;

use crate::module_types::Value;

#[derive(Debug, Default)]
pub(crate) struct ServiceCatalog {
    services: HashMap<String, Value>,
}

impl ServiceCatalog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Publishes `value` under `service`.
    ///
    /// Export names are unique per registry, so an existing entry is never
    /// overwritten.
    pub(crate) fn publish(&mut self, service: &str, value: Value) {
        trace!(service, "Publishing service");
        self.services.entry(service.to_string()).or_insert(value);
    }

    pub(crate) fn get(&self, service: &str) -> Option<&Value> {
        self.services.get(service)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.services.len()
    }
}
