use ferrous_backend_domain::{BackendError, Query, Record};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, instrument};

use crate::ports::Resolver;

/// Routes queries to the single resolver registered for the server.
///
/// The resolver can be set exactly once. Until then every lookup fails with
/// [`BackendError::Configuration`].
pub struct LookupQueryUseCase {
    resolver: OnceLock<Arc<dyn Resolver>>,
}

impl LookupQueryUseCase {
    pub fn new() -> Self {
        Self {
            resolver: OnceLock::new(),
        }
    }

    pub fn with_resolver(resolver: Arc<dyn Resolver>) -> Self {
        let resolver_slot = OnceLock::new();
        let _ = resolver_slot.set(resolver);
        Self {
            resolver: resolver_slot,
        }
    }

    pub fn set_resolver(&self, resolver: Arc<dyn Resolver>) -> Result<(), BackendError> {
        self.resolver.set(resolver).map_err(|_| {
            BackendError::Configuration("resolver has already been set".to_string())
        })?;
        info!("Resolver registered");
        Ok(())
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.get().is_some()
    }

    #[instrument(skip(self, query), fields(name = %query.name(), qtype = %query.qtype()))]
    pub async fn execute(&self, query: &Query) -> Result<Vec<Record>, BackendError> {
        let resolver = self.resolver.get().ok_or_else(|| {
            BackendError::Configuration("this backend server has no resolver set".to_string())
        })?;

        let records = resolver
            .lookup(query)
            .await
            .map_err(BackendError::Resolver)?;

        debug!(records = records.len(), "Lookup completed");
        Ok(records)
    }
}

impl Default for LookupQueryUseCase {
    fn default() -> Self {
        Self::new()
    }
}
