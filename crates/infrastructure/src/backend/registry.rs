use dashmap::DashMap;
use ferrous_backend_domain::BackendError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Anything the registry can signal to stop: an in-process session or a
/// forked worker.
pub trait SessionControl: Send + Sync {
    fn id(&self) -> u64;

    /// Requests the session to end. Must not block on the session finishing.
    fn stop(&self) -> Result<(), BackendError>;
}

/// Set of live sessions, used to stop every one of them at shutdown.
///
/// `register`, `unregister` and `stop` may run concurrently from any worker.
/// `stop` signals a snapshot, so sessions that finish or unregister while it
/// runs are neither missed nor double-removed.
pub struct HandlerRegistry {
    handlers: DashMap<u64, Arc<dyn SessionControl>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates a process-unique handler id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(&self, handler: Arc<dyn SessionControl>) {
        let id = handler.id();
        self.handlers.insert(id, handler);
        debug!(handler_id = id, active = self.handlers.len(), "Registered handler");
    }

    /// Removes the handler if present. Returns whether it was registered.
    pub fn unregister(&self, id: u64) -> bool {
        let removed = self.handlers.remove(&id).is_some();
        if removed {
            debug!(handler_id = id, active = self.handlers.len(), "Unregistered handler");
        }
        removed
    }

    /// Signals every registered handler to stop and drops them from the set.
    ///
    /// Returns the number of handlers signalled. A handler whose stop fails
    /// is logged and skipped.
    pub fn stop(&self) -> usize {
        let snapshot: Vec<Arc<dyn SessionControl>> = self
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        info!(handlers = snapshot.len(), "Stopping registered handlers");

        for handler in &snapshot {
            if let Err(e) = handler.stop() {
                warn!(handler_id = handler.id(), error = %e, "Failed to stop handler");
            }
        }

        for handler in &snapshot {
            self.handlers.remove(&handler.id());
        }

        snapshot.len()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("active", &self.handlers.len())
            .finish()
    }
}
