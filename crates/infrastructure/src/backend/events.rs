use ferrous_backend_domain::{AbiVersion, BackendError};
use tokio::sync::mpsc;

use super::handler::SessionSummary;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Peer closed the connection or sent an empty line.
    Completed,
    /// Session was ended by a shutdown request.
    Stopped,
    /// Session ended on an error. `sent_fail` tells whether the peer got `FAIL`.
    Failed { error: String, sent_fail: bool },
}

impl SessionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionOutcome::Failed { .. })
    }
}

/// Emitted once per finished session.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub handler_id: u64,
    pub version: Option<AbiVersion>,
    pub queries_answered: u64,
    pub outcome: SessionOutcome,
}

impl SessionEvent {
    pub fn from_result(handler_id: u64, result: &Result<SessionSummary, BackendError>) -> Self {
        match result {
            Ok(summary) => Self {
                handler_id,
                version: summary.version,
                queries_answered: summary.queries_answered,
                outcome: if summary.stopped {
                    SessionOutcome::Stopped
                } else {
                    SessionOutcome::Completed
                },
            },
            Err(e) => Self {
                handler_id,
                version: None,
                queries_answered: 0,
                outcome: SessionOutcome::Failed {
                    error: e.to_string(),
                    sent_fail: e.sends_fail(),
                },
            },
        }
    }
}

/// Fire-and-forget channel for session events.
///
/// Disabled by default; `emit()` is then a no-op. Sending never blocks the
/// worker, and events are dropped silently once the receiver is gone.
#[derive(Clone)]
pub struct SessionEventEmitter {
    sender: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl SessionEventEmitter {
    pub fn new_disabled() -> Self {
        Self { sender: None }
    }

    pub fn new_enabled() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(ref tx) = self.sender {
            let _ = tx.send(event);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }
}

impl Default for SessionEventEmitter {
    fn default() -> Self {
        Self::new_disabled()
    }
}

impl std::fmt::Debug for SessionEventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEventEmitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
