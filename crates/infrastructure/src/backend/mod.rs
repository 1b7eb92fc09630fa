//! Unix socket backend: accept loop, per-connection sessions and
//! coordinated shutdown.

pub mod dispatch;
pub mod events;
pub mod handler;
pub mod registry;
pub mod server;

pub use events::{SessionEvent, SessionEventEmitter, SessionOutcome};
pub use handler::{ConnectionHandler, HandlerState, SessionOptions, SessionSummary};
pub use registry::{HandlerRegistry, SessionControl};
pub use server::SocketServer;
