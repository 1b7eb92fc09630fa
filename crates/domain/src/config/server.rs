use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Filesystem path of the listening Unix socket
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Text sent after `HELO` when a handshake succeeds
    #[serde(default = "default_banner")]
    pub banner: String,

    /// How accepted connections are dispatched to workers
    #[serde(default)]
    pub dispatch: DispatchMode,

    /// What a session does after the resolver fails a lookup
    #[serde(default)]
    pub resolver_failure: ResolverFailurePolicy,

    /// Remove a leftover socket file before binding
    #[serde(default = "default_true")]
    pub remove_stale_socket: bool,
}

fn default_socket_path() -> String {
    "/tmp/ferrous-backend.sock".to_string()
}

fn default_banner() -> String {
    "default backend".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            banner: default_banner(),
            dispatch: DispatchMode::default(),
            resolver_failure: ResolverFailurePolicy::default(),
            remove_stale_socket: true,
        }
    }
}

/// Worker model used for accepted connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One tokio task per connection
    #[default]
    Task,
    /// One forked child process per connection
    Process,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Task => "task",
            DispatchMode::Process => "process",
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "task" | "thread" => Ok(DispatchMode::Task),
            "process" | "fork" => Ok(DispatchMode::Process),
            other => Err(format!("unknown dispatch mode: {}", other)),
        }
    }
}

/// Session behaviour after the resolver raises an error.
///
/// A `FAIL` line is written in both cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverFailurePolicy {
    /// End the session
    #[default]
    Close,
    /// Keep reading queries on the same connection
    Continue,
}
