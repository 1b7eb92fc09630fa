//! Configuration module for Ferrous Backend
//!
//! This module contains all configuration structures organized by concern:
//! - `root`: Main configuration and CLI overrides
//! - `server`: Socket path, banner and session policies
//! - `logging`: Logging settings
//! - `records`: Static answers for the bundled resolver
//! - `errors`: Configuration errors

pub mod errors;
pub mod logging;
pub mod records;
pub mod root;
pub mod server;

pub use errors::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use records::StaticRecordConfig;
pub use root::{CliOverrides, Config};
pub use server::{DispatchMode, ResolverFailurePolicy, ServerConfig};
