//! Ferrous Backend Domain Layer
pub mod abi_version;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod query;
pub mod record;

pub use abi_version::AbiVersion;
pub use config::{CliOverrides, Config, ConfigError};
pub use errors::{BackendError, LookupError};
pub use query::Query;
pub use record::Record;
