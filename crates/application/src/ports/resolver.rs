use async_trait::async_trait;
use ferrous_backend_domain::{LookupError, Query, Record};

/// Pluggable answer source supplied by the embedding application.
///
/// Implementations must tolerate concurrent calls from every active session.
/// Records are written back in the order returned; an empty vector is a
/// valid, empty answer. Any error is reported to the peer as `FAIL`.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, query: &Query) -> Result<Vec<Record>, LookupError>;
}
