use ferrous_backend_domain::Config;
use ferrous_backend_infrastructure::resolvers::StaticResolver;
use tracing::{info, warn};

/// Static resolver over the configured records, or the example answer when
/// none are configured.
pub fn build_resolver(config: &Config) -> StaticResolver {
    if config.records.is_empty() {
        warn!("No records configured, answering every query with the example record");
        return StaticResolver::example();
    }

    let resolver = StaticResolver::from_config(&config.records);
    info!(records = resolver.len(), "Static resolver ready");
    resolver
}
