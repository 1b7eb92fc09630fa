use ferrous_backend_domain::config::{LogFormat, LoggingConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_logging(config: &LoggingConfig) {
    let (filter, invalid_level) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, false),
        Err(_) => match EnvFilter::try_new(config.level.as_str()) {
            Ok(filter) => (filter, false),
            Err(_) => (EnvFilter::new("info"), true),
        },
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true);

    match config.format {
        LogFormat::Text => builder.with_ansi(true).init(),
        LogFormat::Json => builder.json().init(),
    }

    if invalid_level {
        warn!(level = %config.level, "Invalid log level, using info");
    }
    info!("Logging initialized at level: {}", config.level);
}
