use ferrous_backend_domain::{CliOverrides, Config};
use tracing::info;

/// Loads and validates the configuration. Runs before logging is up, so the
/// summary is logged separately by `log_config`.
pub fn load_config(
    config_path: Option<&str>,
    cli_overrides: CliOverrides,
) -> anyhow::Result<Config> {
    let config = Config::load(config_path, cli_overrides)?;
    config.validate()?;
    Ok(config)
}

pub fn log_config(config_path: Option<&str>, config: &Config) {
    info!(
        config_file = config_path.unwrap_or("default"),
        socket = %config.server.socket_path,
        dispatch = %config.server.dispatch,
        resolver_failure = ?config.server.resolver_failure,
        records = config.records.len(),
        "Configuration loaded"
    );
}
