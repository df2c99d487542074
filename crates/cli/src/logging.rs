use anyhow::{anyhow, Result};
use bushidage_core::config::{AppConfig, LogFormat};
use tracing::Level;

/// Installs the global subscriber. Output goes to stderr so stdout carries
/// only command results.
pub fn init(config: &AppConfig) -> Result<()> {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}

#[cfg(test)]
mod tests {
    use bushidage_core::config::AppConfig;

    use super::init;

    #[test]
    fn second_install_reports_an_error_instead_of_panicking() {
        let config = AppConfig::default();
        let _ = init(&config);

        assert!(init(&config).is_err());
    }
}
