use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Subscriber settings for the pipeline. `RUST_LOG` drives the filter;
/// shipping to Loki is opt-in and needs the `loki` cargo feature.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
    pub service_name: String,
    pub environment: String,
    pub loki_url: Option<String>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let loki_enabled = std::env::var("LOKI_ENABLED")
            .map(|v| v == "true")
            .unwrap_or(false);

        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "stockpulse".to_string()),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            loki_url: if loki_enabled {
                std::env::var("LOKI_URL").ok()
            } else {
                None
            },
        }
    }
}

/// Install the global subscriber. Errors if one is already set, so tests
/// calling this repeatedly get an Err rather than a panic.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer());

    #[cfg(feature = "loki")]
    if let Some(loki_url) = &config.loki_url {
        let (loki_layer, task) = tracing_loki::builder()
            .label("service", &config.service_name)?
            .label("environment", &config.environment)?
            .build_url(url::Url::parse(loki_url)?)?;

        // Background task shipping buffered log lines to Loki
        tokio::spawn(task);

        registry.with(loki_layer).try_init()?;
        tracing::info!("📊 Logging initialized with Loki at {}", loki_url);
        return Ok(());
    }

    registry.try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console_config() -> LoggingConfig {
        LoggingConfig {
            log_level: "info".to_string(),
            service_name: "stockpulse".to_string(),
            environment: "test".to_string(),
            loki_url: None,
        }
    }

    #[test]
    fn test_from_env_defaults() {
        let config = console_config();
        assert_eq!(config.log_level, "info");
        assert!(config.loki_url.is_none());
    }

    #[test]
    fn test_repeated_init_errors_instead_of_panicking() {
        let first = init_logging(&console_config());
        let second = init_logging(&console_config());
        assert!(first.is_ok() || second.is_err());
    }
}
