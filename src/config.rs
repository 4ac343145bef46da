use std::time::Duration;

/// An instrument tracked by the periodic pipeline.
#[derive(Debug, Clone)]
pub struct WatchedSymbol {
    pub symbol: String,
    pub name: String,
}

impl WatchedSymbol {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
        }
    }
}

/// Strip exchange suffixes to get a searchable company name.
pub fn company_name_from_symbol(symbol: &str) -> String {
    symbol.replace(".NS", "").replace(".BO", "")
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl SmtpConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("SMTP_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            host: std::env::var("SMTP_HOST").unwrap_or_default(),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587),
            username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_email: std::env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@stockpulse.local".to_string()),
            from_name: std::env::var("SMTP_FROM_NAME")
                .unwrap_or_else(|_| "StockPulse".to_string()),
        }
    }
}

/// Pipeline-wide settings. Schedules use the 6-field cron syntax of the
/// job scheduler (sec min hour day month weekday).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub watched: Vec<WatchedSymbol>,
    /// Coarse per-instrument sentiment re-scan.
    pub sentiment_scan_schedule: String,
    /// Short-interval quote refresh feeding the price cache and alerts.
    pub price_refresh_schedule: String,
    /// Hourly prediction-audit reconciliation sweep.
    pub audit_sweep_schedule: String,
    /// Throttle between instruments within one scan cycle.
    pub inter_symbol_delay: Duration,
    pub aggregate_window_hours: i64,
    pub mention_retention_days: i64,
    pub price_cache_ttl: Duration,
    pub prediction_horizon_hours: i64,
    pub finbert_api_key: Option<String>,
    pub smtp: SmtpConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            watched: parse_watched(
                &std::env::var("WATCHED_SYMBOLS").unwrap_or_default(),
            ),
            sentiment_scan_schedule: std::env::var("SENTIMENT_SCAN_SCHEDULE")
                .unwrap_or_else(|_| "0 */15 * * * *".to_string()),
            price_refresh_schedule: std::env::var("PRICE_REFRESH_SCHEDULE")
                .unwrap_or_else(|_| "*/7 * * * * *".to_string()),
            audit_sweep_schedule: std::env::var("AUDIT_SWEEP_SCHEDULE")
                .unwrap_or_else(|_| "0 0 * * * *".to_string()),
            inter_symbol_delay: Duration::from_millis(
                std::env::var("INTER_SYMBOL_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
            ),
            aggregate_window_hours: env_i64("AGGREGATE_WINDOW_HOURS", 72),
            mention_retention_days: env_i64("MENTION_RETENTION_DAYS", 30),
            price_cache_ttl: Duration::from_secs(env_i64("PRICE_CACHE_TTL_SECS", 10) as u64),
            prediction_horizon_hours: env_i64("PREDICTION_HORIZON_HOURS", 24),
            finbert_api_key: std::env::var("HUGGINGFACE_API_KEY").ok(),
            smtp: SmtpConfig::from_env(),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse "SYM:Name,SYM2:Name2"; a bare symbol derives its name.
fn parse_watched(raw: &str) -> Vec<WatchedSymbol> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((symbol, name)) => WatchedSymbol::new(symbol.trim(), name.trim()),
            None => WatchedSymbol::new(entry, company_name_from_symbol(entry)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watched_with_and_without_names() {
        let watched = parse_watched("RELIANCE.NS:Reliance Industries, TCS.NS");
        assert_eq!(watched.len(), 2);
        assert_eq!(watched[0].symbol, "RELIANCE.NS");
        assert_eq!(watched[0].name, "Reliance Industries");
        assert_eq!(watched[1].name, "TCS");
    }

    #[test]
    fn test_parse_watched_empty() {
        assert!(parse_watched("").is_empty());
    }

    #[test]
    fn test_company_name_strips_exchange_suffix() {
        assert_eq!(company_name_from_symbol("INFY.NS"), "INFY");
        assert_eq!(company_name_from_symbol("500325.BO"), "500325");
    }
}
