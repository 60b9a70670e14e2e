use std::collections::HashMap;
use thiserror::Error;

/// Runtime configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub gateway_api_url: String,
    pub gateway_secret: String,
    /// How long after payment a publisher may reject a placement.
    pub rejection_window_ms: i64,
    /// Slack added to the rejection deadline before it hard-expires.
    pub grace_period_ms: i64,
    /// Cadence of the deadline sweeper.
    pub sweep_interval_ms: i64,
    /// Total elapsed-time budget for retrying one unit of work.
    pub txn_retry_budget_ms: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_REJECTION_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;
const DEFAULT_GRACE_PERIOD_MS: i64 = 5 * 60 * 1000;
const DEFAULT_SWEEP_INTERVAL_MS: i64 = 60 * 1000;
const DEFAULT_TXN_RETRY_BUDGET_MS: i64 = 10 * 1000;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let gateway_api_url = env_map
            .get("GATEWAY_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("GATEWAY_API_URL".to_string()))?;

        let gateway_secret = env_map
            .get("GATEWAY_SECRET")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("GATEWAY_SECRET".to_string()))?;

        let rejection_window_ms =
            parse_positive_i64(&env_map, "REJECTION_WINDOW_MS", DEFAULT_REJECTION_WINDOW_MS)?;
        let grace_period_ms =
            parse_non_negative_i64(&env_map, "GRACE_PERIOD_MS", DEFAULT_GRACE_PERIOD_MS)?;
        let sweep_interval_ms =
            parse_positive_i64(&env_map, "SWEEP_INTERVAL_MS", DEFAULT_SWEEP_INTERVAL_MS)?;
        let txn_retry_budget_ms =
            parse_positive_i64(&env_map, "TXN_RETRY_BUDGET_MS", DEFAULT_TXN_RETRY_BUDGET_MS)?;

        Ok(Config {
            database_path,
            gateway_api_url,
            gateway_secret,
            rejection_window_ms,
            grace_period_ms,
            sweep_interval_ms,
            txn_retry_budget_ms,
        })
    }
}

fn parse_i64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid i64".to_string())
        }),
    }
}

fn parse_positive_i64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    let value = parse_i64(env_map, key, default)?;
    if value <= 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be positive".to_string(),
        ));
    }
    Ok(value)
}

fn parse_non_negative_i64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    let value = parse_i64(env_map, key, default)?;
    if value < 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "GATEWAY_API_URL".to_string(),
            "https://api.paystack.co".to_string(),
        );
        map.insert("GATEWAY_SECRET".to_string(), "sk_test_secret".to_string());
        map
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.rejection_window_ms, DEFAULT_REJECTION_WINDOW_MS);
        assert_eq!(config.grace_period_ms, DEFAULT_GRACE_PERIOD_MS);
        assert_eq!(config.sweep_interval_ms, DEFAULT_SWEEP_INTERVAL_MS);
        assert_eq!(config.txn_retry_budget_ms, DEFAULT_TXN_RETRY_BUDGET_MS);
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_gateway_api_url() {
        let mut env_map = setup_required_env();
        env_map.remove("GATEWAY_API_URL");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "GATEWAY_API_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_gateway_secret() {
        let mut env_map = setup_required_env();
        env_map.remove("GATEWAY_SECRET");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "GATEWAY_SECRET"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_rejection_window() {
        let mut env_map = setup_required_env();
        env_map.insert("REJECTION_WINDOW_MS".to_string(), "abc".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "REJECTION_WINDOW_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_rejection_window_must_be_positive() {
        let mut env_map = setup_required_env();
        env_map.insert("REJECTION_WINDOW_MS".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "REJECTION_WINDOW_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_grace_period_may_be_zero() {
        let mut env_map = setup_required_env();
        env_map.insert("GRACE_PERIOD_MS".to_string(), "0".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.grace_period_ms, 0);
    }

    #[test]
    fn test_negative_grace_period_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("GRACE_PERIOD_MS".to_string(), "-1".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "GRACE_PERIOD_MS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
