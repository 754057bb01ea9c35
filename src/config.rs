// src/config.rs
use log::warn;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

const DEV_JWT_SECRET: &str = "trade-pro-dev-secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub scylla_node: String,
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub tick_interval: Duration,
    pub accrual_interval: Duration,
    pub alphavantage_api_key: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = match get("TRADE_PRO_JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("TRADE_PRO_JWT_SECRET is not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        Ok(Config {
            scylla_node: get("TRADE_PRO_SCYLLA_NODE").unwrap_or_else(|| "127.0.0.1:9042".into()),
            http_addr: parse(&get, "TRADE_PRO_HTTP_ADDR", "127.0.0.1:3030")?,
            ws_addr: parse(&get, "TRADE_PRO_WS_ADDR", "127.0.0.1:3031")?,
            jwt_secret,
            token_ttl: chrono::Duration::hours(parse(&get, "TRADE_PRO_TOKEN_TTL_HOURS", "24")?),
            tick_interval: Duration::from_millis(positive(&get, "TRADE_PRO_TICK_MS", "3000")?),
            accrual_interval: Duration::from_secs(positive(&get, "TRADE_PRO_ACCRUAL_SECS", "3600")?),
            alphavantage_api_key: get("ALPHAVANTAGE_API_KEY"),
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    raw.trim().parse().map_err(|e: T::Err| ConfigError {
        key,
        message: format!("invalid value {:?}: {}", raw, e),
    })
}

/// Timer periods; `tokio::time::interval` panics on zero.
fn positive<G>(get: &G, key: &'static str, default: &str) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match parse(get, key, default)? {
        0 => Err(ConfigError {
            key,
            message: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.scylla_node, "127.0.0.1:9042");
        assert_eq!(config.http_addr.port(), 3030);
        assert_eq!(config.ws_addr.port(), 3031);
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.token_ttl, chrono::Duration::hours(24));
        assert_eq!(config.tick_interval, Duration::from_millis(3000));
        assert_eq!(config.accrual_interval, Duration::from_secs(3600));
        assert!(config.alphavantage_api_key.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("TRADE_PRO_HTTP_ADDR", "0.0.0.0:8080"),
            ("TRADE_PRO_TICK_MS", "500"),
            ("TRADE_PRO_JWT_SECRET", "s3cret"),
            ("ALPHAVANTAGE_API_KEY", "demo"),
        ])
        .unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.tick_interval, Duration::from_millis(500));
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.alphavantage_api_key.as_deref(), Some("demo"));
    }

    #[test]
    fn malformed_value_names_the_key() {
        let err = config_from(&[("TRADE_PRO_ACCRUAL_SECS", "hourly")]).unwrap_err();
        assert_eq!(err.key, "TRADE_PRO_ACCRUAL_SECS");
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let err = config_from(&[("TRADE_PRO_TICK_MS", "0")]).unwrap_err();
        assert_eq!(err.key, "TRADE_PRO_TICK_MS");

        let err = config_from(&[("TRADE_PRO_ACCRUAL_SECS", " 0 ")]).unwrap_err();
        assert_eq!(err.key, "TRADE_PRO_ACCRUAL_SECS");
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn blank_value_counts_as_unset() {
        let config = config_from(&[("TRADE_PRO_SCYLLA_NODE", "  ")]).unwrap();
        assert_eq!(config.scylla_node, "127.0.0.1:9042");
    }
}
