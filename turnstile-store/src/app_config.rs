use serde::Deserialize;
use std::env;
use std::time::Duration;
use turnstile_shared::Masked;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reservation: ReservationConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationConfig {
    /// Bounded wait for the ticket-type row lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl ReservationConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Mock,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    pub snap_url: String,
    pub api_url: String,
    /// Base of the hosted payment page; the session token is appended.
    pub redirect_url: String,
    #[serde(default)]
    pub server_key: Masked<String>,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    #[serde(default = "default_circuit_reset_secs")]
    pub circuit_reset_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests: i64,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 100,
            window_seconds: 60,
        }
    }
}

fn default_max_connections() -> u32 { 10 }
fn default_acquire_timeout_secs() -> u64 { 3 }
fn default_true() -> bool { true }
fn default_lock_timeout_ms() -> u64 { 5000 }
fn default_gateway_timeout_secs() -> u64 { 10 }
fn default_circuit_failure_threshold() -> u32 { 5 }
fn default_circuit_reset_secs() -> u64 { 30 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides; optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `TURNSTILE__DATABASE__URL=postgres://...` sets `database.url`
            .add_source(config::Environment::with_prefix("TURNSTILE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Builds a config from an inline TOML document, without files or environment.
    pub fn from_toml(document: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(document, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        port = 8080

        [database]
        url = "postgres://localhost/turnstile"

        [gateway]
        mode = "http"
        snap_url = "https://app.sandbox.midtrans.com/snap/v1/transactions"
        api_url = "https://api.sandbox.midtrans.com/v2"
        redirect_url = "https://app.sandbox.midtrans.com/snap/v2/vtweb"
        server_key = "SB-Mid-server-secret"
    "#;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = Config::from_toml(MINIMAL).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert!(config.database.run_migrations);
        assert_eq!(config.reservation.lock_timeout(), Duration::from_millis(5000));
        assert_eq!(config.gateway.mode, GatewayMode::Http);
        assert_eq!(config.gateway.circuit_failure_threshold, 5);
        assert!(config.redis.url.is_none());
        assert_eq!(config.rate_limit.requests, 100);
    }

    #[test]
    fn test_server_key_is_masked_in_debug() {
        let config = Config::from_toml(MINIMAL).unwrap();

        assert_eq!(config.gateway.server_key.expose(), "SB-Mid-server-secret");
        assert!(!format!("{:?}", config.gateway).contains("SB-Mid-server-secret"));
    }

    #[test]
    fn test_unknown_gateway_mode_rejected() {
        let document = MINIMAL.replace("mode = \"http\"", "mode = \"carrier-pigeon\"");
        assert!(Config::from_toml(&document).is_err());
    }
}
