//! RCON connection and reconnection settings

use crate::error::ConfigError;
use std::time::Duration;

/// Default BattlEye RCON port for Reforger
pub const DEFAULT_RCON_PORT: u16 = 19999;

/// Roster query command
pub const DEFAULT_PLAYERS_COMMAND: &str = "#players";

pub const DEFAULT_PLAYERS_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_LOGIN_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;

pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 5_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 60_000;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Reconnection backoff
#[derive(Clone, Debug)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt (default: 5000ms)
    pub initial_delay_ms: u64,
    /// Maximum delay (default: 60000ms)
    pub max_delay_ms: u64,
    /// Jitter fraction, ±jitter_pct of the delay (default: 0.0)
    pub jitter_pct: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_RECONNECT_INITIAL_MS,
            max_delay_ms: DEFAULT_RECONNECT_MAX_MS,
            jitter_pct: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            initial_delay_ms: env_or("RCON_RECONNECT_INITIAL_MS", DEFAULT_RECONNECT_INITIAL_MS),
            max_delay_ms: env_or("RCON_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS),
            jitter_pct: env_or("RCON_RECONNECT_JITTER_PCT", 0.0),
        }
    }

    /// Delay before attempt `attempt` (1-based): `min(initial * 2^(attempt-1), max)`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay_ms as f64;
        let exponential_ms = base_ms * 2f64.powi(attempt.saturating_sub(1).min(62) as i32);
        let capped_ms = exponential_ms.min(self.max_delay_ms as f64);

        if self.jitter_pct <= 0.0 {
            return Duration::from_millis(capped_ms as u64);
        }

        let jitter_range = capped_ms * self.jitter_pct;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        Duration::from_millis((capped_ms + jitter).max(0.0) as u64)
    }
}

#[derive(Clone, Debug)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub players_command: String,
    pub players_interval: Duration,
    pub login_timeout: Duration,
    pub command_timeout: Duration,
    /// Idle time after which an empty keep-alive command is sent
    pub keepalive_interval: Duration,
    /// No inbound packet for this long means the session is gone
    pub idle_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl RconConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            players_command: DEFAULT_PLAYERS_COMMAND.to_string(),
            players_interval: Duration::from_secs(DEFAULT_PLAYERS_INTERVAL_SECS),
            login_timeout: Duration::from_millis(DEFAULT_LOGIN_TIMEOUT_MS),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Load from `RCON_*` environment variables. Host and password are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("RCON_HOST").map_err(|_| ConfigError::Missing("RCON_HOST"))?;
        let password =
            std::env::var("RCON_PASSWORD").map_err(|_| ConfigError::Missing("RCON_PASSWORD"))?;

        let port = match std::env::var("RCON_PORT") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "RCON_PORT",
                reason: format!("'{}' is not a port number", raw),
            })?,
            Err(_) => DEFAULT_RCON_PORT,
        };

        let config = Self {
            players_command: std::env::var("RCON_PLAYERS_COMMAND")
                .unwrap_or_else(|_| DEFAULT_PLAYERS_COMMAND.to_string()),
            players_interval: Duration::from_secs(env_or(
                "RCON_PLAYERS_INTERVAL_SECS",
                DEFAULT_PLAYERS_INTERVAL_SECS,
            )),
            login_timeout: Duration::from_millis(env_or(
                "RCON_LOGIN_TIMEOUT_MS",
                DEFAULT_LOGIN_TIMEOUT_MS,
            )),
            command_timeout: Duration::from_millis(env_or(
                "RCON_COMMAND_TIMEOUT_MS",
                DEFAULT_COMMAND_TIMEOUT_MS,
            )),
            keepalive_interval: Duration::from_secs(env_or(
                "RCON_KEEPALIVE_SECS",
                DEFAULT_KEEPALIVE_SECS,
            )),
            idle_timeout: Duration::from_secs(env_or(
                "RCON_IDLE_TIMEOUT_SECS",
                DEFAULT_IDLE_TIMEOUT_SECS,
            )),
            reconnect: ReconnectConfig::from_env(),
            ..Self::new(host, port, password)
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("RCON_HOST"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("RCON_PASSWORD"));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                key: "RCON_PORT",
                reason: "port must be non-zero".to_string(),
            });
        }
        if self.players_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "RCON_PLAYERS_INTERVAL_SECS",
                reason: "interval must be positive".to_string(),
            });
        }
        if self.reconnect.initial_delay_ms == 0
            || self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms
        {
            return Err(ConfigError::Invalid {
                key: "RCON_RECONNECT_MAX_MS",
                reason: format!(
                    "need 0 < initial ({}) <= max ({})",
                    self.reconnect.initial_delay_ms, self.reconnect.max_delay_ms
                ),
            });
        }
        if self.idle_timeout <= self.keepalive_interval {
            return Err(ConfigError::Invalid {
                key: "RCON_IDLE_TIMEOUT_SECS",
                reason: "idle timeout must exceed the keep-alive interval".to_string(),
            });
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let config = ReconnectConfig::default();

        assert_eq!(config.calculate_delay(1), Duration::from_secs(5));
        assert_eq!(config.calculate_delay(2), Duration::from_secs(10));
        assert_eq!(config.calculate_delay(3), Duration::from_secs(20));
        assert_eq!(config.calculate_delay(4), Duration::from_secs(40));
        assert_eq!(config.calculate_delay(5), Duration::from_secs(60)); // Capped at max
        assert_eq!(config.calculate_delay(50), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = ReconnectConfig {
            jitter_pct: 0.1,
            ..ReconnectConfig::default()
        };
        for _ in 0..50 {
            let delay = config.calculate_delay(2).as_millis();
            assert!((9_000..=11_000).contains(&delay), "delay {}", delay);
        }
    }

    #[test]
    fn test_validate() {
        assert!(RconConfig::new("127.0.0.1", 19999, "secret").validate().is_ok());
        assert!(matches!(
            RconConfig::new("127.0.0.1", 19999, "").validate(),
            Err(ConfigError::Missing("RCON_PASSWORD"))
        ));

        let mut config = RconConfig::new("127.0.0.1", 19999, "secret");
        config.reconnect.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }
}
