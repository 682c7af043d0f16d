//! Configuration constants and environment loading for the server monitor
//!
//! This module manages all runtime configuration:
//! - Console log transport (tail / FTP / HTTP) and checkpoint location
//! - RCON connection, enabled only when `RCON_HOST` is set
//! - Custom parser directory and vote-kick sweep interval

use anyhow::{Context, Result};
use reforger_rust_core::log_reader::config::{
    DEFAULT_LOG_FILE, DEFAULT_REMOTE_TIMEOUT_MS, DEFAULT_STATE_SAVE_MS,
};
use reforger_rust_core::log_reader::{FtpSettings, HttpSettings, ReaderConfig, ReaderMode};
use reforger_rust_core::rcon::RconConfig;
use reforger_rust_core::MonitorConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Reader name for the server console log; checkpoint is `console_state.json`
pub const CONSOLE_READER_NAME: &str = "console";

/// Default directory for checkpoint files
pub const DEFAULT_STATE_DIR: &str = "./state";

/// Default FTP control port
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default vote-kick sweep interval in seconds
pub const DEFAULT_VOTEKICK_SWEEP_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        let mut monitor = monitor_from_lookup(|key| env::var(key).ok())?;

        if env::var("RCON_HOST").is_ok() {
            monitor.rcon = Some(RconConfig::from_env().context("Invalid RCON configuration")?);
        }

        Ok(Self { monitor })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Everything except RCON, resolved through `lookup`.
fn monitor_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<MonitorConfig> {
    let mode: ReaderMode = lookup("REFORGER_LOG_MODE")
        .unwrap_or_else(|| "tail".to_string())
        .parse()
        .context("REFORGER_LOG_MODE")?;

    let poll_ms = parse_or(
        &lookup,
        "REFORGER_LOG_POLL_MS",
        mode.default_poll_interval().as_millis() as u64,
    )?;
    let state_save_ms = parse_or(&lookup, "REFORGER_STATE_SAVE_MS", DEFAULT_STATE_SAVE_MS)?;
    let remote_timeout = Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS);

    let ftp = match lookup("REFORGER_FTP_HOST") {
        Some(host) => Some(FtpSettings {
            host,
            port: parse_or(&lookup, "REFORGER_FTP_PORT", DEFAULT_FTP_PORT)?,
            user: lookup("REFORGER_FTP_USER").unwrap_or_default(),
            password: lookup("REFORGER_FTP_PASSWORD").unwrap_or_default(),
            timeout: remote_timeout,
        }),
        None => None,
    };
    let http = lookup("REFORGER_HTTP_BASE_URL").map(|base_url| HttpSettings {
        base_url,
        timeout: remote_timeout,
    });

    let reader = ReaderConfig {
        name: CONSOLE_READER_NAME.to_string(),
        mode,
        log_dir: lookup("REFORGER_LOG_DIR"),
        file_name: lookup("REFORGER_LOG_FILE").unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
        poll_interval: Duration::from_millis(poll_ms),
        state_save_interval: Duration::from_millis(state_save_ms),
        state_dir: PathBuf::from(
            lookup("REFORGER_STATE_DIR").unwrap_or_else(|| DEFAULT_STATE_DIR.to_string()),
        ),
        ftp,
        http,
    };
    reader.validate().context("Invalid log reader configuration")?;

    let mut monitor = MonitorConfig::new(reader);
    monitor.custom_parsers_dir = lookup("CUSTOM_PARSERS_DIR").map(PathBuf::from);
    monitor.vote_kick_sweep_interval = Duration::from_secs(parse_or(
        &lookup,
        "VOTEKICK_SWEEP_SECS",
        DEFAULT_VOTEKICK_SWEEP_SECS,
    )?);

    Ok(monitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_tail_defaults() {
        let monitor = monitor_from_lookup(lookup(&[("REFORGER_LOG_DIR", "/srv/reforger/logs")])).unwrap();

        assert_eq!(monitor.reader.mode, ReaderMode::Tail);
        assert_eq!(monitor.reader.file_name, "console.log");
        assert_eq!(monitor.reader.poll_interval, Duration::from_millis(3_000));
        assert_eq!(monitor.reader.state_dir, PathBuf::from("./state"));
        assert_eq!(monitor.vote_kick_sweep_interval, Duration::from_secs(10));
        assert!(monitor.rcon.is_none());
        assert!(monitor.custom_parsers_dir.is_none());
    }

    #[test]
    fn test_ftp_mode() {
        let monitor = monitor_from_lookup(lookup(&[
            ("REFORGER_LOG_MODE", "ftp"),
            ("REFORGER_LOG_DIR", "/profile/logs"),
            ("REFORGER_FTP_HOST", "ftp.example.net"),
            ("REFORGER_FTP_USER", "admin"),
            ("REFORGER_FTP_PASSWORD", "pw"),
            ("CUSTOM_PARSERS_DIR", "/etc/reforger/parsers"),
        ]))
        .unwrap();

        let ftp = monitor.reader.ftp.as_ref().unwrap();
        assert_eq!(ftp.port, 21);
        assert_eq!(ftp.user, "admin");
        assert_eq!(monitor.reader.poll_interval, Duration::from_millis(10_000));
        assert_eq!(
            monitor.custom_parsers_dir,
            Some(PathBuf::from("/etc/reforger/parsers"))
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(monitor_from_lookup(lookup(&[])).is_err());
        assert!(monitor_from_lookup(lookup(&[
            ("REFORGER_LOG_DIR", "/logs"),
            ("REFORGER_LOG_POLL_MS", "soon"),
        ]))
        .is_err());
        assert!(monitor_from_lookup(lookup(&[("REFORGER_LOG_MODE", "sftp")])).is_err());
        assert!(monitor_from_lookup(lookup(&[
            ("REFORGER_LOG_MODE", "http"),
            ("REFORGER_HTTP_BASE_URL", "ftp://wrong"),
        ]))
        .is_err());
    }
}
