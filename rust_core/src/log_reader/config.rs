//! Reader configuration
//!
//! Values are validated once, at construction. A reader with an invalid
//! configuration never starts.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default poll interval for local files
pub const DEFAULT_LOCAL_POLL_MS: u64 = 3_000;

/// Default poll interval for FTP / HTTP sources
pub const DEFAULT_REMOTE_POLL_MS: u64 = 10_000;

/// Default checkpoint interval
pub const DEFAULT_STATE_SAVE_MS: u64 = 60_000;

/// Default console log file name
pub const DEFAULT_LOG_FILE: &str = "console.log";

/// Default network timeout for remote sources
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    /// Follow a local file
    Tail,
    /// Poll a file over FTP (SIZE / REST / RETR)
    Ftp,
    /// Poll a file over HTTP with range requests
    Http,
    /// Local follower owned by a custom parser
    Custom,
}

impl ReaderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReaderMode::Tail => "tail",
            ReaderMode::Ftp => "ftp",
            ReaderMode::Http => "http",
            ReaderMode::Custom => "custom",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ReaderMode::Ftp | ReaderMode::Http)
    }

    pub fn default_poll_interval(&self) -> Duration {
        if self.is_remote() {
            Duration::from_millis(DEFAULT_REMOTE_POLL_MS)
        } else {
            Duration::from_millis(DEFAULT_LOCAL_POLL_MS)
        }
    }
}

impl FromStr for ReaderMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tail" | "local" => Ok(ReaderMode::Tail),
            "ftp" => Ok(ReaderMode::Ftp),
            "http" | "https" => Ok(ReaderMode::Http),
            "custom" => Ok(ReaderMode::Custom),
            other => Err(ConfigError::Invalid {
                key: "mode",
                reason: format!("unknown reader mode '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Base URL the log file name is appended to
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Reader name, used for the checkpoint file (`<name>_state.json`)
    pub name: String,
    pub mode: ReaderMode,
    /// Local directory, or remote directory for FTP
    pub log_dir: Option<String>,
    pub file_name: String,
    pub poll_interval: Duration,
    pub state_save_interval: Duration,
    /// Where checkpoint files are written
    pub state_dir: PathBuf,
    pub ftp: Option<FtpSettings>,
    pub http: Option<HttpSettings>,
}

impl ReaderConfig {
    /// Local follower with default intervals
    pub fn local(name: &str, log_dir: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            mode: ReaderMode::Tail,
            log_dir: Some(log_dir.into()),
            file_name: file_name.into(),
            poll_interval: ReaderMode::Tail.default_poll_interval(),
            state_save_interval: Duration::from_millis(DEFAULT_STATE_SAVE_MS),
            state_dir: PathBuf::from("."),
            ftp: None,
            http: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Missing("reader name"));
        }
        if self.file_name.trim().is_empty() {
            return Err(ConfigError::Missing("fileName"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "scanInterval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.state_save_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "stateSaveInterval",
                reason: "must be greater than zero".to_string(),
            });
        }

        match self.mode {
            ReaderMode::Tail | ReaderMode::Custom => {
                if self.log_dir.as_deref().map_or(true, |d| d.trim().is_empty()) {
                    return Err(ConfigError::Missing("logDir"));
                }
            }
            ReaderMode::Ftp => {
                let ftp = self.ftp.as_ref().ok_or(ConfigError::Missing("ftp settings"))?;
                if ftp.host.trim().is_empty() {
                    return Err(ConfigError::Missing("ftp host"));
                }
                if ftp.user.trim().is_empty() {
                    return Err(ConfigError::Missing("ftp user"));
                }
                if self.log_dir.is_none() {
                    return Err(ConfigError::Missing("logDir"));
                }
            }
            ReaderMode::Http => {
                let http = self
                    .http
                    .as_ref()
                    .ok_or(ConfigError::Missing("http settings"))?;
                if !(http.base_url.starts_with("http://") || http.base_url.starts_with("https://")) {
                    return Err(ConfigError::Invalid {
                        key: "baseUrl",
                        reason: format!("'{}' is not an http(s) url", http.base_url),
                    });
                }
            }
        }

        Ok(())
    }

    /// Path or URL of the followed file, as recorded in the checkpoint
    pub fn source_path(&self) -> String {
        match self.mode {
            ReaderMode::Http => {
                let base = self
                    .http
                    .as_ref()
                    .map(|h| h.base_url.trim_end_matches('/'))
                    .unwrap_or_default();
                format!("{}/{}", base, self.file_name)
            }
            ReaderMode::Ftp => {
                let dir = self.log_dir.as_deref().unwrap_or("").trim_end_matches('/');
                format!("{}/{}", dir, self.file_name)
            }
            ReaderMode::Tail | ReaderMode::Custom => {
                let dir = PathBuf::from(self.log_dir.as_deref().unwrap_or("."));
                let path = dir.join(&self.file_name);
                let path = if path.is_absolute() {
                    path
                } else {
                    std::env::current_dir()
                        .map(|cwd| cwd.join(&path))
                        .unwrap_or(path)
                };
                path.to_string_lossy().into_owned()
            }
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir.join(format!("{}_state.json", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("tail".parse::<ReaderMode>().unwrap(), ReaderMode::Tail);
        assert_eq!("FTP".parse::<ReaderMode>().unwrap(), ReaderMode::Ftp);
        assert_eq!("https".parse::<ReaderMode>().unwrap(), ReaderMode::Http);
        assert!("sftp2".parse::<ReaderMode>().is_err());
    }

    #[test]
    fn test_local_requires_log_dir() {
        let mut config = ReaderConfig::local("main", "", "console.log");
        assert!(matches!(config.validate(), Err(ConfigError::Missing("logDir"))));

        config.log_dir = Some("/var/log/reforger".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_remote_modes_require_settings() {
        let mut config = ReaderConfig::local("main", "/logs", "console.log");
        config.mode = ReaderMode::Ftp;
        assert!(matches!(config.validate(), Err(ConfigError::Missing("ftp settings"))));

        config.mode = ReaderMode::Http;
        config.http = Some(HttpSettings {
            base_url: "ftp://nope".to_string(),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = ReaderConfig::local("main", "/logs", "console.log");
        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths() {
        let mut config = ReaderConfig::local("medics", "/logs", "medics.log");
        config.state_dir = PathBuf::from("/state");
        assert_eq!(config.checkpoint_path(), PathBuf::from("/state/medics_state.json"));
        assert_eq!(config.source_path(), "/logs/medics.log");

        config.mode = ReaderMode::Http;
        config.http = Some(HttpSettings {
            base_url: "https://files.example.net/logs/".to_string(),
            timeout: Duration::from_secs(1),
        });
        assert_eq!(config.source_path(), "https://files.example.net/logs/medics.log");
    }
}
