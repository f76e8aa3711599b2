//! Watcher configuration.
//!
//! Defaults are overlaid by an optional TOML file and then by command-line
//! flags. A missing file is not an error; a malformed one is.

use chrono::Duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::session::BucketIds;

pub const CONFIG_FILE_NAME: &str = "aw-watcher-terminal.toml";
pub const DEFAULT_PORT: u16 = 5600;
pub const TESTING_PORT: u16 = 5666;
pub const COMMANDS_EVENT_TYPE: &str = "app.terminal.command";
pub const ACTIVITY_EVENT_TYPE: &str = "app.terminal.activity";
/// Upper bound for `pulsetime_secs` and `queue_window_secs`.
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config directory not found")]
    NoConfigDir,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: Option<u16>,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BucketConfig {
    pub commands: String,
    pub activity: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            commands: "aw-watcher-terminal-commands".to_string(),
            activity: "aw-watcher-terminal-activity".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherConfig {
    pub server: ServerConfig,
    pub bucket: BucketConfig,
    pub client_id: String,
    pub pipe_path: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub pulsetime_secs: u64,
    pub queue_window_secs: Option<u64>,
    #[serde(skip)]
    pub testing: bool,
    #[serde(skip)]
    pub verbose: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            bucket: BucketConfig::default(),
            client_id: "aw-watcher-terminal".to_string(),
            pipe_path: None,
            poll_interval_ms: 1000,
            pulsetime_secs: 10,
            queue_window_secs: None,
            testing: false,
            verbose: false,
        }
    }
}

/// Values given on the command line; `None` leaves the file/default value.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub testing: bool,
    pub verbose: bool,
    pub pipe_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl WatcherConfig {
    pub fn apply(&mut self, overrides: Overrides) {
        self.testing |= overrides.testing;
        self.verbose |= overrides.verbose;
        if let Some(path) = overrides.pipe_path {
            self.pipe_path = Some(path);
        }
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "server.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.pulsetime_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "pulsetime_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.pulsetime_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                field: "pulsetime_secs",
                reason: format!("must be at most {} seconds", MAX_INTERVAL_SECS),
            });
        }
        if self
            .queue_window_secs
            .is_some_and(|secs| secs > MAX_INTERVAL_SECS)
        {
            return Err(ConfigError::Invalid {
                field: "queue_window_secs",
                reason: format!("must be at most {} seconds", MAX_INTERVAL_SECS),
            });
        }
        if self.bucket.commands.trim().is_empty() || self.bucket.activity.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "bucket",
                reason: "bucket names must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn port(&self) -> u16 {
        match self.server.port {
            Some(port) => port,
            None if self.testing => TESTING_PORT,
            None => DEFAULT_PORT,
        }
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.port())
    }

    pub fn pulsetime(&self) -> Duration {
        Duration::seconds(self.pulsetime_secs as i64)
    }

    /// Reorder window; half the heartbeat pulsetime unless set explicitly.
    pub fn queue_window(&self) -> Duration {
        match self.queue_window_secs {
            Some(secs) => Duration::seconds(secs as i64),
            None => Duration::milliseconds(self.pulsetime_secs as i64 * 500),
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn bucket_ids(&self, hostname: &str) -> BucketIds {
        BucketIds {
            commands: format!("{}_{}", self.bucket.commands, hostname),
            activity: format!("{}_{}", self.bucket.activity, hostname),
        }
    }

    pub fn resolve_pipe_path(&self) -> Option<PathBuf> {
        self.pipe_path
            .clone()
            .or_else(aw_watcher_terminal_protocol::default_pipe_path)
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(dir
        .join("activitywatch")
        .join("aw-watcher-terminal")
        .join(CONFIG_FILE_NAME))
}

pub fn load_config(path: Option<&Path>) -> Result<WatcherConfig, ConfigError> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(WatcherConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;
    toml::from_str::<WatcherConfig>(&content).map_err(|source| ConfigError::Parse {
        path: config_path,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing.toml");
        let config = load_config(Some(&path)).expect("load config");

        assert_eq!(config, WatcherConfig::default());
        assert_eq!(config.server_url(), "http://127.0.0.1:5600");
        assert_eq!(config.queue_window(), Duration::seconds(5));
    }

    #[test]
    fn load_config_parses_partial_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs_err::write(
            &path,
            r#"
pulsetime_secs = 30
poll_interval_ms = 250
pipe_path = "/run/user/1000/aw-terminal.fifo"

[server]
port = 5700

[bucket]
commands = "shell-commands"
"#,
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server_url(), "http://127.0.0.1:5700");
        assert_eq!(config.queue_window(), Duration::seconds(15));
        assert_eq!(config.poll_interval(), std::time::Duration::from_millis(250));
        assert_eq!(
            config.resolve_pipe_path(),
            Some(PathBuf::from("/run/user/1000/aw-terminal.fifo"))
        );

        let buckets = config.bucket_ids("laptop");
        assert_eq!(buckets.commands, "shell-commands_laptop");
        assert_eq!(buckets.activity, "aw-watcher-terminal-activity_laptop");
    }

    #[test]
    fn load_config_rejects_unknown_keys() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs_err::write(&path, "pulse_time = 3\n").expect("write config");

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn testing_flag_switches_default_port_only() {
        let mut config = WatcherConfig::default();
        config.apply(Overrides {
            testing: true,
            ..Overrides::default()
        });
        assert_eq!(config.port(), TESTING_PORT);

        config.apply(Overrides {
            port: Some(6000),
            host: Some("localhost".to_string()),
            ..Overrides::default()
        });
        assert_eq!(config.server_url(), "http://localhost:6000");
        assert!(config.testing);
    }

    #[test]
    fn explicit_window_wins_over_pulsetime() {
        let config = WatcherConfig {
            queue_window_secs: Some(2),
            ..WatcherConfig::default()
        };
        assert_eq!(config.queue_window(), Duration::seconds(2));
    }

    #[test]
    fn validate_bounds_pulsetime_and_window() {
        let config = WatcherConfig {
            pulsetime_secs: 20_000_000_000_000_000,
            ..WatcherConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "pulsetime_secs",
                ..
            })
        ));

        let config = WatcherConfig {
            queue_window_secs: Some(u64::MAX),
            ..WatcherConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "queue_window_secs",
                ..
            })
        ));

        let config = WatcherConfig {
            pulsetime_secs: MAX_INTERVAL_SECS,
            queue_window_secs: Some(MAX_INTERVAL_SECS),
            ..WatcherConfig::default()
        };
        config.validate().expect("bounds are inclusive");
        assert_eq!(config.pulsetime(), Duration::days(1));
        assert_eq!(config.queue_window(), Duration::days(1));
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let config = WatcherConfig {
            poll_interval_ms: 0,
            ..WatcherConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                ..
            })
        ));
    }
}
