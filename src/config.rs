use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default application name reported to the notification server
pub const DEFAULT_APP_NAME: &str = "notify-bridge";

/// Bridge configuration loaded from file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Application name used to initialize the notification service
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Socket front-end configuration
    #[serde(default)]
    pub socket: SocketConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            socket: SocketConfig::default(),
        }
    }
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

/// Unix socket front-end settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Socket path (overrides the runtime-dir default)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Seconds a connection may sit idle before it is closed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

fn default_max_connections() -> usize {
    100
}

fn default_idle_timeout() -> u64 {
    30
}

impl BridgeConfig {
    /// Load configuration from default path (~/.config/notify-bridge/config.toml)
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Get the default configuration path
    pub fn default_path() -> PathBuf {
        directories::BaseDirs::new().map_or_else(
            || PathBuf::from("~/.config/notify-bridge/config.toml"),
            |dirs| dirs.config_dir().join("notify-bridge").join("config.toml"),
        )
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Generate example configuration file content
    pub fn example() -> String {
        r#"# notify-bridge configuration
# Place this file at ~/.config/notify-bridge/config.toml

# Name the notification server shows for this application
app_name = "notify-bridge"

[socket]
# Socket path for `notify-bridge listen` (default: $XDG_RUNTIME_DIR/notify-bridge.sock)
# path = "/run/user/1000/notify-bridge.sock"

# Maximum concurrent connections
max_connections = 100

# Close connections idle for this many seconds
idle_timeout_secs = 30
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load_from_path(dir.path().join("nope.toml"));
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
        assert_eq!(config.socket.max_connections, 100);
        assert!(config.socket.path.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "app_name = \"ci-runner\"\n[socket]\nmax_connections = 4").unwrap();

        let config = BridgeConfig::load_from_path(file.path().to_path_buf());
        assert_eq!(config.app_name, "ci-runner");
        assert_eq!(config.socket.max_connections, 4);
        assert_eq!(config.socket.idle_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "app_name = [").unwrap();
        let config = BridgeConfig::load_from_path(file.path().to_path_buf());
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
    }

    #[test]
    fn test_example_parses() {
        let config: BridgeConfig = toml::from_str(&BridgeConfig::example()).unwrap();
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
        assert_eq!(config.socket.idle_timeout_secs, 30);
    }
}
