//! Bridge Configuration
//!
//! Loaded from a TOML file with `[runtime]` and `[debugger]` tables. Every
//! field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

pub use bridge_js_runtime::RuntimeConfig;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

/// Debugger settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Pause before the first statement of every debugged script
    pub pause_on_start: bool,

    /// How long `send_protocol_message` waits for a response (None = forever)
    pub protocol_timeout_ms: Option<u64>,
}

impl DebuggerConfig {
    pub fn with_pause_on_start(mut self, enabled: bool) -> Self {
        self.pause_on_start = enabled;
        self
    }

    pub fn with_protocol_timeout(mut self, timeout: Duration) -> Self {
        self.protocol_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn protocol_timeout(&self) -> Option<Duration> {
        self.protocol_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    pub runtime: RuntimeConfig,
    pub debugger: DebuggerConfig,
}

impl BridgeConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        let config: BridgeConfig = toml::from_str(&content)?;
        info!(target: "bridge", "Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.toml");
        fs::write(
            &path,
            r#"
[runtime]
memory_limit = 33554432
console = false

[debugger]
pause_on_start = true
protocol_timeout_ms = 2500
"#,
        )
        .await
        .unwrap();

        let config = BridgeConfig::load(&path).await.unwrap();
        assert_eq!(config.runtime.memory_limit, Some(33554432));
        assert!(!config.runtime.console);
        assert!(config.debugger.pause_on_start);
        assert_eq!(config.debugger.protocol_timeout(), Some(Duration::from_millis(2500)));
    }

    #[tokio::test]
    async fn test_missing_tables_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.toml");
        fs::write(&path, "[debugger]\npause_on_start = true\n").await.unwrap();

        let config = BridgeConfig::load(&path).await.unwrap();
        assert_eq!(config.runtime, RuntimeConfig::default());
        assert!(config.debugger.protocol_timeout().is_none());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = BridgeConfig::load(dir.path().join("absent.toml")).await;
        assert!(matches!(result, Err(LoadError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.toml");
        fs::write(&path, "[debugger\n").await.unwrap();

        assert!(matches!(
            BridgeConfig::load(&path).await,
            Err(LoadError::TomlParseError(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = DebuggerConfig::default()
            .with_pause_on_start(true)
            .with_protocol_timeout(Duration::from_secs(2));
        assert!(config.pause_on_start);
        assert_eq!(config.protocol_timeout_ms, Some(2000));
    }
}
