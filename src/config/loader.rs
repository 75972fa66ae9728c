use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::Config;

/// Longest system_id a bind response can carry.
const SYSTEM_ID_MAX_LEN: usize = 15;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.name.is_empty() {
            anyhow::bail!("server.name must not be empty");
        }

        if self.server.system_id.is_empty() {
            anyhow::bail!("server.system_id must not be empty");
        }
        if self.server.system_id.len() > SYSTEM_ID_MAX_LEN {
            anyhow::bail!(
                "server.system_id '{}' exceeds {} characters",
                self.server.system_id,
                SYSTEM_ID_MAX_LEN
            );
        }

        if self.session.window_size == 0 {
            anyhow::bail!("session.window_size must be at least 1");
        }

        let timeouts = [
            ("server.disconnect_timeout", self.server.disconnect_timeout),
            ("session.offer_timeout", self.session.offer_timeout),
            ("session.expire_timeout", self.session.expire_timeout),
            ("session.unbind_timeout", self.session.unbind_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        info!("configuration validated successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.server.name, "smppserver");
        assert_eq!(config.server.address.port(), 2775);
        assert_eq!(config.server.disconnect_timeout, Duration::from_millis(500));
        assert_eq!(config.session.window_size, 10);
        assert_eq!(config.session.offer_timeout, Duration::from_secs(30));
        assert_eq!(config.session.expire_timeout, Duration::from_secs(60));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
server:
  name: edge-1
  address: "127.0.0.1:12775"
  system_id: EDGE
  disconnect_timeout: 250ms

session:
  window_size: 4
  offer_timeout: 2s
  expire_timeout: 5s
  unbind_timeout: 1s

telemetry:
  log_level: debug
  json_logs: true
  pdu_trace: true
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.name, "edge-1");
        assert_eq!(config.server.system_id, "EDGE");
        assert_eq!(config.server.disconnect_timeout, Duration::from_millis(250));
        assert_eq!(config.session.window_size, 4);
        assert_eq!(config.session.unbind_timeout, Duration::from_secs(1));
        assert!(config.telemetry.json_logs);
        assert_eq!(
            config.telemetry.tracing("smppserver").directive(),
            "debug,smppserver::listener::session=trace"
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        let result = Config::from_yaml("session:\n  window_size: 0\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("window_size"));
    }

    #[test]
    fn test_long_system_id_rejected() {
        let result = Config::from_yaml("server:\n  system_id: abcdefghijklmnop\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds 15"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::from_yaml("session:\n  offer_timeout: 0s\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("offer_timeout"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  name: from-file").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.name, "from-file");
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/smppserver.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
