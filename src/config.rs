//! Configuration loading and defaults for idletimerd.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// An idle timer and the commands it runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerConfig {
    /// Name used in logs and printed events.
    pub name: String,

    /// Idle threshold, and the further delay before `on_idle` runs.
    pub timeout_seconds: u64,

    /// Command run once the timer goes idle.
    pub on_idle: String,

    /// Command run when activity resumes.
    #[serde(default)]
    pub on_active: Option<String>,
}

impl TimerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Main configuration for idletimerd.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interval between session idle samples in milliseconds (default: 1000).
    pub poll_interval_ms: u64,

    /// Dry run mode: log commands instead of executing.
    pub dry_run: bool,

    /// Configured idle timers.
    #[serde(rename = "timer")]
    pub timers: Vec<TimerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            dry_run: false,
            timers: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(default_path) = default_path()
            && default_path.exists()
        {
            return Self::load(&default_path);
        }

        Ok(Self::default())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than 0");
        }

        for (i, timer) in self.timers.iter().enumerate() {
            if timer.name.trim().is_empty() {
                anyhow::bail!("timer #{} has an empty name", i + 1);
            }
            if timer.timeout_seconds == 0 {
                anyhow::bail!("timer '{}': timeout_seconds must be greater than 0", timer.name);
            }
            if timer.on_idle.trim().is_empty() {
                anyhow::bail!("timer '{}': on_idle command is empty", timer.name);
            }
            if timer.on_active.as_deref().is_some_and(|c| c.trim().is_empty()) {
                anyhow::bail!("timer '{}': on_active command is empty", timer.name);
            }
            if self.timers[..i].iter().any(|t| t.name == timer.name) {
                anyhow::bail!("duplicate timer name '{}'", timer.name);
            }
        }

        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/idletimerd/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("idletimerd").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn timer(name: &str, timeout_seconds: u64) -> TimerConfig {
        TimerConfig {
            name: name.to_string(),
            timeout_seconds,
            on_idle: "loginctl lock-session".to_string(),
            on_active: None,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(!config.dry_run);
        assert!(config.timers.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            poll_interval_ms = 500
            dry_run = true

            [[timer]]
            name = "dim"
            timeout_seconds = 120
            on_idle = "brightnessctl set 10%"
            on_active = "brightnessctl set 100%"

            [[timer]]
            name = "lock"
            timeout_seconds = 300
            on_idle = "loginctl lock-session"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert!(config.dry_run);
        assert_eq!(config.timers.len(), 2);
        assert_eq!(config.timers[0].timeout(), Duration::from_secs(120));
        assert_eq!(
            config.timers[0].on_active.as_deref(),
            Some("brightnessctl set 100%")
        );
        assert_eq!(config.timers[1].name, "lock");
        assert_eq!(config.timers[1].on_active, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_uses_defaults() {
        let config: Config = toml::from_str("dry_run = true").unwrap();
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.timers.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = Config {
            timers: vec![timer("lock", 0)],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[test]
    fn test_validate_rejects_empty_commands() {
        let mut t = timer("dim", 60);
        t.on_idle = "  ".to_string();
        let config = Config {
            timers: vec![t],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut t = timer("dim", 60);
        t.on_active = Some(String::new());
        let config = Config {
            timers: vec![t],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let config = Config {
            timers: vec![timer("lock", 60), timer("lock", 120)],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let config = Config {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[timer]]\nname = \"lock\"\ntimeout_seconds = 600\non_idle = \"swaylock\""
        )
        .unwrap();

        let config = Config::load_or_default(Some(file.path())).unwrap();
        assert_eq!(
            config.timers,
            vec![TimerConfig {
                name: "lock".to_string(),
                timeout_seconds: 600,
                on_idle: "swaylock".to_string(),
                on_active: None,
            }]
        );
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
