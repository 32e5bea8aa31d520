use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::core::models::SourceSpec;
use crate::core::poll::PollPolicy;
use crate::error::ConfigError;

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV: &str = "PITOOLS_CONFIG";

const ENV_PREFIX: &str = "PITOOLS_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Each source is mirrored into `destination_base/<name>`.
    pub destination_base: PathBuf,
    pub log_directory: PathBuf,
    pub log_retention_days: u32,
    pub min_free_space_gb: u64,
    pub exclude_patterns: Vec<String>,
    pub sources: Vec<SourceSpec>,
    pub state_directory: PathBuf,
    pub bluetooth: BluetoothConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    pub scan_seconds: u64,
    pub settle_seconds: u64,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            scan_seconds: 30,
            settle_seconds: 3,
            poll_attempts: 5,
            poll_interval_ms: 1000,
        }
    }
}

impl BluetoothConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            settle: Duration::from_secs(self.settle_seconds),
            attempts: self.poll_attempts.max(1),
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub output_dir: PathBuf,
    pub default_preset: String,
    pub test_seconds: u64,
    /// Case-insensitive substrings that mark a card as an external microphone.
    pub vendor_hints: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("recordings"),
            default_preset: "cd".to_string(),
            test_seconds: 2,
            vendor_hints: ["usb", "microphone", "mic", "blue", "yeti", "samson", "rode", "fifine"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pitools");
        let state_dir = dirs::state_dir()
            .map(|d| d.join("pitools"))
            .unwrap_or_else(|| data_dir.join("state"));

        Self {
            destination_base: PathBuf::from("/mnt/backup"),
            log_directory: data_dir.join("logs"),
            log_retention_days: 30,
            min_free_space_gb: 2,
            exclude_patterns: [
                "*.tmp",
                "*.swp",
                ".cache/",
                "node_modules/",
                "__pycache__/",
                ".Trash-*/",
                "lost+found/",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            sources: vec![
                SourceSpec::new("home", "/home/pi"),
                SourceSpec::new("etc", "/etc"),
                SourceSpec::new("www", "/var/www"),
            ],
            state_directory: state_dir,
            bluetooth: BluetoothConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from defaults, an optional TOML file and
    /// `PITOOLS_*` environment variables, in that order of precedence.
    ///
    /// A missing file is not an error; a file that fails to parse is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if path.exists() {
            figment = figment.merge(Toml::file(&path));
        }
        let figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["CONFIG"])
                .split("__"),
        );

        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            let name = source.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("source with empty name".to_string()));
            }
            if name.eq_ignore_ascii_case("all") {
                return Err(ConfigError::Invalid(
                    "'all' is reserved and cannot name a source".to_string(),
                ));
            }
            if !is_single_component(&source.name) {
                return Err(ConfigError::Invalid(format!(
                    "source name '{}' must be a plain directory name",
                    source.name
                )));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source name '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }

    /// Free space required at the destination before the first transfer.
    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_space_gb.saturating_mul(1024 * 1024 * 1024)
    }

    pub fn speaker_state_path(&self) -> PathBuf {
        self.state_directory.join("speaker.toml")
    }

    pub fn mic_state_path(&self) -> PathBuf {
        self.state_directory.join("mic.toml")
    }
}

pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pitools")
        .join("config.toml")
}

/// `name` is exactly one normal path component, so it stays inside the
/// destination base. Rejects `.`, `..` and anything with a separator.
fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.sources, AppConfig::default().sources);
        assert_eq!(config.min_free_space_gb, 2);
        assert_eq!(config.log_retention_days, 30);
    }

    #[test]
    fn file_overrides_sources_in_declared_order() {
        let (_dir, path) = write_config(
            r#"
destination_base = "/media/usb/backup"
exclude_patterns = ["*.log"]

[[sources]]
name = "photos"
path = "/srv/photos"

[[sources]]
name = "music"
path = "/srv/music"

[bluetooth]
settle_seconds = 1
"#,
        );

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.destination_base, PathBuf::from("/media/usb/backup"));
        assert_eq!(config.source_names(), vec!["photos", "music"]);
        assert_eq!(config.exclude_patterns, vec!["*.log"]);
        assert_eq!(config.bluetooth.settle_seconds, 1);
        // untouched keys keep their defaults
        assert_eq!(config.bluetooth.scan_seconds, 30);
        assert_eq!(config.log_retention_days, 30);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let (_dir, path) = write_config("sources = [[[\n");
        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn wrong_type_is_an_error() {
        let (_dir, path) = write_config("log_retention_days = \"forever\"\n");
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn duplicate_source_names_rejected() {
        let (_dir, path) = write_config(
            r#"
[[sources]]
name = "home"
path = "/home/a"

[[sources]]
name = "home"
path = "/home/b"
"#,
        );
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn reserved_source_name_rejected() {
        let (_dir, path) = write_config("[[sources]]\nname = \"all\"\npath = \"/\"\n");
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn source_names_must_stay_inside_destination() {
        for name in ["..", ".", "a/b", "/etc", "home/", "./home"] {
            let (_dir, path) =
                write_config(&format!("[[sources]]\nname = '{}'\npath = \"/\"\n", name));
            assert!(
                matches!(AppConfig::load(Some(&path)), Err(ConfigError::Invalid(_))),
                "{name}"
            );
        }

        let (_dir, path) = write_config("[[sources]]\nname = 'music.flac'\npath = \"/\"\n");
        assert!(AppConfig::load(Some(&path)).is_ok());
    }

    #[test]
    fn poll_policy_from_bluetooth_settings() {
        let bt = BluetoothConfig {
            settle_seconds: 2,
            poll_attempts: 0,
            poll_interval_ms: 250,
            ..Default::default()
        };
        let policy = bt.poll_policy();
        assert_eq!(policy.settle, Duration::from_secs(2));
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.interval, Duration::from_millis(250));
    }
}
