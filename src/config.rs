use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::upload::orchestrator::DEFAULT_CONCURRENCY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub forms: FormsConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the filesystem object store.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Uploads in flight at once for one batch (values below 1 act as 1).
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("formvault/objects")
}

fn default_bucket() -> String {
    "form-requests".to_string()
}

fn default_upload_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            bucket: default_bucket(),
            upload_concurrency: default_upload_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormsConfig {
    /// Variant form-key spelling -> canonical storage folder.
    #[serde(default = "default_form_aliases")]
    pub aliases: BTreeMap<String, String>,
}

fn default_form_aliases() -> BTreeMap<String, String> {
    ["boarding", "boarding_tab", "boarding-tab", "boardinghome", "boarding-home"]
        .into_iter()
        .map(|alias| (alias.to_string(), "boarding_home".to_string()))
        .collect()
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            aliases: default_form_aliases(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_comment_chars")]
    pub max_comment_chars: usize,
}

fn default_max_comment_chars() -> usize {
    500
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_comment_chars: default_max_comment_chars(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("formvault")
        .join("formvault.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            storage: StorageConfig::default(),
            forms: FormsConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Config {
    /// Load from `FORMVAULT_CONFIG` or the default location, writing
    /// defaults out when no file exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("formvault")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("FORMVAULT_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[storage]
bucket = "intake"

[forms.aliases]
"Medical Tab" = "medical"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage.bucket, "intake");
        assert_eq!(config.storage.upload_concurrency, 4);
        assert_eq!(config.limits.max_comment_chars, 500);
        assert_eq!(config.forms.aliases.get("Medical Tab").map(String::as_str), Some("medical"));
        assert!(!config.forms.aliases.contains_key("boarding_tab"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.storage.upload_concurrency = 8;
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.storage.upload_concurrency, 8);
        assert_eq!(reloaded.forms.aliases, FormsConfig::default().aliases);
    }
}
