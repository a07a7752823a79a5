use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "qisu.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Whole-request budget; plan streams can run for minutes.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserConfig {
    #[serde(default = "default_user_id")]
    pub id: i64,
    #[serde(default = "default_plan_name")]
    pub plan_name: String,
}

fn default_user_id() -> i64 {
    1
}

fn default_plan_name() -> String {
    crate::plan::text::DEFAULT_TITLE.to_string()
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
            plan_name: default_plan_name(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub directory: Option<String>,
    pub retention_days: Option<u64>,
}

impl Config {
    pub fn load_with_path() -> Result<(Self, Option<PathBuf>)> {
        let mut candidates = Vec::new();

        if let Ok(explicit) = std::env::var("QISU_CONFIG") {
            if !explicit.trim().is_empty() {
                candidates.push(PathBuf::from(explicit));
            }
        }
        candidates.push(PathBuf::from(CONFIG_FILE));
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("qisu").join(CONFIG_FILE));
        }
        candidates.push(crate::paths::config_dir().join(CONFIG_FILE));

        for path in candidates {
            if path.exists() {
                let config = Self::load_from(&path)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.backend.base_url.trim();
        let parsed = url::Url::parse(base)
            .with_context(|| format!("backend.base_url is not a valid URL: {}", base))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!(
                "backend.base_url must start with http:// or https://, got: {}",
                base
            );
        }
        if self.backend.timeout_secs == 0 {
            anyhow::bail!("backend.timeout_secs must be greater than 0");
        }
        if self.backend.connect_timeout_secs == 0 {
            anyhow::bail!("backend.connect_timeout_secs must be greater than 0");
        }
        if self.backend.connect_timeout_secs > self.backend.timeout_secs {
            anyhow::bail!("backend.connect_timeout_secs must not exceed backend.timeout_secs");
        }
        if self.user.plan_name.trim().is_empty() {
            anyhow::bail!("user.plan_name cannot be empty");
        }
        Ok(())
    }
}
