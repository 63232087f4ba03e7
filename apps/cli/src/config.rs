//! panup configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux/macOS: `~/.config/panup/config.toml`
//! - Windows: `%APPDATA%/panup/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use panup_upload::{DEFAULT_APP_PATH, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Token written by `panup init`; never accepted as a credential.
pub const PLACEHOLDER_TOKEN: &str = "your_access_token_here";

/// panup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanupConfig {
    /// OAuth access token sent with every remote call.
    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: String,

    /// Access token expiry. Unset means the token does not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Remote directory all uploads go under.
    #[serde(default = "default_app_path")]
    pub app_path: String,

    /// Local directory standing in for the remote service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_dir: Option<PathBuf>,

    #[serde(default)]
    pub upload: UploadSettings,
}

/// `[upload]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub max_concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    pub exclude: Vec<String>,
    pub keep_structure: bool,
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub progress_interval_secs: u64,
}

fn default_app_path() -> String {
    DEFAULT_APP_PATH.into()
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            cache_dir: None,
            exclude: Vec::new(),
            keep_structure: true,
            max_retries: 3,
            base_retry_delay_ms: 1000,
            progress_interval_secs: 5,
        }
    }
}

impl UploadSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_retry_delay_ms),
            ..RetryPolicy::default()
        }
    }

    /// `None` when reporting is disabled (interval of zero).
    pub fn progress_interval(&self) -> Option<Duration> {
        (self.progress_interval_secs > 0).then(|| Duration::from_secs(self.progress_interval_secs))
    }
}

impl Default for PanupConfig {
    fn default() -> Self {
        Self {
            access_token: PLACEHOLDER_TOKEN.into(),
            refresh_token: String::new(),
            expires_at: None,
            app_path: default_app_path(),
            mirror_dir: None,
            upload: UploadSettings::default(),
        }
    }
}

impl PanupConfig {
    /// Loads configuration from `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            bail!(
                "config file not found at {}; run `panup init` to create one",
                path.display()
            );
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: PanupConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix (contains tokens).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Returns the access token if it is usable right now.
    pub fn credential(&self) -> anyhow::Result<&str> {
        self.credential_at(Utc::now())
    }

    fn credential_at(&self, now: DateTime<Utc>) -> anyhow::Result<&str> {
        let token = self.access_token.trim();
        if token.is_empty() || token == PLACEHOLDER_TOKEN {
            bail!("no access token configured; authorize panup and set access_token in the config file");
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                bail!(
                    "access token expired at {}; re-authorize panup and update the config file",
                    expires_at.to_rfc3339()
                );
            }
        }
        Ok(token)
    }
}

/// Writes a default config file, refusing to overwrite unless `force`.
pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "config file already exists at {}; pass --force to overwrite it",
            path.display()
        );
    }
    PanupConfig::default().save(path)
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("panup").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("panup")
            .join("config.toml")
    }
}
