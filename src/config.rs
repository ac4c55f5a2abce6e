//! Runtime configuration
//!
//! Loaded once from `config.json` in the data directory, then overridden by
//! `SKINVAULT_*` environment variables. Components receive the sections they
//! need at construction.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.json";

/// Value shipped in the default config, means "no key"
pub const API_KEY_PLACEHOLDER: &str = "key";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub log_level: String,
    pub http: HttpConfig,
    pub mineskin: MineSkinConfig,
    pub mojang: MojangConfig,
    pub storage: StorageConfig,
    pub cooldown: CooldownConfig,
    pub cache: CacheConfig,
    pub default_skins: DefaultSkinsConfig,
    pub restrict_skin_urls: RestrictSkinUrlsConfig,
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            log_level: "info".to_string(),
            http: HttpConfig::default(),
            mineskin: MineSkinConfig::default(),
            mojang: MojangConfig::default(),
            storage: StorageConfig::default(),
            cooldown: CooldownConfig::default(),
            cache: CacheConfig::default(),
            default_skins: DefaultSkinsConfig::default(),
            restrict_skin_urls: RestrictSkinUrlsConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("skinvault/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MineSkinConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for MineSkinConfig {
    fn default() -> Self {
        Self {
            api_key: API_KEY_PLACEHOLDER.to_string(),
            endpoint: "https://api.mineskin.org/generate/url".to_string(),
            timeout_ms: 90_000,
        }
    }
}

impl MineSkinConfig {
    /// Usable API key, if one is configured
    pub fn api_key(&self) -> Option<&str> {
        let key = self.api_key.trim();
        if key.is_empty() || key == API_KEY_PLACEHOLDER {
            None
        } else {
            Some(key)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MojangConfig {
    pub profile_endpoint: String,
    pub session_endpoint: String,
    pub timeout_ms: u64,
}

impl Default for MojangConfig {
    fn default() -> Self {
        Self {
            profile_endpoint: "https://api.mojang.com/users/profiles/minecraft".to_string(),
            session_endpoint: "https://sessionserver.mojang.com/session/minecraft/profile"
                .to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl MojangConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory of the file backend, defaults to `<data_dir>/storage`
    pub path: Option<PathBuf>,
    /// Defaults to `sqlite:<data_dir>/skinvault.db`
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: None,
            database_url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub seconds: u64,
    /// Applied after a failed skin change
    pub error_seconds: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            seconds: 30,
            error_seconds: 5,
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DefaultSkinsConfig {
    pub enabled: bool,
    /// Player names or skin URLs
    pub skins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestrictSkinUrlsConfig {
    pub enabled: bool,
    pub allowed_prefixes: Vec<String>,
}

impl Default for RestrictSkinUrlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_prefixes: vec![
                "https://i.imgur.com".to_string(),
                "https://namemc.com/skin/".to_string(),
                "https://s.namemc.com/i/".to_string(),
                "https://textures.minecraft.net/texture/".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Known account used to probe the identity services
    pub probe_name: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            probe_name: "Notch".to_string(),
        }
    }
}

impl Config {
    /// Load `config.json` from the data directory, writing the defaults on
    /// first start
    pub fn load(data_dir: &Path) -> AppResult<Self> {
        let path = data_dir.join(CONFIG_FILE);

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
            serde_json::from_str::<Config>(&content)
                .map_err(|e| AppError::Config(format!("Failed to parse {}: {}", path.display(), e)))?
        } else {
            let config = Config::default();
            std::fs::create_dir_all(data_dir)?;
            std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            config
        };

        config.data_dir = data_dir.to_path_buf();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate();

        Ok(config)
    }

    /// Apply `SKINVAULT_*` overrides read through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("SKINVAULT_MINESKIN_API_KEY") {
            self.mineskin.api_key = key;
        }
        if let Some(backend) = lookup("SKINVAULT_STORAGE_BACKEND") {
            match backend.to_ascii_lowercase().as_str() {
                "file" => self.storage.backend = StorageBackend::File,
                "sqlite" => self.storage.backend = StorageBackend::Sqlite,
                other => tracing::warn!("[Config] Unknown storage backend '{}', keeping {:?}", other, self.storage.backend),
            }
        }
        if let Some(url) = lookup("SKINVAULT_DATABASE_URL") {
            self.storage.database_url = Some(url);
        }
        if let Some(seconds) = lookup("SKINVAULT_COOLDOWN_SECONDS") {
            match seconds.parse() {
                Ok(seconds) => self.cooldown.seconds = seconds,
                Err(_) => tracing::warn!("[Config] Ignoring invalid SKINVAULT_COOLDOWN_SECONDS '{}'", seconds),
            }
        }
        if let Some(level) = lookup("SKINVAULT_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Turn off features whose settings cannot work
    pub fn validate(&mut self) {
        if self.default_skins.enabled && self.default_skins.skins.is_empty() {
            tracing::warn!("[Config] No default skins configured! Disabling default skins.");
            self.default_skins.enabled = false;
        }

        if self.restrict_skin_urls.enabled && self.restrict_skin_urls.allowed_prefixes.is_empty() {
            tracing::warn!("[Config] No allowed skin URLs configured! Disabling URL restriction.");
            self.restrict_skin_urls.enabled = false;
        }

        if self.cooldown.cleanup_interval_secs == 0 {
            tracing::warn!("[Config] cooldown.cleanup_interval_secs must be positive, using 60");
            self.cooldown.cleanup_interval_secs = 60;
        }
    }

    pub fn storage_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("storage"))
    }

    pub fn database_url(&self) -> String {
        self.storage
            .database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite:{}", self.data_dir.join("skinvault.db").display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_api_key_placeholder_means_unset() {
        let mut config = MineSkinConfig::default();
        assert_eq!(config.api_key(), None);

        config.api_key = "   ".to_string();
        assert_eq!(config.api_key(), None);

        config.api_key = "abc123".to_string();
        assert_eq!(config.api_key(), Some("abc123"));
    }

    #[test]
    fn test_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(config.cooldown.seconds, 30);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage_path(), dir.path().join("storage"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"storage":{"backend":"sqlite"},"cooldown":{"seconds":10}}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(config.cooldown.seconds, 10);
        assert_eq!(config.cooldown.error_seconds, 5);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();

        assert!(matches!(Config::load(dir.path()), Err(AppError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SKINVAULT_MINESKIN_API_KEY", "secret"),
            ("SKINVAULT_STORAGE_BACKEND", "SQLITE"),
            ("SKINVAULT_COOLDOWN_SECONDS", "not a number"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.mineskin.api_key(), Some("secret"));
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.cooldown.seconds, 30);
    }

    #[test]
    fn test_validate_disables_empty_lists() {
        let mut config = Config::default();
        config.default_skins.enabled = true;
        config.restrict_skin_urls.enabled = true;
        config.restrict_skin_urls.allowed_prefixes.clear();

        config.validate();

        assert!(!config.default_skins.enabled);
        assert!(!config.restrict_skin_urls.enabled);
    }
}
