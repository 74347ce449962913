//! Configuration loading.
//!
//! Reads `~/.arkmesh/config.json` (or an explicit path), fills gaps with
//! defaults and then applies environment overrides such as `ARK_API_KEY`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ArkError, Result};

/// Default Ark REST API base.
pub const DEFAULT_API_BASE: &str = "https://ark.cn-beijing.volces.com/api/v3";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub poll: PollConfig,
    pub cache: CacheConfig,
}

/// Remote generation API settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST base URL, without trailing slash.
    pub base_url: String,
    /// Bearer key. Usually supplied via `ARK_API_KEY`.
    pub api_key: Option<String>,
    /// Model used for text-to-image generation.
    pub image_model: String,
    /// Model used for image-to-3D generation.
    pub model_model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Image size hint passed to the image endpoint.
    pub image_size: String,
    /// Upper bound on images returned for sequential generation.
    pub max_images: u32,
    pub subdivision_level: String,
    pub file_format: String,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("image_model", &self.image_model)
            .field("model_model", &self.model_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            api_key: None,
            image_model: "doubao-seedream-4-0-250828".to_string(),
            model_model: "doubao-seed3d-1-0-250928".to_string(),
            timeout_secs: 30,
            image_size: "2K".to_string(),
            max_images: 6,
            subdivision_level: "medium".to_string(),
            file_format: "glb".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Task polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Fixed delay between status checks.
    pub interval_secs: u64,
    /// Give up after this many polls. `None` waits indefinitely.
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_attempts: None,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Local model cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory. Defaults to `<data dir>/arkmesh/model-cache`.
    pub dir: Option<PathBuf>,
    /// Entries older than this are treated as misses.
    pub ttl_days: u64,
    /// Archive subfolders searched for the model file, in order.
    pub search_dirs: Vec<String>,
    /// Extension (without dot) of the model file inside the archive.
    pub model_extension: String,
    /// Appended to the cache key when the URL path has no extension.
    pub default_extension: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_days: 30,
            search_dirs: vec!["rgb".to_string(), "pbr".to_string()],
            model_extension: "glb".to_string(),
            default_extension: ".glb".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(24 * 60 * 60))
    }

    /// Resolve the cache directory, preferring the configured one.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        match dirs::data_dir() {
            Some(data) => data.join("arkmesh").join("model-cache"),
            None => Config::dir().join("model-cache"),
        }
    }
}

impl Config {
    /// `~/.arkmesh`
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".arkmesh")
    }

    /// `~/.arkmesh/config.json`
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from the default path and apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Load from `path` and apply environment overrides.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str::<Config>(&data).map_err(|e| {
                ArkError::Config(format!("Invalid config file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Config::default()
            }
            Err(e) => return Err(ArkError::Io(e)),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `ARK_API_KEY` and `ARKMESH_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = get("ARK_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Some(base) = get("ARKMESH_API_BASE_URL") {
            self.api.base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(raw) = get("ARKMESH_POLL_INTERVAL_SECS") {
            match raw.parse() {
                Ok(secs) => self.poll.interval_secs = secs,
                Err(_) => warn!("Ignoring invalid ARKMESH_POLL_INTERVAL_SECS: {}", raw),
            }
        }
        if let Some(dir) = get("ARKMESH_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = get("ARKMESH_CACHE_TTL_DAYS") {
            match raw.parse() {
                Ok(days) => self.cache.ttl_days = days,
                Err(_) => warn!("Ignoring invalid ARKMESH_CACHE_TTL_DAYS: {}", raw),
            }
        }
    }

    /// The API key, or a config error when none is set.
    pub fn require_api_key(&self) -> Result<String> {
        self.api
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .ok_or_else(|| {
                ArkError::Config(
                    "ARK_API_KEY not found in environment variables or config".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.api.base_url, DEFAULT_API_BASE);
        assert_eq!(cfg.api.timeout_secs, 30);
        assert_eq!(cfg.poll.interval_secs, 5);
        assert!(cfg.poll.max_attempts.is_none());
        assert_eq!(cfg.cache.ttl_days, 30);
        assert_eq!(cfg.cache.search_dirs, vec!["rgb", "pbr"]);
        assert_eq!(cfg.cache.model_extension, "glb");
    }

    #[test]
    fn test_cache_ttl_is_thirty_days() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.ttl(), Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"poll": {"interval_secs": 2}, "cache": {"ttl_days": 7}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.poll.interval_secs, 2);
        assert_eq!(cfg.cache.ttl_days, 7);
        assert_eq!(cfg.cache.search_dirs, vec!["rgb", "pbr"]); // default
        assert_eq!(cfg.api.image_model, "doubao-seedream-4-0-250828");
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(cfg.cache.ttl_days, 30);
    }

    #[test]
    fn test_load_from_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ArkError::Config(_)));
    }

    #[test]
    fn test_env_overrides_apply() {
        let vars = env(&[
            ("ARK_API_KEY", "  sk-test  "),
            ("ARKMESH_API_BASE_URL", "http://localhost:8080/api/"),
            ("ARKMESH_POLL_INTERVAL_SECS", "1"),
            ("ARKMESH_CACHE_DIR", "/tmp/arkmesh-cache"),
            ("ARKMESH_CACHE_TTL_DAYS", "3"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_overrides_from(|k| vars.get(k).cloned());
        assert_eq!(cfg.api.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.api.base_url, "http://localhost:8080/api");
        assert_eq!(cfg.poll.interval_secs, 1);
        assert_eq!(cfg.cache.dir, Some(PathBuf::from("/tmp/arkmesh-cache")));
        assert_eq!(cfg.cache.ttl_days, 3);
    }

    #[test]
    fn test_env_override_invalid_number_ignored() {
        let vars = env(&[("ARKMESH_POLL_INTERVAL_SECS", "soon")]);
        let mut cfg = Config::default();
        cfg.apply_overrides_from(|k| vars.get(k).cloned());
        assert_eq!(cfg.poll.interval_secs, 5);
    }

    #[test]
    fn test_require_api_key_missing() {
        let cfg = Config::default();
        let err = cfg.require_api_key().unwrap_err();
        assert!(err.to_string().contains("ARK_API_KEY"));
    }

    #[test]
    fn test_require_api_key_blank_is_missing() {
        let mut cfg = Config::default();
        cfg.api.api_key = Some("   ".into());
        assert!(cfg.require_api_key().is_err());
    }

    #[test]
    fn test_api_config_debug_redacts_key() {
        let mut cfg = ApiConfig::default();
        cfg.api_key = Some("sk-secret".into());
        let out = format!("{:?}", cfg);
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("REDACTED"));
    }

    #[test]
    fn test_resolve_dir_prefers_configured() {
        let cfg = CacheConfig {
            dir: Some(PathBuf::from("/srv/cache")),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_dir(), PathBuf::from("/srv/cache"));
    }

    #[test]
    fn test_resolve_dir_default_ends_with_model_cache() {
        let cfg = CacheConfig::default();
        assert!(cfg.resolve_dir().ends_with("model-cache"));
    }
}
