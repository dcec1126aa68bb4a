//! Configuration for the restore library
//!
//! The cache root and registry endpoint are explicit configuration values,
//! injected into every component at construction time. There is no hidden
//! default path baked into the cache or the orchestrator.

use crate::error::{ConfigError, Result, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a restore run.
///
/// # Example
///
/// ```rust,no_run
/// use fhir_restore::config::RestoreConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RestoreConfig::load()?;
/// println!("Registry URL: {}", config.registry.url);
/// println!("Cache root: {}", config.cache.cache_root.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RestoreConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub restore: RestoreOptions,
}

/// Registry connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

/// Local package cache settings.
///
/// `cache_root` is the directory holding one `{name}#{version}` folder per
/// installed package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub cache_root: PathBuf,
}

/// Tuning knobs for the restore walk itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Upper bound on concurrently processed dependency edges.
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            cache_root: home_dir.join(".fhir-restore").join("packages"),
        }
    }
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            parallel_workers: default_parallel_workers(),
        }
    }
}

impl RestoreConfig {
    /// Loads configuration from `fhir-restore.toml` in the current directory.
    ///
    /// Returns the default configuration when no file exists. Environment
    /// variable overrides are applied after loading.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a specific TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::InvalidFile {
            path: path.to_path_buf(),
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Writes the configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("fhir-restore.toml")
    }

    /// Environment overrides: `FHIR_RESTORE_REGISTRY_URL`, `FHIR_RESTORE_CACHE_ROOT`.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FHIR_RESTORE_REGISTRY_URL") {
            self.registry.url = url;
        }
        if let Ok(root) = std::env::var("FHIR_RESTORE_CACHE_ROOT") {
            self.cache.cache_root = PathBuf::from(root);
        }
    }

    /// Configuration rooted in a temporary directory, for tests.
    pub fn test_config(root: &Path) -> Self {
        Self {
            registry: RegistryConfig::default(),
            cache: CacheConfig {
                cache_root: root.join("packages"),
            },
            restore: RestoreOptions::default(),
        }
    }
}

impl Validate for RestoreConfig {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        self.registry.validate()?;
        self.cache.validate()?;
        if self.restore.parallel_workers == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "restore.parallel_workers must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Validate for RegistryConfig {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        url::Url::parse(&self.url).map_err(|_| ConfigError::InvalidRegistryUrl {
            url: self.url.clone(),
        })?;
        if self.timeout == 0 {
            return Err(ConfigError::ValidationFailed {
                message: "registry.timeout must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }
}

impl Validate for CacheConfig {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        if self.cache_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed {
                message: "cache.cache_root must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn default_registry_url() -> String {
    "https://packages.fhir.org/packages/".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_parallel_workers() -> usize {
    8
}
