//! Error types for the FHIR package restore library

use thiserror::Error;

/// Main result type used throughout the restore library.
pub type Result<T> = std::result::Result<T, RestoreError>;

/// Main error type for the restore library.
///
/// Unifies all domain errors behind a single type with automatic conversions
/// from the underlying error sources.
///
/// # Example
///
/// ```rust
/// use fhir_restore::error::{CacheError, RestoreError};
///
/// let cache_error = CacheError::NotInstalled {
///     package: "hl7.fhir.r4.core#4.0.1".to_string(),
/// };
/// let error: RestoreError = cache_error.into();
/// ```
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Could not resolve all dependencies: {missing}")]
    RestoreIncomplete { missing: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {path}")]
    InvalidFile { path: std::path::PathBuf },

    #[error("Invalid registry URL: {url}")]
    InvalidRegistryUrl { url: String },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Errors raised while talking to a package registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Package not found: {name}@{version}")]
    PackageNotFound { name: String, version: String },

    #[error("Registry unavailable: {url}")]
    RegistryUnavailable { url: String },

    #[error("Invalid package metadata: {message}")]
    InvalidMetadata { message: String },

    #[error("Checksum mismatch for {name}@{version}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        version: String,
        expected: String,
        actual: String,
    },

    #[error("No published checksum for {name}@{version}; refusing unverified install")]
    ChecksumUnavailable { name: String, version: String },
}

/// Errors raised while unpacking or validating package archives.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Package extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("Package validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Missing package manifest")]
    MissingManifest,
}

/// Errors raised by the disk package cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Package not installed: {package}. Run restore first.")]
    NotInstalled { package: String },

    #[error(
        "File '{file}' not found in package {package}. \
         The package may not have been restored."
    )]
    FileNotFound { package: String, file: String },

    #[error("Cache initialization failed: {message}")]
    InitializationFailed { message: String },

    #[error("Invalid cache entry name: {folder}")]
    InvalidEntryName { folder: String },
}

/// Errors raised while building or reading a canonical index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index write failed: {message}")]
    WriteFailed { message: String },

    #[error("Index corrupted: {message}")]
    Corrupted { message: String },
}

/// Trait for validating configuration and data structures.
pub trait Validate {
    type Error;
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}
