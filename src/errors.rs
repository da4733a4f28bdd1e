use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in ConfigVault.
#[derive(Debug, Error)]
pub enum ConfigVaultError {
    // --- Open errors ---
    #[error("Wrong mode {mode:o} for vault '{}'", .path.display())]
    Permission { mode: u32, path: PathBuf },

    #[error("File '{}' is not valid JSON. Cause: {message}", .path.display())]
    Format { path: PathBuf, message: String },

    #[error("File '{}' is not a configuration vault: {message}", .path.display())]
    Shape { path: PathBuf, message: String },

    #[error("Vault already exists at {}", .0.display())]
    VaultAlreadyExists(PathBuf),

    // --- Lookup errors ---
    #[error("Domain '{domain}' does not exist in configuration vault '{}'", .path.display())]
    DomainNotFound { domain: String, path: PathBuf },

    #[error("Key '{key}' does not exist in domain '{domain}' in configuration vault '{}'", .path.display())]
    KeyNotFound {
        domain: String,
        key: String,
        path: PathBuf,
    },

    #[error("Value under key '{key}' in domain '{domain}' is {found}, expected {expected}")]
    TypeMismatch {
        domain: String,
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    // --- Mutation errors ---
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to write configuration vault '{}': {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for ConfigVault results.
pub type Result<T> = std::result::Result<T, ConfigVaultError>;
