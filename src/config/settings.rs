use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigVaultError, Result};
use crate::vault::{VaultOptions, WriteStrategy};

/// Project-level configuration, loaded from `.configvault.toml`.
///
/// Every field has a sensible default so a vault can be opened without
/// any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Vault file (relative to the project root).
    #[serde(default = "default_vault_file")]
    pub vault_file: String,

    /// How mutations are written back: "overwrite" or "atomic".
    #[serde(default)]
    pub write_strategy: WriteStrategy,

    /// Pretty-print the JSON document.
    #[serde(default)]
    pub pretty: bool,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_file() -> String {
    "config-vault.json".to_string()
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_file: default_vault_file(),
            write_strategy: WriteStrategy::default(),
            pretty: false,
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = ".configvault.toml";

    /// Load settings from `<project_dir>/.configvault.toml`.
    ///
    /// If the file does not exist, defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            ConfigVaultError::ConfigError(format!(
                "Failed to parse {}: {e}",
                config_path.display()
            ))
        })?;

        Ok(settings)
    }

    /// Build the full path to the vault file.
    ///
    /// Example: `project_dir/config-vault.json`
    pub fn vault_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.vault_file)
    }

    /// Convert into the options `ConfigVault::open_with` takes.
    pub fn vault_options(&self) -> VaultOptions {
        VaultOptions {
            write_strategy: self.write_strategy,
            pretty: self.pretty,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
