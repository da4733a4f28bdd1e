//! A small persistent key-value store for sensitive configuration values.
//!
//! Values live in a single JSON file, grouped by domain and key.  The
//! file must be private to its owner (no group or other permission bits)
//! or it will not be opened.  Every mutation rewrites the whole file.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use configvault::ConfigVault;
//!
//! # fn main() -> configvault::Result<()> {
//! let mut vault = ConfigVault::open(Path::new("config-vault.json"))?;
//! vault.put_string("svc", "token", Some("abc123"))?;
//! assert_eq!(vault.get_string("svc", "token")?.as_deref(), Some("abc123"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod vault;

pub use errors::{ConfigVaultError, Result};
pub use vault::{ConfigVault, Domain, Item, Value, VaultOptions, WriteStrategy};
