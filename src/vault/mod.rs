//! Vault module — the JSON-file-backed configuration store.
//!
//! This module provides:
//! - The `Value` scalar type and its coercion rules (`value`)
//! - The file-mode precondition (`permissions`)
//! - The on-disk JSON document and write strategies (`format`)
//! - `ConfigVault`, the typed get/put/unset API (`store`)

pub mod format;
pub mod permissions;
pub mod store;
pub mod value;

// Re-export the most commonly used items.
pub use format::{Document, WriteStrategy};
pub use permissions::check_permissions;
pub use store::{ConfigVault, Item, VaultOptions};
pub use value::{Domain, Value};
