//! The configuration vault: a domain -> key -> value store backed by a
//! single JSON file.
//!
//! `ConfigVault` loads the whole file on `open`, serves reads from
//! memory, and rewrites the whole file after every mutation.  Mutations
//! are all-or-nothing: if the write fails, the in-memory state is left as
//! it was before the call.
//!
//! There is no locking.  Two vaults opened on the same path do not see
//! each other's changes until `reload`, and the last writer wins.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zeroize::Zeroize;

use crate::errors::{ConfigVaultError, Result};

use super::format::{self, Document, WriteStrategy};
use super::permissions;
use super::value::{Domain, Mismatch, Value};

/// Options controlling how a vault writes itself back to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaultOptions {
    pub write_strategy: WriteStrategy,
    pub pretty: bool,
}

/// What `get_value` returns and `put_value` accepts: either a whole
/// domain or a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Domain(Domain),
    Value(Value),
}

impl From<Domain> for Item {
    fn from(domain: Domain) -> Self {
        Item::Domain(domain)
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Item::Value(value)
    }
}

macro_rules! item_from_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Item {
                fn from(value: $t) -> Self {
                    Item::Value(Value::from(value))
                }
            }
        )*
    };
}

item_from_scalar!(
    bool,
    i64,
    f64,
    String,
    &str,
    Option<bool>,
    Option<i64>,
    Option<f64>,
    Option<String>,
    Option<&str>,
);

/// The main vault handle.  Create one with `ConfigVault::create` or
/// `ConfigVault::open`, then use its getters and putters.
pub struct ConfigVault {
    /// Path to the JSON file on disk.
    path: PathBuf,

    /// In-memory copy of the whole document.
    data: Document,

    options: VaultOptions,
}

impl ConfigVault {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Open the vault stored at `path` with default options.
    ///
    /// Fails with `Permission` if the file grants any access to group or
    /// other, with `Format` if it is not valid JSON, and with `Shape` if
    /// the JSON does not fit the domain -> key -> scalar model.  A file
    /// containing `null` or `[]` opens as an empty vault.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, VaultOptions::default())
    }

    /// Open the vault stored at `path`.
    pub fn open_with(path: &Path, options: VaultOptions) -> Result<Self> {
        let data = Self::load(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            data,
            options,
        })
    }

    /// Create a new, empty vault file at `path` with mode `0o600`.
    pub fn create(path: &Path) -> Result<Self> {
        Self::create_with(path, VaultOptions::default())
    }

    /// Create a new, empty vault file at `path`.
    ///
    /// The file holds JSON `null` until the first mutation.
    pub fn create_with(path: &Path, options: VaultOptions) -> Result<Self> {
        if path.exists() {
            return Err(ConfigVaultError::VaultAlreadyExists(path.to_path_buf()));
        }

        format::create_private_file(path, b"null").map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                ConfigVaultError::VaultAlreadyExists(path.to_path_buf())
            } else {
                ConfigVaultError::Io(e)
            }
        })?;
        info!(path = %path.display(), "Configuration vault created");

        Ok(Self {
            path: path.to_path_buf(),
            data: Document::new(),
            options,
        })
    }

    /// Re-read the file from disk, discarding the in-memory copy.
    ///
    /// Runs the same permission and format checks as `open`.  On failure
    /// the current in-memory state is kept.
    pub fn reload(&mut self) -> Result<()> {
        let data = Self::load(&self.path)?;
        let mut old = std::mem::replace(&mut self.data, data);
        wipe(&mut old);
        Ok(())
    }

    fn load(path: &Path) -> Result<Document> {
        permissions::ensure_private(path)?;
        let data = format::read_document(path)?;
        debug!(path = %path.display(), domains = data.len(), "Configuration vault loaded");
        Ok(data)
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    /// Returns a boolean stored under a key in a domain.
    pub fn get_bool(&self, domain: &str, key: &str) -> Result<Option<bool>> {
        let value = self.lookup(domain, key)?;
        value
            .as_bool()
            .map_err(|m| Self::type_mismatch(domain, key, "bool", m))
    }

    /// Returns an integer stored under a key in a domain.
    pub fn get_int(&self, domain: &str, key: &str) -> Result<Option<i64>> {
        let value = self.lookup(domain, key)?;
        value
            .as_int()
            .map_err(|m| Self::type_mismatch(domain, key, "int", m))
    }

    /// Returns a float stored under a key in a domain.  Stored integers
    /// are widened.
    pub fn get_float(&self, domain: &str, key: &str) -> Result<Option<f64>> {
        let value = self.lookup(domain, key)?;
        value
            .as_float()
            .map_err(|m| Self::type_mismatch(domain, key, "float", m))
    }

    /// Returns a string stored under a key in a domain.  Other scalars are
    /// returned in their JSON text form.
    pub fn get_string(&self, domain: &str, key: &str) -> Result<Option<String>> {
        let value = self.lookup(domain, key)?;
        value
            .as_string()
            .map_err(|m| Self::type_mismatch(domain, key, "string", m))
    }

    /// Returns all key-value pairs of a domain, in ascending key order.
    pub fn get_domain(&self, domain: &str) -> Result<&Domain> {
        self.data
            .get(domain)
            .ok_or_else(|| ConfigVaultError::DomainNotFound {
                domain: domain.to_string(),
                path: self.path.clone(),
            })
    }

    /// Returns the value under `key`, or the whole domain when `key` is
    /// `None`.
    pub fn get_value(&self, domain: &str, key: Option<&str>) -> Result<Item> {
        match key {
            Some(key) => self.lookup(domain, key).cloned().map(Item::Value),
            None => self.get_domain(domain).cloned().map(Item::Domain),
        }
    }

    /// Domain first, then key, so callers can tell the two apart.
    fn lookup(&self, domain: &str, key: &str) -> Result<&Value> {
        self.get_domain(domain)?
            .get(key)
            .ok_or_else(|| ConfigVaultError::KeyNotFound {
                domain: domain.to_string(),
                key: key.to_string(),
                path: self.path.clone(),
            })
    }

    fn type_mismatch(
        domain: &str,
        key: &str,
        expected: &'static str,
        mismatch: Mismatch,
    ) -> ConfigVaultError {
        ConfigVaultError::TypeMismatch {
            domain: domain.to_string(),
            key: key.to_string(),
            expected,
            found: mismatch.found,
        }
    }

    // ------------------------------------------------------------------
    // Putters
    // ------------------------------------------------------------------

    /// Stores a boolean (or `null`) under a key in a domain.
    pub fn put_bool(&mut self, domain: &str, key: &str, value: Option<bool>) -> Result<()> {
        self.put_value(domain, Some(key), value)
    }

    /// Stores an integer (or `null`) under a key in a domain.
    pub fn put_int(&mut self, domain: &str, key: &str, value: Option<i64>) -> Result<()> {
        self.put_value(domain, Some(key), value)
    }

    /// Stores a float (or `null`) under a key in a domain.
    ///
    /// NaN and the infinities have no JSON form and are rejected.
    pub fn put_float(&mut self, domain: &str, key: &str, value: Option<f64>) -> Result<()> {
        self.put_value(domain, Some(key), value)
    }

    /// Stores a string (or `null`) under a key in a domain.
    pub fn put_string(&mut self, domain: &str, key: &str, value: Option<&str>) -> Result<()> {
        self.put_value(domain, Some(key), value)
    }

    /// Stores a value under a key in a domain, creating the domain if
    /// needed.  With `key == None`, `item` must be a domain and replaces
    /// the existing domain wholesale.
    pub fn put_value(
        &mut self,
        domain: &str,
        key: Option<&str>,
        item: impl Into<Item>,
    ) -> Result<()> {
        match (key, item.into()) {
            (Some(key), Item::Value(value)) => {
                Self::ensure_representable(domain, key, &value)?;
                debug!(domain, key, kind = value.type_name(), "Putting value");
                self.mutate(|data| {
                    data.entry(domain.to_string())
                        .or_default()
                        .insert(key.to_string(), value);
                })
            }
            (None, Item::Domain(replacement)) => {
                for (key, value) in &replacement {
                    Self::ensure_representable(domain, key, value)?;
                }
                debug!(domain, keys = replacement.len(), "Replacing domain");
                self.mutate(|data| {
                    data.insert(domain.to_string(), replacement);
                })
            }
            (Some(key), Item::Domain(_)) => Err(ConfigVaultError::InvalidArgument(format!(
                "cannot store a domain under key '{key}' in domain '{domain}'"
            ))),
            (None, Item::Value(value)) => Err(ConfigVaultError::InvalidArgument(format!(
                "domain '{domain}' can only be replaced by a mapping, got {}",
                value.type_name()
            ))),
        }
    }

    /// NaN and the infinities have no JSON form; written as-is they would
    /// read back as `null`.
    fn ensure_representable(domain: &str, key: &str, value: &Value) -> Result<()> {
        match value {
            Value::Float(x) if !x.is_finite() => Err(ConfigVaultError::InvalidArgument(format!(
                "cannot store non-finite float {x} under key '{key}' in domain '{domain}'"
            ))),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Removes a key from a domain.  The domain stays, even if empty.
    /// Removing a missing key (or a key of a missing domain) is a no-op;
    /// the file is rewritten either way.
    pub fn unset_key(&mut self, domain: &str, key: &str) -> Result<()> {
        debug!(domain, key, "Unsetting key");
        self.mutate(|data| {
            if let Some(mut old) = data.get_mut(domain).and_then(|d| d.remove(key)) {
                old.zeroize();
            }
        })
    }

    /// Removes a whole domain.  Removing a missing domain is a no-op; the
    /// file is rewritten either way.
    pub fn unset_domain(&mut self, domain: &str) -> Result<()> {
        debug!(domain, "Unsetting domain");
        self.mutate(|data| {
            if let Some(mut old) = data.remove(domain) {
                old.values_mut().for_each(Zeroize::zeroize);
            }
        })
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Apply `change` to a copy of the data, persist the copy, and only
    /// then make it the vault's state.
    fn mutate(&mut self, change: impl FnOnce(&mut Document)) -> Result<()> {
        let mut next = self.data.clone();
        change(&mut next);

        if let Err(e) = self.persist(&next) {
            wipe(&mut next);
            return Err(e);
        }

        let mut old = std::mem::replace(&mut self.data, next);
        wipe(&mut old);
        Ok(())
    }

    /// Serialize `data` and overwrite the backing file in full.
    fn persist(&self, data: &Document) -> Result<()> {
        let bytes = format::serialize_document(&self.path, data, self.options.pretty)?;
        format::write_document(&self.path, &bytes, self.options.write_strategy)?;
        debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            strategy = ?self.options.write_strategy,
            "Configuration vault persisted"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the path to the vault file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the options this vault writes with.
    pub fn options(&self) -> VaultOptions {
        self.options
    }

    /// Domain names in ascending order.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn contains_domain(&self, domain: &str) -> bool {
        self.data.contains_key(domain)
    }

    /// Returns `true` if `key` exists in `domain`, even when it holds `null`.
    pub fn contains_key(&self, domain: &str, key: &str) -> bool {
        self.data
            .get(domain)
            .is_some_and(|d| d.contains_key(key))
    }

    /// Returns `true` if the vault has no domains.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Values are secrets; only domain names are shown.
impl fmt::Debug for ConfigVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigVault")
            .field("path", &self.path)
            .field("domains", &self.data.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

impl Drop for ConfigVault {
    fn drop(&mut self) {
        wipe(&mut self.data);
    }
}

/// Zeroize every string value in a document.
fn wipe(data: &mut Document) {
    data.values_mut()
        .flat_map(|domain| domain.values_mut())
        .for_each(Zeroize::zeroize);
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_vault() -> (TempDir, ConfigVault) {
        let tmp = TempDir::new().unwrap();
        let vault = ConfigVault::create(&tmp.path().join("config-vault.json")).unwrap();
        (tmp, vault)
    }

    #[test]
    fn get_on_empty_vault_is_domain_not_found() {
        let (_tmp, vault) = new_vault();
        assert!(matches!(
            vault.get_string("svc", "token"),
            Err(ConfigVaultError::DomainNotFound { .. })
        ));
    }

    #[test]
    fn get_absent_key_is_key_not_found() {
        let (_tmp, mut vault) = new_vault();
        vault.put_string("svc", "token", Some("abc")).unwrap();

        match vault.get_string("svc", "other") {
            Err(ConfigVaultError::KeyNotFound { domain, key, .. }) => {
                assert_eq!(domain, "svc");
                assert_eq!(key, "other");
            }
            other => panic!("expected KeyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn typed_getter_reports_mismatch() {
        let (_tmp, mut vault) = new_vault();
        vault.put_string("svc", "port", Some("eighty")).unwrap();

        match vault.get_int("svc", "port") {
            Err(ConfigVaultError::TypeMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, "int");
                assert_eq!(found, "string");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn key_type_may_change_between_puts() {
        let (_tmp, mut vault) = new_vault();
        vault.put_string("svc", "k", Some("text")).unwrap();
        vault.put_int("svc", "k", Some(7)).unwrap();
        assert_eq!(vault.get_int("svc", "k").unwrap(), Some(7));
    }

    #[test]
    fn get_value_without_key_returns_domain() {
        let (_tmp, mut vault) = new_vault();
        vault.put_int("svc", "port", Some(80)).unwrap();

        let item = vault.get_value("svc", None).unwrap();
        let expected: Domain = [("port".to_string(), Value::Int(80))].into_iter().collect();
        assert_eq!(item, Item::Domain(expected));
        assert_eq!(
            vault.get_value("svc", Some("port")).unwrap(),
            Item::Value(Value::Int(80))
        );
    }

    #[test]
    fn put_value_rejects_domain_under_key() {
        let (_tmp, mut vault) = new_vault();
        let result = vault.put_value("svc", Some("k"), Domain::new());
        assert!(matches!(result, Err(ConfigVaultError::InvalidArgument(_))));
        assert!(vault.is_empty());
    }

    #[test]
    fn put_float_rejects_non_finite() {
        let (_tmp, mut vault) = new_vault();
        for x in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = vault.put_float("svc", "x", Some(x));
            assert!(matches!(result, Err(ConfigVaultError::InvalidArgument(_))));
        }
        assert!(!vault.contains_domain("svc"));

        let domain: Domain = [("x".to_string(), Value::Float(f64::NAN))].into_iter().collect();
        let result = vault.put_value("svc", None, domain);
        assert!(matches!(result, Err(ConfigVaultError::InvalidArgument(_))));
        assert!(vault.is_empty());
    }

    #[test]
    fn unset_key_keeps_empty_domain() {
        let (_tmp, mut vault) = new_vault();
        vault.put_bool("svc", "on", Some(true)).unwrap();
        vault.unset_key("svc", "on").unwrap();

        assert!(vault.contains_domain("svc"));
        assert!(vault.get_domain("svc").unwrap().is_empty());
    }

    #[test]
    fn unset_missing_is_noop() {
        let (_tmp, mut vault) = new_vault();
        vault.put_bool("svc", "on", Some(true)).unwrap();

        vault.unset_key("svc", "missing").unwrap();
        vault.unset_key("missing", "on").unwrap();
        vault.unset_domain("missing").unwrap();

        assert_eq!(vault.domains().collect::<Vec<_>>(), ["svc"]);
        assert!(!vault.contains_domain("missing"));
        assert_eq!(vault.get_bool("svc", "on").unwrap(), Some(true));
    }

    #[test]
    fn contains_key_counts_null_values() {
        let (_tmp, mut vault) = new_vault();
        vault.put_string("svc", "gone", None).unwrap();
        assert!(vault.contains_key("svc", "gone"));
        assert!(!vault.contains_key("svc", "other"));
        assert!(!vault.contains_key("nope", "gone"));
    }

    #[test]
    fn failed_persist_leaves_state_untouched() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sub");
        std::fs::create_dir(&dir).unwrap();
        let path = dir.join("vault.json");
        let mut vault = ConfigVault::create(&path).unwrap();
        vault.put_string("svc", "token", Some("abc")).unwrap();

        // Removing the directory makes every later write fail.
        std::fs::remove_dir_all(&dir).unwrap();

        let result = vault.put_string("svc", "token", Some("changed"));
        assert!(matches!(result, Err(ConfigVaultError::Persist { .. })));
        assert_eq!(
            vault.get_string("svc", "token").unwrap().as_deref(),
            Some("abc")
        );

        let result = vault.unset_domain("svc");
        assert!(matches!(result, Err(ConfigVaultError::Persist { .. })));
        assert!(vault.contains_domain("svc"));
    }

    #[test]
    fn debug_output_hides_values() {
        let (_tmp, mut vault) = new_vault();
        vault.put_string("svc", "token", Some("hunter2")).unwrap();

        let shown = format!("{vault:?}");
        assert!(shown.contains("svc"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn create_refuses_existing_file() {
        let (tmp, _vault) = new_vault();
        let result = ConfigVault::create(&tmp.path().join("config-vault.json"));
        assert!(matches!(
            result,
            Err(ConfigVaultError::VaultAlreadyExists(_))
        ));
    }
}
