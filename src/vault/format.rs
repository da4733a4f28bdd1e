//! On-disk JSON document and how it gets written back.
//!
//! A vault file holds a single JSON value:
//!
//! ```text
//! null or []                            -> empty vault
//! {"<domain>": {"<key>": <scalar|null>, ...}, ...}
//! {"<domain>": [], ...}                 -> empty domain
//! ```
//!
//! Domains and keys are written in ascending order because the in-memory
//! representation is a pair of nested `BTreeMap`s.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::value::{Domain, Value};
use crate::errors::{ConfigVaultError, Result};

/// The whole dataset: domain name -> domain.
pub type Document = BTreeMap<String, Domain>;

/// How `persist` replaces the file on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStrategy {
    /// Truncate and rewrite the file in place.  A crash mid-write can
    /// leave a truncated file.
    #[default]
    Overwrite,

    /// Write a sibling temp file, then rename it over the vault.  The temp
    /// file gets the replaced file's mode (`0o600` for a new vault).
    /// Readers never observe a half-written file.  Concurrent writers
    /// still race: the last rename wins.  The rename needs write access to
    /// the directory, not the file, so a read-only vault is still replaced.
    Atomic,
}

/// Parse the raw file contents into a document.
///
/// `null` and `[]` are both an empty document, and `[]` as a domain is an
/// empty domain (that is how PHP's `json_encode` writes an empty array).
/// Malformed JSON is a `Format` error; well-formed JSON that does not fit
/// the domain -> key -> scalar shape is a `Shape` error.
pub fn parse_document(path: &Path, raw: &[u8]) -> Result<Document> {
    let json: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| ConfigVaultError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    document_from_json(json).map_err(|message| ConfigVaultError::Shape {
        path: path.to_path_buf(),
        message,
    })
}

fn document_from_json(json: serde_json::Value) -> std::result::Result<Document, String> {
    let domains = match json {
        serde_json::Value::Null => return Ok(Document::new()),
        serde_json::Value::Array(items) if items.is_empty() => return Ok(Document::new()),
        serde_json::Value::Object(domains) => domains,
        other => return Err(format!("top level is {}, expected an object", json_kind(&other))),
    };

    let mut document = Document::new();
    for (name, domain) in domains {
        let entries = match domain {
            serde_json::Value::Array(items) if items.is_empty() => Default::default(),
            serde_json::Value::Object(entries) => entries,
            other => {
                return Err(format!(
                    "domain '{name}' is {}, expected an object",
                    json_kind(&other)
                ))
            }
        };

        let mut values = Domain::new();
        for (key, json) in entries {
            let kind = json_kind(&json);
            let value = Value::from_json(json)
                .ok_or_else(|| format!("key '{key}' in domain '{name}' holds {kind}"))?;
            values.insert(key, value);
        }
        document.insert(name, values);
    }
    Ok(document)
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Read and parse the vault file.  The raw bytes are wiped afterwards.
pub fn read_document(path: &Path) -> Result<Document> {
    let raw = Zeroizing::new(fs::read(path)?);
    parse_document(path, &raw)
}

/// Serialize a document to JSON bytes.
pub fn serialize_document(
    path: &Path,
    document: &Document,
    pretty: bool,
) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(document)
    } else {
        serde_json::to_vec(document)
    };
    bytes
        .map(Zeroizing::new)
        .map_err(|e| ConfigVaultError::Persist {
            path: path.to_path_buf(),
            source: e.into(),
        })
}

/// Write `bytes` to `path` with the given strategy.
///
/// I/O failures are reported as `Persist` errors.
pub fn write_document(path: &Path, bytes: &[u8], strategy: WriteStrategy) -> Result<()> {
    let result = match strategy {
        WriteStrategy::Overwrite => fs::write(path, bytes),
        WriteStrategy::Atomic => write_atomic(path, bytes),
    };
    result.map_err(|source| ConfigVaultError::Persist {
        path: path.to_path_buf(),
        source,
    })
}

/// Create a new file at `path` containing `bytes`, with owner-only
/// permissions from the start.  Fails if the file already exists.
pub fn create_private_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = private_open_options().open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Temp file in the same directory so the rename stays on one
/// filesystem.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    // A stale temp file from an earlier crash would make create_new fail.
    match fs::remove_file(&tmp_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mode = existing_mode(path)?;
    if let Err(e) = create_private_file(&tmp_path, bytes).and_then(|()| match mode {
        Some(mode) => restore_mode(&tmp_path, mode),
        None => Ok(()),
    }) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, path)
}

/// Mode of the file about to be replaced, if there is one.
#[cfg(unix)]
fn existing_mode(path: &Path) -> std::io::Result<Option<u32>> {
    use std::os::unix::fs::PermissionsExt;

    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.permissions().mode() & 0o7777)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn existing_mode(_path: &Path) -> std::io::Result<Option<u32>> {
    Ok(None)
}

#[cfg(unix)]
fn restore_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restore_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn private_open_options() -> fs::OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = fs::OpenOptions::new();
    options
        .write(true)
        .create_new(true)
        .mode(super::permissions::VAULT_FILE_MODE);
    options
}

#[cfg(not(unix))]
fn private_open_options() -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    options
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn path() -> &'static Path {
        Path::new("vault.json")
    }

    #[test]
    fn null_is_empty_document() {
        let doc = parse_document(path(), b"null").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn empty_object_is_empty_document() {
        let doc = parse_document(path(), b"{}").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn parses_two_level_document() {
        let doc = parse_document(
            path(),
            br#"{"svc": {"port": 8080, "debug": false, "ratio": 0.5, "name": "x", "gone": null}}"#,
        )
        .unwrap();
        let svc = &doc["svc"];
        assert_eq!(svc["port"], Value::Int(8080));
        assert_eq!(svc["debug"], Value::Bool(false));
        assert_eq!(svc["ratio"], Value::Float(0.5));
        assert_eq!(svc["name"], Value::String("x".into()));
        assert_eq!(svc["gone"], Value::Absent);
    }

    #[test]
    fn malformed_json_is_format_error() {
        let err = parse_document(path(), b"[Ceci n'est pas une pipe.}").unwrap_err();
        match err {
            ConfigVaultError::Format { path: p, message } => {
                assert_eq!(p, path());
                assert!(!message.is_empty());
            }
            other => panic!("expected Format error, got {other:?}"),
        }
    }

    #[test]
    fn empty_array_is_empty_document() {
        let doc = parse_document(path(), b"[]").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn empty_array_domain_is_empty_domain() {
        let doc = parse_document(path(), br#"{"svc":[],"db":{"k":"v"}}"#).unwrap();
        assert!(doc["svc"].is_empty());
        assert_eq!(doc["db"]["k"], Value::String("v".into()));
    }

    #[test]
    fn wrong_shapes_are_shape_errors() {
        let cases: [(&[u8], &str); 5] = [
            (b"[1, 2, 3]", "top level is an array"),
            (br#"{"svc": "not a domain"}"#, "domain 'svc' is a string"),
            (br#"{"svc": [1]}"#, "domain 'svc' is an array"),
            (br#"{"svc": {"k": [1, 2], "t": "abc"}}"#, "key 'k' in domain 'svc' holds an array"),
            (b"42", "top level is a number"),
        ];
        for (raw, expected) in cases {
            match parse_document(path(), raw) {
                Err(ConfigVaultError::Shape { message, .. }) => {
                    assert!(message.contains(expected), "{message}")
                }
                other => panic!(
                    "expected Shape error for {}, got {other:?}",
                    String::from_utf8_lossy(raw)
                ),
            }
        }
    }

    #[test]
    fn serialize_compact_and_pretty() {
        let mut doc = Document::new();
        doc.entry("b".into())
            .or_default()
            .insert("k".into(), Value::Int(1));
        doc.entry("a".into()).or_default();

        let compact = serialize_document(path(), &doc, false).unwrap();
        assert_eq!(&compact[..], br#"{"a":{},"b":{"k":1}}"#);

        let pretty = serialize_document(path(), &doc, true).unwrap();
        let text = String::from_utf8(pretty.to_vec()).unwrap();
        assert!(text.contains('\n'));
        assert_eq!(parse_document(path(), text.as_bytes()).unwrap(), doc);
    }

    #[test]
    fn overwrite_replaces_whole_file() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("vault.json");
        fs::write(&target, "a much longer previous content").unwrap();

        write_document(&target, b"null", WriteStrategy::Overwrite).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"null");
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("vault.json");
        fs::write(&target, "null").unwrap();

        write_document(&target, b"{}", WriteStrategy::Atomic).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"{}");
        assert!(!tmp.path().join(".vault.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_produces_private_file() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("vault.json");
        write_document(&target, b"null", WriteStrategy::Atomic).unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("vault.json");
        create_private_file(&target, b"null").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o400)).unwrap();

        write_document(&target, br#"{"svc":{"k":1}}"#, WriteStrategy::Atomic).unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);
        assert_eq!(fs::read(&target).unwrap(), br#"{"svc":{"k":1}}"#);
    }

    #[test]
    fn write_into_missing_directory_is_persist_error() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("no-such-dir").join("vault.json");
        let result = write_document(&target, b"null", WriteStrategy::Overwrite);
        assert!(matches!(result, Err(ConfigVaultError::Persist { .. })));
    }

    #[test]
    fn create_private_file_refuses_existing_path() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("vault.json");
        create_private_file(&target, b"null").unwrap();
        assert!(create_private_file(&target, b"null").is_err());
    }
}
