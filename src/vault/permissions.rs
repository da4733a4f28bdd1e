//! File mode checks for the vault's backing file.
//!
//! A vault must not be readable, writable or executable by group or
//! other.  The check itself is a pure function over the mode bits so it
//! can be tested without touching the filesystem.

use std::path::Path;

use crate::errors::{ConfigVaultError, Result};

/// Mode bits that must all be clear on a vault file.
pub const FORBIDDEN_MODE_BITS: u32 = 0o077;

/// Mode given to vault files (and temp files) this crate creates.
pub const VAULT_FILE_MODE: u32 = 0o600;

/// Returns `true` if `mode` grants nothing to group or other.
pub fn check_permissions(mode: u32) -> bool {
    mode & FORBIDDEN_MODE_BITS == 0
}

/// Stat `path` and fail with `Permission` if its mode is too permissive.
#[cfg(unix)]
pub fn ensure_private(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();
    if !check_permissions(mode) {
        return Err(ConfigVaultError::Permission {
            mode,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Non-Unix platforms have no group/other mode bits to inspect; only
/// existence is checked.
#[cfg(not(unix))]
pub fn ensure_private(path: &Path) -> Result<()> {
    std::fs::metadata(path)?;
    Ok(())
}
