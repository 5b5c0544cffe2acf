//! Encryption key material for the settings table.
//!
//! The key is resolved once at startup: from `HUC_ENCRYPTION_KEY` (base64) when set,
//! otherwise from the key file, which is generated on first run. A key file that does
//! not decode to 32 bytes is replaced, which makes previously stored settings unreadable.

use crate::errors::{Error, Result};
use aes_gcm::{
    Aes256Gcm,
    aead::{KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::Path;
use tracing::{info, warn};

/// Length of an AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// A 256-bit key for sealing settings values.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl EncryptionKey {
    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0_u8; KEY_LEN];
        bytes.copy_from_slice(key.as_slice());
        Self(bytes)
    }

    /// Decodes a base64 key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Crypto {
                message: format!("Key is not valid base64: {e}"),
            })?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| Error::Crypto {
            message: format!("Key must be {KEY_LEN} bytes, got {}", b.len()),
        })?;
        Ok(Self(bytes))
    }

    /// Base64 form as stored in the key file.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Resolves the key from the environment value if given, else from `key_file`.
pub fn resolve_key(env_value: Option<&str>, key_file: &Path) -> Result<EncryptionKey> {
    if let Some(encoded) = env_value {
        info!("Using encryption key from HUC_ENCRYPTION_KEY");
        return EncryptionKey::from_base64(encoded);
    }
    load_or_create_key_file(key_file)
}

/// Reads the key file, creating or replacing it when absent or invalid.
pub fn load_or_create_key_file(path: &Path) -> Result<EncryptionKey> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        match EncryptionKey::from_base64(&contents) {
            Ok(key) => return Ok(key),
            Err(e) => warn!(
                "Key file {} is invalid ({}); generating a new key. Saved settings can no longer be decrypted.",
                path.display(),
                e
            ),
        }
    } else {
        info!("No key file at {}, generating one", path.display());
    }

    let key = EncryptionKey::generate();
    write_key_file(path, &key)?;
    Ok(key)
}

fn write_key_file(path: &Path, key: &EncryptionKey) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, key.to_base64())?;
    restrict_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
const fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
