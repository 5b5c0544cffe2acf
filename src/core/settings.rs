//! Encrypted settings stored in the `app_config` table.
//!
//! Each value is sealed with AES-256-GCM under the key resolved at startup. The
//! stored blob is `nonce (12 bytes) || ciphertext`. Remote store credentials live
//! here under [`SUPABASE_URL`] and [`SUPABASE_KEY`].

use crate::{
    config::secrets::EncryptionKey,
    entities::{AppConfig, app_config},
    errors::{Error, Result},
};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, Set, sea_query::OnConflict};
use tracing::{debug, instrument, warn};

/// Settings key for the remote store base URL
pub const SUPABASE_URL: &str = "SUPABASE_URL";
/// Settings key for the remote store API key
pub const SUPABASE_KEY: &str = "SUPABASE_KEY";

const NONCE_LEN: usize = 12;

/// Base URL and API key of the remote table store.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    /// Base URL, e.g. `https://project.supabase.co`
    pub url: String,
    /// API key sent as `apikey` and bearer token
    pub api_key: String,
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("url", &self.url)
            .field("api_key", &"..")
            .finish()
    }
}

/// Seals and opens values with one key.
#[derive(Clone)]
pub struct SettingsCipher {
    cipher: Aes256Gcm,
}

impl SettingsCipher {
    /// Builds a cipher for `key`.
    pub fn new(key: &EncryptionKey) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| Error::Crypto {
            message: e.to_string(),
        })?;
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &str) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::Crypto {
                message: "Failed to encrypt value".to_string(),
            })?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypts a blob produced by [`Self::seal`].
    pub fn open(&self, blob: &[u8]) -> Result<String> {
        if blob.len() < NONCE_LEN {
            return Err(Error::Crypto {
                message: "Stored value is too short".to_string(),
            });
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Crypto {
                message: "Failed to decrypt value; the key may have changed".to_string(),
            })?;
        String::from_utf8(plaintext).map_err(|e| Error::Crypto {
            message: e.to_string(),
        })
    }
}

/// Key/value settings sealed at rest.
#[derive(Clone)]
pub struct SettingsStore {
    db: DatabaseConnection,
    cipher: SettingsCipher,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// Creates a store over `db` using `key`.
    pub fn new(db: DatabaseConnection, key: &EncryptionKey) -> Result<Self> {
        Ok(Self {
            db,
            cipher: SettingsCipher::new(key)?,
        })
    }

    /// Encrypts and upserts a value. Empty values are rejected.
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        if key.trim().is_empty() {
            return Err(Error::invalid_input("Setting key cannot be empty"));
        }
        if value.is_empty() {
            return Err(Error::invalid_input(format!("{key} cannot be empty")));
        }

        let row = app_config::ActiveModel {
            key: Set(key.to_string()),
            value: Set(self.cipher.seal(value)?),
            updated_at: Set(Utc::now()),
        };
        AppConfig::insert(row)
            .on_conflict(
                OnConflict::column(app_config::Column::Key)
                    .update_columns([app_config::Column::Value, app_config::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        debug!("Stored setting {}", key);
        Ok(())
    }

    /// Reads and decrypts a value; `None` when the key is absent.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(row) = AppConfig::find_by_id(key.to_string()).one(&self.db).await? else {
            return Ok(None);
        };
        self.cipher.open(&row.value).map(Some)
    }

    /// Removes a value. Absent keys are ignored.
    pub async fn remove(&self, key: &str) -> Result<()> {
        AppConfig::delete_by_id(key.to_string())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Stores both remote credentials.
    pub async fn save_remote_credentials(&self, url: &str, api_key: &str) -> Result<()> {
        let url = url.trim().trim_end_matches('/');
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::invalid_input(format!(
                "Remote URL must start with http:// or https://: '{url}'"
            )));
        }
        self.set(SUPABASE_URL, url).await?;
        self.set(SUPABASE_KEY, api_key).await
    }

    /// Remote credentials, or `None` when either is missing or unreadable.
    pub async fn remote_credentials(&self) -> Result<Option<RemoteCredentials>> {
        let url = self.get_or_warn(SUPABASE_URL).await?;
        let api_key = self.get_or_warn(SUPABASE_KEY).await?;
        Ok(url
            .zip(api_key)
            .map(|(url, api_key)| RemoteCredentials { url, api_key }))
    }

    async fn get_or_warn(&self, key: &str) -> Result<Option<String>> {
        match self.get(key).await {
            Ok(value) => Ok(value),
            Err(Error::Crypto { message }) => {
                warn!("Setting {} cannot be decrypted: {}", key, message);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
