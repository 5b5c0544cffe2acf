//! Application configuration loading from config.toml
//!
//! All settings are read once at startup into an [`AppConfig`] that is passed to
//! constructors explicitly. Values come from the TOML file (optional; every field has
//! a default) and are then overridden by environment variables, which may in turn come
//! from a `.env` file loaded by the binary.

use crate::core::calculator::RoundingPolicy;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the history file, next to the executable's working directory.
pub const DEFAULT_CSV_PATH: &str = "meter_calculation_history.csv";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// `SeaORM` connection string for the local database
    pub database_url: String,
    /// Page size for history and rental listings
    pub page_size: u64,
    /// CSV history file settings
    pub csv: CsvConfig,
    /// Room bill rounding
    pub rounding: RoundingPolicy,
    /// Remote table store settings (credentials live in the encrypted settings table)
    pub remote: RemoteConfig,
    /// Key material settings
    pub security: SecurityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/home_unit_calc.sqlite?mode=rwc".to_string(),
            page_size: 20,
            csv: CsvConfig::default(),
            rounding: RoundingPolicy::default(),
            remote: RemoteConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// How re-saving an existing month treats the history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CsvWriteMode {
    /// Rewrite the file so each month appears once
    #[default]
    Rewrite,
    /// Append a new block and leave older blocks in place
    Append,
}

/// CSV history file settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CsvConfig {
    /// Path of the history file
    pub path: PathBuf,
    /// Upsert or append-only behaviour
    pub mode: CsvWriteMode,
    /// Number of `Meter-N` / `Diff-N` columns written
    pub meter_slots: usize,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CSV_PATH),
            mode: CsvWriteMode::Rewrite,
            meter_slots: 10,
        }
    }
}

/// Remote table store settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    /// Storage bucket for tenant document images
    pub bucket: String,
    /// Folder inside the bucket
    pub folder: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            bucket: "rental-images".to_string(),
            folder: "rentals".to_string(),
        }
    }
}

/// Where the settings encryption key is kept
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Key file used when no key is supplied through the environment
    pub key_file: PathBuf,
    /// Base64 key from `HUC_ENCRYPTION_KEY`; never read from the TOML file
    #[serde(skip)]
    pub env_key: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            key_file: PathBuf::from("huc_encryption.key"),
            env_key: None,
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("key_file", &self.key_file)
            .field("env_key", &self.env_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    parse_config(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })
}

fn parse_config(contents: &str) -> std::result::Result<AppConfig, toml::de::Error> {
    toml::from_str(contents)
}

/// Applies environment overrides to a loaded configuration.
///
/// `lookup` is normally `std::env::var(..).ok()`; tests pass a map instead.
pub fn apply_env_overrides<F>(mut config: AppConfig, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("DATABASE_URL") {
        config.database_url = url;
    }
    if let Some(path) = lookup("HUC_CSV_PATH") {
        config.csv.path = PathBuf::from(path);
    }
    if let Some(size) = lookup("HUC_PAGE_SIZE") {
        config.page_size = size.parse().map_err(|_| Error::Config {
            message: format!("HUC_PAGE_SIZE must be a positive integer, got '{size}'"),
        })?;
    }
    if let Some(path) = lookup("HUC_KEY_FILE") {
        config.security.key_file = PathBuf::from(path);
    }
    if let Some(key) = lookup("HUC_ENCRYPTION_KEY") {
        config.security.env_key = Some(key);
    }
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.page_size == 0 {
        return Err(Error::Config {
            message: "page_size must be greater than zero".to_string(),
        });
    }
    if config.csv.meter_slots == 0 {
        return Err(Error::Config {
            message: "csv.meter_slots must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Loads the application configuration from `./config.toml` if present, then applies
/// environment overrides.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = Path::new("config.toml");
    let config = if path.exists() {
        info!("Loading configuration from {}", path.display());
        load_config(path)?
    } else {
        info!("No config.toml found, using defaults.");
        AppConfig::default()
    };
    apply_env_overrides(config, |key| std::env::var(key).ok())
}
