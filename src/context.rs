//! Application context built once at startup.
//!
//! Holds the configuration, the database connection and the settings store, and
//! hands out storage backends on demand. Nothing here is global; callers receive
//! the context explicitly.

use crate::{
    config::{
        AppConfig,
        database::init_database,
        secrets::{EncryptionKey, resolve_key},
    },
    core::{period::BillingPeriod, rollover, settings::SettingsStore},
    errors::{Error, Result},
    models::{HistoryFilter, PageRequest},
    storage::{
        Backend, CalculationStore,
        csv::CsvStore,
        history::HistoryLoader,
        local::{LocalRentalStore, LocalStore},
        remote::{RemoteClient, RemoteRentalStore, RemoteStore},
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{info, instrument};

/// Shared state for every user action.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Settings loaded at startup
    pub config: Arc<AppConfig>,
    /// Local database connection
    pub database: DatabaseConnection,
    /// Encrypted key/value settings
    pub settings: SettingsStore,
}

impl AppContext {
    /// Builds a context over an open database.
    pub fn new(
        config: AppConfig,
        database: DatabaseConnection,
        key: &EncryptionKey,
    ) -> Result<Self> {
        let settings = SettingsStore::new(database.clone(), key)?;
        Ok(Self {
            config: Arc::new(config),
            database,
            settings,
        })
    }

    /// Opens the database and resolves the settings key.
    ///
    /// The key comes from `security.env_key` when set; otherwise the configured key
    /// file is used (and created when missing).
    #[instrument(skip_all)]
    pub async fn bootstrap(config: AppConfig) -> Result<Self> {
        let database = init_database(&config.database_url).await?;
        let key = resolve_key(config.security.env_key.as_deref(), &config.security.key_file)?;
        info!("Encryption key resolved");
        Self::new(config, database, &key)
    }

    /// CSV history backend.
    #[must_use]
    pub fn csv_store(&self) -> CsvStore {
        CsvStore::new(self.config.csv.clone())
    }

    /// Local database backend.
    #[must_use]
    pub fn local_store(&self) -> LocalStore {
        LocalStore::new(self.database.clone())
    }

    /// Local tenant records.
    #[must_use]
    pub fn local_rentals(&self) -> LocalRentalStore {
        LocalRentalStore::new(self.database.clone())
    }

    /// REST client for the remote store; fails when credentials are not saved.
    pub async fn remote_client(&self) -> Result<RemoteClient> {
        let credentials = self
            .settings
            .remote_credentials()
            .await?
            .ok_or(Error::RemoteNotConfigured)?;
        Ok(RemoteClient::new(&credentials, self.config.remote.clone()))
    }

    /// Remote tenant records.
    pub async fn remote_rentals(&self) -> Result<RemoteRentalStore> {
        self.remote_client().await.map(RemoteRentalStore::new)
    }

    /// Calculation store for `backend`.
    pub async fn calculation_store(&self, backend: Backend) -> Result<Arc<dyn CalculationStore>> {
        Ok(match backend {
            Backend::Csv => Arc::new(self.csv_store()),
            Backend::Local => Arc::new(self.local_store()),
            Backend::Remote => Arc::new(RemoteStore::new(self.remote_client().await?)),
        })
    }

    /// Calculation stores for each selected backend, in the given order.
    pub async fn calculation_stores(
        &self,
        backends: &[Backend],
    ) -> Result<Vec<Arc<dyn CalculationStore>>> {
        let mut stores = Vec::with_capacity(backends.len());
        for backend in backends {
            stores.push(self.calculation_store(*backend).await?);
        }
        Ok(stores)
    }

    /// History loader over `backend` with the configured page size.
    pub async fn history(&self, backend: Backend) -> Result<HistoryLoader> {
        HistoryLoader::new(self.calculation_store(backend).await?, self.config.page_size)
    }

    /// Chronologically latest period stored in `backend`, if any.
    pub async fn latest_period(&self, backend: Backend) -> Result<Option<BillingPeriod>> {
        let store = self.calculation_store(backend).await?;
        let filter = HistoryFilter::default();
        let mut request = Some(PageRequest::first(self.config.page_size));
        let mut latest: Option<BillingPeriod> = None;
        while let Some(page_request) = request {
            let page = store.list(&filter, page_request).await?;
            latest = latest.max(rollover::latest_period(&page.items));
            request = page.next_request();
        }
        Ok(latest)
    }
}
