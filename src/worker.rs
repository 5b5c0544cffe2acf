//! Single-flight background fetch of tenant records.
//!
//! At most one fetch runs at a time. A request made while one is outstanding is
//! rejected with [`Error::Busy`] rather than queued. The busy flag is cleared when
//! the task finishes, fails or is aborted, before the outcome is delivered.

use crate::{
    errors::{Error, Result},
    models::{PageRequest, RentalRecord},
    storage::{ArchiveFilter, RentalStore},
};
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, warn};

/// Outcome of one background fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// Records fetched successfully
    Fetched(Vec<RentalRecord>),
    /// The fetch failed; the message is ready to show
    Failed(String),
}

/// Clears the busy flag when dropped.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs fetches on the tokio runtime and reports them over a channel.
#[derive(Debug, Clone)]
pub struct FetchWorker {
    busy: Arc<AtomicBool>,
    events: mpsc::Sender<FetchEvent>,
}

impl FetchWorker {
    /// Creates a worker and the receiver its events arrive on.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FetchEvent>) {
        let (events, rx) = mpsc::channel(capacity.max(1));
        let worker = Self {
            busy: Arc::new(AtomicBool::new(false)),
            events,
        };
        (worker, rx)
    }

    /// Whether a fetch is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Starts `job` in the background unless a fetch is already running.
    pub fn spawn<F>(&self, job: F) -> Result<JoinHandle<()>>
    where
        F: Future<Output = Result<Vec<RentalRecord>>> + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Fetch requested while another is in progress");
            return Err(Error::Busy);
        }

        let guard = BusyGuard(Arc::clone(&self.busy));
        let events = self.events.clone();
        Ok(tokio::spawn(async move {
            let event = match job.await {
                Ok(records) => {
                    debug!("Fetched {} record(s)", records.len());
                    FetchEvent::Fetched(records)
                }
                Err(e) => {
                    error!("Background fetch failed: {}", e);
                    FetchEvent::Failed(e.to_string())
                }
            };
            drop(guard);
            if events.send(event).await.is_err() {
                debug!("Fetch result dropped; receiver is gone");
            }
        }))
    }

    /// Fetches one page of tenant records from `store` in the background.
    pub fn fetch_rentals(
        &self,
        store: Arc<dyn RentalStore>,
        filter: ArchiveFilter,
        page: PageRequest,
    ) -> Result<JoinHandle<()>> {
        self.spawn(async move { store.list(filter, page).await.map(|p| p.items) })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        storage::local::LocalRentalStore,
        test_utils::{sample_draft, setup_test_db},
    };
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_second_fetch_rejected_while_busy() -> Result<()> {
        let (worker, mut rx) = FetchWorker::new(4);
        let (release, wait) = oneshot::channel::<()>();

        worker.spawn(async move {
            let _ = wait.await;
            Ok(Vec::new())
        })?;
        assert!(worker.is_busy());
        assert!(matches!(
            worker.spawn(async { Ok(Vec::new()) }),
            Err(Error::Busy)
        ));

        release.send(()).unwrap();
        assert_eq!(rx.recv().await, Some(FetchEvent::Fetched(Vec::new())));
        assert!(!worker.is_busy());

        worker.spawn(async { Ok(Vec::new()) })?;
        assert_eq!(rx.recv().await, Some(FetchEvent::Fetched(Vec::new())));
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_clears_busy_flag() -> Result<()> {
        let (worker, mut rx) = FetchWorker::new(1);
        worker.spawn(async { Err(Error::RemoteNotConfigured) })?;

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            FetchEvent::Failed(Error::RemoteNotConfigured.to_string())
        );
        assert!(!worker.is_busy());
        Ok(())
    }

    #[tokio::test]
    async fn test_abort_clears_busy_flag() -> Result<()> {
        let (worker, _rx) = FetchWorker::new(1);
        let handle = worker.spawn(std::future::pending())?;
        assert!(worker.is_busy());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(!worker.is_busy());
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_rentals() -> Result<()> {
        let store = LocalRentalStore::new(setup_test_db().await?);
        store.create(sample_draft("Karim", "2B")).await?;

        let (worker, mut rx) = FetchWorker::new(1);
        worker.fetch_rentals(
            Arc::new(store),
            ArchiveFilter::Active,
            PageRequest::first(20),
        )?;

        match rx.recv().await.unwrap() {
            FetchEvent::Fetched(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].tenant_name, "Karim");
            }
            FetchEvent::Failed(message) => panic!("fetch failed: {message}"),
        }
        Ok(())
    }
}
