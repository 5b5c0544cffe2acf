//! Filtered, paginated history reads over any [`CalculationStore`].

use crate::{
    errors::{Error, Result},
    models::{HistoryFilter, MainCalculationRecord, Page, PageRequest},
    storage::CalculationStore,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Loads history pages of a fixed size, most recent first.
#[derive(Clone)]
pub struct HistoryLoader {
    store: Arc<dyn CalculationStore>,
    page_size: u64,
}

impl std::fmt::Debug for HistoryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLoader")
            .field("backend", &self.store.backend())
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// A page of history together with the filter that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    /// Filter applied to every page of this listing
    pub filter: HistoryFilter,
    /// The records on this page
    pub page: Page<MainCalculationRecord>,
}

impl HistoryLoader {
    /// Creates a loader; `page_size` must be positive.
    pub fn new(store: Arc<dyn CalculationStore>, page_size: u64) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::invalid_input("Page size must be greater than zero"));
        }
        Ok(Self { store, page_size })
    }

    /// Page size used for every request.
    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    /// First page of records matching `filter`.
    #[instrument(skip(self), fields(backend = %self.store.backend()))]
    pub async fn list(&self, filter: HistoryFilter) -> Result<HistoryPage> {
        self.fetch(filter, PageRequest::first(self.page_size)).await
    }

    /// The page after `current`, or `None` when it was the last one.
    pub async fn next_page(&self, current: &HistoryPage) -> Result<Option<HistoryPage>> {
        match current.page.next_request() {
            Some(request) => self.fetch(current.filter, request).await.map(Some),
            None => Ok(None),
        }
    }

    async fn fetch(&self, filter: HistoryFilter, request: PageRequest) -> Result<HistoryPage> {
        let page = self.store.list(&filter, request).await?;
        debug!(
            "Loaded {} record(s) at offset {} (more: {})",
            page.items.len(),
            request.offset,
            page.has_more
        );
        Ok(HistoryPage { filter, page })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::period::Month,
        storage::local::LocalStore,
        test_utils::{sample_record, setup_test_db},
    };

    async fn loader_with(records: &[(Month, i32)], page_size: u64) -> Result<HistoryLoader> {
        let db = setup_test_db().await?;
        let store = LocalStore::new(db);
        for (month, year) in records {
            store.save(&sample_record(*month, *year)).await?;
        }
        HistoryLoader::new(Arc::new(store), page_size)
    }

    fn labels(page: &HistoryPage) -> Vec<String> {
        page.page
            .items
            .iter()
            .map(|r| r.period.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_zero_page_size_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let result = HistoryLoader::new(Arc::new(LocalStore::new(db)), 0);
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_filters() -> Result<()> {
        let loader = loader_with(
            &[
                (Month::May, 2024),
                (Month::June, 2024),
                (Month::June, 2025),
                (Month::July, 2025),
            ],
            20,
        )
        .await?;

        let all = loader.list(HistoryFilter::default()).await?;
        assert_eq!(all.page.items.len(), 4);
        assert_eq!(labels(&all)[0], "July 2025");

        let june = loader
            .list(HistoryFilter {
                month: Some(Month::June),
                year: None,
            })
            .await?;
        assert_eq!(labels(&june), vec!["June 2025", "June 2024"]);

        let year = loader
            .list(HistoryFilter {
                month: None,
                year: Some(2024),
            })
            .await?;
        assert_eq!(labels(&year), vec!["June 2024", "May 2024"]);

        let both = loader
            .list(HistoryFilter {
                month: Some(Month::May),
                year: Some(2025),
            })
            .await?;
        assert!(both.page.items.is_empty());
        assert!(!both.page.has_more);
        Ok(())
    }

    #[tokio::test]
    async fn test_pagination() -> Result<()> {
        let loader = loader_with(
            &[
                (Month::January, 2025),
                (Month::February, 2025),
                (Month::March, 2025),
                (Month::April, 2025),
                (Month::May, 2025),
            ],
            2,
        )
        .await?;

        let first = loader.list(HistoryFilter::default()).await?;
        assert_eq!(labels(&first), vec!["May 2025", "April 2025"]);
        assert!(first.page.has_more);

        let second = loader.next_page(&first).await?.unwrap();
        assert_eq!(labels(&second), vec!["March 2025", "February 2025"]);
        assert!(second.page.has_more);

        let third = loader.next_page(&second).await?.unwrap();
        assert_eq!(labels(&third), vec!["January 2025"]);
        assert!(!third.page.has_more);
        assert!(loader.next_page(&third).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_exact_page_boundary_has_no_more() -> Result<()> {
        let loader = loader_with(&[(Month::January, 2025), (Month::February, 2025)], 2).await?;
        let first = loader.list(HistoryFilter::default()).await?;
        assert_eq!(first.page.items.len(), 2);
        assert!(!first.page.has_more);
        Ok(())
    }
}
