//! Refresh cycle - fetch, merge by per-list `updated`, persist on change
//!
//! The fetch runs without touching the store. The merge and the persist then
//! run as one exclusive section on the store, so concurrent readers see either
//! the old document or the new one, never a mix.

use crate::infra::metrics::Metrics;
use crate::io::sources::ListSource;
use crate::services::list_store::ListStore;
use anyhow::Context;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info};

/// Result of one refresh cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Lists returned by the source
    pub fetched: usize,
    /// Lists that replaced (or were added to) the store
    pub lists_replaced: Vec<String>,
}

impl RefreshOutcome {
    /// True when the store was rewritten
    pub fn changed(&self) -> bool {
        !self.lists_replaced.is_empty()
    }
}

pub struct UpdateCoordinator {
    store: Arc<ListStore>,
    source: Arc<dyn ListSource>,
    metrics: Arc<Metrics>,
}

impl UpdateCoordinator {
    pub fn new(store: Arc<ListStore>, source: Arc<dyn ListSource>, metrics: Arc<Metrics>) -> Self {
        Self { store, source, metrics }
    }

    /// Run one refresh cycle.
    /// A fetch failure leaves the store untouched; nothing is written when no list is newer.
    pub async fn refresh(&self) -> anyhow::Result<RefreshOutcome> {
        let start = Instant::now();

        let fetched = match self.source.fetch().await {
            Ok(doc) => doc,
            Err(e) => {
                self.metrics.record_refresh_failure();
                return Err(e.context(format!("Fetch from {} failed", self.source.name())));
            }
        };
        let fetched_count = fetched.len();

        // Disk I/O under the store's write lock stays off the async workers
        let store = Arc::clone(&self.store);
        let applied = tokio::task::spawn_blocking(move || store.apply_update(fetched))
            .await
            .context("Store update task panicked")?;

        let lists_replaced = match applied {
            Ok(replaced) => replaced,
            Err(e) => {
                self.metrics.record_refresh_failure();
                return Err(anyhow::Error::new(e).context("Failed to apply refreshed lists"));
            }
        };

        self.metrics.record_refresh(lists_replaced.len());
        info!(
            source = %self.source.name(),
            fetched = %fetched_count,
            replaced = ?lists_replaced,
            elapsed_ms = %start.elapsed().as_millis(),
            "refresh_complete"
        );
        Ok(RefreshOutcome { fetched: fetched_count, lists_replaced })
    }

    /// Refresh on a fixed interval until shutdown. Failures are logged and retried next tick.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        info!(interval_secs = %interval.as_secs(), "refresh_scheduler_started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        error!(error = %format!("{e:#}"), "refresh_failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("refresh_scheduler_stopped");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{SanctionList, SanctionsDocument};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::tempdir;

    /// Source returning whatever document is staged, or an error when empty
    struct StagedSource {
        staged: Mutex<Option<SanctionsDocument>>,
    }

    impl StagedSource {
        fn new(doc: Option<SanctionsDocument>) -> Self {
            Self { staged: Mutex::new(doc) }
        }

        fn stage(&self, doc: Option<SanctionsDocument>) {
            *self.staged.lock() = doc;
        }
    }

    #[async_trait]
    impl ListSource for StagedSource {
        fn name(&self) -> &str {
            "staged"
        }

        async fn fetch(&self) -> anyhow::Result<SanctionsDocument> {
            self.staged.lock().clone().ok_or_else(|| anyhow::anyhow!("feed offline"))
        }
    }

    fn lists(entries: &[(&str, i64, &str)]) -> SanctionsDocument {
        entries
            .iter()
            .map(|(id, updated, name)| (id.to_string(), SanctionList::plain(*updated, [*name])))
            .collect()
    }

    #[tokio::test]
    async fn test_refresh_persists_only_on_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sanctions.json");
        let store = Arc::new(ListStore::new(&path));
        let source = Arc::new(StagedSource::new(Some(lists(&[("L1", 10, "Jon Snow")]))));
        let metrics = Arc::new(Metrics::new());
        let coordinator = UpdateCoordinator::new(store.clone(), source.clone(), metrics.clone());

        let first = coordinator.refresh().await.unwrap();
        assert!(first.changed());
        assert_eq!(first.lists_replaced, vec!["L1".to_string()]);
        let written = fs::metadata(&path).unwrap().modified().unwrap();

        let second = coordinator.refresh().await.unwrap();
        assert!(!second.changed());
        assert_eq!(second.fetched, 1);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), written);

        assert_eq!(metrics.refreshes_total(), 2);
    }

    #[tokio::test]
    async fn test_refresh_keeps_unaffected_lists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sanctions.json");
        let store = Arc::new(ListStore::new(&path));
        let source = Arc::new(StagedSource::new(Some(lists(&[
            ("L1", 10, "Jon Snow"),
            ("L2", 10, "Arya Stark"),
        ]))));
        let coordinator =
            UpdateCoordinator::new(store.clone(), source.clone(), Arc::new(Metrics::new()));
        coordinator.refresh().await.unwrap();

        // Next fetch only carries L2, and an older L1
        source.stage(Some(lists(&[("L2", 20, "Sansa Stark"), ("L1", 5, "Stale Name")])));
        let outcome = coordinator.refresh().await.unwrap();
        assert_eq!(outcome.lists_replaced, vec!["L2".to_string()]);

        let reopened = ListStore::new(&path);
        let doc = reopened.current_data().unwrap();
        assert_eq!(doc["L1"].updated, 10);
        assert_eq!(doc["L2"].updated, 20);
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sanctions.json");
        let store = Arc::new(ListStore::new(&path));
        let source = Arc::new(StagedSource::new(None));
        let metrics = Arc::new(Metrics::new());
        let coordinator = UpdateCoordinator::new(store, source, metrics.clone());

        let err = coordinator.refresh().await.unwrap_err();
        assert!(format!("{err:#}").contains("feed offline"));
        assert!(!path.exists());
        assert_eq!(metrics.refresh_failures_total(), 1);
        assert_eq!(metrics.refreshes_total(), 0);
    }

    #[tokio::test]
    async fn test_periodic_refresh_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sanctions.json");
        let store = Arc::new(ListStore::new(&path));
        let source = Arc::new(StagedSource::new(Some(lists(&[("L1", 1, "Jon Snow")]))));
        let coordinator = Arc::new(UpdateCoordinator::new(store, source, Arc::new(Metrics::new())));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator.run_periodic(Duration::from_millis(10), shutdown_rx).await;
            })
        };

        // First tick fires immediately
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists());

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
    }
}
