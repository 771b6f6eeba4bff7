//! Refresh cycle for one open manifest
//!
//! `Idle -> Scanning -> Fetching{batch, total} -> Settled`. At most one cycle
//! runs per session; overlapping requests are dropped, not queued. Batches run
//! strictly in order and the view is updated once per settled batch.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::parser::traits::{ParseError, Parser};
use crate::parser::types::{DependencySection, RegistryType};
use crate::update::view::{DocumentView, RefreshSummary};
use crate::version::client::RegistryClient;
use crate::version::store::KeyValueStore;

/// Progress sink for a refresh cycle
#[async_trait::async_trait]
pub trait RefreshObserver: Send + Sync {
    /// Called after every batch with the merged view
    async fn on_batch_complete(&self, batch: usize, total: usize, view: &DocumentView);

    /// Called once when the cycle settles
    async fn on_settled(&self, summary: &RefreshSummary, view: &DocumentView);

    async fn on_parse_error(&self, error: &ParseError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Scanning,
    Fetching { batch: usize, total: usize },
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh was in flight
    Skipped,
    Cancelled,
    Failed(ParseError),
    Settled(RefreshSummary),
}

/// Releases the in-flight flag however the cycle ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Refresh state and view model of one open document
pub struct DocumentSession {
    registry_type: RegistryType,
    in_flight: AtomicBool,
    cancelled: AtomicBool,
    state: Mutex<RefreshState>,
    view: RwLock<DocumentView>,
}

impl DocumentSession {
    pub fn new(registry_type: RegistryType) -> Self {
        Self {
            registry_type,
            in_flight: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            state: Mutex::new(RefreshState::Idle),
            view: RwLock::new(DocumentView::empty(registry_type)),
        }
    }

    pub fn registry_type(&self) -> RegistryType {
        self.registry_type
    }

    pub fn state(&self) -> RefreshState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Snapshot of the current view
    pub fn view(&self) -> DocumentView {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the running cycle before its next batch
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Reclassify an entry after the user applied an update to it
    pub fn mark_updated(&self, name: &str, section: DependencySection, constraint: &str) -> bool {
        self.view
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .mark_updated(name, section, constraint)
    }

    fn set_state(&self, state: RefreshState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn replace_view(&self, view: DocumentView) {
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = view;
    }

    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }

    /// Run one refresh cycle over `content`
    pub async fn refresh<S: KeyValueStore>(
        &self,
        content: &str,
        parser: &dyn Parser,
        client: &RegistryClient<S>,
        observer: &dyn RefreshObserver,
        batch_size: usize,
    ) -> RefreshOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!("Refresh already in flight; dropping request");
            return RefreshOutcome::Skipped;
        };

        self.set_state(RefreshState::Scanning);

        let packages = match parser.parse(content) {
            Ok(packages) => packages,
            Err(e) => {
                warn!("Failed to parse manifest: {}", e);
                self.replace_view(DocumentView::empty(self.registry_type));
                self.set_state(RefreshState::Idle);
                observer.on_parse_error(&e).await;
                return RefreshOutcome::Failed(e);
            }
        };

        let mut view = DocumentView::new(self.registry_type, packages);

        // Cached metadata is shown right away; stale entries are refetched below
        let mut seen = HashSet::new();
        let mut needs_fetch = Vec::new();
        let names: Vec<String> = view
            .dependencies()
            .iter()
            .filter(|d| !d.package.is_url)
            .map(|d| d.package.name.clone())
            .collect();
        for name in names {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(cached) = client.get_cached(&name)
                && cached.latest_version.is_some()
            {
                view.apply_metadata(&name, &cached);
            }
            if client.needs_fetch(&name) {
                needs_fetch.push(name);
            }
        }

        self.replace_view(view);

        let batch_size = batch_size.max(1);
        let total = needs_fetch.len().div_ceil(batch_size);
        debug!(
            "{} packages need fetching in {} batches",
            needs_fetch.len(),
            total
        );

        for (index, batch) in needs_fetch.chunks(batch_size).enumerate() {
            if self.is_cancelled() {
                info!("Refresh cancelled before batch {}/{}", index + 1, total);
                self.set_state(RefreshState::Idle);
                return RefreshOutcome::Cancelled;
            }

            self.set_state(RefreshState::Fetching {
                batch: index + 1,
                total,
            });

            let results = join_all(batch.iter().map(|name| async move {
                (name, client.fetch_latest(name).await)
            }))
            .await;

            if self.is_cancelled() {
                info!("Refresh cancelled during batch {}/{}", index + 1, total);
                self.set_state(RefreshState::Idle);
                return RefreshOutcome::Cancelled;
            }

            let snapshot = {
                let mut view = self.view.write().unwrap_or_else(PoisonError::into_inner);
                for (name, metadata) in &results {
                    if let Some(metadata) = metadata {
                        view.apply_metadata(name, metadata);
                    }
                }
                view.clone()
            };

            let failed = results.iter().filter(|(_, m)| m.is_none()).count();
            if failed > 0 {
                error!(
                    "{} of {} fetches failed in batch {}/{}",
                    failed,
                    batch.len(),
                    index + 1,
                    total
                );
            }

            observer.on_batch_complete(index + 1, total, &snapshot).await;
        }

        self.set_state(RefreshState::Settled);
        let snapshot = self.view();
        let summary = snapshot.summary();
        info!("Refresh settled: {}", summary);
        observer.on_settled(&summary, &snapshot).await;

        RefreshOutcome::Settled(summary)
    }
}

/// Refetch every stale cached package of one environment
///
/// Uses the same batch pacing as document refreshes. Returns the number of
/// packages that were refreshed successfully.
pub async fn refresh_stale_packages<S: KeyValueStore>(
    client: &RegistryClient<S>,
    batch_size: usize,
) -> usize {
    let registry_type = client.registry_type();
    let stale = client
        .cache()
        .stale_packages(registry_type)
        .inspect_err(|e| {
            error!(
                "Failed to list stale packages for {}: {}",
                registry_type.as_str(),
                e
            )
        })
        .unwrap_or_default();

    if stale.is_empty() {
        debug!("No stale packages for {}", registry_type.as_str());
        return 0;
    }

    info!(
        "Refreshing {} stale packages for {}",
        stale.len(),
        registry_type.as_str()
    );

    let mut refreshed = 0;
    for batch in stale.chunks(batch_size.max(1)) {
        let results = join_all(batch.iter().map(|name| client.fetch_latest(name))).await;
        refreshed += results.iter().filter(|r| r.is_some()).count();
    }
    refreshed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REFRESH_INTERVAL_MS;
    use crate::parser::package_json::PackageJsonParser;
    use crate::parser::traits::MockParser;
    use crate::version::cache::MetadataCache;
    use crate::version::classifier::UpdateClassification;
    use crate::version::error::RegistryError;
    use crate::version::registry::{MockRegistry, Registry};
    use crate::version::store::SqliteStore;
    use crate::version::types::{PackageMetadata, VersionMetadata, now_ms};
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingObserver {
        batches: Mutex<Vec<(usize, usize, usize)>>,
        settled: Mutex<Vec<RefreshSummary>>,
        parse_errors: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RefreshObserver for RecordingObserver {
        async fn on_batch_complete(&self, batch: usize, total: usize, view: &DocumentView) {
            let classified = view
                .dependencies()
                .iter()
                .filter(|d| d.classification.is_some())
                .count();
            self.batches.lock().unwrap().push((batch, total, classified));
        }

        async fn on_settled(&self, summary: &RefreshSummary, _view: &DocumentView) {
            self.settled.lock().unwrap().push(summary.clone());
        }

        async fn on_parse_error(&self, _error: &ParseError) {
            self.parse_errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Registry that tracks how many fetches run at the same time
    #[derive(Default)]
    struct ConcurrencyTrackingRegistry {
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Registry for ConcurrencyTrackingRegistry {
        fn registry_type(&self) -> RegistryType {
            RegistryType::Npm
        }

        async fn fetch_latest(&self, _package_name: &str) -> Result<PackageMetadata, RegistryError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(PackageMetadata {
                version: "2.0.0".to_string(),
                description: None,
                author_name: None,
            })
        }
    }

    /// Registry whose every fetch takes 100ms
    #[derive(Default)]
    struct SlowRegistry {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Registry for SlowRegistry {
        fn registry_type(&self) -> RegistryType {
            RegistryType::Npm
        }

        async fn fetch_latest(&self, _package_name: &str) -> Result<PackageMetadata, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(PackageMetadata {
                version: "1.0.1".to_string(),
                description: None,
                author_name: None,
            })
        }
    }

    fn create_cache() -> Arc<MetadataCache<SqliteStore>> {
        Arc::new(MetadataCache::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            DEFAULT_REFRESH_INTERVAL_MS,
        ))
    }

    fn package_json(count: usize) -> String {
        let entries: Vec<String> = (0..count)
            .map(|i| format!(r#"    "pkg-{i}": "^1.0.0""#))
            .collect();
        format!("{{\n  \"dependencies\": {{\n{}\n  }}\n}}", entries.join(",\n"))
    }

    fn npm_registry() -> MockRegistry {
        let mut registry = MockRegistry::new();
        registry
            .expect_registry_type()
            .returning(|| RegistryType::Npm);
        registry
    }

    #[tokio::test]
    async fn refresh_runs_sequential_batches_with_incremental_events() {
        let registry = Arc::new(ConcurrencyTrackingRegistry::default());
        let client = RegistryClient::new(registry.clone(), create_cache());
        let session = DocumentSession::new(RegistryType::Npm);
        let observer = RecordingObserver::default();

        let outcome = session
            .refresh(
                &package_json(45),
                &PackageJsonParser::new(),
                &client,
                &observer,
                20,
            )
            .await;

        let RefreshOutcome::Settled(summary) = outcome else {
            panic!("expected settled outcome, got {outcome:?}");
        };
        assert_eq!(summary.total, 45);
        assert_eq!(summary.count(UpdateClassification::OutOfRange), 45);

        // Each batch is fully merged before the next one starts
        assert_eq!(
            *observer.batches.lock().unwrap(),
            vec![(1, 3, 20), (2, 3, 40), (3, 3, 45)]
        );
        assert_eq!(observer.settled.lock().unwrap().len(), 1);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 45);
        assert_eq!(registry.max_active.load(Ordering::SeqCst), 20);
        assert_eq!(session.state(), RefreshState::Settled);
        assert!(!session.is_refreshing());
    }

    #[tokio::test]
    async fn refresh_uses_fresh_cache_without_fetching() {
        let mut registry = npm_registry();
        registry.expect_fetch_latest().times(0);

        let cache = create_cache();
        cache
            .put_cached(
                RegistryType::Npm,
                "pkg-0",
                VersionMetadata {
                    latest_version: Some("1.0.3".to_string()),
                    description: None,
                    author_name: None,
                    fetched_at: now_ms(),
                },
            )
            .unwrap();
        let client = RegistryClient::new(Arc::new(registry), cache);
        let session = DocumentSession::new(RegistryType::Npm);
        let observer = RecordingObserver::default();

        let outcome = session
            .refresh(
                &package_json(1),
                &PackageJsonParser::new(),
                &client,
                &observer,
                20,
            )
            .await;

        let RefreshOutcome::Settled(summary) = outcome else {
            panic!("expected settled outcome");
        };
        assert_eq!(summary.count(UpdateClassification::Patch), 1);
        assert!(observer.batches.lock().unwrap().is_empty());
        assert_eq!(observer.settled.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refresh_fetches_each_name_once_and_skips_url_dependencies() {
        let mut registry = npm_registry();
        registry
            .expect_fetch_latest()
            .withf(|name| name == "react")
            .times(1)
            .returning(|_| {
                Ok(PackageMetadata {
                    version: "18.2.0".to_string(),
                    description: None,
                    author_name: None,
                })
            });

        let content = r#"{
  "dependencies": {
    "react": "^18.0.0",
    "fork": "git+https://github.com/me/fork.git"
  },
  "devDependencies": {
    "react": "^17.0.0"
  }
}"#;
        let client = RegistryClient::new(Arc::new(registry), create_cache());
        let session = DocumentSession::new(RegistryType::Npm);
        let observer = RecordingObserver::default();

        session
            .refresh(content, &PackageJsonParser::new(), &client, &observer, 20)
            .await;

        let view = session.view();
        assert_eq!(
            view.get("react", DependencySection::Primary)
                .unwrap()
                .classification,
            Some(UpdateClassification::Minor)
        );
        assert_eq!(
            view.get("react", DependencySection::Development)
                .unwrap()
                .classification,
            Some(UpdateClassification::OutOfRange)
        );
        assert_eq!(
            view.get("fork", DependencySection::Primary)
                .unwrap()
                .classification,
            Some(UpdateClassification::Url)
        );
    }

    #[tokio::test]
    async fn failed_fetch_is_retried_on_next_refresh() {
        let mut registry = npm_registry();
        let mut seq = mockall::Sequence::new();
        registry
            .expect_fetch_latest()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(RegistryError::InvalidResponse("unavailable".to_string())));
        registry
            .expect_fetch_latest()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(PackageMetadata {
                    version: "1.1.0".to_string(),
                    description: None,
                    author_name: None,
                })
            });

        let cache = create_cache();
        let client = RegistryClient::new(Arc::new(registry), cache.clone());
        let session = DocumentSession::new(RegistryType::Npm);
        let observer = RecordingObserver::default();
        let parser = PackageJsonParser::new();
        let content = package_json(1);

        let first = session
            .refresh(&content, &parser, &client, &observer, 20)
            .await;
        let RefreshOutcome::Settled(summary) = first else {
            panic!("expected settled outcome");
        };
        assert_eq!(summary.pending, 1);
        assert_eq!(cache.get_cached(RegistryType::Npm, "pkg-0").unwrap(), None);

        let second = session
            .refresh(&content, &parser, &client, &observer, 20)
            .await;
        let RefreshOutcome::Settled(summary) = second else {
            panic!("expected settled outcome");
        };
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.count(UpdateClassification::Minor), 1);
    }

    #[tokio::test]
    async fn refresh_reports_parse_failure_with_empty_view() {
        let mut registry = npm_registry();
        registry.expect_fetch_latest().times(0);
        let client = RegistryClient::new(Arc::new(registry), create_cache());
        let session = DocumentSession::new(RegistryType::Npm);
        let observer = RecordingObserver::default();

        let mut parser = MockParser::new();
        parser
            .expect_parse()
            .returning(|_| Err(ParseError::InvalidSyntax("unexpected EOF".to_string())));

        let outcome = session
            .refresh("{", &parser, &client, &observer, 20)
            .await;

        assert!(matches!(outcome, RefreshOutcome::Failed(_)));
        assert!(session.view().is_empty());
        assert_eq!(observer.parse_errors.load(Ordering::SeqCst), 1);
        assert!(observer.settled.lock().unwrap().is_empty());
        assert_eq!(session.state(), RefreshState::Idle);
        assert!(!session.is_refreshing());
    }

    #[tokio::test]
    async fn overlapping_refresh_is_dropped() {
        let registry = Arc::new(ConcurrencyTrackingRegistry::default());
        let client = RegistryClient::new(registry.clone(), create_cache());
        let session = DocumentSession::new(RegistryType::Npm);
        let observer = RecordingObserver::default();
        let parser = PackageJsonParser::new();
        let content = package_json(5);

        let (first, second) = tokio::join!(
            session.refresh(&content, &parser, &client, &observer, 20),
            session.refresh(&content, &parser, &client, &observer, 20),
        );

        assert!(matches!(first, RefreshOutcome::Settled(_)));
        assert_eq!(second, RefreshOutcome::Skipped);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 5);
        assert!(!session.is_refreshing());
    }

    #[tokio::test]
    async fn cancelled_session_stops_before_next_batch() {
        let registry = Arc::new(ConcurrencyTrackingRegistry::default());
        let client = RegistryClient::new(registry.clone(), create_cache());
        let session = DocumentSession::new(RegistryType::Npm);
        let observer = RecordingObserver::default();

        session.cancel();
        let outcome = session
            .refresh(
                &package_json(3),
                &PackageJsonParser::new(),
                &client,
                &observer,
                20,
            )
            .await;

        assert_eq!(outcome, RefreshOutcome::Cancelled);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
        assert!(!session.is_refreshing());
    }

    #[tokio::test]
    async fn cancel_during_batch_discards_its_results() {
        let registry = Arc::new(SlowRegistry::default());
        let client = RegistryClient::new(registry.clone(), create_cache());
        let session = DocumentSession::new(RegistryType::Npm);
        let observer = RecordingObserver::default();
        let parser = PackageJsonParser::new();
        let content = package_json(3);

        let (outcome, _) = tokio::join!(
            session.refresh(&content, &parser, &client, &observer, 20),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                session.cancel();
            },
        );

        assert_eq!(outcome, RefreshOutcome::Cancelled);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 3);
        assert!(observer.batches.lock().unwrap().is_empty());
        assert!(observer.settled.lock().unwrap().is_empty());
        assert!(
            session
                .view()
                .dependencies()
                .iter()
                .all(|d| d.classification.is_none())
        );
        assert_eq!(session.state(), RefreshState::Idle);
        assert!(!session.is_refreshing());
    }

    #[tokio::test]
    async fn mark_updated_reclassifies_view_entry() {
        let registry = Arc::new(ConcurrencyTrackingRegistry::default());
        let client = RegistryClient::new(registry, create_cache());
        let session = DocumentSession::new(RegistryType::Npm);
        let observer = RecordingObserver::default();

        session
            .refresh(
                &package_json(1),
                &PackageJsonParser::new(),
                &client,
                &observer,
                20,
            )
            .await;

        assert!(session.mark_updated("pkg-0", DependencySection::Primary, "2.0.0"));
        assert_eq!(
            session
                .view()
                .get("pkg-0", DependencySection::Primary)
                .unwrap()
                .classification,
            Some(UpdateClassification::Latest)
        );
    }

    #[tokio::test]
    async fn refresh_stale_packages_refetches_only_stale_entries() {
        let mut registry = npm_registry();
        registry
            .expect_fetch_latest()
            .withf(|name| name == "stale")
            .times(1)
            .returning(|_| {
                Ok(PackageMetadata {
                    version: "3.0.0".to_string(),
                    description: None,
                    author_name: None,
                })
            });

        let cache = create_cache();
        let now = now_ms();
        for (name, fetched_at) in [("fresh", now), ("stale", now - DEFAULT_REFRESH_INTERVAL_MS * 2)] {
            cache
                .put_cached(
                    RegistryType::Npm,
                    name,
                    VersionMetadata {
                        latest_version: Some("1.0.0".to_string()),
                        description: None,
                        author_name: None,
                        fetched_at,
                    },
                )
                .unwrap();
        }
        let client = RegistryClient::new(Arc::new(registry), cache.clone());

        assert_eq!(refresh_stale_packages(&client, 20).await, 1);
        assert_eq!(
            cache
                .get_cached(RegistryType::Npm, "stale")
                .unwrap()
                .unwrap()
                .latest_version
                .as_deref(),
            Some("3.0.0")
        );
    }
}
