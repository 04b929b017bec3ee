use async_trait::async_trait;
use burrow_cache::{BloomFilterConfig, BloomMembershipFilter, MokaAliasCache};
use burrow_core::repository::Result as StoreResult;
use burrow_core::{
    AliasCache, AliasError, AliasRecord, AliasStore, CacheError, ErrorKind, FilterError,
    ManualClock, MembershipFilter, ShortCode, StorageError,
};
use burrow_generator::{CodeGenerator, RandomGenerator, SequenceGenerator};
use burrow_resolver::{RegistrationStats, ResolutionService, ResolverConfig, ShortenOptions};
use burrow_storage::InMemoryAliasStore;
use jiff::{SignedDuration, Timestamp};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Wraps the in-memory store with call counters and injectable failures.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryAliasStore,
    inserts: AtomicUsize,
    finds: AtomicUsize,
    conflicts: AtomicU32,
    unavailable: AtomicBool,
    delay_ms: AtomicU64,
}

impl CountingStore {
    async fn pause(&self) {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[async_trait]
impl AliasStore for CountingStore {
    async fn insert(&self, record: &AliasRecord) -> StoreResult<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "connection refused by db-7.internal".to_string(),
            ));
        }
        let pending = self.conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(StorageError::Conflict(record.code.to_string()));
        }
        self.inner.insert(record).await
    }

    async fn find_by_code(&self, code: &ShortCode) -> StoreResult<Option<AliasRecord>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Timeout("db-7.internal".to_string()));
        }
        self.inner.find_by_code(code).await
    }

    async fn list_codes(
        &self,
        after: Option<&ShortCode>,
        limit: usize,
    ) -> StoreResult<Vec<ShortCode>> {
        self.inner.list_codes(after, limit).await
    }
}

/// An exact-set filter whose answers and failures tests can steer.
#[derive(Default)]
struct StubFilter {
    present: Mutex<HashSet<ShortCode>>,
    all_present: AtomicBool,
    fail_exists: AtomicBool,
    add_failures: AtomicU32,
    add_delay_ms: AtomicU64,
    exists_calls: AtomicUsize,
}

impl StubFilter {
    fn with_present(codes: &[&str]) -> Self {
        let filter = Self::default();
        filter
            .present
            .lock()
            .unwrap()
            .extend(codes.iter().map(|c| ShortCode::new_unchecked(*c)));
        filter
    }

    fn registered(&self, code: &ShortCode) -> bool {
        self.present.lock().unwrap().contains(code)
    }
}

#[async_trait]
impl MembershipFilter for StubFilter {
    async fn add(&self, code: &ShortCode) -> Result<(), FilterError> {
        let delay = self.add_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let pending = self.add_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.add_failures.store(pending - 1, Ordering::SeqCst);
            return Err(FilterError::Unavailable("filter offline".to_string()));
        }
        self.present.lock().unwrap().insert(code.clone());
        Ok(())
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool, FilterError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(FilterError::Operation("filter offline".to_string()));
        }
        Ok(self.all_present.load(Ordering::SeqCst) || self.present.lock().unwrap().contains(code))
    }
}

/// Hands out scripted codes first, then sequential ones.
#[derive(Default)]
struct ScriptedGenerator {
    script: Mutex<VecDeque<ShortCode>>,
    fallback: SequenceGenerator,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn scripted(codes: &[&str]) -> Self {
        Self {
            script: Mutex::new(codes.iter().map(|c| ShortCode::new_unchecked(*c)).collect()),
            ..Self::default()
        }
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn generate(&self, length: usize) -> ShortCode {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.generate(length))
    }
}

#[derive(Default)]
struct BrokenCache {
    gets: AtomicUsize,
    sets: AtomicUsize,
}

#[async_trait]
impl AliasCache for BrokenCache {
    async fn get(&self, _code: &ShortCode) -> Result<Option<AliasRecord>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("cache node down".to_string()))
    }

    async fn set(
        &self,
        _code: &ShortCode,
        _record: &AliasRecord,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Operation("cache node down".to_string()))
    }
}

type Service<C> =
    ResolutionService<Arc<CountingStore>, Arc<StubFilter>, C, Arc<ScriptedGenerator>>;

struct Harness<C = MokaAliasCache> {
    store: Arc<CountingStore>,
    filter: Arc<StubFilter>,
    generator: Arc<ScriptedGenerator>,
    clock: ManualClock,
    service: Service<C>,
}

fn start() -> Timestamp {
    "2030-01-01T00:00:00Z".parse().unwrap()
}

impl<C: AliasCache> Harness<C> {
    fn build(
        filter: StubFilter,
        generator: ScriptedGenerator,
        cache: C,
        config: ResolverConfig,
    ) -> Self {
        let store = Arc::new(CountingStore::default());
        let filter = Arc::new(filter);
        let generator = Arc::new(generator);
        let clock = ManualClock::new(start());

        let service = ResolutionService::new(
            Arc::clone(&store),
            Arc::clone(&filter),
            cache,
            Arc::clone(&generator),
        )
        .with_config(config)
        .with_clock(clock.clone())
        .with_registration_stats(RegistrationStats::new().unwrap());

        Self {
            store,
            filter,
            generator,
            clock,
            service,
        }
    }

    fn generated(&self) -> usize {
        self.generator.calls.load(Ordering::SeqCst)
    }

    fn inserts(&self) -> usize {
        self.store.inserts.load(Ordering::SeqCst)
    }

    fn finds(&self) -> usize {
        self.store.finds.load(Ordering::SeqCst)
    }
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ResolverConfig::default())
    }

    fn with_config(config: ResolverConfig) -> Self {
        Self::build(
            StubFilter::default(),
            ScriptedGenerator::default(),
            MokaAliasCache::new(),
            config,
        )
    }
}

const TARGET: &str = "https://example.com/some/long/path?q=1";

#[tokio::test]
async fn shorten_then_resolve_returns_target() {
    let h = Harness::new();

    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();
    assert_eq!(created.code.len(), 8);
    assert_eq!(created.target, TARGET);

    let resolved = h.service.resolve(created.code.as_str()).await.unwrap();
    assert_eq!(resolved, created);
}

#[tokio::test]
async fn default_expiry_is_72_hours_after_creation() {
    let h = Harness::new();

    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    assert_eq!(created.created_at, start());
    assert_eq!(
        created.expires_at,
        created.created_at + SignedDuration::from_hours(72)
    );
}

#[tokio::test]
async fn created_at_is_truncated_to_milliseconds() {
    let h = Harness::new();
    h.clock
        .set(start() + SignedDuration::from_nanos(1_234_567));

    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    assert_eq!(created.created_at, start() + SignedDuration::from_millis(1));
}

#[tokio::test]
async fn explicit_future_expiry_is_kept() {
    let h = Harness::new();
    let expires_at = start() + SignedDuration::from_hours(1);

    let created = h
        .service
        .shorten(TARGET, ShortenOptions::expiring_at(expires_at))
        .await
        .unwrap();

    assert_eq!(created.expires_at, expires_at);
}

#[tokio::test]
async fn past_or_present_expiry_is_invalid_input() {
    let h = Harness::new();

    let past: Timestamp = "2000-01-01T00:00:00Z".parse().unwrap();
    let err = h
        .service
        .shorten(TARGET, ShortenOptions::expiring_at(past))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = h
        .service
        .shorten(TARGET, ShortenOptions::expiring_at(start()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert_eq!(h.inserts(), 0);
}

#[tokio::test]
async fn empty_or_malformed_target_is_invalid_input() {
    let h = Harness::new();

    for target in ["", "not a url", "ftp://example.com/file", "https://"] {
        let err = h
            .service
            .shorten(target, ShortenOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "target {target:?}");
    }

    assert_eq!(h.generated(), 0);
    assert_eq!(h.inserts(), 0);
}

#[tokio::test]
async fn empty_code_is_invalid_input() {
    let h = Harness::new();

    let err = h.service.resolve("").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(err.kind().code(), 400_001);
}

#[tokio::test]
async fn malformed_code_is_not_found_without_any_lookup() {
    let h = Harness::new();

    let too_long = "x".repeat(33);
    for code in ["abc-1234", "has space", too_long.as_str()] {
        let err = h.service.resolve(code).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "code {code:?}");
    }

    assert_eq!(h.filter.exists_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.finds(), 0);
}

#[tokio::test]
async fn unknown_code_is_rejected_by_filter_without_storage_access() {
    let h = Harness::new();

    let err = h.service.resolve("zzzzzzzz").await.unwrap_err();

    assert!(matches!(err, AliasError::NotFound(ref c) if c == "zzzzzzzz"));
    assert_eq!(h.finds(), 0);
}

#[tokio::test]
async fn expired_alias_reports_expired_not_not_found() {
    let h = Harness::new();
    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    h.clock.advance(SignedDuration::from_hours(72));

    let err = h.service.resolve(created.code.as_str()).await.unwrap_err();
    match err {
        AliasError::Expired { code, expired_at } => {
            assert_eq!(code, created.code.as_str());
            assert_eq!(expired_at, created.expires_at);
        }
        other => panic!("expected Expired, got {other:?}"),
    }
}

#[tokio::test]
async fn expiry_is_judged_on_cached_records_too() {
    let h = Harness::new();
    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    h.service.resolve(created.code.as_str()).await.unwrap();
    h.clock.advance(SignedDuration::from_hours(100));

    let err = h.service.resolve(created.code.as_str()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);
    assert_eq!(err.kind().code(), 404_003);
    assert_eq!(h.finds(), 1);
}

#[tokio::test]
async fn probable_collisions_are_regenerated() {
    let h = Harness::build(
        StubFilter::with_present(&["taken001", "taken002"]),
        ScriptedGenerator::scripted(&["taken001", "taken002", "fresh003"]),
        MokaAliasCache::new(),
        ResolverConfig::default(),
    );

    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    assert_eq!(created.code.as_str(), "fresh003");
    assert_eq!(h.generated(), 3);
    assert_eq!(h.inserts(), 1);
}

#[tokio::test]
async fn generation_gives_up_after_attempt_budget() {
    let h = Harness::new();
    h.filter.all_present.store(true, Ordering::SeqCst);

    let err = h
        .service
        .shorten(TARGET, ShortenOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.generated(), 10);
    assert_eq!(h.inserts(), 0);
}

#[tokio::test]
async fn generation_budget_is_configurable() {
    let h = Harness::with_config(ResolverConfig::builder().max_generation_attempts(3).build());
    h.filter.all_present.store(true, Ordering::SeqCst);

    h.service
        .shorten(TARGET, ShortenOptions::default())
        .await
        .unwrap_err();

    assert_eq!(h.generated(), 3);
}

#[tokio::test]
async fn filter_failure_during_generation_counts_as_absent() {
    let h = Harness::new();
    h.filter.fail_exists.store(true, Ordering::SeqCst);

    h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    assert_eq!(h.generated(), 1);
    assert_eq!(h.inserts(), 1);
}

#[tokio::test]
async fn storage_conflicts_are_retried_with_fresh_codes() {
    let h = Harness::new();
    h.store.conflicts.store(2, Ordering::SeqCst);

    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    assert_eq!(h.inserts(), 3);
    assert_eq!(h.generated(), 3);
    assert_eq!(h.service.resolve(created.code.as_str()).await.unwrap(), created);
}

#[tokio::test]
async fn storage_conflicts_beyond_budget_are_internal() {
    let h = Harness::new();
    h.store.conflicts.store(10, Ordering::SeqCst);

    let err = h
        .service
        .shorten(TARGET, ShortenOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.inserts(), 4);
}

#[tokio::test]
async fn zero_conflict_retries_fails_on_first_conflict() {
    let h = Harness::with_config(ResolverConfig::builder().max_conflict_retries(0).build());
    h.store.conflicts.store(1, Ordering::SeqCst);

    let err = h
        .service
        .shorten(TARGET, ShortenOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.inserts(), 1);
}

#[tokio::test]
async fn storage_failures_are_internal_without_backend_detail() {
    let h = Harness::new();
    h.store.unavailable.store(true, Ordering::SeqCst);

    let err = h
        .service
        .shorten(TARGET, ShortenOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(!err.to_string().contains("db-7"));

    h.filter.all_present.store(true, Ordering::SeqCst);
    let err = h.service.resolve("abcdefgh").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.kind().http_status(), 500);
    assert!(!err.to_string().contains("db-7"));
}

#[tokio::test]
async fn resolved_records_are_served_from_cache() {
    let h = Harness::new();
    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    for _ in 0..3 {
        h.service.resolve(created.code.as_str()).await.unwrap();
    }

    assert_eq!(h.finds(), 1);
}

#[tokio::test]
async fn misses_are_not_cached() {
    let h = Harness::new();
    h.filter.all_present.store(true, Ordering::SeqCst);

    for _ in 0..2 {
        let err = h.service.resolve("ghost001").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    assert_eq!(h.finds(), 2);
}

#[tokio::test]
async fn cache_failures_are_absorbed() {
    let cache = Arc::new(BrokenCache::default());
    let h = Harness::build(
        StubFilter::default(),
        ScriptedGenerator::default(),
        Arc::clone(&cache),
        ResolverConfig::default(),
    );

    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();
    let resolved = h.service.resolve(created.code.as_str()).await.unwrap();

    assert_eq!(resolved.target, TARGET);
    assert_eq!(cache.gets.load(Ordering::SeqCst), 1);
    assert_eq!(cache.sets.load(Ordering::SeqCst), 1);
    assert_eq!(h.finds(), 1);
}

#[tokio::test]
async fn filter_failure_on_resolve_falls_through_to_storage() {
    let h = Harness::new();
    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    h.filter.fail_exists.store(true, Ordering::SeqCst);

    assert_eq!(h.service.resolve(created.code.as_str()).await.unwrap(), created);
    let err = h.service.resolve("ghost001").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn slow_resolve_hits_the_operation_timeout() {
    let h = Harness::with_config(
        ResolverConfig::builder()
            .operation_timeout(Duration::from_millis(50))
            .build(),
    );
    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();
    h.store.delay_ms.store(2_000, Ordering::SeqCst);

    let err = h.service.resolve(created.code.as_str()).await.unwrap_err();

    assert!(matches!(err, AliasError::DeadlineExceeded(_)));
    assert_eq!(err.kind().http_status(), 504);
}

#[tokio::test]
async fn shorten_before_deadline_abandons_the_write() {
    let h = Harness::new();
    h.store.delay_ms.store(2_000, Ordering::SeqCst);

    let deadline = Instant::now() + Duration::from_millis(20);
    let err = h
        .service
        .shorten_before(TARGET, ShortenOptions::default(), deadline)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    assert!(h.store.inner.is_empty());
}

#[tokio::test]
async fn resolve_before_generous_deadline_succeeds() {
    let h = Harness::new();
    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let resolved = h
        .service
        .resolve_before(created.code.as_str(), deadline)
        .await
        .unwrap();

    assert_eq!(resolved, created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_registration_is_retried_in_background() {
    let h = Harness::with_config(
        ResolverConfig::builder()
            .filter_retry_backoff(Duration::from_millis(5))
            .build(),
    );
    h.filter.add_failures.store(2, Ordering::SeqCst);

    let created = h.service.shorten(TARGET, ShortenOptions::default()).await.unwrap();
    let stats = h.service.registration_stats().unwrap();
    assert_eq!(stats.inline_failures(), 1);

    let service = h.service.clone();
    awaitility::at_most(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(10))
        .until_async(|| {
            let service = service.clone();
            async move { service.registration_stats().unwrap().recovered() == 1 }
        })
        .await;

    assert_eq!(stats.abandoned(), 0);
    assert_eq!(h.service.resolve(created.code.as_str()).await.unwrap(), created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_registration_past_deadline_still_creates_and_resolves() {
    let h = Harness::with_config(
        ResolverConfig::builder()
            .filter_retry_backoff(Duration::from_millis(10))
            .build(),
    );
    h.filter.add_delay_ms.store(200, Ordering::SeqCst);

    let deadline = Instant::now() + Duration::from_millis(50);
    let created = h
        .service
        .shorten_before(TARGET, ShortenOptions::default(), deadline)
        .await
        .unwrap();

    assert_eq!(h.inserts(), 1);
    assert_eq!(h.service.registration_stats().unwrap().inline_failures(), 1);

    let filter = Arc::clone(&h.filter);
    let code = created.code.clone();
    awaitility::at_most(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(10))
        .until_async(|| {
            let filter = Arc::clone(&filter);
            let code = code.clone();
            async move { filter.registered(&code) }
        })
        .await;

    h.filter.add_delay_ms.store(0, Ordering::SeqCst);
    assert_eq!(h.service.resolve(created.code.as_str()).await.unwrap(), created);
    assert_eq!(h.service.registration_stats().unwrap().abandoned(), 0);
}

#[tokio::test]
async fn service_without_stats_still_retries_registration() {
    let h = Harness::new();
    let service = ResolutionService::new(
        Arc::clone(&h.store),
        Arc::clone(&h.filter),
        MokaAliasCache::new(),
        Arc::clone(&h.generator),
    )
    .with_config(
        ResolverConfig::builder()
            .filter_retry_backoff(Duration::from_millis(1))
            .build(),
    );
    h.filter.add_failures.store(1, Ordering::SeqCst);

    let created = service.shorten(TARGET, ShortenOptions::default()).await.unwrap();
    assert!(service.registration_stats().is_none());

    for _ in 0..500 {
        if h.filter.registered(&created.code) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(service.resolve(created.code.as_str()).await.unwrap(), created);
}

#[tokio::test]
async fn concurrent_creators_get_distinct_codes() {
    let filter =
        BloomMembershipFilter::new(BloomFilterConfig::builder().expected_items(1_000).build())
            .unwrap();
    let service = ResolutionService::new(
        InMemoryAliasStore::new(),
        filter,
        MokaAliasCache::new(),
        RandomGenerator::new(),
    );

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .shorten(&format!("https://example.com/{i}"), ShortenOptions::default())
                    .await
            })
        })
        .collect();

    let mut codes = HashSet::new();
    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        let resolved = service.resolve(record.code.as_str()).await.unwrap();
        assert_eq!(resolved.target, record.target);
        codes.insert(record.code);
    }

    assert_eq!(codes.len(), 32);
}
