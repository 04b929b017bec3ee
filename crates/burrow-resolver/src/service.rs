use crate::config::ResolverConfig;
use crate::registration::{self, RegistrationStats};
use burrow_core::{
    AliasCache, AliasError, AliasRecord, AliasStore, Clock, MembershipFilter, ShortCode,
    StorageError, SystemClock,
};
use burrow_generator::CodeGenerator;
use jiff::Timestamp;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};
use url::Url;

/// Caller choices for [`ResolutionService::shorten`].
#[derive(Debug, Clone, Default)]
pub struct ShortenOptions {
    /// When the alias stops resolving. Must lie in the future; `None` picks
    /// the configured default TTL.
    pub expires_at: Option<Timestamp>,
}

impl ShortenOptions {
    pub fn expiring_at(expires_at: Timestamp) -> Self {
        Self {
            expires_at: Some(expires_at),
        }
    }
}

/// Creates aliases and resolves them back to their targets.
///
/// The service coordinates four collaborators:
/// - a [`CodeGenerator`] proposing candidate codes,
/// - a [`MembershipFilter`] that skips candidates probably in use and rejects
///   lookups of codes that were never issued,
/// - an [`AliasCache`] in front of storage on the read path,
/// - an [`AliasStore`] holding the records and arbitrating code uniqueness.
///
/// Cache failures never reach the caller, and neither do filter failures.
/// Storage failures surface as [`AliasError::Internal`] without the
/// backend's message. Cloning is cheap; clones share every collaborator.
pub struct ResolutionService<S, F, C, G> {
    store: Arc<S>,
    filter: Arc<F>,
    cache: Arc<C>,
    generator: Arc<G>,
    clock: Arc<dyn Clock>,
    config: Arc<ResolverConfig>,
    stats: Option<Arc<RegistrationStats>>,
}

impl<S, F, C, G> Clone for ResolutionService<S, F, C, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            filter: Arc::clone(&self.filter),
            cache: Arc::clone(&self.cache),
            generator: Arc::clone(&self.generator),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
            stats: self.stats.clone(),
        }
    }
}

impl<S, F, C, G> ResolutionService<S, F, C, G>
where
    S: AliasStore,
    F: MembershipFilter,
    C: AliasCache,
    G: CodeGenerator,
{
    /// Creates a service with the default configuration and the system clock.
    pub fn new(store: S, filter: F, cache: C, generator: G) -> Self {
        Self {
            store: Arc::new(store),
            filter: Arc::new(filter),
            cache: Arc::new(cache),
            generator: Arc::new(generator),
            clock: Arc::new(SystemClock),
            config: Arc::new(ResolverConfig::default()),
            stats: None,
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Counts filter registrations that needed a background retry.
    pub fn with_registration_stats(mut self, stats: RegistrationStats) -> Self {
        self.stats = Some(Arc::new(stats));
        self
    }

    /// Filter registration counters shared by every clone of this service.
    pub fn registration_stats(&self) -> Option<&RegistrationStats> {
        self.stats.as_deref()
    }

    /// Creates an alias for `target` under the configured operation timeout.
    pub async fn shorten(
        &self,
        target: &str,
        options: ShortenOptions,
    ) -> Result<AliasRecord, AliasError> {
        let deadline = Instant::now().checked_add(self.config.operation_timeout);
        self.shorten_until(target, options, deadline).await
    }

    /// Creates an alias for `target`, giving up at `deadline`.
    ///
    /// The deadline bounds the work up to and including the insert. Once the
    /// record is stored the call succeeds; a filter registration still
    /// running at `deadline` continues in the background.
    pub async fn shorten_before(
        &self,
        target: &str,
        options: ShortenOptions,
        deadline: Instant,
    ) -> Result<AliasRecord, AliasError> {
        self.shorten_until(target, options, Some(deadline)).await
    }

    async fn shorten_until(
        &self,
        target: &str,
        options: ShortenOptions,
        deadline: Option<Instant>,
    ) -> Result<AliasRecord, AliasError> {
        let work = self.create(target, options);
        let record = match deadline {
            Some(deadline) => run_before(deadline, "shortening a url", work).await?,
            None => work.await?,
        };

        self.register(&record.code, deadline).await;
        debug!(code = %record.code, expires_at = %record.expires_at, "alias created");
        Ok(record)
    }

    /// Looks up the active record for `code` under the configured operation
    /// timeout.
    pub async fn resolve(&self, code: &str) -> Result<AliasRecord, AliasError> {
        let work = self.lookup(code);
        match Instant::now().checked_add(self.config.operation_timeout) {
            Some(deadline) => run_before(deadline, "resolving a code", work).await,
            None => work.await,
        }
    }

    /// Looks up the active record for `code`, giving up at `deadline`.
    pub async fn resolve_before(
        &self,
        code: &str,
        deadline: Instant,
    ) -> Result<AliasRecord, AliasError> {
        run_before(deadline, "resolving a code", self.lookup(code)).await
    }

    /// Validates the request and stores a record under a fresh code.
    async fn create(&self, target: &str, options: ShortenOptions) -> Result<AliasRecord, AliasError> {
        let target = validate_target(target)?;
        let now = self.clock.now();
        let created_at = truncate_to_millis(now)?;

        let expires_at = match options.expires_at {
            Some(expires_at) => {
                let expires_at = truncate_to_millis(expires_at)?;
                if expires_at <= created_at {
                    return Err(AliasError::InvalidInput(format!(
                        "expiry {expires_at} is not in the future"
                    )));
                }
                expires_at
            }
            None => created_at
                .checked_add(self.config.default_ttl)
                .map_err(|e| AliasError::InvalidInput(format!("default expiry overflows: {e}")))?,
        };

        let mut conflicts = 0;
        loop {
            let code = self.next_candidate().await?;
            let record = AliasRecord {
                code,
                target: target.clone(),
                created_at,
                expires_at,
            };

            match self.store.insert(&record).await {
                Ok(()) => return Ok(record),
                Err(StorageError::Conflict(_)) if conflicts < self.config.max_conflict_retries => {
                    conflicts += 1;
                    warn!(code = %record.code, conflicts, "short code taken in storage, regenerating");
                }
                Err(StorageError::Conflict(_)) => {
                    error!(code = %record.code, conflicts, "storage conflict retries exhausted");
                    return Err(AliasError::Internal(
                        "could not allocate a unique short code".to_string(),
                    ));
                }
                Err(err) => {
                    error!(code = %record.code, error = %err, "failed to persist alias");
                    return Err(AliasError::Internal("failed to persist alias".to_string()));
                }
            }
        }
    }

    /// Draws codes until the filter reports one as absent.
    async fn next_candidate(&self) -> Result<ShortCode, AliasError> {
        for attempt in 1..=self.config.max_generation_attempts {
            let code = self.generator.generate(self.config.code_length);
            match self.filter.exists(&code).await {
                Ok(false) => return Ok(code),
                Ok(true) => {
                    trace!(code = %code, attempt, "candidate probably taken, regenerating");
                }
                Err(err) => {
                    // Storage uniqueness still guards the insert.
                    warn!(code = %code, error = %err, "filter check failed, using candidate");
                    return Ok(code);
                }
            }
        }

        error!(
            attempts = self.config.max_generation_attempts,
            "no free short code found"
        );
        Err(AliasError::Internal(
            "exhausted short code generation attempts".to_string(),
        ))
    }

    /// Adds a stored code to the filter, inline while `deadline` allows and
    /// in the background after that or after a failure.
    async fn register(&self, code: &ShortCode, deadline: Option<Instant>) {
        let outcome = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.filter.add(code)).await,
            None => Ok(self.filter.add(code).await),
        };

        match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => {
                warn!(code = %code, error = %err, "filter registration failed, retrying in background");
            }
            Err(_) => {
                warn!(code = %code, "filter registration ran past the deadline, retrying in background");
            }
        }

        registration::spawn_retry(
            Arc::clone(&self.filter),
            self.stats.clone(),
            code.clone(),
            self.config.filter_retry_attempts,
            self.config.filter_retry_backoff,
        );
    }

    async fn lookup(&self, code: &str) -> Result<AliasRecord, AliasError> {
        if code.is_empty() {
            return Err(AliasError::InvalidInput("short code is empty".to_string()));
        }
        let code = ShortCode::new(code).map_err(|_| AliasError::NotFound(code.to_string()))?;

        match self.filter.exists(&code).await {
            Ok(true) => {}
            Ok(false) => {
                trace!(code = %code, "filter rejected code");
                return Err(AliasError::NotFound(code.to_string()));
            }
            Err(err) => {
                warn!(code = %code, error = %err, "filter check failed, falling through to storage");
            }
        }

        let record = match self.cache.get(&code).await {
            Ok(Some(record)) => record,
            Ok(None) => self.load(&code).await?,
            Err(err) => {
                warn!(code = %code, error = %err, "cache read failed, treating as miss");
                self.load(&code).await?
            }
        };

        if record.is_expired_at(self.clock.now()) {
            debug!(code = %code, expires_at = %record.expires_at, "alias expired");
            return Err(AliasError::Expired {
                code: code.to_string(),
                expired_at: record.expires_at,
            });
        }

        Ok(record)
    }

    /// Reads `code` from storage and populates the cache on a hit.
    async fn load(&self, code: &ShortCode) -> Result<AliasRecord, AliasError> {
        let record = match self.store.find_by_code(code).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(AliasError::NotFound(code.to_string())),
            Err(err) => {
                error!(code = %code, error = %err, "failed to load alias");
                return Err(AliasError::Internal("failed to load alias".to_string()));
            }
        };

        if let Err(err) = self.cache.set(code, &record, self.config.cache_ttl).await {
            warn!(code = %code, error = %err, "cache write failed");
        }

        Ok(record)
    }
}

async fn run_before<T>(
    deadline: Instant,
    operation: &'static str,
    work: impl Future<Output = Result<T, AliasError>>,
) -> Result<T, AliasError> {
    match tokio::time::timeout_at(deadline, work).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, "deadline exceeded");
            Err(AliasError::DeadlineExceeded(operation))
        }
    }
}

fn validate_target(target: &str) -> Result<String, AliasError> {
    if target.is_empty() {
        return Err(AliasError::InvalidInput("url cannot be empty".to_string()));
    }

    let url = Url::parse(target)
        .map_err(|e| AliasError::InvalidInput(format!("invalid url '{target}': {e}")))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(target.to_string()),
        "http" | "https" => Err(AliasError::InvalidInput(format!(
            "url has no host: '{target}'"
        ))),
        scheme => Err(AliasError::InvalidInput(format!(
            "url scheme must be http or https, got '{scheme}'"
        ))),
    }
}

fn truncate_to_millis(ts: Timestamp) -> Result<Timestamp, AliasError> {
    Timestamp::from_millisecond(ts.as_millisecond())
        .map_err(|e| AliasError::Internal(format!("timestamp out of range: {e}")))
}
