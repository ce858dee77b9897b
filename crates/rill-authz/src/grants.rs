//! Per-principal grants cache.
//!
//! Authorization checks are served from memory: `info_for` finds or creates
//! the entry for the token's principal, and the cached grants document is
//! consulted on every check. Upstream traffic is bounded by a single-flight
//! barrier (one fetch per principal at any time), a periodic refresh pass
//! that re-fetches grants for active sessions through a bounded worker pool,
//! and a garbage-collection pass that drops entries for principals with no
//! live session.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::config::GrantsCacheConfig;
use crate::errors::{ConfigError, FetchError, GrantsError};
use crate::http::GrantsProvider;
use crate::sessions::AuthzContext;
use crate::singleflight::{Flight, SingleFlight};
use crate::token::{TokenPayload, mask};

/// Cache entry for one principal.
///
/// `expires_at` and `last_used` are published through atomics and
/// `access_token` / `grants` through locks, so readers observe either the
/// previous or the new value of each field. `expires_at` is only written
/// under the token lock, which keeps it monotonically non-decreasing and
/// consistent with the stored token.
pub struct GrantsInfo {
    access_token: RwLock<String>,
    grants: RwLock<Option<Arc<Value>>>,
    expires_at: AtomicI64,
    last_used: AtomicI64,
}

impl GrantsInfo {
    fn new(access_token: String, expires_at: i64, now: i64) -> Self {
        Self {
            access_token: RwLock::new(access_token),
            grants: RwLock::new(None),
            expires_at: AtomicI64::new(expires_at),
            last_used: AtomicI64::new(now),
        }
    }

    /// Record a consult and adopt the incoming token if it expires later
    /// than the stored one. Ties keep the current token.
    pub(crate) fn update_token_if_newer(&self, token: &TokenPayload, now: i64) {
        self.last_used.store(now, Ordering::Release);
        let mut current = self.access_token.write().expect("token lock");
        if token.lifetime_ms() > self.expires_at.load(Ordering::Acquire) {
            *current = token.value().to_string();
            self.expires_at.store(token.lifetime_ms(), Ordering::Release);
        }
    }

    /// The most recent access token observed for this principal.
    pub fn access_token(&self) -> String {
        self.access_token.read().expect("token lock").clone()
    }

    /// The last successfully fetched grants document, or `None` before the
    /// first fetch completes. Never blocks on I/O.
    pub fn grants(&self) -> Option<Arc<Value>> {
        self.grants.read().expect("grants lock").clone()
    }

    fn set_grants(&self, grants: Arc<Value>) {
        *self.grants.write().expect("grants lock") = Some(grants);
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at.load(Ordering::Acquire)
    }

    pub fn last_used(&self) -> i64 {
        self.last_used.load(Ordering::Acquire)
    }

    fn is_expired_at(&self, timestamp: i64) -> bool {
        self.expires_at() < timestamp
    }
}

impl std::fmt::Debug for GrantsInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantsInfo")
            .field("access_token", &mask(&self.access_token()))
            .field("expires_at", &self.expires_at())
            .field("last_used", &self.last_used())
            .field("has_grants", &self.grants().is_some())
            .finish()
    }
}

/// See the module documentation.
pub struct GrantsCache {
    inner: Arc<Inner>,
    refresh_task: Option<JoinHandle<()>>,
    gc_task: Option<JoinHandle<()>>,
}

struct Inner {
    entries: Mutex<HashMap<String, Arc<GrantsInfo>>>,
    flights: SingleFlight<Arc<Value>>,
    provider: Arc<dyn GrantsProvider>,
    context: AuthzContext,
    http_retries: u32,
    max_idle_millis: i64,
    gc_period_millis: i64,
    refresh_permits: Arc<Semaphore>,
    last_gc_run_millis: AtomicI64,
}

impl GrantsCache {
    /// Create the cache and start its background workers.
    ///
    /// Must be called within a tokio runtime. A `refresh_period_seconds` of
    /// zero disables background refresh; garbage collection always runs.
    pub fn new(
        config: GrantsCacheConfig,
        provider: Arc<dyn GrantsProvider>,
        context: AuthzContext,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let inner = Arc::new(Inner {
            entries: Mutex::new(HashMap::new()),
            flights: SingleFlight::new(),
            provider,
            context,
            http_retries: config.http_retries,
            max_idle_millis: i64::from(config.max_idle_seconds) * 1000,
            gc_period_millis: i64::from(config.gc_period_seconds) * 1000,
            refresh_permits: Arc::new(Semaphore::new(config.refresh_pool_size)),
            last_gc_run_millis: AtomicI64::new(0),
        });

        let refresh_task = (config.refresh_period_seconds > 0).then(|| {
            let period = Duration::from_secs(u64::from(config.refresh_period_seconds));
            tokio::spawn(refresh_loop(inner.clone(), period))
        });
        let gc_period = Duration::from_secs(u64::from(config.gc_period_seconds));
        let gc_task = Some(tokio::spawn(gc_loop(inner.clone(), gc_period)));

        Ok(Self {
            inner,
            refresh_task,
            gc_task,
        })
    }

    /// Find or create the cache entry for the token's principal.
    ///
    /// Updates the entry's token by the monotonic rule and bumps `last_used`.
    /// Never blocks on I/O.
    pub fn info_for(&self, token: &TokenPayload) -> Arc<GrantsInfo> {
        let now = self.inner.context.clock.now_millis();
        let info = {
            let mut entries = self.inner.entries.lock().expect("grants cache lock");
            entries
                .entry(token.principal_name().to_string())
                .or_insert_with(|| {
                    Arc::new(GrantsInfo::new(
                        token.value().to_string(),
                        token.lifetime_ms(),
                        now,
                    ))
                })
                .clone()
        };
        info.update_token_if_newer(token, now);
        info
    }

    /// Populate `info.grants` by fetching from the authorization server, or
    /// by waiting on the fetch already in flight for this principal.
    ///
    /// A 403 from the server stores and returns the empty deny-all grants
    /// document; any other failure propagates to every caller waiting on the
    /// same fetch.
    pub async fn fetch_or_wait(
        &self,
        principal: &str,
        info: &Arc<GrantsInfo>,
    ) -> Result<Arc<Value>, GrantsError> {
        self.inner.fetch_or_wait(principal, info).await
    }

    /// Stop the background workers. Called automatically on drop.
    pub fn close(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        if let Some(task) = self.gc_task.take() {
            task.abort();
        }
        self.inner.refresh_permits.close();
    }
}

impl Drop for GrantsCache {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    async fn fetch_or_wait(
        &self,
        principal: &str,
        info: &Arc<GrantsInfo>,
    ) -> Result<Arc<Value>, GrantsError> {
        match self.flights.acquire(principal) {
            Flight::Leader(completion) => {
                let result = self.fetch_and_store(principal, info).await;
                completion.complete(result.clone());
                result
            }
            Flight::Follower(waiter) => {
                debug!(principal = %principal, "waiting on in-flight grants fetch");
                waiter.wait().await
            }
        }
    }

    /// Fetch grants for the entry's current token and store them. Runs under
    /// the single-flight barrier, so at most one call per principal is in
    /// flight at any time.
    async fn fetch_and_store(
        &self,
        principal: &str,
        info: &Arc<GrantsInfo>,
    ) -> Result<Arc<Value>, GrantsError> {
        let token = info.access_token();
        debug!(principal = %principal, token = %mask(&token), "fetching grants from the authorization server");

        let new_grants = match self.fetch_with_retry(&token).await {
            Ok(value) => value,
            Err(FetchError::Http { status: 403, .. }) => {
                // 403 means no policy matched the token: no grants, deny-all.
                debug!(principal = %principal, "authorization server returned no grants");
                Value::Object(serde_json::Map::new())
            }
            Err(err) => return Err(err.into()),
        };

        let changed = match info.grants() {
            Some(old) => *old != new_grants,
            None => true,
        };
        let new_grants = Arc::new(new_grants);
        if changed {
            debug!(principal = %principal, "grants changed, storing");
            info.set_grants(new_grants.clone());
        }
        Ok(new_grants)
    }

    /// Call the provider with up to `http_retries` additional attempts.
    /// 401 (invalid token) and 403 (no permissions) are terminal.
    async fn fetch_with_retry(&self, access_token: &str) -> Result<Value, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if attempt > 1 {
                debug!(attempt, "grants request retry");
            }
            match self.provider.fetch_grants(access_token).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if matches!(err.status(), Some(401 | 403)) {
                        return Err(err);
                    }
                    info!(attempt, error = %err, "failed to fetch grants");
                    if attempt > self.http_retries {
                        return Err(err);
                    }
                }
            }
        }
    }

    async fn refresh_all_grants(self: &Arc<Self>) {
        debug!("refreshing authorization grants");
        let snapshot: Vec<(String, Arc<GrantsInfo>)> = {
            let entries = self.entries.lock().expect("grants cache lock");
            entries
                .iter()
                .map(|(principal, info)| (principal.clone(), info.clone()))
                .collect()
        };

        let now = self.context.clock.now_millis();
        let mut jobs = Vec::with_capacity(snapshot.len());
        for (principal, info) in snapshot {
            if info.last_used() < now - self.max_idle_millis {
                debug!(principal = %principal, "skipping grants refresh for idle principal");
                self.remove_if_idle_or_expired(&principal);
                continue;
            }
            let inner = self.clone();
            jobs.push(async move {
                let Ok(_permit) = inner.refresh_permits.clone().acquire_owned().await else {
                    // The cache is closing.
                    return;
                };
                trace!(principal = %principal, "refreshing grants");
                if let Err(err) = inner.fetch_or_wait(&principal, &info).await {
                    warn!(principal = %principal, error = %err, "[IGNORED] failed to refresh grants");
                    if err.status() == Some(401) {
                        // The token is no longer valid upstream; purge every
                        // session still presenting it.
                        inner
                            .context
                            .sessions
                            .remove_all_with_matching_access_token(&info.access_token());
                    }
                }
            });
        }
        futures::future::join_all(jobs).await;
        debug!("done refreshing grants");
    }

    fn remove_if_idle_or_expired(&self, principal: &str) {
        let now = self.context.clock.now_millis();
        let mut entries = self.entries.lock().expect("grants cache lock");
        if let Some(info) = entries.get(principal) {
            let idle = info.last_used() < now - self.max_idle_millis;
            if idle || info.is_expired_at(now) {
                debug!(
                    principal = %principal,
                    reason = if idle { "idle" } else { "expired" },
                    "removing principal from grants cache"
                );
                entries.remove(principal);
            }
        }
    }

    fn gc_if_due(&self) {
        let now = self.context.clock.now_millis();
        let elapsed = now - self.last_gc_run_millis.load(Ordering::Acquire);
        // Give or take one second, to tolerate queued ticks after a stall.
        if elapsed < self.gc_period_millis - 1000 {
            debug!(elapsed_millis = elapsed, "skipped queued gc run");
            return;
        }
        self.last_gc_run_millis.store(now, Ordering::Release);
        self.gc_entries();
    }

    fn gc_entries(&self) {
        let live: HashSet<String> = self
            .context
            .sessions
            .list_live()
            .iter()
            .map(|session| session.principal_name().to_string())
            .collect();
        trace!(?live, "grants gc: active principals");

        let mut entries = self.entries.lock().expect("grants cache lock");
        let before = entries.len();
        entries.retain(|principal, _| live.contains(principal));
        debug!(
            active = live.len(),
            before,
            after = entries.len(),
            "grants gc complete"
        );
    }
}

async fn refresh_loop(inner: Arc<Inner>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the first refresh happens one full
    // period after startup.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        // Errors are contained inside the run; a panic here would silently
        // kill the loop, so there is nothing to catch.
        inner.refresh_all_grants().await;
    }
}

async fn gc_loop(inner: Arc<Inner>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        inner.gc_if_due();
    }
}
