//! Multi-tenant issuer cache
//!
//! Maps the `(issuer, client id)` pair of an incoming token to the validator
//! of the tenant that owns it. The tenant list comes from an
//! [`IssuerListProvider`] and is re-synchronised in the background;
//! validators are built on first use through a [`ValidatorProvider`].
//!
//! The map sits behind a `parking_lot::RwLock` that is only held for map
//! access. Validator construction runs outside the lock, guarded per issuer
//! by a `tokio::sync::OnceCell`: concurrent callers wait for one build, and a
//! failed build leaves the cell empty so the next request retries it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::error::{AuthError, Result};
use super::getter::UserGetter;
use super::token::parse_claims_unvalidated;
use super::user::User;
use crate::constants::{DEFAULT_RELOAD_INTERVAL, DEFAULT_RETRY_INTERVAL};

pub type Annotations = BTreeMap<String, String>;

/// One tenant's token issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerConfig {
    pub tenant: String,
    pub issuer: String,
    pub client_id: String,
    #[serde(default)]
    pub annotations: Annotations,
}

impl IssuerConfig {
    pub fn new(
        tenant: impl Into<String>,
        issuer: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            issuer: issuer.into(),
            client_id: client_id.into(),
            annotations: Annotations::new(),
        }
    }

    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> IssuerKey {
        IssuerKey::new(&self.issuer, &self.client_id)
    }
}

/// Cache key of an issuer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IssuerKey {
    client_id: String,
    issuer: String,
}

impl IssuerKey {
    pub fn new(issuer: &str, client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            issuer: issuer.to_string(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Display for IssuerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.client_id, self.issuer)
    }
}

/// Source of truth for the tenant list.
#[async_trait]
pub trait IssuerListProvider: Send + Sync {
    async fn issuers(&self) -> Result<Vec<IssuerConfig>>;
}

/// Builds the validator of one issuer. May be slow and network-bound.
#[async_trait]
pub trait ValidatorProvider: Send + Sync {
    async fn validator(&self, config: &IssuerConfig) -> Result<Arc<dyn UserGetter>>;
}

/// A fixed tenant list.
#[derive(Debug, Clone, Default)]
pub struct StaticIssuerList(pub Vec<IssuerConfig>);

#[async_trait]
impl IssuerListProvider for StaticIssuerList {
    async fn issuers(&self) -> Result<Vec<IssuerConfig>> {
        Ok(self.0.clone())
    }
}

/// A cache entry: an issuer configuration and its lazily built validator.
pub struct Issuer {
    config: IssuerConfig,
    validator: Arc<OnceCell<Arc<dyn UserGetter>>>,
}

impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issuer")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Issuer {
    fn new(config: IssuerConfig) -> Self {
        Self {
            config,
            validator: Arc::new(OnceCell::new()),
        }
    }

    /// Same validator, new annotations.
    fn reannotated(&self, annotations: Annotations) -> Self {
        Self {
            config: IssuerConfig {
                annotations,
                ..self.config.clone()
            },
            validator: Arc::clone(&self.validator),
        }
    }

    pub const fn config(&self) -> &IssuerConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.validator.initialized()
    }

    /// The validator, if it has been built.
    pub fn validator(&self) -> Option<Arc<dyn UserGetter>> {
        self.validator.get().cloned()
    }
}

/// Reload scheduling for [`IssuerCache`].
#[derive(Debug, Clone, Copy)]
pub struct IssuerCacheOptions {
    pub reload_interval: Duration,
    /// Used instead of `reload_interval` while the last reload failed.
    pub retry_interval: Duration,
}

impl Default for IssuerCacheOptions {
    fn default() -> Self {
        Self {
            reload_interval: DEFAULT_RELOAD_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl IssuerCacheOptions {
    #[must_use]
    pub const fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Replace zero intervals with the defaults.
    fn sanitized(self) -> Self {
        let mut options = self;
        if options.reload_interval.is_zero() {
            tracing::warn!(default = ?DEFAULT_RELOAD_INTERVAL, "Zero issuer reload interval, using default");
            options.reload_interval = DEFAULT_RELOAD_INTERVAL;
        }
        if options.retry_interval.is_zero() {
            tracing::warn!(default = ?DEFAULT_RETRY_INTERVAL, "Zero issuer retry interval, using default");
            options.retry_interval = DEFAULT_RETRY_INTERVAL;
        }
        options
    }
}

struct Inner {
    entries: RwLock<HashMap<IssuerKey, Arc<Issuer>>>,
    issuers: Arc<dyn IssuerListProvider>,
    validators: Arc<dyn ValidatorProvider>,
}

/// `UserGetter` backed by many tenants' issuers.
///
/// Dropping the cache stops its reload task.
pub struct IssuerCache {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
}

impl fmt::Debug for IssuerCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl IssuerCache {
    /// Load the tenant list and start the reload task.
    ///
    /// A failing initial load is logged and retried on the retry interval;
    /// the cache starts empty in that case. Zero intervals fall back to the
    /// defaults.
    pub async fn new<L, V>(issuers: L, validators: V, options: IssuerCacheOptions) -> Self
    where
        L: IssuerListProvider + 'static,
        V: ValidatorProvider + 'static,
    {
        let options = options.sanitized();
        let inner = Arc::new(Inner {
            entries: RwLock::new(HashMap::new()),
            issuers: Arc::new(issuers),
            validators: Arc::new(validators),
        });

        let retrying = inner.reload().await.is_err();
        let shutdown = CancellationToken::new();
        tokio::spawn(reload_loop(
            Arc::clone(&inner),
            options,
            retrying,
            shutdown.clone(),
        ));

        Self { inner, shutdown }
    }

    /// Re-read the tenant list now. On failure the current entries stay.
    pub async fn reload(&self) -> Result<()> {
        self.inner.reload().await
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// All cache keys, sorted.
    pub fn keys(&self) -> Vec<IssuerKey> {
        let mut keys: Vec<IssuerKey> = self.inner.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn issuer(&self, key: &IssuerKey) -> Option<Arc<Issuer>> {
        self.inner.entries.read().get(key).cloned()
    }

    /// First entry matching `issuer` and one of `audiences`, in audience order.
    fn find(&self, issuer: &str, audiences: &[String]) -> Option<Arc<Issuer>> {
        let entries = self.inner.entries.read();
        audiences.iter().find_map(|client_id| {
            tracing::debug!(issuer, client_id = %client_id, "Looking up issuer");
            entries.get(&IssuerKey::new(issuer, client_id)).cloned()
        })
    }

    async fn validator_for(&self, issuer: &Issuer) -> Result<Arc<dyn UserGetter>> {
        let validators = &self.inner.validators;
        let config = &issuer.config;
        let validator = issuer
            .validator
            .get_or_try_init(|| async {
                tracing::info!(tenant = %config.tenant, issuer = %config.issuer, "Building validator");
                validators.validator(config).await
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    tenant = %config.tenant,
                    issuer = %config.issuer,
                    error = %e,
                    "Validator construction failed, will retry on next request"
                );
                e
            })?;
        Ok(Arc::clone(validator))
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for IssuerCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl UserGetter for IssuerCache {
    async fn user(&self, parts: &Parts) -> Result<Arc<User>> {
        let claims = parse_claims_unvalidated(parts)?;
        let issuer = self
            .find(&claims.iss, &claims.audiences())
            .ok_or(AuthError::IssuerNotFound)?;

        tracing::debug!(key = %issuer.config.key(), tenant = %issuer.config.tenant, "Found issuer");

        let validator = self.validator_for(&issuer).await?;
        validator.user(parts).await
    }
}

impl Inner {
    async fn reload(&self) -> Result<()> {
        match self.issuers.issuers().await {
            Ok(list) => {
                self.sync(list);
                #[cfg(feature = "metrics")]
                crate::observability::record_issuer_reload("success", self.entries.read().len());
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Error updating issuer cache");
                #[cfg(feature = "metrics")]
                crate::observability::record_issuer_reload("error", self.entries.read().len());
                Err(e)
            }
        }
    }

    /// Reconcile the cache with `list` in one write-locked step.
    fn sync(&self, list: Vec<IssuerConfig>) {
        let mut seen = HashSet::with_capacity(list.len());
        let mut incoming: HashMap<String, IssuerConfig> = HashMap::with_capacity(list.len());
        let mut order = Vec::with_capacity(list.len());
        for config in list {
            if !seen.insert(config.tenant.clone()) {
                tracing::info!(tenant = %config.tenant, "Skipping duplicate tenant in issuer list");
                continue;
            }
            order.push(config.tenant.clone());
            incoming.insert(config.tenant.clone(), config);
        }

        let mut entries = self.entries.write();
        let mut next: HashMap<IssuerKey, Arc<Issuer>> = HashMap::with_capacity(incoming.len());

        for (key, issuer) in entries.drain() {
            let tenant = &issuer.config.tenant;
            let Some(config) = incoming.remove(tenant) else {
                tracing::info!(tenant = %tenant, key = %key, "Deleting tenant from issuer cache");
                continue;
            };

            let new_key = config.key();
            let entry = if new_key == key {
                if issuer.config.annotations == config.annotations {
                    issuer
                } else {
                    tracing::info!(tenant = %tenant, key = %key, "Updating tenant annotations");
                    Arc::new(issuer.reannotated(config.annotations))
                }
            } else {
                tracing::info!(tenant = %tenant, old_key = %key, key = %new_key, "Tenant changed issuer, replacing entry");
                Arc::new(Issuer::new(config))
            };
            insert_unique(&mut next, new_key, entry);
        }

        for tenant in order {
            if let Some(config) = incoming.remove(&tenant) {
                let key = config.key();
                tracing::info!(tenant = %tenant, key = %key, "Adding tenant to issuer cache");
                insert_unique(&mut next, key, Arc::new(Issuer::new(config)));
            }
        }

        *entries = next;
    }
}

fn insert_unique(entries: &mut HashMap<IssuerKey, Arc<Issuer>>, key: IssuerKey, issuer: Arc<Issuer>) {
    match entries.entry(key) {
        std::collections::hash_map::Entry::Occupied(existing) => {
            tracing::warn!(
                key = %existing.key(),
                kept = %existing.get().config.tenant,
                dropped = %issuer.config.tenant,
                "Two tenants share one issuer and client id"
            );
        }
        std::collections::hash_map::Entry::Vacant(slot) => {
            slot.insert(issuer);
        }
    }
}

async fn reload_loop(
    inner: Arc<Inner>,
    options: IssuerCacheOptions,
    mut retrying: bool,
    shutdown: CancellationToken,
) {
    loop {
        let wait = if retrying {
            options.retry_interval
        } else {
            options.reload_interval
        };

        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::debug!("Issuer cache reload task shutting down");
                break;
            }
            () = tokio::time::sleep(wait) => {}
        }

        tracing::info!("Updating issuer cache");
        let failed = inner.reload().await.is_err();
        if failed && !retrying {
            tracing::warn!(retry_in = ?options.retry_interval, "Issuer reload failed, switching to retry interval");
        }
        retrying = failed;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::auth::getter::testing::{Fixed, empty_parts, parts_with_header};

    const ISS_A: &str = "https://a.example.com";
    const ISS_B: &str = "https://b.example.com";

    #[derive(Debug, Default)]
    struct TestList {
        list: Mutex<Option<Vec<IssuerConfig>>>,
        reads: AtomicUsize,
    }

    impl TestList {
        fn new(list: Vec<IssuerConfig>) -> Arc<Self> {
            Arc::new(Self {
                list: Mutex::new(Some(list)),
                reads: AtomicUsize::new(0),
            })
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn set(&self, list: Option<Vec<IssuerConfig>>) {
            *self.list.lock() = list;
        }
    }

    #[async_trait]
    impl IssuerListProvider for Arc<TestList> {
        async fn issuers(&self) -> Result<Vec<IssuerConfig>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.list
                .lock()
                .clone()
                .ok_or_else(|| AuthError::IssuerList("list unavailable".into()))
        }
    }

    /// Builds a getter that answers with the tenant name. Fails while
    /// `failures` is positive.
    #[derive(Debug, Default)]
    struct TestValidators {
        builds: AtomicUsize,
        failures: AtomicUsize,
        delay: Option<Duration>,
    }

    impl TestValidators {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ValidatorProvider for Arc<TestValidators> {
        async fn validator(&self, config: &IssuerConfig) -> Result<Arc<dyn UserGetter>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AuthError::DiscoveryFailed("provider down".into()));
            }
            Ok(Fixed::user(&config.tenant))
        }
    }

    fn token_parts(issuer: &str, audience: &[&str]) -> Parts {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "RS256", "kid": "k"}).to_string());
        let claims = URL_SAFE_NO_PAD.encode(json!({"iss": issuer, "aud": audience}).to_string());
        parts_with_header("Authorization", &format!("Bearer {header}.{claims}.c2ln"))
    }

    fn tenants() -> Vec<IssuerConfig> {
        vec![
            IssuerConfig::new("t1", ISS_A, "cidA"),
            IssuerConfig::new("t2", ISS_B, "cidB"),
        ]
    }

    async fn cache(list: &Arc<TestList>, validators: &Arc<TestValidators>) -> IssuerCache {
        IssuerCache::new(
            Arc::clone(list),
            Arc::clone(validators),
            IssuerCacheOptions::default(),
        )
        .await
    }

    #[test]
    fn test_issuer_key_display() {
        let key = IssuerConfig::new("t1", ISS_A, "cidA").key();
        assert_eq!(key.to_string(), "cidA|https://a.example.com");
        assert_eq!(key.issuer(), ISS_A);
        assert_eq!(key.client_id(), "cidA");
    }

    #[tokio::test]
    async fn test_lookup_builds_validator_once() {
        let validators = TestValidators::new();
        let cache = cache(&TestList::new(tenants()), &validators).await;
        assert_eq!(validators.builds(), 0);

        let user = cache.user(&token_parts(ISS_A, &["cidA"])).await.unwrap();
        assert_eq!(user.name, "t1");
        let user = cache.user(&token_parts(ISS_A, &["cidA"])).await.unwrap();
        assert_eq!(user.name, "t1");
        assert_eq!(validators.builds(), 1);

        let user = cache.user(&token_parts(ISS_B, &["cidB"])).await.unwrap();
        assert_eq!(user.name, "t2");
        assert_eq!(validators.builds(), 2);
    }

    #[tokio::test]
    async fn test_lookup_tries_audiences_in_order() {
        let validators = TestValidators::new();
        let cache = cache(&TestList::new(tenants()), &validators).await;

        let user = cache
            .user(&token_parts(ISS_A, &["unknown", "cidA"]))
            .await
            .unwrap();
        assert_eq!(user.name, "t1");
    }

    #[tokio::test]
    async fn test_unknown_issuer_is_not_found() {
        let validators = TestValidators::new();
        let cache = cache(&TestList::new(tenants()), &validators).await;

        let err = cache
            .user(&token_parts(ISS_A, &["cidB"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IssuerNotFound));

        let err = cache.user(&token_parts(ISS_A, &[])).await.unwrap_err();
        assert!(matches!(err, AuthError::IssuerNotFound));
        assert_eq!(validators.builds(), 0);
    }

    #[tokio::test]
    async fn test_unroutable_algorithm_is_invalid_token() {
        let validators = TestValidators::new();
        let cache = cache(&TestList::new(tenants()), &validators).await;
        let claims = URL_SAFE_NO_PAD.encode(json!({"iss": ISS_A, "aud": ["cidA"]}).to_string());

        for (alg, signature) in [("HS256", "c2ln"), ("none", "")] {
            let header = URL_SAFE_NO_PAD.encode(json!({"alg": alg, "kid": "k"}).to_string());
            let parts = parts_with_header(
                "Authorization",
                &format!("Bearer {header}.{claims}.{signature}"),
            );
            let err = cache.user(&parts).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidToken), "{alg}: {err:?}");
        }
        assert_eq!(validators.builds(), 0);
    }

    #[tokio::test]
    async fn test_missing_token_is_no_auth() {
        let cache = cache(&TestList::new(tenants()), &TestValidators::new()).await;
        let err = cache.user(&empty_parts()).await.unwrap_err();
        assert!(matches!(err, AuthError::NoAuthFound));
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let list = TestList::new(tenants());
        let validators = TestValidators::new();
        let cache = cache(&list, &validators).await;
        cache.user(&token_parts(ISS_A, &["cidA"])).await.unwrap();

        let key = IssuerConfig::new("t1", ISS_A, "cidA").key();
        let before = cache.issuer(&key).unwrap().validator().unwrap();
        let keys_before = cache.keys();

        cache.reload().await.unwrap();
        cache.reload().await.unwrap();

        assert_eq!(cache.keys(), keys_before);
        let after = cache.issuer(&key).unwrap().validator().unwrap();
        assert!(Arc::ptr_eq(&before, &after));

        cache.user(&token_parts(ISS_A, &["cidA"])).await.unwrap();
        assert_eq!(validators.builds(), 1);
    }

    #[tokio::test]
    async fn test_annotation_change_keeps_validator() {
        let list = TestList::new(tenants());
        let validators = TestValidators::new();
        let cache = cache(&list, &validators).await;
        cache.user(&token_parts(ISS_A, &["cidA"])).await.unwrap();

        let mut changed = tenants();
        changed[0] = changed[0].clone().with_annotation("plan", "gold");
        list.set(Some(changed));
        cache.reload().await.unwrap();

        let key = IssuerConfig::new("t1", ISS_A, "cidA").key();
        let issuer = cache.issuer(&key).unwrap();
        assert_eq!(issuer.config().annotations.get("plan").unwrap(), "gold");
        assert!(issuer.is_initialized());

        cache.user(&token_parts(ISS_A, &["cidA"])).await.unwrap();
        assert_eq!(validators.builds(), 1);
    }

    #[tokio::test]
    async fn test_issuer_change_replaces_entry() {
        let list = TestList::new(tenants());
        let validators = TestValidators::new();
        let cache = cache(&list, &validators).await;
        cache.user(&token_parts(ISS_A, &["cidA"])).await.unwrap();

        list.set(Some(vec![
            IssuerConfig::new("t1", ISS_A, "cidA2"),
            IssuerConfig::new("t2", ISS_B, "cidB"),
        ]));
        cache.reload().await.unwrap();

        assert!(cache.issuer(&IssuerKey::new(ISS_A, "cidA")).is_none());
        let moved = cache.issuer(&IssuerKey::new(ISS_A, "cidA2")).unwrap();
        assert!(!moved.is_initialized());

        let err = cache
            .user(&token_parts(ISS_A, &["cidA"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::IssuerNotFound));

        let user = cache.user(&token_parts(ISS_A, &["cidA2"])).await.unwrap();
        assert_eq!(user.name, "t1");
        assert_eq!(validators.builds(), 2);
    }

    #[tokio::test]
    async fn test_removed_tenant_is_deleted_and_new_tenant_added() {
        let list = TestList::new(tenants());
        let cache = cache(&list, &TestValidators::new()).await;
        assert_eq!(cache.len(), 2);

        list.set(Some(vec![
            IssuerConfig::new("t2", ISS_B, "cidB"),
            IssuerConfig::new("t3", ISS_A, "cidC"),
        ]));
        cache.reload().await.unwrap();

        assert_eq!(
            cache.keys(),
            vec![IssuerKey::new(ISS_B, "cidB"), IssuerKey::new(ISS_A, "cidC")]
        );
    }

    #[tokio::test]
    async fn test_duplicate_tenants_first_wins() {
        let list = TestList::new(vec![
            IssuerConfig::new("t1", ISS_A, "first"),
            IssuerConfig::new("t1", ISS_B, "second"),
        ]);
        let cache = cache(&list, &TestValidators::new()).await;

        assert_eq!(cache.keys(), vec![IssuerKey::new(ISS_A, "first")]);
    }

    #[tokio::test]
    async fn test_failed_construction_is_retried() {
        let validators = Arc::new(TestValidators {
            failures: AtomicUsize::new(1),
            ..TestValidators::default()
        });
        let cache = cache(&TestList::new(tenants()), &validators).await;

        let err = cache
            .user(&token_parts(ISS_A, &["cidA"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DiscoveryFailed(_)));
        assert!(!cache.issuer(&IssuerKey::new(ISS_A, "cidA")).unwrap().is_initialized());

        let user = cache.user(&token_parts(ISS_A, &["cidA"])).await.unwrap();
        assert_eq!(user.name, "t1");
        assert_eq!(validators.builds(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_build_once() {
        let validators = Arc::new(TestValidators {
            delay: Some(Duration::from_millis(50)),
            ..TestValidators::default()
        });
        let cache = Arc::new(cache(&TestList::new(tenants()), &validators).await);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.user(&token_parts(ISS_A, &["cidA"])).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().name, "t1");
        }
        assert_eq!(validators.builds(), 1);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_last_known_good() {
        let list = TestList::new(tenants());
        let cache = cache(&list, &TestValidators::new()).await;

        list.set(None);
        let err = cache.reload().await.unwrap_err();
        assert!(matches!(err, AuthError::IssuerList(_)));
        assert_eq!(cache.len(), 2);

        cache.user(&token_parts(ISS_B, &["cidB"])).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_failure_switches_to_retry_interval() {
        let list = TestList::failing();
        let cache = IssuerCache::new(
            Arc::clone(&list),
            TestValidators::new(),
            IssuerCacheOptions::default()
                .with_reload_interval(Duration::from_secs(3600))
                .with_retry_interval(Duration::from_secs(1)),
        )
        .await;
        assert!(cache.is_empty());

        list.set(Some(tenants()));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_intervals_fall_back_to_defaults() {
        let list = TestList::failing();
        let _cache = IssuerCache::new(
            Arc::clone(&list),
            TestValidators::new(),
            IssuerCacheOptions::default()
                .with_reload_interval(Duration::ZERO)
                .with_retry_interval(Duration::ZERO),
        )
        .await;
        assert_eq!(list.reads(), 1);

        tokio::time::sleep(DEFAULT_RETRY_INTERVAL / 2).await;
        assert_eq!(list.reads(), 1);

        tokio::time::sleep(DEFAULT_RETRY_INTERVAL).await;
        assert_eq!(list.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_reload_picks_up_changes() {
        let list = TestList::new(tenants());
        let cache = IssuerCache::new(
            Arc::clone(&list),
            TestValidators::new(),
            IssuerCacheOptions::default().with_reload_interval(Duration::from_secs(60)),
        )
        .await;
        assert_eq!(cache.len(), 2);

        list.set(Some(vec![IssuerConfig::new("t1", ISS_A, "cidA")]));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.len(), 1);
    }
}
