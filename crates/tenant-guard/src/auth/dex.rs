//! Dex token validator
//!
//! Verifies bearer tokens issued by a Dex instance against the key set Dex
//! publishes at `<base_url>/keys`. The keys are owned by a [`KeySetActor`]
//! that refreshes them in the background.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;
use jsonwebtoken::Algorithm;
use url::Url;

use super::claims::DexClaims;
use super::error::{AuthError, Result};
use super::getter::UserGetter;
use super::jwks::{HttpKeySetFetcher, KeySetFetcher};
use super::jwt::{VerifyPolicy, verify_token};
use super::keyset::{KeySetActor, KeySetOptions};
use super::token::extract_bearer;
use super::user::{ResourceAccess, User};

/// Maps verified Dex claims to a [`User`].
pub type DexUserExtractor = Arc<dyn Fn(&DexClaims) -> Result<User> + Send + Sync>;

/// Default mapping: groups are copied verbatim and the tenant is the part
/// of the federated `connector_id` before its first underscore.
pub fn default_user_extractor(claims: &DexClaims) -> Result<User> {
    let tenant = claims
        .connector_id()
        .and_then(|cid| cid.split('_').next())
        .unwrap_or_default()
        .to_string();

    Ok(User {
        issuer: claims.iss.clone(),
        subject: claims.sub.clone(),
        name: claims.name.clone(),
        email: claims.email.clone(),
        groups: claims.groups.iter().cloned().map(ResourceAccess::from).collect(),
        tenant,
        ..User::default()
    })
}

/// Options for [`Dex`].
#[derive(Clone)]
pub struct DexOptions {
    pub algorithms: Vec<Algorithm>,
    pub extractor: DexUserExtractor,
    pub audience: Vec<String>,
    pub issuer: Option<String>,
    pub leeway: Duration,
    pub keyset: KeySetOptions,
}

impl std::fmt::Debug for DexOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DexOptions")
            .field("algorithms", &self.algorithms)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("leeway", &self.leeway)
            .field("keyset", &self.keyset)
            .finish_non_exhaustive()
    }
}

impl Default for DexOptions {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::RS256, Algorithm::RS512],
            extractor: Arc::new(default_user_extractor),
            audience: Vec::new(),
            issuer: None,
            leeway: Duration::ZERO,
            keyset: KeySetOptions::default(),
        }
    }
}

impl DexOptions {
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    #[must_use]
    pub fn with_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&DexClaims) -> Result<User> + Send + Sync + 'static,
    {
        self.extractor = Arc::new(extractor);
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: Vec<String>) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub const fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    #[must_use]
    pub const fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.keyset.refresh_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.keyset.fetch_timeout = timeout;
        self
    }

    fn policy(&self) -> VerifyPolicy {
        let mut policy = VerifyPolicy::new(self.algorithms.clone())
            .with_audience(self.audience.clone())
            .with_leeway(self.leeway);
        if let Some(issuer) = &self.issuer {
            policy = policy.with_issuer(issuer.clone());
        }
        policy
    }
}

/// Bearer-token validator for Dex.
pub struct Dex {
    base_url: String,
    keys: KeySetActor,
    policy: VerifyPolicy,
    extractor: DexUserExtractor,
}

impl std::fmt::Debug for Dex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dex")
            .field("base_url", &self.base_url)
            .field("keys", &self.keys)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Dex {
    /// Connect to the Dex at `base_url` with default options.
    ///
    /// Fails if the key set cannot be fetched.
    pub async fn new(base_url: &str) -> Result<Self> {
        Self::with_options(base_url, DexOptions::default()).await
    }

    pub async fn with_options(base_url: &str, options: DexOptions) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        let keys_url = Url::parse(&format!("{base_url}/keys"))
            .map_err(|e| AuthError::Config(format!("Invalid Dex URL {base_url:?}: {e}")))?;
        let fetcher = HttpKeySetFetcher::new(keys_url, options.keyset.fetch_timeout)?;
        Self::with_fetcher(base_url, fetcher, options).await
    }

    /// Build a validator on top of an arbitrary key source.
    pub async fn with_fetcher<F>(base_url: &str, fetcher: F, options: DexOptions) -> Result<Self>
    where
        F: KeySetFetcher + 'static,
    {
        let keys = KeySetActor::spawn(fetcher, options.keyset).await?;
        tracing::info!(base_url, "Dex validator ready");

        Ok(Self {
            base_url: base_url.to_string(),
            keys,
            policy: options.policy(),
            extractor: options.extractor,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub const fn keys(&self) -> &KeySetActor {
        &self.keys
    }

    /// Verify a raw token and map its claims to a user.
    pub async fn user_from_token(&self, token: &str) -> Result<Arc<User>> {
        let claims: DexClaims = verify_token(token, &self.keys, &self.policy).await?;
        let user = (self.extractor)(&claims)?;
        Ok(Arc::new(user))
    }
}

#[async_trait]
impl UserGetter for Dex {
    async fn user(&self, parts: &Parts) -> Result<Arc<User>> {
        let token = extract_bearer(&parts.headers)?;
        self.user_from_token(token).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::auth::getter::testing::{empty_parts, parts_with_header};
    use crate::auth::jwks::testing::{StaticFetcher, TEST_KID, jwks, sign};

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn dex_token(alg: Algorithm) -> String {
        sign(
            &json!({
                "iss": "https://dex.example.com",
                "sub": "ChVhY2hpbUBleGFtcGxlLmNvbQ",
                "aud": "metal-stack",
                "exp": now() + 300,
                "iat": now(),
                "name": "Achim Admin",
                "email": "achim@example.com",
                "groups": ["k8s-all-all-cadm", "maas-all-all-admin"],
                "federated_claims": {"connector_id": "tnnt_ldap_openldap", "user_id": "achim"}
            }),
            alg,
            Some(TEST_KID),
        )
    }

    async fn dex(options: DexOptions) -> Dex {
        Dex::with_fetcher(
            "https://dex.example.com",
            StaticFetcher(jwks(&[TEST_KID])),
            options,
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_default_user_extractor() {
        let claims = DexClaims {
            iss: "https://dex".into(),
            sub: "sub".into(),
            name: "n".into(),
            email: "e@x".into(),
            groups: vec!["g1".into()],
            federated_claims: HashMap::from([("connector_id".to_string(), "tnnt_ldap".to_string())]),
            ..DexClaims::default()
        };
        let user = default_user_extractor(&claims).unwrap();
        assert_eq!(user.tenant, "tnnt");
        assert_eq!(user.groups, vec![ResourceAccess::from("g1")]);
        assert_eq!(user.issuer, "https://dex");
        assert_eq!(user.subject, "sub");
    }

    #[test]
    fn test_default_user_extractor_without_connector() {
        let user = default_user_extractor(&DexClaims::default()).unwrap();
        assert_eq!(user.tenant, "");
        assert!(user.groups.is_empty());

        let claims = DexClaims {
            federated_claims: HashMap::from([("connector_id".to_string(), "nounderscore".to_string())]),
            ..DexClaims::default()
        };
        assert_eq!(default_user_extractor(&claims).unwrap().tenant, "nounderscore");
    }

    #[tokio::test]
    async fn test_user_from_valid_token() {
        let dex = dex(DexOptions::default()).await;
        let token = dex_token(Algorithm::RS256);
        let parts = parts_with_header("Authorization", &format!("Bearer {token}"));

        let user = dex.user(&parts).await.unwrap();
        assert_eq!(user.tenant, "tnnt");
        assert_eq!(user.name, "Achim Admin");
        assert_eq!(user.email, "achim@example.com");
        assert!(user.has_group(&[ResourceAccess::from("maas-all-all-admin")]));
    }

    #[tokio::test]
    async fn test_rs512_is_whitelisted_by_default() {
        let dex = dex(DexOptions::default()).await;
        let token = sign(
            &json!({"sub": "s", "exp": now() + 300}),
            Algorithm::RS512,
            Some(TEST_KID),
        );
        // The test JWK declares RS256, so the whitelist passes and the key
        // lookup refuses the algorithm.
        let err = dex.user_from_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::NoMatchingKey));
    }

    #[tokio::test]
    async fn test_algorithm_outside_whitelist() {
        let dex = dex(DexOptions::default()).await;
        let err = dex
            .user_from_token(&dex_token(Algorithm::RS384))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_custom_whitelist_and_extractor() {
        let options = DexOptions::default()
            .with_algorithms(vec![Algorithm::RS256])
            .with_extractor(|claims| {
                Ok(User {
                    name: format!("dex:{}", claims.email),
                    ..User::default()
                })
            });
        let dex = dex(options).await;

        let user = dex
            .user_from_token(&dex_token(Algorithm::RS256))
            .await
            .unwrap();
        assert_eq!(user.name, "dex:achim@example.com");
    }

    #[tokio::test]
    async fn test_extractor_error_is_surfaced() {
        let options = DexOptions::default()
            .with_extractor(|_| Err(AuthError::Claims("no groups".into())));
        let dex = dex(options).await;

        let err = dex
            .user_from_token(&dex_token(Algorithm::RS256))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Claims(msg) if msg == "no groups"));
    }

    #[tokio::test]
    async fn test_audience_check() {
        let dex = dex(DexOptions::default().with_audience(vec!["other".into()])).await;
        let err = dex
            .user_from_token(&dex_token(Algorithm::RS256))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidAudience));
    }

    #[tokio::test]
    async fn test_missing_bearer_is_no_auth() {
        let dex = dex(DexOptions::default()).await;
        let err = dex.user(&empty_parts()).await.unwrap_err();
        assert!(matches!(err, AuthError::NoAuthFound));

        let parts = parts_with_header("Authorization", "mytype 1234");
        let err = dex.user(&parts).await.unwrap_err();
        assert!(matches!(err, AuthError::NoAuthFound));
    }

    #[tokio::test]
    async fn test_unreachable_dex_fails_construction() {
        let err = Dex::with_options(
            "http://127.0.0.1:9",
            DexOptions::default().with_fetch_timeout(Duration::from_secs(2)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::KeySetFetch { .. }));
    }
}
