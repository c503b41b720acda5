//! Generic OpenID Connect validator
//!
//! Discovers the provider with `openidconnect`, then verifies ID tokens
//! against the provider's JWKS, held by a [`KeySetActor`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::request::Parts;
use jsonwebtoken::Algorithm;
use openidconnect::IssuerUrl;
use openidconnect::core::CoreProviderMetadata;
use url::Url;

use super::claims::OidcClaims;
use super::error::{AuthError, Result};
use super::getter::UserGetter;
use super::issuer_cache::{IssuerConfig, ValidatorProvider};
use super::jwks::HttpKeySetFetcher;
use super::jwt::{VerifyPolicy, verify_token};
use super::keyset::{KeySetActor, KeySetOptions};
use super::token::extract_bearer;
use super::user::{ResourceAccess, User};
use crate::constants::{DEFAULT_FETCH_TIMEOUT, DEFAULT_KEY_REFRESH_INTERVAL};

/// Endpoints learned from a provider's discovery document.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// Issuer exactly as the provider spells it.
    pub issuer: String,
    pub jwks_uri: Url,
}

/// Fetch `<issuer>/.well-known/openid-configuration`.
///
/// The discovered issuer must equal `issuer`.
pub async fn discover(issuer: &str, timeout: Duration) -> Result<ProviderEndpoints> {
    tracing::info!(issuer, "Discovering OIDC provider");

    let issuer_url = IssuerUrl::new(issuer.to_string())
        .map_err(|e| AuthError::Config(format!("Invalid issuer URL: {e}")))?;

    // Use the reqwest client that openidconnect re-exports to avoid version conflicts
    let http_client = openidconnect::reqwest::Client::builder()
        .timeout(timeout)
        .redirect(openidconnect::reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| AuthError::Config(format!("Failed to create HTTP client: {e}")))?;

    let metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
        .await
        .map_err(|e| AuthError::DiscoveryFailed(e.to_string()))?;

    let jwks_uri = Url::parse(metadata.jwks_uri().as_str())
        .map_err(|e| AuthError::DiscoveryFailed(format!("Invalid JWKS URI: {e}")))?;

    Ok(ProviderEndpoints {
        issuer: metadata.issuer().as_str().to_string(),
        jwks_uri,
    })
}

/// Maps verified claims of a tenant's issuer to a [`User`].
pub type GenericUserExtractor =
    Arc<dyn Fn(&IssuerConfig, &OidcClaims) -> Result<User> + Send + Sync>;

/// Default mapping: the tenant comes from the issuer configuration and
/// roles become groups.
pub fn default_generic_user_extractor(config: &IssuerConfig, claims: &OidcClaims) -> Result<User> {
    Ok(User {
        issuer: claims.iss.clone(),
        subject: claims.sub.clone(),
        name: claims.username().to_string(),
        email: claims.email.clone(),
        groups: claims.roles.iter().cloned().map(ResourceAccess::from).collect(),
        tenant: config.tenant.clone(),
        ..User::default()
    })
}

/// Options for [`GenericOidc`].
#[derive(Clone)]
pub struct GenericOidcOptions {
    pub algorithms: Vec<Algorithm>,
    /// Bound for discovery and every key fetch.
    pub timeout: Duration,
    pub refresh_interval: Duration,
    pub leeway: Duration,
    pub extractor: GenericUserExtractor,
}

impl std::fmt::Debug for GenericOidcOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericOidcOptions")
            .field("algorithms", &self.algorithms)
            .field("timeout", &self.timeout)
            .field("refresh_interval", &self.refresh_interval)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl Default for GenericOidcOptions {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512],
            timeout: DEFAULT_FETCH_TIMEOUT,
            refresh_interval: DEFAULT_KEY_REFRESH_INTERVAL,
            leeway: Duration::ZERO,
            extractor: Arc::new(default_generic_user_extractor),
        }
    }
}

impl GenericOidcOptions {
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    #[must_use]
    pub fn with_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&IssuerConfig, &OidcClaims) -> Result<User> + Send + Sync + 'static,
    {
        self.extractor = Arc::new(extractor);
        self
    }

    const fn keyset(&self) -> KeySetOptions {
        KeySetOptions {
            refresh_interval: self.refresh_interval,
            fetch_timeout: self.timeout,
            mailbox_capacity: crate::constants::KEYSET_MAILBOX_CAPACITY,
        }
    }
}

/// Validator for ID tokens of one tenant's OIDC provider.
///
/// Tokens must be issued by the discovered issuer and carry the tenant's
/// client id in their audience.
pub struct GenericOidc {
    config: IssuerConfig,
    endpoints: ProviderEndpoints,
    keys: KeySetActor,
    policy: VerifyPolicy,
    extractor: GenericUserExtractor,
}

impl std::fmt::Debug for GenericOidc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericOidc")
            .field("tenant", &self.config.tenant)
            .field("issuer", &self.endpoints.issuer)
            .field("client_id", &self.config.client_id)
            .finish_non_exhaustive()
    }
}

impl GenericOidc {
    /// Discover the provider and load its keys.
    pub async fn new(config: IssuerConfig, options: GenericOidcOptions) -> Result<Self> {
        let endpoints = discover(&config.issuer, options.timeout).await?;
        let fetcher = HttpKeySetFetcher::new(endpoints.jwks_uri.clone(), options.timeout)?;
        let keys = KeySetActor::spawn(fetcher, options.keyset()).await?;

        let policy = VerifyPolicy::new(options.algorithms.clone())
            .with_audience(vec![config.client_id.clone()])
            .with_issuer(endpoints.issuer.clone())
            .with_leeway(options.leeway);

        tracing::info!(
            tenant = %config.tenant,
            issuer = %endpoints.issuer,
            jwks_uri = %endpoints.jwks_uri,
            "OIDC validator ready"
        );

        Ok(Self {
            config,
            endpoints,
            keys,
            policy,
            extractor: options.extractor,
        })
    }

    pub const fn config(&self) -> &IssuerConfig {
        &self.config
    }

    pub const fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    /// Verify a raw ID token and map its claims to a user.
    pub async fn user_from_token(&self, token: &str) -> Result<Arc<User>> {
        let claims: OidcClaims = verify_token(token, &self.keys, &self.policy).await?;
        let user = (self.extractor)(&self.config, &claims)?;
        Ok(Arc::new(user))
    }
}

#[async_trait]
impl UserGetter for GenericOidc {
    async fn user(&self, parts: &Parts) -> Result<Arc<User>> {
        let token = extract_bearer(&parts.headers)?;
        self.user_from_token(token).await
    }
}

/// Builds a [`GenericOidc`] per tenant for the issuer cache.
#[derive(Debug, Clone, Default)]
pub struct GenericOidcProvider {
    options: GenericOidcOptions,
}

impl GenericOidcProvider {
    #[must_use]
    pub const fn new(options: GenericOidcOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ValidatorProvider for GenericOidcProvider {
    async fn validator(&self, config: &IssuerConfig) -> Result<Arc<dyn UserGetter>> {
        let oidc = GenericOidc::new(config.clone(), self.options.clone()).await?;
        Ok(Arc::new(oidc))
    }
}
