//! JWT verification against a key-set actor

use std::time::Duration;

use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::de::DeserializeOwned;

use super::error::{AuthError, Result};
use super::keyset::KeySetActor;

/// What a token must satisfy to be accepted.
#[derive(Debug, Clone)]
pub struct VerifyPolicy {
    /// Algorithm whitelist. Tokens signed with anything else are rejected
    /// before any key is looked up.
    pub algorithms: Vec<Algorithm>,
    /// Accepted audiences; empty disables the audience check.
    pub audience: Vec<String>,
    pub issuer: Option<String>,
    pub leeway: Duration,
}

impl VerifyPolicy {
    #[must_use]
    pub const fn new(algorithms: Vec<Algorithm>) -> Self {
        Self {
            algorithms,
            audience: Vec::new(),
            issuer: None,
            leeway: Duration::ZERO,
        }
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

    /// Check the token header and return its algorithm and key id.
    ///
    /// Both fields must be present and the algorithm whitelisted; this is
    /// what keeps `none` and HMAC-signed tokens out.
    pub fn check_header(&self, token: &str) -> Result<(Algorithm, String)> {
        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;
        if !self.algorithms.contains(&header.alg) {
            tracing::debug!(alg = ?header.alg, "Token algorithm not whitelisted");
            return Err(AuthError::InvalidToken);
        }
        let kid = header.kid.ok_or(AuthError::InvalidToken)?;
        Ok((header.alg, kid))
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.validate_nbf = true;
        validation.leeway = self.leeway.as_secs();

        if self.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audience);
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

/// Verify `token` and deserialize its claims.
///
/// Signature, expiry, not-before and, where configured, issuer and audience
/// are checked by `jsonwebtoken`; its failures surface as the matching
/// [`AuthError`] variant.
pub async fn verify_token<C>(token: &str, keys: &KeySetActor, policy: &VerifyPolicy) -> Result<C>
where
    C: DeserializeOwned,
{
    let (alg, kid) = policy.check_header(token)?;
    let key = keys.key(&kid, alg).await?;
    let data = decode::<C>(token, &key, &policy.validation(alg))?;
    Ok(data.claims)
}
