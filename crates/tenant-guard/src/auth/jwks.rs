//! JWKS wire types and fetching

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{AuthError, Result};

/// JSON Web Key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key ID
    #[serde(default)]
    pub kid: Option<String>,
    /// Key type (RSA, EC, OKP)
    pub kty: String,
    /// Algorithm
    #[serde(default)]
    pub alg: Option<String>,
    /// Key usage
    #[serde(default)]
    pub r#use: Option<String>,
    // RSA components
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    // EC / OKP components
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

/// JSON Web Key Set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// A decoded verification key.
#[derive(Clone)]
pub struct JwkEntry {
    key: DecodingKey,
    kty: String,
    algorithm: Option<Algorithm>,
}

impl std::fmt::Debug for JwkEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwkEntry")
            .field("kty", &self.kty)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl JwkEntry {
    pub const fn key(&self) -> &DecodingKey {
        &self.key
    }

    pub const fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Whether this key may verify a signature made with `alg`.
    ///
    /// A key that declares its algorithm only verifies that algorithm,
    /// otherwise the key type decides.
    pub fn supports(&self, alg: Algorithm) -> bool {
        if let Some(declared) = self.algorithm {
            return declared == alg;
        }
        match self.kty.as_str() {
            "RSA" => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            "EC" => matches!(alg, Algorithm::ES256 | Algorithm::ES384),
            "OKP" => alg == Algorithm::EdDSA,
            _ => false,
        }
    }
}

/// One issuer's signing keys at a point in time.
///
/// Key sets are never mutated: every refresh builds a new one with a
/// higher revision and readers keep whatever snapshot they already hold.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, JwkEntry>,
    revision: u64,
}

impl KeySet {
    /// Decode every usable key of `jwks`. Keys without a `kid`, of an
    /// unsupported type or with malformed components are skipped.
    pub fn from_jwks(jwks: &JwkSet, revision: u64) -> Result<Self> {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            let Some(kid) = jwk.kid.as_deref() else {
                tracing::debug!(kty = %jwk.kty, "Skipping key without kid");
                continue;
            };
            match decode_jwk(jwk) {
                Ok(Some(entry)) => {
                    keys.insert(kid.to_string(), entry);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(kid, kty = %jwk.kty, error = %e, "Skipping malformed key");
                }
            }
        }
        Ok(Self { keys, revision })
    }

    pub fn get(&self, kid: &str) -> Option<&JwkEntry> {
        self.keys.get(kid)
    }

    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

fn decode_jwk(jwk: &Jwk) -> Result<Option<JwkEntry>> {
    if jwk.r#use.as_deref().is_some_and(|u| u != "sig") {
        tracing::debug!(kid = ?jwk.kid, "Skipping non-signature key");
        return Ok(None);
    }

    let algorithm = match jwk.alg.as_deref() {
        Some(name) => match Algorithm::from_str(name) {
            Ok(alg) => Some(alg),
            Err(_) => {
                tracing::debug!(kid = ?jwk.kid, alg = name, "Skipping key with unsupported algorithm");
                return Ok(None);
            }
        },
        None => None,
    };

    let key = match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk
                .n
                .as_ref()
                .ok_or_else(|| AuthError::JwksParse("Missing 'n' in RSA key".into()))?;
            let e = jwk
                .e
                .as_ref()
                .ok_or_else(|| AuthError::JwksParse("Missing 'e' in RSA key".into()))?;
            DecodingKey::from_rsa_components(n, e)
                .map_err(|e| AuthError::JwksParse(format!("Invalid RSA components: {e}")))?
        }
        "EC" => {
            let x = jwk
                .x
                .as_ref()
                .ok_or_else(|| AuthError::JwksParse("Missing 'x' in EC key".into()))?;
            let y = jwk
                .y
                .as_ref()
                .ok_or_else(|| AuthError::JwksParse("Missing 'y' in EC key".into()))?;
            DecodingKey::from_ec_components(x, y)
                .map_err(|e| AuthError::JwksParse(format!("Invalid EC components: {e}")))?
        }
        "OKP" => {
            let x = jwk
                .x
                .as_ref()
                .ok_or_else(|| AuthError::JwksParse("Missing 'x' in OKP key".into()))?;
            DecodingKey::from_ed_components(x)
                .map_err(|e| AuthError::JwksParse(format!("Invalid OKP components: {e}")))?
        }
        other => {
            tracing::debug!(kty = other, "Skipping unsupported key type");
            return Ok(None);
        }
    };

    Ok(Some(JwkEntry {
        key,
        kty: jwk.kty.clone(),
        algorithm,
    }))
}

/// Fetches the current JWKS of one issuer.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet>;

    /// Where the keys come from, for logs and errors.
    fn endpoint(&self) -> &str;
}

#[async_trait]
impl<T: KeySetFetcher + ?Sized> KeySetFetcher for Arc<T> {
    async fn fetch(&self) -> Result<JwkSet> {
        (**self).fetch().await
    }

    fn endpoint(&self) -> &str {
        (**self).endpoint()
    }
}

/// Fetches a JWKS document over HTTP.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    url: Url,
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { url, client })
    }

    pub const fn url(&self) -> &Url {
        &self.url
    }

    fn fetch_error(&self, reason: impl ToString) -> AuthError {
        AuthError::KeySetFetch {
            url: self.url.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<JwkSet> {
        tracing::debug!(jwks_uri = %self.url, "Fetching JWKS");

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| self.fetch_error(e))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::JwksParse(e.to_string()))
    }

    fn endpoint(&self) -> &str {
        self.url.as_str()
    }
}
