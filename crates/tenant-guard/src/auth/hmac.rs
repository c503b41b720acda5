//! Shared-secret HMAC request authentication
//!
//! A signed request carries three headers:
//!
//! ```text
//! Authorization: <type> <hex(HMAC-SHA256(key, ts || method || nonce))>
//! X-Date:        <RFC3339 timestamp, seconds precision>
//! X-Nonce:       <random alphanumerics>
//! ```
//!
//! The identity of a verified request is the user bound to the
//! authenticator, never anything taken from the request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use http::request::Parts;
use http::Method;
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::{AuthError, Result};
use super::getter::UserGetter;
use super::user::User;
use crate::constants::{DEFAULT_HMAC_LIFETIME, NONCE_HEADER, NONCE_LEN, TS_HEADER};

type HmacSha256 = Hmac<Sha256>;

/// Source of the per-request nonce written by [`HmacAuth::add_auth`].
pub trait NonceSource: Send + Sync + fmt::Debug {
    fn nonce(&self) -> String;
}

/// Random alphanumeric nonces from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomNonce;

impl NonceSource for RandomNonce {
    fn nonce(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect()
    }
}

/// HMAC authenticator for one authorization type and shared key.
#[derive(Clone)]
pub struct HmacAuth {
    auth_type: String,
    key: Vec<u8>,
    user: Arc<User>,
    lifetime: Duration,
    nonces: Arc<dyn NonceSource>,
}

impl fmt::Debug for HmacAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacAuth")
            .field("auth_type", &self.auth_type)
            .field("key", &"<redacted>")
            .field("user", &self.user.name)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl HmacAuth {
    /// Authenticator bound to the guest identity with the default lifetime.
    pub fn new(auth_type: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            auth_type: auth_type.into(),
            key: key.into(),
            user: User::guest(),
            lifetime: DEFAULT_HMAC_LIFETIME,
            nonces: Arc::new(RandomNonce),
        }
    }

    /// Identity returned for verified requests.
    #[must_use]
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Arc::new(user);
        self
    }

    /// Accepted clock distance of the request timestamp. Zero disables the
    /// check.
    #[must_use]
    pub const fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_nonce_source<N: NonceSource + 'static>(mut self, nonces: N) -> Self {
        self.nonces = Arc::new(nonces);
        self
    }

    pub fn auth_type(&self) -> &str {
        &self.auth_type
    }

    pub fn bound_user(&self) -> &User {
        &self.user
    }

    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn mac(&self, ts: &str, segments: &[&[u8]]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AuthError::Config(format!("invalid HMAC key: {e}")))?;
        mac.update(ts.as_bytes());
        for segment in segments {
            mac.update(segment);
        }
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// MAC over `ts` and `segments`, returned with the formatted timestamp
    /// it was computed over.
    pub fn create(&self, ts: DateTime<Utc>, segments: &[&[u8]]) -> Result<(String, String)> {
        let ts = ts.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mac = self.mac(&ts, segments)?;
        Ok((mac, ts))
    }

    /// Sign a request for `method` by writing the authorization, timestamp
    /// and nonce headers.
    pub fn add_auth(&self, headers: &mut HeaderMap, ts: DateTime<Utc>, method: &Method) -> Result<()> {
        let nonce = self.nonces.nonce();
        let (mac, ts) = self.create(ts, &[method.as_str().as_bytes(), nonce.as_bytes()])?;

        headers.insert(AUTHORIZATION, header_value(&format!("{} {mac}", self.auth_type))?);
        headers.insert(TS_HEADER, header_value(&ts)?);
        headers.insert(NONCE_HEADER, header_value(&nonce)?);
        Ok(())
    }

    fn verify(&self, headers: &HeaderMap, method: &Method) -> Result<()> {
        let auth = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::NoAuthFound)?
            .to_str()
            .map_err(|_| AuthError::UnknownAuthFound)?
            .trim();
        if auth.is_empty() {
            return Err(AuthError::NoAuthFound);
        }

        let (auth_type, mac) = auth
            .split_once(' ')
            .map(|(t, m)| (t, m.trim()))
            .filter(|(_, m)| !m.is_empty())
            .ok_or(AuthError::IllegalAuthFound)?;
        if auth_type != self.auth_type {
            return Err(AuthError::IllegalAuthFound);
        }

        let raw_ts = header_str(headers, TS_HEADER);
        let ts = DateTime::parse_from_rfc3339(raw_ts)
            .map_err(|_| AuthError::UnknownTimestamp {
                value: raw_ts.to_string(),
                header: TS_HEADER,
            })?
            .with_timezone(&Utc);
        self.check_window(ts, raw_ts)?;

        // Signed over the canonical form, not the header text.
        let nonce = header_str(headers, NONCE_HEADER);
        let (expected, _) = self.create(ts, &[method.as_str().as_bytes(), nonce.as_bytes()])?;
        if bool::from(expected.as_bytes().ct_eq(mac.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::WrongHmac)
        }
    }

    fn check_window(&self, ts: DateTime<Utc>, raw: &str) -> Result<()> {
        if self.lifetime.is_zero() {
            return Ok(());
        }
        let lifetime = TimeDelta::from_std(self.lifetime).unwrap_or(TimeDelta::MAX);
        let age = Utc::now().signed_duration_since(ts);
        if age > lifetime {
            return Err(AuthError::TimestampTooOld(raw.to_string()));
        }
        if -age > lifetime {
            return Err(AuthError::TimestampInFuture(raw.to_string()));
        }
        Ok(())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AuthError::Config(format!("invalid header value: {e}")))
}

#[async_trait]
impl UserGetter for HmacAuth {
    async fn user(&self, parts: &Parts) -> Result<Arc<User>> {
        self.verify(&parts.headers, &parts.method)?;
        tracing::debug!(auth_type = %self.auth_type, user = %self.user.name, "HMAC verified");
        Ok(Arc::clone(&self.user))
    }
}
