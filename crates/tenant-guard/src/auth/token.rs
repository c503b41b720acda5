//! Bearer token helpers

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use http::request::Parts;
use jsonwebtoken::{Algorithm, decode_header};

use super::claims::UnverifiedClaims;
use super::error::{AuthError, Result};
use crate::constants::BEARER_PREFIX;

/// Algorithms a token may be routed with. Symmetric algorithms are never
/// accepted for bearer tokens.
const ROUTABLE_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::EdDSA,
];

/// Extract the bearer token from the `Authorization` header.
///
/// The `Bearer` prefix is matched case-insensitively. A missing header or a
/// credential of another scheme yields [`AuthError::NoAuthFound`].
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::NoAuthFound)?;

    match auth.get(..BEARER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => {
            let token = auth[BEARER_PREFIX.len()..].trim();
            if token.is_empty() {
                Err(AuthError::NoAuthFound)
            } else {
                Ok(token)
            }
        }
        _ => Err(AuthError::NoAuthFound),
    }
}

/// Read the registered claims of `token` WITHOUT verifying its signature.
///
/// Never trust the result for anything but picking a validator. An
/// unreadable header or a symmetric or `none` algorithm is
/// [`AuthError::InvalidToken`]; a broken payload is
/// [`AuthError::MalformedToken`].
pub fn peek_claims(token: &str) -> Result<UnverifiedClaims> {
    let header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "Unreadable token header");
        AuthError::InvalidToken
    })?;
    if !ROUTABLE_ALGORITHMS.contains(&header.alg) {
        tracing::debug!(alg = ?header.alg, "Token algorithm not routable");
        return Err(AuthError::InvalidToken);
    }

    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(AuthError::MalformedToken("expected three segments".into())),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("payload: {e}")))?;

    serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedToken(format!("claims: {e}")))
}

/// Unverified claims of the bearer token carried by a request.
pub fn parse_claims_unvalidated(parts: &Parts) -> Result<UnverifiedClaims> {
    peek_claims(extract_bearer(&parts.headers)?)
}

/// Attach `token` as a bearer credential.
pub fn add_user_token(headers: &mut HeaderMap, token: &str) -> Result<()> {
    let value = HeaderValue::try_from(format!("Bearer {token}"))
        .map_err(|_| AuthError::MalformedToken("token is not a valid header value".into()))?;
    headers.append(AUTHORIZATION, value);
    Ok(())
}
