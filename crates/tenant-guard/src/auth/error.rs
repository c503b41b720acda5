//! Authentication error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no auth found")]
    NoAuthFound,

    #[error("illegal auth found")]
    IllegalAuthFound,

    #[error("unknown authtype found")]
    UnknownAuthFound,

    #[error("invalid token")]
    InvalidToken,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("token used before issued")]
    TokenNotYetValid,

    #[error("invalid issuer")]
    InvalidIssuer,

    #[error("invalid audience")]
    InvalidAudience,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token verification failed: {0}")]
    Verification(#[source] jsonwebtoken::errors::Error),

    #[error("key {0:?} not found")]
    KeyNotFound(String),

    #[error("no matching key for algorithm")]
    NoMatchingKey,

    #[error("key set for {0} is closed")]
    KeySetClosed(String),

    #[error("cannot fetch keys from {url}: {reason}")]
    KeySetFetch { url: String, reason: String },

    #[error("JWKS parse failed: {0}")]
    JwksParse(String),

    #[error("OIDC discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("wrong HMAC found")]
    WrongHmac,

    #[error("unknown timestamp {value:?} in {header:?} header, use RFC3339")]
    UnknownTimestamp { value: String, header: &'static str },

    #[error("the timestamp in your header is too old: {0:?}")]
    TimestampTooOld(String),

    #[error("the timestamp in your header is in the future: {0:?}")]
    TimestampInFuture(String),

    #[error("issuer/clientid not found")]
    IssuerNotFound,

    #[error("issuer list unavailable: {0}")]
    IssuerList(String),

    #[error("claims extraction failed: {0}")]
    Claims(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Errors that mean "this authenticator does not apply to the request".
    ///
    /// An [`AuthenticatorChain`](super::AuthenticatorChain) swallows these and
    /// moves on to the next authenticator; every other error is fatal.
    #[must_use]
    pub const fn is_fallthrough(&self) -> bool {
        matches!(
            self,
            Self::NoAuthFound | Self::IllegalAuthFound | Self::UnknownAuthFound
        )
    }

    /// Errors raised while checking an HMAC signature.
    #[must_use]
    pub const fn is_hmac_failure(&self) -> bool {
        matches!(
            self,
            Self::WrongHmac
                | Self::UnknownTimestamp { .. }
                | Self::TimestampTooOld(_)
                | Self::TimestampInFuture(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::ImmatureSignature => Self::TokenNotYetValid,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            _ => Self::Verification(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
