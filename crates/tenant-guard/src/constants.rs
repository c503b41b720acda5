//! Header names and default intervals

use std::time::Duration;

/// Header carrying bearer tokens and HMAC signatures.
pub const AUTHZ_HEADER: &str = "Authorization";

/// Companion header with the RFC3339 timestamp an HMAC was computed over.
pub const TS_HEADER: &str = "X-Date";

/// Companion header with the random nonce an HMAC was computed over.
pub const NONCE_HEADER: &str = "X-Nonce";

/// Case-insensitive prefix of bearer credentials, including the separator.
pub const BEARER_PREFIX: &str = "bearer ";

/// Length of generated HMAC nonces.
pub const NONCE_LEN: usize = 24;

/// Default HMAC validity window.
pub const DEFAULT_HMAC_LIFETIME: Duration = Duration::from_secs(15);

/// Background key-set refresh interval.
pub const DEFAULT_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Timeout for key-set fetches and OIDC discovery.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Issuer list reload interval.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Issuer list reload interval while the last reload failed.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Capacity of a key-set actor mailbox.
pub const KEYSET_MAILBOX_CAPACITY: usize = 64;

pub const GUEST_NAME: &str = "anonymous";
pub const GUEST_EMAIL: &str = "anonymous@localhost";
