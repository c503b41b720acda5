//! Multi-tenant request authentication.
//!
//! Resolves the [`User`](auth::User) behind an incoming HTTP request from
//! HMAC-signed headers, Dex-issued bearer tokens or per-tenant OIDC issuers.

pub mod auth;
pub mod config;
pub mod constants;
mod error;
pub mod observability;
#[cfg(feature = "http")]
pub mod server;

pub use auth::{AuthError, AuthenticatorChain, User, UserGetter};
pub use config::{BearerMode, Settings, load_settings, load_settings_from_path};
pub use error::{Error, Result};
