//! The `UserGetter` capability

use std::sync::Arc;

use async_trait::async_trait;
use http::request::Parts;

use super::error::Result;
use super::user::User;

/// Resolves the authenticated user of a request.
///
/// Implemented by every authenticator in this crate: key-set backed Dex
/// validators, generic OIDC validators, HMAC authenticators, the issuer
/// cache, the authenticator chain and the static mapping proxy. Only the
/// request head is inspected, bodies are never consumed.
#[async_trait]
pub trait UserGetter: Send + Sync {
    async fn user(&self, parts: &Parts) -> Result<Arc<User>>;
}

#[async_trait]
impl<T: UserGetter + ?Sized> UserGetter for Arc<T> {
    async fn user(&self, parts: &Parts) -> Result<Arc<User>> {
        (**self).user(parts).await
    }
}
