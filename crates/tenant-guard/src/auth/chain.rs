//! Ordered authenticator chain

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::request::Parts;

use super::error::Result;
use super::getter::UserGetter;
use super::hmac::HmacAuth;
use super::user::User;

/// Tries HMAC authenticators in the order they were added, then the bearer
/// authenticator.
///
/// The first identity wins. Fall-through errors (see
/// [`AuthError::is_fallthrough`](super::AuthError::is_fallthrough)) move on to
/// the next authenticator, any other error is returned as is. When nothing
/// applies the request is a guest.
#[derive(Default, Clone)]
pub struct AuthenticatorChain {
    hmac: Vec<HmacAuth>,
    bearer: Option<Arc<dyn UserGetter>>,
}

impl fmt::Debug for AuthenticatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorChain")
            .field("hmac", &self.hmac)
            .field("bearer", &self.bearer.is_some())
            .finish()
    }
}

impl AuthenticatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_hmac(mut self, auth: HmacAuth) -> Self {
        self.hmac.push(auth);
        self
    }

    /// Set the bearer authenticator, replacing any previous one.
    #[must_use]
    pub fn with_bearer<G: UserGetter + 'static>(mut self, getter: G) -> Self {
        self.bearer = Some(Arc::new(getter));
        self
    }

    pub fn len(&self) -> usize {
        self.hmac.len() + usize::from(self.bearer.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn authenticators(&self) -> impl Iterator<Item = (&str, &dyn UserGetter)> {
        self.hmac
            .iter()
            .map(|h| ("hmac", h as &dyn UserGetter))
            .chain(self.bearer.iter().map(|b| ("bearer", b.as_ref())))
    }
}

#[async_trait]
impl UserGetter for AuthenticatorChain {
    async fn user(&self, parts: &Parts) -> Result<Arc<User>> {
        for (method, auth) in self.authenticators() {
            match auth.user(parts).await {
                Ok(user) => {
                    #[cfg(feature = "metrics")]
                    crate::observability::record_authentication(method, "success");
                    return Ok(user);
                }
                Err(e) if e.is_fallthrough() => {
                    tracing::debug!(method, error = %e, "Authenticator not applicable");
                }
                Err(e) => {
                    tracing::debug!(method, error = %e, "Authentication failed");
                    #[cfg(feature = "metrics")]
                    crate::observability::record_authentication(method, "failure");
                    return Err(e);
                }
            }
        }

        #[cfg(feature = "metrics")]
        crate::observability::record_authentication("none", "guest");
        Ok(User::guest())
    }
}
