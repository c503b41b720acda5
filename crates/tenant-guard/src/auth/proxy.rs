//! Static issuer/client-id routing

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::request::Parts;

use super::error::{AuthError, Result};
use super::getter::UserGetter;
use super::issuer_cache::IssuerKey;
use super::token::parse_claims_unvalidated;
use super::user::User;

/// Picks exactly one getter by the `(issuer, audience)` of the bearer
/// token, falling back to a default.
///
/// Audiences are tried in token order. Without a match and without a
/// default the request has no usable credential.
#[derive(Default, Clone)]
pub struct UserGetterProxy {
    getters: HashMap<IssuerKey, Arc<dyn UserGetter>>,
    default: Option<Arc<dyn UserGetter>>,
}

impl fmt::Debug for UserGetterProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.getters.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("UserGetterProxy")
            .field("mappings", &keys)
            .field("default", &self.default.is_some())
            .finish()
    }
}

impl UserGetterProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default<G: UserGetter + 'static>(getter: G) -> Self {
        Self {
            getters: HashMap::new(),
            default: Some(Arc::new(getter)),
        }
    }

    /// Route tokens of `issuer` for `client_id` to `getter`. A later mapping
    /// for the same pair replaces the earlier one.
    #[must_use]
    pub fn with_mapping<G: UserGetter + 'static>(
        mut self,
        issuer: &str,
        client_id: &str,
        getter: G,
    ) -> Self {
        self.add(issuer, client_id, getter);
        self
    }

    pub fn add<G: UserGetter + 'static>(&mut self, issuer: &str, client_id: &str, getter: G) {
        self.getters
            .insert(IssuerKey::new(issuer, client_id), Arc::new(getter));
    }

    pub fn len(&self) -> usize {
        self.getters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.getters.is_empty()
    }
}

#[async_trait]
impl UserGetter for UserGetterProxy {
    async fn user(&self, parts: &Parts) -> Result<Arc<User>> {
        let claims = parse_claims_unvalidated(parts)?;

        let mapped = claims.audiences().iter().find_map(|client_id| {
            self.getters
                .get(&IssuerKey::new(&claims.iss, client_id))
                .map(|g| (client_id.clone(), g))
        });

        let getter = match mapped {
            Some((client_id, getter)) => {
                tracing::debug!(issuer = %claims.iss, client_id = %client_id, "Routing to mapped getter");
                getter
            }
            None => self.default.as_ref().ok_or(AuthError::NoAuthFound)?,
        };
        getter.user(parts).await
    }
}
