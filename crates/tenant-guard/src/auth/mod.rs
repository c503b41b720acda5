//! Request authentication
//!
//! Everything here resolves an HTTP request head to a [`User`] through the
//! [`UserGetter`] capability.
//!
//! # Authenticators
//!
//! - [`Dex`] verifies bearer tokens of one Dex instance against its key set
//! - [`GenericOidc`] verifies ID tokens of a discovered OIDC provider
//! - [`HmacAuth`] verifies requests signed with a shared secret
//! - [`IssuerCache`] routes bearer tokens to per-tenant validators built on
//!   first use, keeping the tenant list in sync in the background
//! - [`AuthenticatorChain`] tries HMAC authenticators, then a bearer
//!   authenticator, and falls back to the guest
//! - [`UserGetterProxy`] routes by a static issuer/client-id table
//!
//! # Key sets
//!
//! Signing keys are owned by a [`KeySetActor`] per issuer: a tokio task
//! that serves snapshots, refreshes on a timer and refetches once when a
//! token names an unknown key.

mod chain;
mod claims;
mod context;
mod dex;
mod error;
mod getter;
mod hmac;
mod issuer_cache;
mod jwks;
mod jwt;
mod keyset;
#[cfg(feature = "http")]
mod middleware;
mod oidc;
mod proxy;
mod token;
mod user;

pub use chain::AuthenticatorChain;
pub use claims::{DexClaims, OidcClaims, OneOrMany, UnverifiedClaims};
pub use context::{get_user, get_user_from_context, put_user_in_context};
pub use dex::{Dex, DexOptions, DexUserExtractor, default_user_extractor};
pub use error::{AuthError, Result};
pub use getter::UserGetter;
pub use hmac::{HmacAuth, NonceSource, RandomNonce};
pub use issuer_cache::{
    Annotations, Issuer, IssuerCache, IssuerCacheOptions, IssuerConfig, IssuerKey,
    IssuerListProvider, StaticIssuerList, ValidatorProvider,
};
pub use jwks::{HttpKeySetFetcher, Jwk, JwkEntry, JwkSet, KeySet, KeySetFetcher};
pub use jwt::{VerifyPolicy, verify_token};
pub use keyset::{KeySetActor, KeySetOptions};
#[cfg(feature = "http")]
pub use middleware::{AuthState, CurrentUser, authenticate};
pub use oidc::{
    GenericOidc, GenericOidcOptions, GenericOidcProvider, GenericUserExtractor, ProviderEndpoints,
    default_generic_user_extractor, discover,
};
pub use proxy::UserGetterProxy;
pub use token::{add_user_token, extract_bearer, parse_claims_unvalidated, peek_claims};
pub use user::{ResourceAccess, User};
