//! Authentication middleware for axum
//!
//! This module requires the `http` feature for axum integration.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use super::context::{get_user_from_context, put_user_in_context};
use super::getter::UserGetter;
use super::user::User;

/// Authentication state for middleware
#[derive(Clone)]
pub struct AuthState {
    pub getter: Arc<dyn UserGetter>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState").finish_non_exhaustive()
    }
}

impl AuthState {
    pub fn new<G: UserGetter + 'static>(getter: G) -> Self {
        Self {
            getter: Arc::new(getter),
        }
    }
}

/// Resolve the request's user and store it in the request extensions.
///
/// Any error of the getter rejects the request with `401`. Whether guests
/// may proceed is up to the handlers.
pub async fn authenticate(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (mut parts, body) = request.into_parts();

    let user = state.getter.user(&parts).await.map_err(|e| {
        tracing::warn!(error = %e, path = %parts.uri.path(), "Authentication failed");
        StatusCode::UNAUTHORIZED
    })?;

    tracing::debug!(user = %user.name, tenant = %user.tenant, "Authenticated request");
    put_user_in_context(&mut parts.extensions, user);

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Extractor for the user resolved by [`authenticate`]; the guest when the
/// middleware did not run.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Arc<User>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(get_user_from_context(&parts.extensions)))
    }
}

impl std::ops::Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::AuthenticatorChain;
    use crate::auth::error::AuthError;
    use crate::auth::getter::testing::Fixed;

    async fn whoami(user: CurrentUser) -> String {
        user.name.clone()
    }

    fn app(state: AuthState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(axum::middleware::from_fn_with_state(state, authenticate))
    }

    fn request(auth_header: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri("/whoami").method("GET");
        if let Some(header) = auth_header {
            builder = builder.header("Authorization", header);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_resolved_user_reaches_handler() {
        let response = app(AuthState::new(Fixed::user("achim")))
            .oneshot(request(Some("Bearer abc")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "achim");
    }

    #[tokio::test]
    async fn test_hard_failure_is_unauthorized() {
        let state = AuthState::new(Fixed::failing(|| AuthError::TokenExpired));
        let response = app(state).oneshot(request(Some("Bearer abc"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chain_without_credentials_is_guest() {
        let response = app(AuthState::new(AuthenticatorChain::new()))
            .oneshot(request(None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, crate::constants::GUEST_NAME);
    }

    #[tokio::test]
    async fn test_extractor_without_middleware_is_guest() {
        let app = Router::new().route("/whoami", get(whoami));
        let response = app.oneshot(request(None)).await.unwrap();
        assert_eq!(body_string(response).await, crate::constants::GUEST_NAME);
    }
}
