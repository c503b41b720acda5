mod common;

use std::time::Duration;

use serde_json::json;
use tenant_guard::auth::{
    AuthError, GenericOidcOptions, GenericOidcProvider, IssuerCache, IssuerCacheOptions,
    IssuerConfig, IssuerKey, StaticIssuerList, UserGetter,
};
use wiremock::MockServer;

use common::{KID, bearer_parts, mount_provider, now, sign};

fn id_token(issuer: &str, audience: &str) -> String {
    sign(
        &json!({
            "iss": issuer,
            "sub": "00u1",
            "aud": audience,
            "exp": now() + 300,
            "iat": now(),
            "preferred_username": "jdoe",
            "email": "jdoe@t1.example.com",
            "roles": ["viewer"],
        }),
        KID,
    )
}

async fn cache_for(configs: Vec<IssuerConfig>) -> IssuerCache {
    IssuerCache::new(
        StaticIssuerList(configs),
        GenericOidcProvider::new(GenericOidcOptions::default().with_timeout(Duration::from_secs(5))),
        IssuerCacheOptions::default(),
    )
    .await
}

#[tokio::test]
async fn test_tenant_resolved_through_discovered_provider() {
    let server = MockServer::start().await;
    mount_provider(&server, 1).await;

    let cache = cache_for(vec![IssuerConfig::new("t1", server.uri(), "client-t1")]).await;
    let key = IssuerKey::new(&server.uri(), "client-t1");
    assert!(!cache.issuer(&key).unwrap().is_initialized());

    let token = id_token(&server.uri(), "client-t1");
    let user = cache.user(&bearer_parts(&token)).await.unwrap();
    assert_eq!(user.tenant, "t1");
    assert_eq!(user.name, "jdoe");
    assert_eq!(user.email, "jdoe@t1.example.com");

    // Second request reuses the validator; discovery ran once.
    let user = cache.user(&bearer_parts(&token)).await.unwrap();
    assert_eq!(user.subject, "00u1");
    assert!(cache.issuer(&key).unwrap().is_initialized());
}

#[tokio::test]
async fn test_unknown_audience_is_issuer_not_found() {
    let server = MockServer::start().await;
    mount_provider(&server, 0).await;

    let cache = cache_for(vec![IssuerConfig::new("t1", server.uri(), "client-t1")]).await;
    let token = id_token(&server.uri(), "client-t2");

    let err = cache.user(&bearer_parts(&token)).await.unwrap_err();
    assert!(matches!(err, AuthError::IssuerNotFound));
}

#[tokio::test]
async fn test_failed_discovery_is_retried_on_next_request() {
    // Nothing mounted: discovery answers 404.
    let server = MockServer::start().await;
    let cache = cache_for(vec![IssuerConfig::new("t1", server.uri(), "client-t1")]).await;
    let token = id_token(&server.uri(), "client-t1");

    let err = cache.user(&bearer_parts(&token)).await.unwrap_err();
    assert!(matches!(err, AuthError::DiscoveryFailed(_)));
    let key = IssuerKey::new(&server.uri(), "client-t1");
    assert!(!cache.issuer(&key).unwrap().is_initialized());

    mount_provider(&server, 1).await;
    let user = cache.user(&bearer_parts(&token)).await.unwrap();
    assert_eq!(user.tenant, "t1");
}
