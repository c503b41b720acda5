//! JWT claims types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Audience can be a single string or array of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(s) => s == value,
            Self::Many(v) => v.iter().any(|s| s == value),
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Registered claims read from a token without verifying it.
///
/// Only used to route a token to the validator that can verify it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnverifiedClaims {
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub aud: Option<OneOrMany>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
}

impl UnverifiedClaims {
    /// All audience values in token order.
    pub fn audiences(&self) -> Vec<String> {
        self.aud.as_ref().map(OneOrMany::to_vec).unwrap_or_default()
    }
}

/// Claims issued by Dex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DexClaims {
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<OneOrMany>,
    #[serde(default)]
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub federated_claims: HashMap<String, String>,
    /// Newer Dex versions emit roles next to groups.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl DexClaims {
    /// Connector id of the upstream identity provider, e.g. `tnnt_ldap`.
    pub fn connector_id(&self) -> Option<&str> {
        self.federated_claims
            .get("connector_id")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Claims issued by a generic OpenID Connect provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OidcClaims {
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<OneOrMany>,
    #[serde(default)]
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub preferred_username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl OidcClaims {
    /// `preferred_username`, or `name` when the provider did not send one.
    pub fn username(&self) -> &str {
        if self.preferred_username.is_empty() {
            &self.name
        } else {
            &self.preferred_username
        }
    }
}
