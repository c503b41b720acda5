//! Configuration management
//!
//! Supports configuration loading with precedence: env > file > defaults

mod env;
mod file;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use file::{FileIssuerList, find_config_file};
use serde::Deserialize;

use crate::Result;
use crate::auth::{
    AuthenticatorChain, Dex, DexOptions, GenericOidcOptions, GenericOidcProvider, HmacAuth,
    IssuerCache, IssuerCacheOptions, IssuerConfig, KeySetOptions, ResourceAccess,
    StaticIssuerList, User,
};
use crate::constants::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_HMAC_LIFETIME, DEFAULT_KEY_REFRESH_INTERVAL,
    DEFAULT_RELOAD_INTERVAL, DEFAULT_RETRY_INTERVAL, KEYSET_MAILBOX_CAPACITY,
};

/// Which authenticator handles bearer tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BearerMode {
    /// Per-tenant OIDC validators behind an issuer cache.
    IssuerCache,
    /// A single Dex instance.
    Dex,
    #[default]
    None,
}

impl FromStr for BearerMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "issuer-cache" | "issuer_cache" | "oidc" => Ok(Self::IssuerCache),
            "dex" => Ok(Self::Dex),
            "none" | "" => Ok(Self::None),
            other => Err(crate::Error::Config(format!(
                "Unknown bearer mode {other:?}, expected issuer-cache, dex or none"
            ))),
        }
    }
}

impl fmt::Display for BearerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IssuerCache => "issuer-cache",
            Self::Dex => "dex",
            Self::None => "none",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySetSettings {
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for KeySetSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_KEY_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl KeySetSettings {
    pub const fn options(&self) -> KeySetOptions {
        KeySetOptions {
            refresh_interval: self.refresh_interval,
            fetch_timeout: self.fetch_timeout,
            mailbox_capacity: KEYSET_MAILBOX_CAPACITY,
        }
    }
}

/// Tenant list of the issuer cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerSettings {
    /// Re-read on every reload when set; `tenants` is ignored then.
    pub file: Option<PathBuf>,
    pub tenants: Vec<IssuerConfig>,
    pub reload_interval: Duration,
    pub retry_interval: Duration,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            file: None,
            tenants: Vec::new(),
            reload_interval: DEFAULT_RELOAD_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl IssuerSettings {
    pub const fn options(&self) -> IssuerCacheOptions {
        IssuerCacheOptions {
            reload_interval: self.reload_interval,
            retry_interval: self.retry_interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DexSettings {
    pub url: String,
    pub audience: Vec<String>,
    pub issuer: Option<String>,
}

/// Identity bound to an HMAC authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub name: String,
    pub email: String,
    pub tenant: String,
    pub groups: Vec<String>,
}

impl From<UserSettings> for User {
    fn from(settings: UserSettings) -> Self {
        Self {
            name: settings.name,
            email: settings.email,
            tenant: settings.tenant,
            groups: settings.groups.into_iter().map(ResourceAccess::from).collect(),
            ..Self::default()
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct HmacSettings {
    pub auth_type: String,
    pub key: String,
    pub lifetime: Duration,
    pub user: UserSettings,
}

impl fmt::Debug for HmacSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSettings")
            .field("auth_type", &self.auth_type)
            .field("key", &"<redacted>")
            .field("lifetime", &self.lifetime)
            .field("user", &self.user.name)
            .finish()
    }
}

impl HmacSettings {
    pub fn authenticator(&self) -> HmacAuth {
        HmacAuth::new(self.auth_type.clone(), self.key.as_bytes())
            .with_user(self.user.clone().into())
            .with_lifetime(self.lifetime)
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub keyset: KeySetSettings,
    pub bearer: BearerMode,
    pub issuers: IssuerSettings,
    pub dex: Option<DexSettings>,
    pub hmac: Vec<HmacSettings>,
}

impl Settings {
    /// Check cross-field requirements.
    pub fn validate(&self) -> Result<()> {
        if self.bearer == BearerMode::Dex
            && self.dex.as_ref().is_none_or(|d| d.url.trim().is_empty())
        {
            return Err(crate::Error::Config(
                "Bearer mode dex requires [dex] url".to_string(),
            ));
        }
        for (name, interval) in [
            ("keyset refresh_interval_secs", self.keyset.refresh_interval),
            ("keyset fetch_timeout_secs", self.keyset.fetch_timeout),
            ("issuers reload_interval_secs", self.issuers.reload_interval),
            ("issuers retry_interval_secs", self.issuers.retry_interval),
        ] {
            if interval.is_zero() {
                return Err(crate::Error::Config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        for hmac in &self.hmac {
            if hmac.auth_type.trim().is_empty() || hmac.auth_type.contains(' ') {
                return Err(crate::Error::Config(format!(
                    "Invalid HMAC type {:?}",
                    hmac.auth_type
                )));
            }
            if hmac.key.is_empty() {
                return Err(crate::Error::Config(format!(
                    "HMAC type {} has an empty key",
                    hmac.auth_type
                )));
            }
        }
        Ok(())
    }

    /// Build the authenticator chain: HMAC entries in order, then the
    /// configured bearer authenticator.
    pub async fn authenticator(&self) -> Result<AuthenticatorChain> {
        self.validate()?;

        let mut chain = AuthenticatorChain::new();
        for hmac in &self.hmac {
            tracing::info!(auth_type = %hmac.auth_type, user = %hmac.user.name, "HMAC authenticator enabled");
            chain = chain.with_hmac(hmac.authenticator());
        }

        match self.bearer {
            BearerMode::None => {
                tracing::info!("No bearer authenticator configured");
            }
            BearerMode::Dex => {
                let dex = self.dex.as_ref().ok_or_else(|| {
                    crate::Error::Config("Bearer mode dex requires [dex] url".to_string())
                })?;
                let mut options = DexOptions {
                    keyset: self.keyset.options(),
                    ..DexOptions::default()
                }
                .with_audience(dex.audience.clone());
                if let Some(issuer) = &dex.issuer {
                    options = options.with_issuer(issuer.clone());
                }
                chain = chain.with_bearer(Dex::with_options(&dex.url, options).await?);
            }
            BearerMode::IssuerCache => {
                let provider = GenericOidcProvider::new(
                    GenericOidcOptions::default()
                        .with_timeout(self.keyset.fetch_timeout)
                        .with_refresh_interval(self.keyset.refresh_interval),
                );
                let options = self.issuers.options();
                let cache = if let Some(path) = &self.issuers.file {
                    tracing::info!(path = %path.display(), "Issuer list read from file");
                    IssuerCache::new(FileIssuerList::new(path), provider, options).await
                } else {
                    IssuerCache::new(StaticIssuerList(self.issuers.tenants.clone()), provider, options)
                        .await
                };
                tracing::info!(issuers = cache.len(), "Issuer cache ready");
                chain = chain.with_bearer(cache);
            }
        }

        Ok(chain)
    }
}

/// Load settings with precedence: env > file > defaults
pub fn load_settings() -> Result<Settings> {
    let mut settings = Settings::default();

    if let Some(path) = file::find_config_file() {
        tracing::info!("Loading configuration from {}", path.display());
        settings = file::load_from_file(&path, settings)?;
    }

    env::load_from_env(settings)
}

/// Load settings from a specific file path
pub fn load_settings_from_path(path: &std::path::Path) -> Result<Settings> {
    let settings = file::load_from_file(path, Settings::default())?;
    env::load_from_env(settings)
}
