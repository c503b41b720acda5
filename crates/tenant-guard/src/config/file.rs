//! TOML configuration file loading

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{BearerMode, DexSettings, HmacSettings, Settings, UserSettings};
use crate::Result;
use crate::auth::{self, AuthError, IssuerConfig, IssuerListProvider};
use crate::constants::DEFAULT_HMAC_LIFETIME;

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./tenant-guard.toml",
    "~/.config/tenant-guard/config.toml",
    "/etc/tenant-guard/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, settings: Settings) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    apply_file_config(settings, file_config)
}

fn apply_file_config(mut settings: Settings, config: FileConfig) -> Result<Settings> {
    if let Some(mode) = config.bearer {
        settings.bearer = mode.parse()?;
    }

    if let Some(server) = config.server {
        if let Some(host_str) = server.host {
            let host = host_str
                .parse::<IpAddr>()
                .map_err(|e| crate::Error::Config(format!("Invalid server host: {e}")))?;
            settings.server.host = host;
        }
        if let Some(port) = server.port {
            settings.server.port = port;
        }
    }

    if let Some(logging) = config.logging {
        if let Some(level) = logging.level {
            settings.logging.level = level;
        }
        if let Some(json) = logging.json {
            settings.logging.json = json;
        }
    }

    if let Some(keyset) = config.keyset {
        if let Some(secs) = keyset.refresh_interval_secs {
            settings.keyset.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = keyset.fetch_timeout_secs {
            settings.keyset.fetch_timeout = Duration::from_secs(secs);
        }
    }

    if let Some(issuers) = config.issuers {
        if let Some(file) = issuers.file {
            settings.issuers.file = Some(file);
        }
        if let Some(secs) = issuers.reload_interval_secs {
            settings.issuers.reload_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = issuers.retry_interval_secs {
            settings.issuers.retry_interval = Duration::from_secs(secs);
        }
    }

    if !config.tenant.is_empty() {
        settings.issuers.tenants = config.tenant;
    }

    if let Some(dex) = config.dex {
        settings.dex = Some(DexSettings {
            url: dex.url,
            audience: dex.audience,
            issuer: dex.issuer,
        });
    }

    if !config.hmac.is_empty() {
        settings.hmac = config
            .hmac
            .into_iter()
            .map(|h| HmacSettings {
                auth_type: h.auth_type,
                key: h.key,
                lifetime: h
                    .lifetime_secs
                    .map_or(DEFAULT_HMAC_LIFETIME, Duration::from_secs),
                user: h.user,
            })
            .collect();
    }

    Ok(settings)
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    bearer: Option<String>,
    server: Option<ServerFileConfig>,
    logging: Option<LoggingFileConfig>,
    keyset: Option<KeySetFileConfig>,
    issuers: Option<IssuersFileConfig>,
    #[serde(default)]
    tenant: Vec<IssuerConfig>,
    dex: Option<DexFileConfig>,
    #[serde(default)]
    hmac: Vec<HmacFileConfig>,
}

#[derive(Debug, Deserialize)]
struct ServerFileConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct LoggingFileConfig {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct KeySetFileConfig {
    refresh_interval_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct IssuersFileConfig {
    file: Option<PathBuf>,
    reload_interval_secs: Option<u64>,
    retry_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DexFileConfig {
    url: String,
    #[serde(default)]
    audience: Vec<String>,
    issuer: Option<String>,
}

#[derive(Deserialize)]
struct HmacFileConfig {
    #[serde(rename = "type")]
    auth_type: String,
    key: String,
    lifetime_secs: Option<u64>,
    #[serde(default)]
    user: UserSettings,
}

impl std::fmt::Debug for HmacFileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacFileConfig")
            .field("auth_type", &self.auth_type)
            .field("key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// A tenant list file: a sequence of `[[tenant]]` tables.
#[derive(Debug, Deserialize)]
struct TenantListFile {
    #[serde(default)]
    tenant: Vec<IssuerConfig>,
}

/// Issuer list read from a TOML file on every reload.
#[derive(Debug, Clone)]
pub struct FileIssuerList {
    path: PathBuf,
}

impl FileIssuerList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IssuerListProvider for FileIssuerList {
    async fn issuers(&self) -> auth::Result<Vec<IssuerConfig>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AuthError::IssuerList(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let list: TenantListFile = toml::from_str(&content).map_err(|e| {
            AuthError::IssuerList(format!("cannot parse {}: {e}", self.path.display()))
        })?;
        tracing::debug!(path = %self.path.display(), tenants = list.tenant.len(), "Read issuer list");
        Ok(list.tenant)
    }
}
