//! Environment variable loading for configuration

use std::env;
use std::net::IpAddr;

use super::{DexSettings, Settings};
use crate::Result;

/// Environment variable names
mod vars {
    pub const HOST: &str = "TENANT_GUARD_HOST";
    pub const PORT: &str = "TENANT_GUARD_PORT";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const JSON_LOGS: &str = "TENANT_GUARD_JSON_LOGS";
    pub const DEX_URL: &str = "TENANT_GUARD_DEX_URL";
    pub const ISSUERS_FILE: &str = "TENANT_GUARD_ISSUERS_FILE";
    pub const BEARER: &str = "TENANT_GUARD_BEARER";
}

/// Apply environment overrides to `settings`
pub fn load_from_env(mut settings: Settings) -> Result<Settings> {
    if let Ok(host_str) = env::var(vars::HOST)
        && let Ok(host) = host_str.parse::<IpAddr>()
    {
        settings.server.host = host;
    }

    if let Ok(port_str) = env::var(vars::PORT)
        && let Ok(port) = port_str.parse::<u16>()
    {
        settings.server.port = port;
    }

    if let Ok(level) = env::var(vars::RUST_LOG) {
        settings.logging.level = level;
    }

    if let Ok(val) = env::var(vars::JSON_LOGS) {
        settings.logging.json = parse_bool(&val);
    }

    if let Ok(url) = env::var(vars::DEX_URL) {
        match settings.dex.as_mut() {
            Some(dex) => dex.url = url,
            None => {
                settings.dex = Some(DexSettings {
                    url,
                    ..DexSettings::default()
                });
            }
        }
    }

    if let Ok(path) = env::var(vars::ISSUERS_FILE) {
        settings.issuers.file = Some(path.into());
    }

    if let Ok(mode) = env::var(vars::BEARER) {
        settings.bearer = mode.parse()?;
    }

    Ok(settings)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
