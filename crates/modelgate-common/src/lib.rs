use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("missing required global config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged global configuration used by the running process.
///
/// Merge order: CLI > ENV > defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Path to the provider table consumed at startup.
    pub providers_path: String,
    /// Path to the downstream API-key table. Empty disables auth.
    pub keys_path: Option<String>,
    /// Optional outbound proxy for upstream egress.
    pub proxy: Option<String>,
    /// Sticky-session TTL in seconds.
    pub sticky_ttl_secs: u64,
}

/// Optional layer used for merging global config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub providers_path: Option<String>,
    pub keys_path: Option<String>,
    pub proxy: Option<String>,
    pub sticky_ttl_secs: Option<u64>,
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.providers_path.is_some() {
            self.providers_path = other.providers_path;
        }
        if other.keys_path.is_some() {
            self.keys_path = other.keys_path;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.sticky_ttl_secs.is_some() {
            self.sticky_ttl_secs = other.sticky_ttl_secs;
        }
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        Ok(GlobalConfig {
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: self.port.unwrap_or(8788),
            providers_path: self
                .providers_path
                .ok_or(GlobalConfigError::MissingField("providers_path"))?,
            keys_path: self.keys_path,
            proxy: self.proxy,
            sticky_ttl_secs: self.sticky_ttl_secs.unwrap_or(3600),
        })
    }
}
