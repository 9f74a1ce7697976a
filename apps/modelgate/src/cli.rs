use clap::Parser;

use modelgate_common::GlobalConfigPatch;

#[derive(Parser)]
#[command(name = "modelgate")]
pub(crate) struct Cli {
    /// Bind host.
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Bind port.
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Provider table (JSON array of provider records).
    #[arg(long)]
    pub(crate) providers: Option<String>,
    /// Downstream API-key table (JSON array). Omit to disable auth.
    #[arg(long)]
    pub(crate) keys: Option<String>,
    /// Outbound proxy for upstream egress.
    #[arg(long)]
    pub(crate) proxy: Option<String>,
    /// Sticky-session TTL in seconds.
    #[arg(long)]
    pub(crate) sticky_ttl_secs: Option<u64>,
}

impl Cli {
    pub(crate) fn into_patch(self) -> GlobalConfigPatch {
        GlobalConfigPatch {
            host: self.host,
            port: self.port,
            providers_path: self.providers,
            keys_path: self.keys,
            proxy: self.proxy,
            sticky_ttl_secs: self.sticky_ttl_secs,
        }
    }
}

/// ENV layer, read under the `MODELGATE_` prefix.
pub(crate) fn env_patch() -> GlobalConfigPatch {
    GlobalConfigPatch {
        host: std::env::var("MODELGATE_HOST").ok(),
        port: std::env::var("MODELGATE_PORT")
            .ok()
            .and_then(|value| value.parse().ok()),
        providers_path: std::env::var("MODELGATE_PROVIDERS").ok(),
        keys_path: std::env::var("MODELGATE_KEYS").ok(),
        proxy: std::env::var("MODELGATE_PROXY").ok(),
        sticky_ttl_secs: std::env::var("MODELGATE_STICKY_TTL_SECS")
            .ok()
            .and_then(|value| value.parse().ok()),
    }
}
