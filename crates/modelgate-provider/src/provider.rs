use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use modelgate_protocol::WireFormat;

pub type ProviderId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Claude,
    OpenaiCompatible,
    Codex,
    GeminiCli,
}

impl ProviderKind {
    /// The wire format this provider speaks natively.
    pub fn wire_format(&self) -> WireFormat {
        match self {
            ProviderKind::Claude => WireFormat::Claude,
            ProviderKind::OpenaiCompatible => WireFormat::OpenAi,
            ProviderKind::Codex => WireFormat::Codex,
            ProviderKind::GeminiCli => WireFormat::GeminiCli,
        }
    }
}

/// An upstream LLM API endpoint with credentials and policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub kind: ProviderKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Selection bias within a priority band; 0 only draws when the whole
    /// band is 0-weight.
    #[serde(default)]
    pub weight: u32,
    /// Lower number ranks higher.
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_mtok: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_5h_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_weekly_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_monthly_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_concurrent_sessions: Option<u32>,
    /// Tokens per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm: Option<u64>,
    /// Requests per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u64>,
    /// Requests per day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpd: Option<u64>,
    /// Hard concurrent-call cap, folded into the same concurrency check as
    /// `limit_concurrent_sessions` (the tighter one wins).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<u32>,
    /// Model redirection: requests for a key get rewritten to its value
    /// before translation.
    #[serde(default)]
    pub model_map: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    /// Tombstone; a deleted provider is never eligible.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

fn default_enabled() -> bool {
    true
}

impl Provider {
    pub fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The effective concurrency ceiling, if any.
    pub fn concurrency_limit(&self) -> Option<u32> {
        match (self.limit_concurrent_sessions, self.cc) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    pub fn redirect_model(&self, model: &str) -> Option<&str> {
        self.model_map.get(model).map(|target| target.as_str())
    }
}

/// Route family: which provider kinds can serve a model name. Static
/// prefix table; unknown prefixes fall back to every kind.
pub fn route_family(model: &str) -> &'static [ProviderKind] {
    const CLAUDE: &[ProviderKind] = &[ProviderKind::Claude];
    const CODEX_FIRST: &[ProviderKind] =
        &[ProviderKind::Codex, ProviderKind::OpenaiCompatible];
    const OPENAI_FIRST: &[ProviderKind] =
        &[ProviderKind::OpenaiCompatible, ProviderKind::Codex];
    const GEMINI: &[ProviderKind] = &[ProviderKind::GeminiCli];
    const ANY: &[ProviderKind] = &[
        ProviderKind::Claude,
        ProviderKind::OpenaiCompatible,
        ProviderKind::Codex,
        ProviderKind::GeminiCli,
    ];

    if model.starts_with("claude") {
        CLAUDE
    } else if model.starts_with("gpt-5-codex") || model.starts_with("codex") {
        CODEX_FIRST
    } else if model.starts_with("gpt") || model.starts_with("o1") || model.starts_with("o3")
        || model.starts_with("o4")
    {
        OPENAI_FIRST
    } else if model.starts_with("gemini") {
        GEMINI
    } else {
        ANY
    }
}
