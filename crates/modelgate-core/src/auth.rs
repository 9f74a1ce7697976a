//! Downstream authentication: a lookup from API key to principal. The
//! persistent key store is a collaborator; in-memory and no-op
//! implementations cover the binary and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use http::HeaderMap;
use serde::Deserialize;

#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub key_id: Option<String>,
}

pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, String>;
}

/// Accepts everything; used when no key table is configured.
#[derive(Debug, Default)]
pub struct NoopAuth;

impl AuthProvider for NoopAuth {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<AuthContext, String> {
        Ok(AuthContext::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthKeyEntry {
    pub key: String,
    pub key_id: i64,
    pub user_id: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Default)]
pub struct MemoryAuth {
    keys_by_value: RwLock<HashMap<String, AuthKeyEntry>>,
}

impl MemoryAuth {
    pub fn new(entries: Vec<AuthKeyEntry>) -> Self {
        let keys_by_value = entries
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect();
        Self {
            keys_by_value: RwLock::new(keys_by_value),
        }
    }
}

impl AuthProvider for MemoryAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, String> {
        let api_key = extract_api_key(headers).ok_or_else(|| "missing api key".to_string())?;

        let keys = self.keys_by_value.read().expect("auth key table lock");
        let entry = keys.get(api_key.as_str()).ok_or_else(|| "invalid api key".to_string())?;
        if !entry.enabled {
            return Err("api key disabled".to_string());
        }

        Ok(AuthContext {
            user_id: Some(entry.user_id.to_string()),
            key_id: Some(entry.key_id.to_string()),
        })
    }
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = header_value(headers, "x-api-key") {
        return Some(value);
    }

    let auth = header_value(headers, "authorization")?;
    let auth = auth.trim();
    if let Some(token) = auth.strip_prefix("Bearer ") {
        return Some(token.trim().to_string());
    }
    if let Some(token) = auth.strip_prefix("bearer ") {
        return Some(token.trim().to_string());
    }
    None
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}
