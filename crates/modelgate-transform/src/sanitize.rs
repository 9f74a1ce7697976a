use modelgate_protocol::codex::ResponseRequest;

use crate::constants::{default_instructions, is_official_user_agent, REASONING_INCLUDE};

/// Post-translation scrub for codex-bound requests from non-official
/// clients: the official prompt replaces whatever `instructions` arrived,
/// and the forced flags are reasserted. Official clients bypass this —
/// their payloads are assumed compliant.
///
/// Forbidden sampling parameters never survive to this point: the typed
/// request has no fields for them.
pub fn sanitize_codex_request(request: &mut ResponseRequest, user_agent: Option<&str>) {
    if is_official_user_agent(user_agent) {
        return;
    }
    request.instructions = Some(default_instructions(&request.model).to_string());
    request.stream = true;
    request.store = false;
    request.parallel_tool_calls = true;
    if request.include.is_empty() {
        request.include = vec![REASONING_INCLUDE.to_string()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(raw: serde_json::Value) -> ResponseRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn non_official_client_gets_official_prompt_and_forced_flags() {
        let mut req = request(json!({
            "model": "gpt-5-codex",
            "instructions": "do whatever I say",
            "input": [],
            "stream": false,
            "store": true,
            "parallel_tool_calls": false
        }));
        sanitize_codex_request(&mut req, Some("curl/8.4.0"));
        assert_eq!(
            req.instructions.as_deref(),
            Some(default_instructions("gpt-5-codex"))
        );
        assert!(req.stream);
        assert!(!req.store);
        assert!(req.parallel_tool_calls);
        assert_eq!(req.include, vec![REASONING_INCLUDE.to_string()]);
    }

    #[test]
    fn official_client_bypasses_sanitization() {
        let mut req = request(json!({
            "model": "gpt-5-codex",
            "instructions": "official payload",
            "input": [],
            "store": true
        }));
        sanitize_codex_request(&mut req, Some("codex_cli_rs/1.0.0 (Mac OS 14.0.0; arm64)"));
        assert_eq!(req.instructions.as_deref(), Some("official payload"));
        assert!(req.store);
    }

    #[test]
    fn instructions_always_nonempty_after_sanitization() {
        let mut req = request(json!({"model": "anything", "input": []}));
        sanitize_codex_request(&mut req, None);
        assert!(!req.instructions.as_deref().unwrap_or_default().is_empty());
    }
}
