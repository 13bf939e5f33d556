use regex::{Captures, Regex};
use std::sync::LazyLock;

// OpenRouter / OpenAI style keys: sk-or-v1-..., sk-proj-..., sk-...
static API_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sk-[a-zA-Z0-9][a-zA-Z0-9_-]{15,}").unwrap());

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9_\-\.]+").unwrap());

static KEY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(["']?(?:api_key|apikey|token|secret)["']?\s*[:=]\s*)["']?[a-zA-Z0-9_\-\.]{12,}["']?"#)
        .unwrap()
});

/// Remove credentials from text bound for logs, errors or reports
///
/// Provider error bodies sometimes echo request headers back; everything that
/// leaves the HTTP client passes through here first.
pub fn scrub_secrets(message: &str) -> String {
    let scrubbed = BEARER.replace_all(message, "Bearer [TOKEN_REDACTED]");
    let scrubbed = API_KEY.replace_all(&scrubbed, "[API_KEY_REDACTED]");
    KEY_FIELD
        .replace_all(&scrubbed, |caps: &Captures| format!("{}[REDACTED]", &caps[1]))
        .into_owned()
}
