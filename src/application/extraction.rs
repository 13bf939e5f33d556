//! Structural extraction from model replies
//!
//! Generation replies carry a reasoning block (`<thought>` or `<plan>`) and a fenced
//! code block; synthesis replies additionally carry an `<improvements>` list. Judge
//! and verifier replies are JSON objects, sometimes wrapped in markdown fences.

use regex::Regex;
use std::sync::LazyLock;

static PLAN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(thought|plan)>(.*?)</(?:thought|plan)>").expect("plan pattern is valid")
});

static DOCTYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!DOCTYPE html>.*?</html>").expect("doctype pattern is valid")
});

static RAW_HTML_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<html.*</html>").expect("html pattern is valid"));

static IMPROVEMENTS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<improvements>(.*?)</improvements>").expect("improvements pattern is valid")
});

static BULLET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").expect("bullet pattern is valid")
});

static JSON_FENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:json)?\s*(.*?)```").expect("json fence pattern is valid")
});

/// Plan and code pulled out of a generation reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub declared_plan: Option<String>,
    pub code: String,
}

/// Extract plan and code; `None` when the reply holds no code block
pub fn extract(raw: &str, language: &str) -> Option<Extracted> {
    let code = extract_code(raw, language)?;
    Some(Extracted {
        declared_plan: extract_plan(raw),
        code,
    })
}

/// Reasoning from the first `<thought>` or `<plan>` block
pub fn extract_plan(raw: &str) -> Option<String> {
    PLAN_PATTERN
        .captures(raw)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|plan| !plan.is_empty())
}

/// Code from the first fence tagged `language`
///
/// For html the reply may also hold a bare `<!DOCTYPE html>` document or, failing
/// that, anything spanning `<html` to the last `</html>`.
pub fn extract_code(raw: &str, language: &str) -> Option<String> {
    if let Some(code) = fenced_block(raw, language) {
        return Some(code);
    }

    if !language.eq_ignore_ascii_case("html") {
        return None;
    }

    DOCTYPE_PATTERN
        .find(raw)
        .or_else(|| RAW_HTML_PATTERN.find(raw))
        .map(|m| m.as_str().trim().to_string())
        .filter(|code| !code.is_empty())
}

fn fenced_block(raw: &str, language: &str) -> Option<String> {
    let pattern = format!(r"(?is)```{}[^\S\n]*\n(.*?)```", regex::escape(language));
    let fence = Regex::new(&pattern).ok()?;
    let code = fence
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .find(|code| !code.is_empty());
    code
}

/// Ordered list of changes from an `<improvements>` block
///
/// Bullet and numbered lines are taken as items; a block without bullets is read
/// one item per non-empty line.
pub fn extract_improvements(raw: &str) -> Vec<String> {
    let Some(block) = IMPROVEMENTS_PATTERN
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    else {
        return vec![];
    };

    let bullets: Vec<String> = block
        .lines()
        .filter_map(|line| BULLET_PATTERN.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if !bullets.is_empty() {
        return bullets;
    }

    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// JSON object text inside a reply, with markdown fences and chatter stripped
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let body = JSON_FENCE_PATTERN
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str());

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}
