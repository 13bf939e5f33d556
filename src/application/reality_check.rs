//! Static reality check
//!
//! Compares the mechanisms a branch *says* it uses against what its code and
//! execution log actually contain. A claim is any backticked term in the plan or
//! the phrase following a mechanism verb ("using", "implements", "via", ...). A
//! claim is traced when one of its distinctive keywords appears in the evidence.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::domain::models::RealityCheck;

static BACKTICK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]{2,80})`").expect("backtick pattern is valid"));

static MECHANISM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:using|uses|implement(?:s|ed|ing)?|via|based on|apply|applies|applying)\s+(?:an?\s+|the\s+)?([a-z0-9_][a-z0-9_\- ]{2,60}?)(?:[.,;:()\n]|\s+(?:to|for|with|and|that|which|so|in|on)\b|$)",
    )
    .expect("mechanism pattern is valid")
});

const STOPWORDS: &[&str] = &[
    "about", "also", "approach", "code", "each", "every", "from", "function", "functions",
    "into", "method", "more", "over", "simple", "some", "that", "their", "them", "then",
    "there", "these", "this", "those", "using", "very", "when", "where", "which", "while",
    "will", "with", "would", "your",
];

/// Outcome of the static comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealityAssessment {
    pub outcome: RealityCheck,
    /// Every mechanism claim found in the plan
    pub claims: Vec<String>,
    /// Claims with no trace in code or logs
    pub unsupported: Vec<String>,
}

/// Compare a declared plan against code and execution log
pub fn assess(plan: Option<&str>, code: Option<&str>, log: Option<&[String]>) -> RealityAssessment {
    let Some(plan) = plan.map(str::trim).filter(|p| !p.is_empty()) else {
        return RealityAssessment {
            outcome: RealityCheck::NotApplicable,
            claims: vec![],
            unsupported: vec![],
        };
    };

    let mut evidence = code.unwrap_or_default().to_string();
    for line in log.unwrap_or_default() {
        evidence.push('\n');
        evidence.push_str(line);
    }
    let evidence = compact(&evidence);

    let claims = extract_claims(plan);
    let unsupported: Vec<String> = claims
        .iter()
        .filter(|claim| {
            let keywords = claim_keywords(claim);
            !keywords.is_empty() && !keywords.iter().any(|k| evidence.contains(k.as_str()))
        })
        .cloned()
        .collect();

    let outcome = if unsupported.is_empty() {
        RealityCheck::Pass
    } else {
        RealityCheck::Fail
    };

    RealityAssessment {
        outcome,
        claims,
        unsupported,
    }
}

/// Merge the static outcome with a verifier model's own verdict
///
/// Either side reporting `Fail` fails the check. An absent plan stays
/// `NotApplicable` whatever the model says.
pub fn combine(static_outcome: RealityCheck, model_verdict: Option<RealityCheck>) -> RealityCheck {
    match (static_outcome, model_verdict) {
        (RealityCheck::NotApplicable, _) => RealityCheck::NotApplicable,
        (RealityCheck::Fail, _) | (_, Some(RealityCheck::Fail)) => RealityCheck::Fail,
        _ => RealityCheck::Pass,
    }
}

fn extract_claims(plan: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut claims = Vec::new();

    let backticked = BACKTICK_PATTERN
        .captures_iter(plan)
        .filter_map(|caps| caps.get(1));
    let phrases = MECHANISM_PATTERN
        .captures_iter(plan)
        .filter_map(|caps| caps.get(1));

    for claim in backticked.chain(phrases) {
        let claim = claim.as_str().trim().to_string();
        if !claim.is_empty() && seen.insert(claim.to_lowercase()) {
            claims.push(claim);
        }
    }
    claims
}

fn claim_keywords(claim: &str) -> Vec<String> {
    claim
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 4)
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
        .collect()
}

/// Lowercase with separators removed, so `request_animation_frame` and
/// `requestAnimationFrame` both contain `requestanimationframe`
fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
