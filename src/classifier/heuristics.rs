//! Local fallbacks used when model output cannot be parsed.
//!
//! All of them err on the side of "no".

use std::sync::LazyLock;

use regex::Regex;

use crate::classifier::{IdentityVerdict, QualifyDecision, ResumeFields, ResumeVerdict};
use crate::outreach::model::User;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b").unwrap());

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s().\-]{8,}\d").unwrap());

const RESUME_KEYWORDS: &[&str] = &[
    "experience",
    "education",
    "skills",
    "employment",
    "work history",
    "projects",
    "certifications",
    "curriculum vitae",
    "resume",
    "objective",
    "references",
    "bachelor",
    "university",
];

/// Minimum distinct keyword hits for a document to count as a resume.
const MIN_KEYWORD_HITS: usize = 2;

/// Resume when there is contact info and at least two section keywords.
pub fn resume_verdict(text: &str) -> ResumeVerdict {
    let lower = text.to_lowercase();
    let email = EMAIL.find(text).map(|m| m.as_str().to_string());
    let phone = PHONE
        .find(text)
        .map(|m| m.as_str().to_string())
        .filter(|p| p.chars().filter(char::is_ascii_digit).count() >= 10);
    let hits: Vec<&str> = RESUME_KEYWORDS
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .collect();

    let has_contact = email.is_some() || phone.is_some();
    let is_resume = has_contact && hits.len() >= MIN_KEYWORD_HITS;

    let mut reasons = Vec::new();
    if !has_contact {
        reasons.push("no email or phone found".to_string());
    }
    if hits.len() < MIN_KEYWORD_HITS {
        reasons.push(format!("only {} resume keyword(s)", hits.len()));
    }
    if is_resume {
        reasons.push(format!("contact info and keywords: {}", hits.join(", ")));
    }

    ResumeVerdict {
        is_resume,
        confidence: if is_resume { 0.5 } else { 0.2 },
        reasons,
        key_fields: ResumeFields {
            email,
            phone,
            ..Default::default()
        },
    }
}

/// Match only when every token of a multi-word name shows up in the link.
pub fn identity_verdict(claimed: &User, subject: &str) -> IdentityVerdict {
    let tokens: Vec<String> = claimed
        .name
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|t| t.len() >= 2)
        .collect();
    let haystack = subject.to_lowercase();

    if tokens.len() < 2 {
        return IdentityVerdict {
            matched: false,
            confidence: 0.0,
            reasons: vec!["no full name on file to compare".to_string()],
            profile: serde_json::json!({}),
        };
    }

    let matched = tokens.iter().all(|t| haystack.contains(t.as_str()));
    IdentityVerdict {
        matched,
        confidence: if matched { 0.5 } else { 0.1 },
        reasons: vec![if matched {
            "all name tokens appear in link".to_string()
        } else {
            "name does not appear in link".to_string()
        }],
        profile: if matched {
            serde_json::json!({ "url": subject.trim() })
        } else {
            serde_json::json!({})
        },
    }
}

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "cannot", "can't", "didn't", "doesn't", "don't", "isn't", "wasn't",
    "won't", "wouldn't", "hasn't",
];

/// How many words back a negation still applies.
const NEGATION_REACH: usize = 3;

/// Scan free text for a verdict word.
///
/// A negated qualify ("not qualified", "disqualified") is a fail. A qualify
/// with any negation in the text, a negated fail, or both verdicts at once
/// is `Neither`.
pub fn qualify_decision(raw: &str) -> QualifyDecision {
    let lower = raw.to_lowercase().replace('\u{2019}', "'");
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();
    let is_negation = |w: &&str| NEGATIONS.contains(w) || w.ends_with("n't");
    let negated_at = |i: usize| {
        words[i.saturating_sub(NEGATION_REACH)..i]
            .iter()
            .any(is_negation)
    };
    let hedged = words.iter().any(is_negation);

    let (mut qualify, mut not_qualify, mut fail, mut not_fail) = (false, false, false, false);
    for (i, word) in words.iter().enumerate() {
        if ["disqualif", "unqualif", "nonqualif"]
            .iter()
            .any(|p| word.starts_with(p))
        {
            not_qualify = true;
        } else if word.starts_with("qualif") {
            if negated_at(i) {
                not_qualify = true;
            } else {
                qualify = true;
            }
        } else if word.starts_with("fail") {
            if negated_at(i) {
                not_fail = true;
            } else {
                fail = true;
            }
        }
    }

    match (qualify, not_qualify, fail, not_fail) {
        (false, true, _, false) => QualifyDecision::Fail,
        (true, false, false, false) if !hedged => QualifyDecision::Qualify,
        (false, false, true, false) => QualifyDecision::Fail,
        _ => QualifyDecision::Neither,
    }
}
