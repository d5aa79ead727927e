//! Parsing of structured model output.

use crate::classifier::QualifyDecision;

/// Pull a JSON object out of model output that may be wrapped in prose
/// or a markdown fence.
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Try to find object bounds
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

/// Decode a JSON object of type `T` from raw model output.
pub fn parse_object<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, String> {
    let json_str = extract_json_object(raw);
    serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))
}

/// Read a one-word verdict. Anything else is an error so the caller can
/// fall back.
pub fn parse_qualify_word(raw: &str) -> Result<QualifyDecision, String> {
    let word = raw
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphabetic())
        .to_ascii_lowercase();
    match word.as_str() {
        "qualify" | "qualified" => Ok(QualifyDecision::Qualify),
        "fail" | "failed" => Ok(QualifyDecision::Fail),
        "neither" | "none" | "undecided" | "continue" => Ok(QualifyDecision::Neither),
        _ => Err(format!("unexpected verdict '{}'", raw.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ResumeVerdict;

    #[test]
    fn extract_json_plain() {
        let input = r#"{"matched": true}"#;
        assert_eq!(extract_json_object(input), input);
    }

    #[test]
    fn extract_json_from_markdown_block() {
        let input = "Here you go:\n```json\n{\"matched\": false}\n```\nDone.";
        assert_eq!(extract_json_object(input), "{\"matched\": false}");
    }

    #[test]
    fn extract_json_embedded_in_text() {
        let input = "Verdict: {\"is_resume\": true, \"confidence\": 0.8} as requested.";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.ends_with('}'));
    }

    #[test]
    fn resume_verdict_accepts_camel_case_flag() {
        let v: ResumeVerdict =
            parse_object(r#"{"isResume": true, "confidence": 0.9, "reasons": ["skills"]}"#).unwrap();
        assert!(v.is_resume);
        assert!(v.key_fields.email.is_none());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_object::<ResumeVerdict>("I think so, yes").is_err());
    }

    #[test]
    fn qualify_words() {
        assert_eq!(parse_qualify_word("qualify").unwrap(), QualifyDecision::Qualify);
        assert_eq!(parse_qualify_word(" FAIL.\n").unwrap(), QualifyDecision::Fail);
        assert_eq!(parse_qualify_word("neither").unwrap(), QualifyDecision::Neither);
        assert!(parse_qualify_word("they seem keen").is_err());
    }
}
