//! Document text extraction.

use crate::error::ArtifactError;

/// Turns an uploaded document into plain text.
pub trait DocumentExtractor: Send + Sync {
    fn extract(
        &self,
        file_name: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, ArtifactError>;
}

/// Share of control characters above which content counts as binary.
const MAX_BINARY_RATIO: f64 = 0.1;

/// Accepts text-like documents and rejects binary formats.
///
/// PDF and Word parsing live outside this process; anything mostly
/// non-printable is reported as unsupported.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn extract(
        &self,
        file_name: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, ArtifactError> {
        let unsupported = |reason: &str| ArtifactError::Unsupported {
            file_name: file_name.to_string(),
            reason: reason.to_string(),
        };

        if let Some(mime) = mime_type
            && !mime.starts_with("text/")
            && mime != "application/json"
            && mime != "application/octet-stream"
        {
            return Err(unsupported(mime));
        }

        let text = String::from_utf8_lossy(bytes);
        let total = text.chars().count();
        if total == 0 {
            return Err(unsupported("empty document"));
        }
        let binary = text
            .chars()
            .filter(|c| *c == char::REPLACEMENT_CHARACTER || (c.is_control() && !c.is_whitespace()))
            .count();
        if binary as f64 / total as f64 > MAX_BINARY_RATIO {
            return Err(unsupported("binary content"));
        }

        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_utf8_text() {
        let text = PlainTextExtractor
            .extract("cv.txt", Some("text/plain"), "  Jane Doe\nSkills: Rust  ".as_bytes())
            .unwrap();
        assert_eq!(text, "Jane Doe\nSkills: Rust");
    }

    #[test]
    fn rejects_binary_and_foreign_mime() {
        let pdf = b"%PDF-1.7\x00\x01\x02\x03\xff\xfe\x00\x00\x00\x07";
        assert!(matches!(
            PlainTextExtractor.extract("cv.bin", None, pdf),
            Err(ArtifactError::Unsupported { .. })
        ));
        assert!(
            PlainTextExtractor
                .extract("cv.pdf", Some("application/pdf"), b"text")
                .is_err()
        );
        assert!(PlainTextExtractor.extract("empty.txt", None, b"").is_err());
    }
}
