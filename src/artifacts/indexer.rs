//! Downstream ingestion of verified artifacts.

use async_trait::async_trait;

use crate::artifacts::Artifact;
use crate::error::ArtifactError;

#[async_trait]
pub trait ArtifactIndexer: Send + Sync {
    async fn index(&self, artifact: &Artifact) -> Result<(), ArtifactError>;
}

/// Posts each artifact as JSON to a webhook.
pub struct HttpIndexer {
    url: String,
    client: reqwest::Client,
}

impl HttpIndexer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ArtifactIndexer for HttpIndexer {
    async fn index(&self, artifact: &Artifact) -> Result<(), ArtifactError> {
        let resp = self
            .client
            .post(&self.url)
            .json(artifact)
            .send()
            .await
            .map_err(|e| ArtifactError::Index(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ArtifactError::Index(format!("{status}: {body}")));
        }
        tracing::debug!(jid = %artifact.jid, kind = ?artifact.kind, "Artifact indexed");
        Ok(())
    }
}

/// Used when no indexer is configured.
#[derive(Debug, Default)]
pub struct NoopIndexer;

#[async_trait]
impl ArtifactIndexer for NoopIndexer {
    async fn index(&self, artifact: &Artifact) -> Result<(), ArtifactError> {
        tracing::debug!(jid = %artifact.jid, kind = ?artifact.kind, "No indexer configured, skipping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactKind;

    fn artifact() -> Artifact {
        Artifact {
            jid: "15551230000".into(),
            kind: ArtifactKind::Resume,
            source: "cv.txt".into(),
            fields: serde_json::json!({"email": "jane@example.com"}),
        }
    }

    #[tokio::test]
    async fn noop_accepts_everything() {
        assert!(NoopIndexer.index(&artifact()).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_webhook_is_an_index_error() {
        let indexer = HttpIndexer::new("http://127.0.0.1:1/index");
        let err = indexer.index(&artifact()).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Index(_)));
    }

    #[test]
    fn artifact_serializes_kind_in_snake_case() {
        let json = serde_json::to_value(artifact()).unwrap();
        assert_eq!(json["kind"], "resume");
    }
}
