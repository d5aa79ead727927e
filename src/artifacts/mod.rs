//! Verified artifacts: document text extraction and downstream indexing.

mod extract;
mod indexer;

use serde::Serialize;

pub use extract::{DocumentExtractor, PlainTextExtractor};
pub use indexer::{ArtifactIndexer, HttpIndexer, NoopIndexer};

/// What was verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Professional-network profile link.
    Profile,
    /// Freelancer portfolio URL.
    Portfolio,
    Resume,
}

/// A verified artifact handed to the indexer.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub jid: String,
    pub kind: ArtifactKind,
    /// URL or file name.
    pub source: String,
    /// Fields the classifier pulled out.
    pub fields: serde_json::Value,
}
