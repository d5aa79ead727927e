//! Classifier boundary: structured verdicts from the language model.
//!
//! The coordinator only sees the [`Classifier`] trait. [`LlmClassifier`]
//! implements it over an [`LlmProvider`](crate::llm::LlmProvider) and falls
//! back to [`heuristics`] whenever the model's output cannot be parsed.

pub mod heuristics;
pub mod llm;
pub mod parse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::outreach::model::{HistoryEntry, User};

pub use llm::LlmClassifier;

/// Name of the administrative tool the reply model may call.
pub const END_SESSION_TOOL: &str = "end_session";

/// Input for a free-form reply.
#[derive(Debug, Clone)]
pub struct ReplyContext {
    pub user: User,
    /// Raw message text, or the engaged-user prompt.
    pub prompt: String,
    /// Prior turns, oldest first.
    pub history: Vec<HistoryEntry>,
}

/// A tool invocation requested alongside a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub tool: Option<ToolRequest>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool: None,
        }
    }
}

/// Same-identity verdict for a profile link or portfolio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityVerdict {
    #[serde(default)]
    pub matched: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub profile: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_experience: Option<f64>,
}

/// Is-this-a-resume verdict for extracted document text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeVerdict {
    #[serde(default, alias = "isResume")]
    pub is_resume: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub key_fields: ResumeFields,
}

/// Outcome of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualifyDecision {
    Qualify,
    Fail,
    /// Not decided yet; the conversation continues.
    Neither,
}

/// Text the coordinator asks the model to write.
#[derive(Debug, Clone)]
pub enum Synthesis {
    /// First message of an `ask` reach-out.
    Opening {
        author: String,
        opportunity: String,
        target: User,
    },
    /// Body of a `notify` reach-out.
    Notification {
        author: String,
        opportunity: String,
        target: User,
    },
    /// Pre-computed `user_info` for a notified target.
    TargetInfo { opportunity: String, target: User },
    /// Summary of a qualified target from their conversation.
    UserSummary {
        opportunity: String,
        history: Vec<HistoryEntry>,
    },
    /// An hr/client conversation condensed into a need statement.
    NeedStatement { history: Vec<HistoryEntry> },
    /// Report for an author whose query succeeded.
    SuccessSummary {
        need: String,
        qualified: Vec<String>,
    },
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Free-form reply, optionally with one tool request.
    async fn reply(&self, ctx: &ReplyContext) -> Result<Reply, LlmError>;

    /// Does `subject` (a link or page) describe `claimed`? Defaults to no.
    async fn match_identity(
        &self,
        claimed: &User,
        subject: &str,
    ) -> Result<IdentityVerdict, LlmError>;

    async fn classify_document(&self, text: &str) -> Result<ResumeVerdict, LlmError>;

    async fn qualify(
        &self,
        opportunity: &str,
        history: &[HistoryEntry],
    ) -> Result<QualifyDecision, LlmError>;

    async fn synthesize(&self, task: Synthesis) -> Result<String, LlmError>;

    /// Facts in `history` that are new relative to `profile`, as a JSON object.
    async fn profile_facts(
        &self,
        profile: &serde_json::Value,
        history: &[HistoryEntry],
    ) -> Result<serde_json::Value, LlmError>;
}
