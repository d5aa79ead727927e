//! Attachment triage: profile links, portfolios and resumes.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::artifacts::{Artifact, ArtifactKind};
use crate::channels::{Attachment, IncomingMessage};
use crate::error::OutreachError;
use crate::outreach::coordinator::Coordinator;
use crate::outreach::model::{Message, MessageRole, User, UserPatch, UserType};
use crate::outreach::prompts;

static PROFESSIONAL_PROFILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://([a-z]{2,3}\.)?(www\.)?linkedin\.com/(in|pub)/[^/\s]+").unwrap()
});

/// What the inbound path does after triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triage {
    /// Nothing to verify; reply to the message as usual.
    Continue,
    /// An artifact was accepted and a "what's next" turn seeded.
    Verified,
    /// The flow already answered; send nothing else.
    Stop,
}

pub fn is_professional_profile(url: &str) -> bool {
    PROFESSIONAL_PROFILE.is_match(url)
}

impl Coordinator {
    /// Route an attachment to its verification flow. First match wins.
    pub(crate) async fn triage(
        &self,
        user: &User,
        msg: &IncomingMessage,
    ) -> Result<Triage, OutreachError> {
        let Some(attachment) = &msg.attachment else {
            return Ok(Triage::Continue);
        };

        match (attachment, user.user_type) {
            (Attachment::Link { url }, _) if is_professional_profile(url) => {
                self.verify_link(user, url, ArtifactKind::Profile).await
            }
            (Attachment::Document { .. }, UserType::Candidate) => {
                self.verify_document(user, attachment).await
            }
            (Attachment::Link { url }, UserType::Freelancer) => {
                self.verify_link(user, url, ArtifactKind::Portfolio).await
            }
            (Attachment::Document { .. }, UserType::Freelancer) => {
                self.verify_document(user, attachment).await
            }
            _ => Ok(Triage::Continue),
        }
    }

    async fn verify_link(
        &self,
        user: &User,
        url: &str,
        kind: ArtifactKind,
    ) -> Result<Triage, OutreachError> {
        self.say(user, prompts::CHECKING).await?;

        let verdict = self.classifier.match_identity(user, url).await?;
        info!(
            jid = %user.jid,
            kind = ?kind,
            matched = verdict.matched,
            confidence = verdict.confidence,
            "Identity verdict"
        );

        let (confirmed, rejected) = match kind {
            ArtifactKind::Portfolio => (prompts::PORTFOLIO_CONFIRMED, prompts::PORTFOLIO_REJECTED),
            _ => (prompts::PROFILE_CONFIRMED, prompts::PROFILE_REJECTED),
        };

        if !verdict.matched {
            self.say(user, rejected).await?;
            return Ok(Triage::Stop);
        }

        let mut fields = match verdict.profile {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        fields.insert("url".into(), serde_json::Value::String(url.to_string()));
        self.accept(user, kind, url, serde_json::Value::Object(fields), confirmed)
            .await
    }

    async fn verify_document(
        &self,
        user: &User,
        attachment: &Attachment,
    ) -> Result<Triage, OutreachError> {
        let Attachment::Document {
            file_name,
            mime_type,
            bytes,
        } = attachment
        else {
            return Ok(Triage::Continue);
        };

        let text = match self
            .extractor
            .extract(file_name, mime_type.as_deref(), bytes)
        {
            Ok(text) => text,
            Err(e) => {
                warn!(jid = %user.jid, error = %e, "Document extraction failed");
                self.say(user, prompts::DOCUMENT_UNREADABLE).await?;
                return Ok(Triage::Stop);
            }
        };

        self.say(user, prompts::CHECKING).await?;

        let verdict = self.classifier.classify_document(&text).await?;
        info!(
            jid = %user.jid,
            is_resume = verdict.is_resume,
            confidence = verdict.confidence,
            "Resume verdict"
        );

        if !verdict.is_resume {
            self.say(user, prompts::RESUME_REJECTED).await?;
            return Ok(Triage::Stop);
        }

        let fields = serde_json::to_value(&verdict.key_fields)
            .unwrap_or_else(|_| serde_json::json!({}));
        self.accept(user, ArtifactKind::Resume, file_name, fields, prompts::RESUME_CONFIRMED)
            .await
    }

    /// Store the artifact on the profile, confirm, seed a "what's next"
    /// turn and hand the artifact to the indexer.
    async fn accept(
        &self,
        user: &User,
        kind: ArtifactKind,
        source: &str,
        fields: serde_json::Value,
        confirmation: &str,
    ) -> Result<Triage, OutreachError> {
        let key = match kind {
            ArtifactKind::Profile => "profile",
            ArtifactKind::Portfolio => "portfolio",
            ArtifactKind::Resume => "resume",
        };
        let mut extra = serde_json::Map::new();
        extra.insert(key.to_string(), fields.clone());
        let user = self
            .merge_profile(user, serde_json::Value::Object(extra), UserPatch::default())
            .await?;

        self.say(&user, confirmation).await?;

        let seed = Message::new(&user.jid, MessageRole::User, user.user_type, prompts::WHATS_NEXT);
        self.gateway.append_message(&seed).await?;

        let artifact = Artifact {
            jid: user.jid.clone(),
            kind,
            source: source.to_string(),
            fields,
        };
        if let Err(e) = self.indexer.index(&artifact).await {
            warn!(jid = %user.jid, kind = ?kind, error = %e, "Artifact indexing failed");
        }
        Ok(Triage::Verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_profile_links() {
        assert!(is_professional_profile("https://www.linkedin.com/in/ada-lovelace"));
        assert!(is_professional_profile("http://uk.linkedin.com/pub/ada/1/2/3"));
        assert!(!is_professional_profile("https://www.linkedin.com/company/acme"));
        assert!(!is_professional_profile("https://dribbble.com/ada"));
    }
}
