//! Outreach coordinator: drives user, query and reach-out transitions from
//! inbound messages.
//!
//! The coordinator is split across files by flow: attachment triage
//! (`triage.rs`), session-end handling (`session.rs`), the pending-work
//! sweep (`sweep.rs`) and query fan-out (`fanout.rs`). This file holds the
//! shared state and the inbound entry point.
//!
//! State changes always commit before the message announcing them is sent,
//! and a failed send never rolls anything back.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactIndexer, DocumentExtractor, NoopIndexer, PlainTextExtractor};
use crate::cache::CacheGateway;
use crate::channels::{IncomingMessage, Outbound};
use crate::classifier::{Classifier, END_SESSION_TOOL, ReplyContext};
use crate::config::OutreachConfig;
use crate::error::OutreachError;
use crate::outreach::model::{Message, MessageRole, User, UserPatch};
use crate::outreach::prompts;
use crate::outreach::queries::QueryRegistry;
use crate::outreach::reach_outs::ReachOutRegistry;
use crate::outreach::session::SessionAction;
use crate::outreach::triage::Triage;

pub struct Coordinator {
    pub(crate) gateway: Arc<CacheGateway>,
    pub(crate) queries: QueryRegistry,
    pub(crate) reach_outs: ReachOutRegistry,
    pub(crate) classifier: Arc<dyn Classifier>,
    pub(crate) outbound: Arc<dyn Outbound>,
    pub(crate) extractor: Arc<dyn DocumentExtractor>,
    pub(crate) indexer: Arc<dyn ArtifactIndexer>,
    pub(crate) config: OutreachConfig,
}

impl Coordinator {
    pub fn new(
        gateway: Arc<CacheGateway>,
        classifier: Arc<dyn Classifier>,
        outbound: Arc<dyn Outbound>,
        config: OutreachConfig,
    ) -> Self {
        let db = gateway.store().clone();
        Self {
            queries: QueryRegistry::new(db.clone()),
            reach_outs: ReachOutRegistry::new(db),
            gateway,
            classifier,
            outbound,
            extractor: Arc::new(PlainTextExtractor),
            indexer: Arc::new(NoopIndexer),
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn ArtifactIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn gateway(&self) -> &Arc<CacheGateway> {
        &self.gateway
    }

    pub fn queries(&self) -> &QueryRegistry {
        &self.queries
    }

    pub fn reach_outs(&self) -> &ReachOutRegistry {
        &self.reach_outs
    }

    /// Handle one inbound message.
    ///
    /// Returns the reply the transport should deliver, or `None` when
    /// everything the user needs to see was already sent.
    pub async fn handle_inbound(
        &self,
        msg: &IncomingMessage,
    ) -> Result<Option<String>, OutreachError> {
        let mut user = self.gateway.get_user(&msg.user_id).await?;
        if user.name.is_none()
            && let Some(name) = msg.user_name.as_deref()
        {
            user = self
                .gateway
                .update_user(user.id, &UserPatch::default().name(name))
                .await?;
        }

        let mut inbound = Message::new(&user.jid, MessageRole::User, user.user_type, &msg.content);
        if let Some(attachment) = &msg.attachment {
            inbound = inbound.with_media(attachment.media_type());
        }
        self.gateway.append_message(&inbound).await?;

        match self.respond(user, msg).await {
            Err(OutreachError::TransientProvider(reason)) => {
                warn!(jid = %msg.user_id, reason, "Classifier unavailable, asking user to retry");
                let user = self.gateway.get_user(&msg.user_id).await?;
                self.persist_reply(&user, prompts::TRY_LATER).await?;
                Ok(Some(prompts::TRY_LATER.to_string()))
            }
            other => other,
        }
    }

    async fn respond(
        &self,
        user: User,
        msg: &IncomingMessage,
    ) -> Result<Option<String>, OutreachError> {
        let content = match self.triage(&user, msg).await? {
            Triage::Stop => return Ok(None),
            Triage::Continue => msg.content.clone(),
            Triage::Verified => prompts::WHATS_NEXT.to_string(),
        };
        // Triage may have merged profile fields.
        let user = self.gateway.get_user(&user.jid).await?;

        let mut history = self.gateway.get_history(&user.jid).await?;
        if history
            .last()
            .is_some_and(|h| h.role == MessageRole::User && h.text == content)
        {
            history.pop();
        }

        let prompt = if user.user_type.is_engaged() {
            self.engaged_prompt(&user, &content).await?
        } else {
            content
        };

        let ctx = ReplyContext {
            user: user.clone(),
            prompt,
            history,
        };
        let reply = self.classifier.reply(&ctx).await?;

        let Some(tool) = reply.tool else {
            self.persist_reply(&user, &reply.text).await?;
            return Ok(Some(reply.text));
        };

        if tool.name != END_SESSION_TOOL {
            warn!(jid = %user.jid, tool = %tool.name, "Ignoring unknown tool request");
            self.persist_reply(&user, &reply.text).await?;
            return Ok(Some(reply.text));
        }

        // The model's own words go out before the session notice.
        if !reply.text.trim().is_empty() {
            self.say(&user, &reply.text).await?;
        }
        let action = SessionAction::from_arguments(&tool.arguments);
        let outcome = self.end_session(&user, action).await?;
        debug!(jid = %user.jid, outcome = ?outcome, "Session-end handled");
        Ok(None)
    }

    /// Message for an engaged user, framed by their active opportunity.
    async fn engaged_prompt(&self, user: &User, content: &str) -> Result<String, OutreachError> {
        let Some(reach_out_id) = user.current_reach_out else {
            warn!(jid = %user.jid, "Engaged user has no active reach-out");
            return Ok(content.to_string());
        };
        let (_, query) = self.reach_outs.find_by_id(reach_out_id).await?;
        let author = self.gateway.get_user_by_id(query.author_id).await?;
        Ok(prompts::engaged_prompt(
            author.display_name(),
            &query.text,
            content,
        ))
    }

    async fn persist_reply(&self, user: &User, text: &str) -> Result<(), OutreachError> {
        let reply = Message::new(&user.jid, MessageRole::Model, user.user_type, text);
        self.gateway.append_message(&reply).await?;
        Ok(())
    }

    /// Persist a model message, then deliver it. Delivery is best-effort.
    pub(crate) async fn say(&self, user: &User, text: &str) -> Result<(), OutreachError> {
        self.persist_reply(user, text).await?;
        if let Err(e) = self.outbound.send_text(&user.jid, text).await {
            warn!(jid = %user.jid, error = %e, "Delivery failed");
        }
        Ok(())
    }

    /// Best-effort variant of [`say`](Self::say) for notices.
    pub(crate) async fn notify(&self, user: &User, text: &str) {
        if let Err(e) = self.say(user, text).await {
            warn!(jid = %user.jid, error = %e, "Notice not recorded");
        }
    }

    /// Store `extra`'s keys on top of the user's profile.
    pub(crate) async fn merge_profile(
        &self,
        user: &User,
        extra: serde_json::Value,
        patch: UserPatch,
    ) -> Result<User, OutreachError> {
        let merged = merge_metadata(&user.metadata, extra);
        let updated = self
            .gateway
            .update_user(user.id, &patch.metadata(merged))
            .await?;
        info!(jid = %user.jid, user_type = %updated.user_type, "Profile updated");
        Ok(updated)
    }
}

/// Shallow merge of two JSON objects; `extra` wins on conflicts. Non-object
/// inputs are treated as empty.
pub(crate) fn merge_metadata(base: &serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    let mut merged = match base {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let serde_json::Value::Object(extra) = extra {
        for (k, v) in extra {
            if !v.is_null() {
                merged.insert(k, v);
            }
        }
    }
    serde_json::Value::Object(merged)
}
