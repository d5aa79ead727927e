//! Session-end handling, dispatched on the user's current type.

use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{QualifyDecision, Synthesis};
use crate::error::OutreachError;
use crate::outreach::candidates::Candidate;
use crate::outreach::coordinator::Coordinator;
use crate::outreach::model::{ReachOutStatus, User, UserPatch, UserType};
use crate::outreach::prompts;

/// Arguments of an `end_session` tool request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionAction {
    pub new_type: Option<UserType>,
    pub candidates: Vec<Candidate>,
}

impl SessionAction {
    /// Lenient parse: unknown types and malformed candidates are dropped.
    pub fn from_arguments(args: &serde_json::Value) -> Self {
        let new_type = args
            .get("new_type")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok());
        let candidates = args
            .get("candidates")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| serde_json::from_value(c.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            new_type,
            candidates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    TypeAssigned(UserType),
    /// No usable type was given; the user gets guidance.
    NeedsType,
    /// Held reach-outs were delivered instead of a type change.
    ReachOutsSent,
    Qualified,
    Failed,
    /// The classifier could not decide; the negotiation continues.
    Unresolved,
    ProfileUpdated,
    Dispatched { query_id: Uuid, reached: usize },
}

impl SessionOutcome {
    fn notice(&self) -> Option<String> {
        match self {
            Self::TypeAssigned(t) => Some(prompts::session_changed(*t)),
            Self::NeedsType => Some(prompts::NEEDS_TYPE.to_string()),
            Self::ReachOutsSent => Some(prompts::REACH_OUTS_SENT.to_string()),
            Self::Qualified | Self::Failed | Self::ProfileUpdated | Self::Dispatched { .. } => {
                Some(prompts::session_changed(UserType::Idol))
            }
            Self::Unresolved => None,
        }
    }
}

impl Coordinator {
    /// Handle an `end_session` request from the reply model.
    ///
    /// Every handled outcome except [`SessionOutcome::Unresolved`] ends
    /// with a best-effort notice to the user.
    pub async fn end_session(
        &self,
        user: &User,
        action: SessionAction,
    ) -> Result<SessionOutcome, OutreachError> {
        let outcome = match user.user_type {
            UserType::New => self.assign_type(user, action.new_type).await?,
            UserType::Idol => {
                let sweep = self.check_reach_out(&user.jid).await?;
                if sweep.dispatched() {
                    SessionOutcome::ReachOutsSent
                } else {
                    self.assign_type(user, action.new_type).await?
                }
            }
            UserType::Rof | UserType::Roc => self.close_negotiation(user).await?,
            UserType::Candidate | UserType::Freelancer => self.update_profile(user).await?,
            UserType::Client | UserType::Hr => {
                self.dispatch_query(user, &action.candidates).await?
            }
        };

        if let Some(notice) = outcome.notice() {
            let current = self.gateway.get_user(&user.jid).await.unwrap_or_else(|e| {
                warn!(jid = %user.jid, error = %e, "Could not reload user for notice");
                user.clone()
            });
            self.notify(&current, &notice).await;
        }
        Ok(outcome)
    }

    async fn assign_type(
        &self,
        user: &User,
        new_type: Option<UserType>,
    ) -> Result<SessionOutcome, OutreachError> {
        let Some(target) = new_type.filter(|t| t.is_assignable()) else {
            return Ok(SessionOutcome::NeedsType);
        };
        if !user.user_type.can_transition_to(target) {
            warn!(jid = %user.jid, from = %user.user_type, to = %target, "Refusing type change");
            return Ok(SessionOutcome::NeedsType);
        }

        self.gateway
            .update_user(user.id, &UserPatch::with_type(target))
            .await?;
        info!(jid = %user.jid, from = %user.user_type, to = %target, "User type assigned");
        Ok(SessionOutcome::TypeAssigned(target))
    }

    /// Qualification of an engaged target.
    async fn close_negotiation(&self, user: &User) -> Result<SessionOutcome, OutreachError> {
        let reach_out_id = user.current_reach_out.ok_or_else(|| OutreachError::NotFound {
            entity: "reach_out".into(),
            id: format!("current for {}", user.jid),
        })?;
        let (reach_out, query) = self.reach_outs.find_by_id(reach_out_id).await?;
        let history = self.gateway.get_history(&user.jid).await?;

        let outcome = match self.classifier.qualify(&query.text, &history).await? {
            QualifyDecision::Neither => {
                info!(jid = %user.jid, reach_out_id = %reach_out.id, "Negotiation unresolved");
                return Ok(SessionOutcome::Unresolved);
            }
            QualifyDecision::Qualify => {
                self.reach_outs
                    .update_status(reach_out.id, ReachOutStatus::Qualify, true)
                    .await?;
                match self
                    .classifier
                    .synthesize(Synthesis::UserSummary {
                        opportunity: query.text.clone(),
                        history,
                    })
                    .await
                {
                    Ok(summary) if !summary.trim().is_empty() => {
                        self.reach_outs
                            .update_user_info(reach_out.id, &summary)
                            .await?;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(jid = %user.jid, error = %e, "User summary failed"),
                }
                SessionOutcome::Qualified
            }
            QualifyDecision::Fail => {
                self.reach_outs
                    .update_status(reach_out.id, ReachOutStatus::Fail, true)
                    .await?;
                SessionOutcome::Failed
            }
        };

        if self.queries.is_successful(query.id).await? {
            match self.gateway.get_user_by_id(query.author_id).await {
                Ok(author) if author.user_type == UserType::Idol => {
                    if let Err(e) = self.check_reach_out(&author.jid).await {
                        warn!(jid = %author.jid, error = %e, "Author sweep failed");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(query_id = %query.id, error = %e, "Query author missing"),
            }
        }

        self.release(user).await?;
        self.check_reach_out(&user.jid).await?;
        Ok(outcome)
    }

    /// Store new facts from the conversation, then release.
    async fn update_profile(&self, user: &User) -> Result<SessionOutcome, OutreachError> {
        let history = self.gateway.get_history(&user.jid).await?;
        let facts = self
            .classifier
            .profile_facts(&user.metadata, &history)
            .await?;

        self.merge_profile(user, facts, UserPatch::release()).await?;
        info!(jid = %user.jid, from = %user.user_type, to = %UserType::Idol, "User released");
        self.check_reach_out(&user.jid).await?;
        Ok(SessionOutcome::ProfileUpdated)
    }

    /// Turn the author's conversation into a query and reach out.
    async fn dispatch_query(
        &self,
        author: &User,
        candidates: &[Candidate],
    ) -> Result<SessionOutcome, OutreachError> {
        let history = self.gateway.get_history(&author.jid).await?;
        let need = self
            .classifier
            .synthesize(Synthesis::NeedStatement { history })
            .await?;

        let query = self.queries.create(author, need.trim()).await?;
        let reached = self.fan_out(&query, author, candidates).await;
        let job_id = self.gateway.store().enqueue_match_job(query.id).await?;
        info!(query_id = %query.id, job_id = %job_id, "Match job queued");

        self.release(author).await?;
        self.check_reach_out(&author.jid).await?;
        Ok(SessionOutcome::Dispatched {
            query_id: query.id,
            reached,
        })
    }

    async fn release(&self, user: &User) -> Result<User, OutreachError> {
        let released = self
            .gateway
            .update_user(user.id, &UserPatch::release())
            .await?;
        info!(jid = %user.jid, from = %user.user_type, to = %released.user_type, "User released");
        Ok(released)
    }
}
