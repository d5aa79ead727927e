//! Pending-work sweep: success reports and held reach-outs for one user.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::Synthesis;
use crate::error::OutreachError;
use crate::outreach::coordinator::Coordinator;
use crate::outreach::model::{
    Query, ReachOut, ReachOutKind, ReachOutStatus, User, UserPatch, UserType,
};
use crate::outreach::prompts;

/// Result of [`Coordinator::check_reach_out`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No held reach-outs; nothing was written.
    NothingPending,
    /// The user is mid-negotiation; held items wait.
    Deferred { pending: usize },
    /// An `ask` reach-out was opened; later items stay held.
    Engaged { reach_out_id: Uuid },
    /// Every held item was a `notify` and is now qualified.
    Notified { count: usize },
}

impl SweepOutcome {
    /// Whether anything was delivered to the user.
    pub fn dispatched(&self) -> bool {
        match self {
            Self::Engaged { .. } => true,
            Self::Notified { count } => *count > 0,
            Self::NothingPending | Self::Deferred { .. } => false,
        }
    }
}

impl Coordinator {
    /// Deliver pending work to `jid`: success reports for queries they
    /// authored, then held reach-outs in creation order.
    ///
    /// At most one `ask` is opened per sweep; `notify` items before it are
    /// all delivered.
    pub async fn check_reach_out(&self, jid: &str) -> Result<SweepOutcome, OutreachError> {
        let Some(mut user) = self.gateway.find_user(jid).await? else {
            return Ok(SweepOutcome::NothingPending);
        };

        self.report_successes(&user).await?;

        let held = self.reach_outs.find_held_for_user(user.id).await?;
        if held.is_empty() {
            return Ok(SweepOutcome::NothingPending);
        }
        if user.user_type.is_engaged() {
            debug!(jid, pending = held.len(), "User engaged, deferring held reach-outs");
            return Ok(SweepOutcome::Deferred {
                pending: held.len(),
            });
        }

        let framing = if user.user_type == UserType::New {
            prompts::SAVE_CONTACT
        } else {
            prompts::HAVE_UPDATES
        };
        let mut framed = false;

        let mut notified = 0;
        for reach_out in held {
            let query = match self.queries.get_by_id(reach_out.query_id).await {
                Ok(query) => query,
                Err(OutreachError::NotFound { .. }) => {
                    warn!(reach_out_id = %reach_out.id, "Held reach-out has no query, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let author = self.gateway.get_user_by_id(query.author_id).await?;

            // Intro goes out only once something is actually delivered.
            if !framed {
                self.say(&user, framing).await?;
                framed = true;
            }

            match reach_out.kind {
                ReachOutKind::Ask => {
                    user = self.open_ask(&user, &author, &query, &reach_out).await?;
                    debug!(jid = %user.jid, "Stopping sweep after opening ask");
                    return Ok(SweepOutcome::Engaged {
                        reach_out_id: reach_out.id,
                    });
                }
                ReachOutKind::Notify => {
                    self.deliver_notify(&user, &author, &query, &reach_out)
                        .await?;
                    notified += 1;
                }
            }
        }

        Ok(SweepOutcome::Notified { count: notified })
    }

    async fn open_ask(
        &self,
        user: &User,
        author: &User,
        query: &Query,
        reach_out: &ReachOut,
    ) -> Result<User, OutreachError> {
        let opening = self
            .classifier
            .synthesize(Synthesis::Opening {
                author: author.display_name().to_string(),
                opportunity: query.text.clone(),
                target: user.clone(),
            })
            .await?;

        let engaged_type = query.author_role.engaged_type();
        let engaged = self
            .gateway
            .update_user(user.id, &UserPatch::engage(engaged_type, reach_out.id))
            .await?;
        info!(
            jid = %user.jid,
            from = %user.user_type,
            to = %engaged_type,
            reach_out_id = %reach_out.id,
            "User engaged"
        );
        self.reach_outs
            .update_status(reach_out.id, ReachOutStatus::Init, false)
            .await?;

        self.say(&engaged, &opening).await?;
        Ok(engaged)
    }

    async fn deliver_notify(
        &self,
        user: &User,
        author: &User,
        query: &Query,
        reach_out: &ReachOut,
    ) -> Result<(), OutreachError> {
        let text = self
            .classifier
            .synthesize(Synthesis::Notification {
                author: author.display_name().to_string(),
                opportunity: query.text.clone(),
                target: user.clone(),
            })
            .await?;

        self.reach_outs
            .update_status(reach_out.id, ReachOutStatus::Qualify, true)
            .await?;
        if self.queries.is_successful(query.id).await? && author.user_type == UserType::Idol {
            if let Err(e) = self.report_successes(author).await {
                warn!(jid = %author.jid, error = %e, "Success report failed");
            }
        }

        self.say(user, &text).await
    }

    /// Send a summary for each successful query the user authored that has
    /// not been reported yet. Returns how many were sent.
    pub(crate) async fn report_successes(&self, user: &User) -> Result<usize, OutreachError> {
        let pending = self.queries.successful_unreported(user.id).await?;
        for query in &pending {
            let qualified: Vec<String> = self
                .reach_outs
                .list_for_query(query.id)
                .await?
                .into_iter()
                .filter(|r| r.status == ReachOutStatus::Qualify)
                .map(|r| r.user_info)
                .filter(|info| !info.trim().is_empty())
                .collect();

            let summary = self
                .classifier
                .synthesize(Synthesis::SuccessSummary {
                    need: query.text.clone(),
                    qualified,
                })
                .await?;

            self.queries.mark_reported(query.id).await?;
            info!(jid = %user.jid, query_id = %query.id, "Query success reported");
            self.say(user, &summary).await?;
        }
        Ok(pending.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::{CacheGateway, InMemoryCache};
    use crate::channels::ChannelManager;
    use crate::classifier::{
        Classifier, IdentityVerdict, QualifyDecision, Reply, ReplyContext, ResumeVerdict,
    };
    use crate::config::{CacheConfig, OutreachConfig};
    use crate::error::LlmError;
    use crate::outreach::model::{AuthorRole, HistoryEntry};
    use crate::store::{Database, LibSqlBackend};

    /// Sweeps over orphaned items must never reach the model.
    struct Unreachable;

    #[async_trait]
    impl Classifier for Unreachable {
        async fn reply(&self, _: &ReplyContext) -> Result<Reply, LlmError> {
            unreachable!()
        }
        async fn match_identity(&self, _: &User, _: &str) -> Result<IdentityVerdict, LlmError> {
            unreachable!()
        }
        async fn classify_document(&self, _: &str) -> Result<ResumeVerdict, LlmError> {
            unreachable!()
        }
        async fn qualify(&self, _: &str, _: &[HistoryEntry]) -> Result<QualifyDecision, LlmError> {
            unreachable!()
        }
        async fn synthesize(&self, _: Synthesis) -> Result<String, LlmError> {
            unreachable!()
        }
        async fn profile_facts(
            &self,
            _: &serde_json::Value,
            _: &[HistoryEntry],
        ) -> Result<serde_json::Value, LlmError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn orphaned_items_send_no_intro() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let author = User::new("author").with_type(UserType::Hr);
        let target = User::new("target").with_type(UserType::Idol);
        backend.insert_user(&author).await.unwrap();
        backend.insert_user(&target).await.unwrap();
        let query = Query::new(author.id, AuthorRole::Hr, "Rust engineer");
        backend.insert_query(&query).await.unwrap();
        let held = ReachOut::new(target.id, query.id, ReachOutKind::Notify);
        backend.insert_reach_out(&held).await.unwrap();

        // Leave the reach-out pointing at a query that no longer exists.
        backend
            .conn()
            .execute("PRAGMA foreign_keys = OFF", ())
            .await
            .unwrap();
        backend
            .conn()
            .execute(
                "DELETE FROM queries WHERE id = ?1",
                libsql::params![query.id.to_string()],
            )
            .await
            .unwrap();

        let db: Arc<dyn Database> = backend;
        let gateway = Arc::new(CacheGateway::new(
            db.clone(),
            Arc::new(InMemoryCache::new()),
            CacheConfig::default(),
        ));
        let coordinator = Coordinator::new(
            gateway,
            Arc::new(Unreachable),
            Arc::new(ChannelManager::new()),
            OutreachConfig::default(),
        );

        let outcome = coordinator.check_reach_out("target").await.unwrap();
        assert_eq!(outcome, SweepOutcome::Notified { count: 0 });
        assert!(db.recent_messages("target", 10).await.unwrap().is_empty());
    }

    #[test]
    fn only_delivery_counts_as_dispatched() {
        assert!(SweepOutcome::Engaged { reach_out_id: Uuid::new_v4() }.dispatched());
        assert!(SweepOutcome::Notified { count: 2 }.dispatched());
        assert!(!SweepOutcome::Notified { count: 0 }.dispatched());
        assert!(!SweepOutcome::NothingPending.dispatched());
        assert!(!SweepOutcome::Deferred { pending: 1 }.dispatched());
    }
}
