//! Fan-out of a dispatched query to its candidates.

use tracing::{debug, info, warn};

use crate::classifier::Synthesis;
use crate::error::OutreachError;
use crate::outreach::candidates::Candidate;
use crate::outreach::coordinator::Coordinator;
use crate::outreach::model::{Query, ReachOutKind, User, UserPatch, jid_from_phone};

impl Coordinator {
    /// Hold a reach-out for every usable candidate and sweep each new
    /// target right away.
    ///
    /// Candidates are handled one at a time with the configured pause in
    /// between. One candidate failing does not stop the rest. Returns the
    /// number of reach-outs created.
    pub async fn fan_out(&self, query: &Query, author: &User, candidates: &[Candidate]) -> usize {
        let mut created = 0;
        for (i, candidate) in candidates.iter().enumerate() {
            if i > 0 && !self.config.fanout_delay.is_zero() {
                tokio::time::sleep(self.config.fanout_delay).await;
            }
            match self.reach_candidate(query, author, candidate).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    query_id = %query.id,
                    phone = %candidate.phone,
                    error = %e,
                    "Reach-out to candidate failed"
                ),
            }
        }
        info!(query_id = %query.id, candidates = candidates.len(), created, "Fan-out finished");
        created
    }

    async fn reach_candidate(
        &self,
        query: &Query,
        author: &User,
        candidate: &Candidate,
    ) -> Result<bool, OutreachError> {
        let Some(jid) = jid_from_phone(&candidate.phone, self.config.min_phone_digits) else {
            debug!(phone = %candidate.phone, "Skipping candidate with invalid phone");
            return Ok(false);
        };
        if jid == author.jid {
            debug!(query_id = %query.id, "Skipping self reach-out");
            return Ok(false);
        }

        let target = self.find_or_create_target(&jid, candidate).await?;

        let kind = ReachOutKind::decide(query.author_role, target.user_type);
        let user_info = match kind {
            ReachOutKind::Ask => String::new(),
            ReachOutKind::Notify => self
                .classifier
                .synthesize(Synthesis::TargetInfo {
                    opportunity: query.text.clone(),
                    target: target.clone(),
                })
                .await
                .unwrap_or_else(|e| {
                    warn!(jid, error = %e, "Target summary failed");
                    String::new()
                }),
        };

        let (_, created) = self
            .reach_outs
            .create(target.id, query.id, kind, &user_info)
            .await?;
        if !created {
            return Ok(false);
        }

        let outcome = self.check_reach_out(&jid).await?;
        debug!(jid, outcome = ?outcome, "Target swept");
        Ok(true)
    }

    async fn find_or_create_target(
        &self,
        jid: &str,
        candidate: &Candidate,
    ) -> Result<User, OutreachError> {
        let Some(existing) = self.gateway.find_user(jid).await? else {
            let mut user = User::new(jid).with_phone(&candidate.phone);
            if let Some(name) = &candidate.name {
                user = user.with_name(name);
            }
            if candidate.profile.is_object() {
                user.metadata = candidate.profile.clone();
            }
            self.gateway.insert_user(&user).await?;
            info!(jid, user_id = %user.id, "Created fan-out target");
            return Ok(user);
        };

        let mut patch = UserPatch::default();
        if existing.name.is_none()
            && let Some(name) = &candidate.name
        {
            patch = patch.name(name);
        }
        if existing.phone.is_none() {
            patch = patch.phone(&candidate.phone);
        }
        if !existing.has_profile() && candidate.profile.is_object() {
            patch = patch.metadata(candidate.profile.clone());
        }
        if patch.is_empty() {
            return Ok(existing);
        }
        Ok(self.gateway.update_user(existing.id, &patch).await?)
    }
}
