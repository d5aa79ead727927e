//! ReachOut registry.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::OutreachError;
use crate::outreach::model::{Query, ReachOut, ReachOutKind, ReachOutStatus};
use crate::store::Database;

/// Owns the `reach_outs` collection.
pub struct ReachOutRegistry {
    db: Arc<dyn Database>,
}

impl ReachOutRegistry {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Create a held reach-out for (query, target).
    ///
    /// The pair is unique in storage; a repeat returns the existing row and
    /// `false`.
    pub async fn create(
        &self,
        target_id: Uuid,
        query_id: Uuid,
        kind: ReachOutKind,
        user_info: &str,
    ) -> Result<(ReachOut, bool), OutreachError> {
        let candidate = ReachOut::new(target_id, query_id, kind).with_user_info(user_info);
        let (reach_out, created) = self.db.insert_reach_out(&candidate).await?;
        if created {
            info!(
                reach_out_id = %reach_out.id,
                query_id = %query_id,
                target_id = %target_id,
                kind = reach_out.kind.as_str(),
                "Reach-out held"
            );
        } else {
            debug!(reach_out_id = %reach_out.id, "Reach-out already exists for pair");
        }
        Ok((reach_out, created))
    }

    /// The reach-out together with its owning query.
    pub async fn find_by_id(&self, id: Uuid) -> Result<(ReachOut, Query), OutreachError> {
        let reach_out = self
            .db
            .get_reach_out(id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "reach_out".into(),
                id: id.to_string(),
            })?;
        let query = self
            .db
            .get_query(reach_out.query_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "query".into(),
                id: reach_out.query_id.to_string(),
            })?;
        Ok((reach_out, query))
    }

    /// Held reach-outs for a target, oldest first.
    pub async fn find_held_for_user(&self, target_id: Uuid) -> Result<Vec<ReachOut>, OutreachError> {
        Ok(self.db.list_held_reach_outs(target_id).await?)
    }

    pub async fn list_for_query(&self, query_id: Uuid) -> Result<Vec<ReachOut>, OutreachError> {
        Ok(self.db.list_reach_outs_for_query(query_id).await?)
    }

    /// Move to `status`; `end` marks the negotiation closed.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: ReachOutStatus,
        end: bool,
    ) -> Result<(), OutreachError> {
        let (current, _) = self.find_by_id(id).await?;
        if !current.status.can_transition_to(status) {
            return Err(OutreachError::InvalidTransition {
                entity: "reach_out".into(),
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }
        self.db.update_reach_out_status(id, status, end).await?;
        info!(reach_out_id = %id, from = %current.status, to = %status, "Reach-out status changed");
        Ok(())
    }

    pub async fn update_user_info(&self, id: Uuid, info: &str) -> Result<(), OutreachError> {
        self.db.update_reach_out_user_info(id, info).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outreach::model::{AuthorRole, User, UserType};
    use crate::store::LibSqlBackend;

    struct Fixture {
        registry: ReachOutRegistry,
        query: Query,
        target: User,
    }

    async fn setup() -> Fixture {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let author = User::new("author").with_type(UserType::Client);
        let target = User::new("target").with_type(UserType::Idol);
        db.insert_user(&author).await.unwrap();
        db.insert_user(&target).await.unwrap();
        let query = Query::new(author.id, AuthorRole::Client, "Logo designer");
        db.insert_query(&query).await.unwrap();
        Fixture {
            registry: ReachOutRegistry::new(db),
            query,
            target,
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_per_pair() {
        let f = setup().await;
        let (first, created) = f
            .registry
            .create(f.target.id, f.query.id, ReachOutKind::Ask, "")
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.status, ReachOutStatus::Hold);

        let (again, created) = f
            .registry
            .create(f.target.id, f.query.id, ReachOutKind::Notify, "other")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);
        assert_eq!(again.kind, ReachOutKind::Ask);
        assert_eq!(f.registry.list_for_query(f.query.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_by_id_resolves_query() {
        let f = setup().await;
        let (ro, _) = f
            .registry
            .create(f.target.id, f.query.id, ReachOutKind::Ask, "")
            .await
            .unwrap();
        let (found, query) = f.registry.find_by_id(ro.id).await.unwrap();
        assert_eq!(found.id, ro.id);
        assert_eq!(query.text, "Logo designer");

        assert!(matches!(
            f.registry.find_by_id(Uuid::new_v4()).await,
            Err(OutreachError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn status_follows_lifecycle() {
        let f = setup().await;
        let (ro, _) = f
            .registry
            .create(f.target.id, f.query.id, ReachOutKind::Ask, "")
            .await
            .unwrap();

        f.registry
            .update_status(ro.id, ReachOutStatus::Init, false)
            .await
            .unwrap();
        assert!(f.registry.find_held_for_user(f.target.id).await.unwrap().is_empty());

        f.registry
            .update_status(ro.id, ReachOutStatus::Fail, true)
            .await
            .unwrap();
        let (done, _) = f.registry.find_by_id(ro.id).await.unwrap();
        assert_eq!(done.status, ReachOutStatus::Fail);
        assert!(done.end);

        let err = f
            .registry
            .update_status(ro.id, ReachOutStatus::Qualify, true)
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn user_info_is_stored() {
        let f = setup().await;
        let (ro, _) = f
            .registry
            .create(f.target.id, f.query.id, ReachOutKind::Notify, "")
            .await
            .unwrap();
        f.registry
            .update_user_info(ro.id, "Ten years of brand work")
            .await
            .unwrap();
        let (stored, _) = f.registry.find_by_id(ro.id).await.unwrap();
        assert_eq!(stored.user_info, "Ten years of brand work");
    }
}
