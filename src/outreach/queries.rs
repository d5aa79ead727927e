//! Query registry.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::OutreachError;
use crate::outreach::model::{AuthorRole, Query, QueryStatus, ReachOutStatus, User};
use crate::store::Database;

/// Owns the `queries` collection. No cross-entity orchestration here.
pub struct QueryRegistry {
    db: Arc<dyn Database>,
}

impl QueryRegistry {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Persist a new `init` query. Only hr and client users may author one.
    pub async fn create(&self, author: &User, text: &str) -> Result<Query, OutreachError> {
        let role = AuthorRole::from_user_type(author.user_type).ok_or_else(|| {
            OutreachError::Authorization {
                user_type: author.user_type.to_string(),
            }
        })?;

        let query = Query::new(author.id, role, text);
        self.db.insert_query(&query).await?;
        info!(query_id = %query.id, author = %author.jid, role = role.as_str(), "Query created");
        Ok(query)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Query, OutreachError> {
        self.db
            .get_query(id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "query".into(),
                id: id.to_string(),
            })
    }

    /// Change status. A terminal query keeps its status.
    pub async fn update_status(&self, id: Uuid, status: QueryStatus) -> Result<(), OutreachError> {
        let query = self.get_by_id(id).await?;
        if query.status == status {
            return Ok(());
        }
        if query.status.is_terminal() {
            return Err(OutreachError::InvalidTransition {
                entity: "query".into(),
                from: query.status.to_string(),
                to: status.to_string(),
            });
        }
        self.db.update_query_status(id, status).await?;
        info!(query_id = %id, from = %query.status, to = %status, "Query status changed");
        Ok(())
    }

    /// Flip to `success` once qualifying reach-outs exceed half of all of
    /// them. Never marks `fail`; a query already `success` returns true
    /// without writing.
    pub async fn is_successful(&self, id: Uuid) -> Result<bool, OutreachError> {
        let query = self.get_by_id(id).await?;
        match query.status {
            QueryStatus::Success => return Ok(true),
            QueryStatus::Fail => return Ok(false),
            QueryStatus::Init | QueryStatus::Hold => {}
        }

        let reach_outs = self.db.list_reach_outs_for_query(id).await?;
        let total = reach_outs.len();
        let qualifying = reach_outs
            .iter()
            .filter(|r| r.status == ReachOutStatus::Qualify)
            .count();

        if qualifying * 2 > total {
            self.update_status(id, QueryStatus::Success).await?;
            info!(query_id = %id, qualifying, total, "Query reached success threshold");
            return Ok(true);
        }
        Ok(false)
    }

    /// Successful queries by `author_id` whose summary has not been sent.
    pub async fn successful_unreported(&self, author_id: Uuid) -> Result<Vec<Query>, OutreachError> {
        Ok(self
            .db
            .list_queries_by_author(author_id)
            .await?
            .into_iter()
            .filter(|q| q.status == QueryStatus::Success && !q.reported)
            .collect())
    }

    pub async fn mark_reported(&self, id: Uuid) -> Result<(), OutreachError> {
        self.db.mark_query_reported(id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outreach::model::{ReachOut, ReachOutKind, UserType};
    use crate::store::LibSqlBackend;

    async fn setup() -> (Arc<dyn Database>, QueryRegistry, User) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let author = User::new("author").with_type(UserType::Hr);
        db.insert_user(&author).await.unwrap();
        (db.clone(), QueryRegistry::new(db), author)
    }

    async fn add_reach_out(db: &Arc<dyn Database>, query: &Query, status: ReachOutStatus) {
        let target = User::new(Uuid::new_v4().to_string()).with_type(UserType::Idol);
        db.insert_user(&target).await.unwrap();
        let ro = ReachOut::new(target.id, query.id, ReachOutKind::Ask);
        db.insert_reach_out(&ro).await.unwrap();
        if status != ReachOutStatus::Hold {
            db.update_reach_out_status(ro.id, status, status.is_terminal())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn only_hr_and_client_may_author() {
        let (db, registry, author) = setup().await;
        let query = registry.create(&author, "Senior backend engineer").await.unwrap();
        assert_eq!(query.status, QueryStatus::Init);
        assert_eq!(query.author_role, AuthorRole::Hr);

        let candidate = User::new("cand").with_type(UserType::Candidate);
        db.insert_user(&candidate).await.unwrap();
        let err = registry.create(&candidate, "anything").await.unwrap_err();
        assert!(matches!(err, OutreachError::Authorization { ref user_type } if user_type == "candidate"));
    }

    #[tokio::test]
    async fn missing_query_is_not_found() {
        let (_db, registry, _) = setup().await;
        let err = registry.get_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, OutreachError::NotFound { .. }));
    }

    #[tokio::test]
    async fn success_needs_strict_majority() {
        let (db, registry, author) = setup().await;
        let query = registry.create(&author, "Designer").await.unwrap();

        assert!(!registry.is_successful(query.id).await.unwrap());

        add_reach_out(&db, &query, ReachOutStatus::Qualify).await;
        add_reach_out(&db, &query, ReachOutStatus::Fail).await;
        // 1 of 2 is not more than half.
        assert!(!registry.is_successful(query.id).await.unwrap());
        assert_eq!(registry.get_by_id(query.id).await.unwrap().status, QueryStatus::Init);

        add_reach_out(&db, &query, ReachOutStatus::Qualify).await;
        assert!(registry.is_successful(query.id).await.unwrap());
        assert_eq!(registry.get_by_id(query.id).await.unwrap().status, QueryStatus::Success);
    }

    #[tokio::test]
    async fn success_check_is_idempotent() {
        let (db, registry, author) = setup().await;
        let query = registry.create(&author, "Designer").await.unwrap();
        add_reach_out(&db, &query, ReachOutStatus::Qualify).await;

        assert!(registry.is_successful(query.id).await.unwrap());
        let first = registry.get_by_id(query.id).await.unwrap();
        assert!(registry.is_successful(query.id).await.unwrap());
        let second = registry.get_by_id(query.id).await.unwrap();
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn terminal_status_never_reverts() {
        let (_db, registry, author) = setup().await;
        let query = registry.create(&author, "Designer").await.unwrap();
        registry.update_status(query.id, QueryStatus::Success).await.unwrap();

        let err = registry
            .update_status(query.id, QueryStatus::Init)
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unreported_successes_are_listed_once() {
        let (_db, registry, author) = setup().await;
        let query = registry.create(&author, "Designer").await.unwrap();
        registry.update_status(query.id, QueryStatus::Success).await.unwrap();

        let pending = registry.successful_unreported(author.id).await.unwrap();
        assert_eq!(pending.len(), 1);

        registry.mark_reported(query.id).await.unwrap();
        assert!(registry.successful_unreported(author.id).await.unwrap().is_empty());
    }
}
