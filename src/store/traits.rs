//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::outreach::model::{
    MatchJob, Message, Query, QueryStatus, ReachOut, ReachOutStatus, User, UserPatch, UserType,
};

/// Backend-agnostic database trait covering users, queries, reach-outs,
/// the message log and the match-job queue.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_jid(&self, jid: &str) -> Result<Option<User>, DatabaseError>;

    /// Apply a patch and return the stored result.
    ///
    /// Fails with `Constraint` when the patch would leave
    /// `current_reach_out` out of step with the user type.
    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<User, DatabaseError>;

    /// Users whose type is one of `types`, oldest first.
    async fn list_users_by_types(&self, types: &[UserType]) -> Result<Vec<User>, DatabaseError>;

    // ── Queries ─────────────────────────────────────────────────────

    async fn insert_query(&self, query: &Query) -> Result<(), DatabaseError>;

    async fn get_query(&self, id: Uuid) -> Result<Option<Query>, DatabaseError>;

    async fn update_query_status(&self, id: Uuid, status: QueryStatus)
    -> Result<(), DatabaseError>;

    async fn mark_query_reported(&self, id: Uuid) -> Result<(), DatabaseError>;

    async fn list_queries_by_author(&self, author_id: Uuid) -> Result<Vec<Query>, DatabaseError>;

    // ── Reach-outs ──────────────────────────────────────────────────

    /// Insert unless a reach-out for the same (query, target) exists.
    ///
    /// Returns the stored row and whether it was newly created.
    async fn insert_reach_out(&self, reach_out: &ReachOut)
    -> Result<(ReachOut, bool), DatabaseError>;

    async fn get_reach_out(&self, id: Uuid) -> Result<Option<ReachOut>, DatabaseError>;

    /// Held reach-outs for a target in creation order.
    async fn list_held_reach_outs(&self, target_id: Uuid)
    -> Result<Vec<ReachOut>, DatabaseError>;

    async fn list_reach_outs_for_query(&self, query_id: Uuid)
    -> Result<Vec<ReachOut>, DatabaseError>;

    async fn update_reach_out_status(
        &self,
        id: Uuid,
        status: ReachOutStatus,
        end: bool,
    ) -> Result<(), DatabaseError>;

    async fn update_reach_out_user_info(&self, id: Uuid, info: &str)
    -> Result<(), DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError>;

    /// The latest `limit` messages for a jid, oldest first.
    async fn recent_messages(&self, jid: &str, limit: usize)
    -> Result<Vec<Message>, DatabaseError>;

    // ── Match jobs ──────────────────────────────────────────────────

    async fn enqueue_match_job(&self, query_id: Uuid) -> Result<Uuid, DatabaseError>;

    /// Take the oldest pending job and mark it running.
    async fn claim_next_match_job(&self) -> Result<Option<MatchJob>, DatabaseError>;

    async fn complete_match_job(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Record a failure. `requeue` puts the job back to pending.
    async fn fail_match_job(&self, id: Uuid, error: &str, requeue: bool)
    -> Result<(), DatabaseError>;

    /// Put jobs left running by a previous process back to pending.
    async fn reset_running_match_jobs(&self) -> Result<usize, DatabaseError>;
}
