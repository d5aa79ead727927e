//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::outreach::model::{
    AuthorRole, JobStatus, MatchJob, Message, MessageRole, Query, QueryStatus, ReachOut,
    ReachOutKind, ReachOutStatus, User, UserPatch, UserType,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_one<T>(
        &self,
        op: &str,
        sql: &str,
        args: impl libsql::params::IntoParams,
        map: fn(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<Option<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(Some(map(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    async fn query_all<T>(
        &self,
        op: &str,
        sql: &str,
        args: impl libsql::params::IntoParams,
        map: fn(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<Vec<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        let mut out = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => out.push(map(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
            }
        }
        Ok(out)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format. Fixed-width so lexical order is time order.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid '{s}': {e}")))
}

fn parse_enum<T: FromStr<Err = String>>(s: &str) -> Result<T, DatabaseError> {
    s.parse().map_err(DatabaseError::Serialization)
}

fn text(row: &libsql::Row, idx: i32) -> Result<String, DatabaseError> {
    row.get::<String>(idx)
        .map_err(|e| DatabaseError::Query(format!("row parse (col {idx}): {e}")))
}

fn int(row: &libsql::Row, idx: i32) -> Result<i64, DatabaseError> {
    row.get::<i64>(idx)
        .map_err(|e| DatabaseError::Query(format!("row parse (col {idx}): {e}")))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

const USER_COLUMNS: &str =
    "id, jid, phone, name, user_type, current_reach_out, metadata, created_at, updated_at";

const QUERY_COLUMNS: &str =
    "id, author_id, author_role, text, status, reported, created_at, updated_at";

const REACH_OUT_COLUMNS: &str =
    "id, query_id, target_id, kind, status, user_info, ended, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, jid, role, user_type, content, has_media, media_type, created_at";

const JOB_COLUMNS: &str = "id, query_id, status, attempts, last_error, created_at, updated_at";

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let metadata_str: String = text(row, 6)?;
    Ok(User {
        id: parse_uuid(&text(row, 0)?)?,
        jid: text(row, 1)?,
        phone: row.get::<String>(2).ok(),
        name: row.get::<String>(3).ok(),
        user_type: parse_enum(&text(row, 4)?)?,
        current_reach_out: match row.get::<String>(5).ok() {
            Some(s) => Some(parse_uuid(&s)?),
            None => None,
        },
        metadata: serde_json::from_str(&metadata_str)
            .map_err(|e| DatabaseError::Serialization(format!("user metadata: {e}")))?,
        created_at: parse_datetime(&text(row, 7)?),
        updated_at: parse_datetime(&text(row, 8)?),
    })
}

fn row_to_query(row: &libsql::Row) -> Result<Query, DatabaseError> {
    Ok(Query {
        id: parse_uuid(&text(row, 0)?)?,
        author_id: parse_uuid(&text(row, 1)?)?,
        author_role: parse_enum::<AuthorRole>(&text(row, 2)?)?,
        text: text(row, 3)?,
        status: parse_enum::<QueryStatus>(&text(row, 4)?)?,
        reported: int(row, 5)? != 0,
        created_at: parse_datetime(&text(row, 6)?),
        updated_at: parse_datetime(&text(row, 7)?),
    })
}

fn row_to_reach_out(row: &libsql::Row) -> Result<ReachOut, DatabaseError> {
    Ok(ReachOut {
        id: parse_uuid(&text(row, 0)?)?,
        query_id: parse_uuid(&text(row, 1)?)?,
        target_id: parse_uuid(&text(row, 2)?)?,
        kind: parse_enum::<ReachOutKind>(&text(row, 3)?)?,
        status: parse_enum::<ReachOutStatus>(&text(row, 4)?)?,
        user_info: text(row, 5)?,
        end: int(row, 6)? != 0,
        created_at: parse_datetime(&text(row, 7)?),
        updated_at: parse_datetime(&text(row, 8)?),
    })
}

fn row_to_message(row: &libsql::Row) -> Result<Message, DatabaseError> {
    Ok(Message {
        id: parse_uuid(&text(row, 0)?)?,
        jid: text(row, 1)?,
        role: parse_enum::<MessageRole>(&text(row, 2)?)?,
        user_type: parse_enum::<UserType>(&text(row, 3)?)?,
        content: text(row, 4)?,
        has_media: int(row, 5)? != 0,
        media_type: row.get::<String>(6).ok(),
        created_at: parse_datetime(&text(row, 7)?),
    })
}

fn row_to_job(row: &libsql::Row) -> Result<MatchJob, DatabaseError> {
    Ok(MatchJob {
        id: parse_uuid(&text(row, 0)?)?,
        query_id: parse_uuid(&text(row, 1)?)?,
        status: parse_enum::<JobStatus>(&text(row, 2)?)?,
        attempts: int(row, 3)? as u32,
        last_error: row.get::<String>(4).ok(),
        created_at: parse_datetime(&text(row, 5)?),
        updated_at: parse_datetime(&text(row, 6)?),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        if !user.invariant_holds() {
            return Err(DatabaseError::Constraint(format!(
                "user {} of type {} with current_reach_out {:?}",
                user.jid, user.user_type, user.current_reach_out
            )));
        }
        self.conn()
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    user.id.to_string(),
                    user.jid.as_str(),
                    opt_text(user.phone.as_deref()),
                    opt_text(user.name.as_deref()),
                    user.user_type.as_str(),
                    opt_text(user.current_reach_out.map(|id| id.to_string()).as_deref()),
                    user.metadata.to_string(),
                    ts(&user.created_at),
                    ts(&user.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_user: {e}")))?;

        debug!(user_id = %user.id, jid = %user.jid, "User inserted");
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        self.query_one(
            "get_user",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            row_to_user,
        )
        .await
    }

    async fn get_user_by_jid(&self, jid: &str) -> Result<Option<User>, DatabaseError> {
        self.query_one(
            "get_user_by_jid",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE jid = ?1"),
            params![jid],
            row_to_user,
        )
        .await
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<User, DatabaseError> {
        let current = self
            .get_user(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".into(),
                id: id.to_string(),
            })?;
        let next = patch.apply(&current);
        if !next.invariant_holds() {
            return Err(DatabaseError::Constraint(format!(
                "user {} would be {} with current_reach_out {:?}",
                next.jid, next.user_type, next.current_reach_out
            )));
        }

        self.conn()
            .execute(
                "UPDATE users SET phone = ?1, name = ?2, user_type = ?3, current_reach_out = ?4,
                    metadata = ?5, updated_at = ?6 WHERE id = ?7",
                params![
                    opt_text(next.phone.as_deref()),
                    opt_text(next.name.as_deref()),
                    next.user_type.as_str(),
                    opt_text(next.current_reach_out.map(|id| id.to_string()).as_deref()),
                    next.metadata.to_string(),
                    ts(&next.updated_at),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_user: {e}")))?;

        debug!(user_id = %id, user_type = %next.user_type, "User updated");
        Ok(next)
    }

    async fn list_users_by_types(&self, types: &[UserType]) -> Result<Vec<User>, DatabaseError> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        // Values come from the closed enum, so inlining them is safe.
        let in_list = types
            .iter()
            .map(|t| format!("'{}'", t.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        self.query_all(
            "list_users_by_types",
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE user_type IN ({in_list}) ORDER BY created_at ASC"
            ),
            (),
            row_to_user,
        )
        .await
    }

    // ── Queries ─────────────────────────────────────────────────────

    async fn insert_query(&self, query: &Query) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO queries ({QUERY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    query.id.to_string(),
                    query.author_id.to_string(),
                    query.author_role.as_str(),
                    query.text.as_str(),
                    query.status.as_str(),
                    query.reported as i64,
                    ts(&query.created_at),
                    ts(&query.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_query: {e}")))?;

        debug!(query_id = %query.id, author_id = %query.author_id, "Query inserted");
        Ok(())
    }

    async fn get_query(&self, id: Uuid) -> Result<Option<Query>, DatabaseError> {
        self.query_one(
            "get_query",
            &format!("SELECT {QUERY_COLUMNS} FROM queries WHERE id = ?1"),
            params![id.to_string()],
            row_to_query,
        )
        .await
    }

    async fn update_query_status(
        &self,
        id: Uuid,
        status: QueryStatus,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE queries SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), ts(&Utc::now()), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_query_status: {e}")))?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "query".into(),
                id: id.to_string(),
            });
        }
        debug!(query_id = %id, status = %status, "Query status updated");
        Ok(())
    }

    async fn mark_query_reported(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE queries SET reported = 1, updated_at = ?1 WHERE id = ?2",
                params![ts(&Utc::now()), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_query_reported: {e}")))?;
        Ok(())
    }

    async fn list_queries_by_author(&self, author_id: Uuid) -> Result<Vec<Query>, DatabaseError> {
        self.query_all(
            "list_queries_by_author",
            &format!(
                "SELECT {QUERY_COLUMNS} FROM queries WHERE author_id = ?1 ORDER BY created_at ASC"
            ),
            params![author_id.to_string()],
            row_to_query,
        )
        .await
    }

    // ── Reach-outs ──────────────────────────────────────────────────

    async fn insert_reach_out(
        &self,
        reach_out: &ReachOut,
    ) -> Result<(ReachOut, bool), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                &format!(
                    "INSERT INTO reach_outs ({REACH_OUT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(query_id, target_id) DO NOTHING"
                ),
                params![
                    reach_out.id.to_string(),
                    reach_out.query_id.to_string(),
                    reach_out.target_id.to_string(),
                    reach_out.kind.as_str(),
                    reach_out.status.as_str(),
                    reach_out.user_info.as_str(),
                    reach_out.end as i64,
                    ts(&reach_out.created_at),
                    ts(&reach_out.updated_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_reach_out: {e}")))?;

        if affected > 0 {
            debug!(reach_out_id = %reach_out.id, query_id = %reach_out.query_id, "Reach-out inserted");
            return Ok((reach_out.clone(), true));
        }

        let existing = self
            .query_one(
                "insert_reach_out existing",
                &format!(
                    "SELECT {REACH_OUT_COLUMNS} FROM reach_outs WHERE query_id = ?1 AND target_id = ?2"
                ),
                params![reach_out.query_id.to_string(), reach_out.target_id.to_string()],
                row_to_reach_out,
            )
            .await?
            .ok_or_else(|| {
                DatabaseError::Constraint(format!(
                    "reach-out for query {} target {} neither inserted nor found",
                    reach_out.query_id, reach_out.target_id
                ))
            })?;
        debug!(reach_out_id = %existing.id, "Reach-out already exists for pair");
        Ok((existing, false))
    }

    async fn get_reach_out(&self, id: Uuid) -> Result<Option<ReachOut>, DatabaseError> {
        self.query_one(
            "get_reach_out",
            &format!("SELECT {REACH_OUT_COLUMNS} FROM reach_outs WHERE id = ?1"),
            params![id.to_string()],
            row_to_reach_out,
        )
        .await
    }

    async fn list_held_reach_outs(
        &self,
        target_id: Uuid,
    ) -> Result<Vec<ReachOut>, DatabaseError> {
        self.query_all(
            "list_held_reach_outs",
            &format!(
                "SELECT {REACH_OUT_COLUMNS} FROM reach_outs
                 WHERE target_id = ?1 AND status = 'hold'
                 ORDER BY created_at ASC, rowid ASC"
            ),
            params![target_id.to_string()],
            row_to_reach_out,
        )
        .await
    }

    async fn list_reach_outs_for_query(
        &self,
        query_id: Uuid,
    ) -> Result<Vec<ReachOut>, DatabaseError> {
        self.query_all(
            "list_reach_outs_for_query",
            &format!(
                "SELECT {REACH_OUT_COLUMNS} FROM reach_outs WHERE query_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ),
            params![query_id.to_string()],
            row_to_reach_out,
        )
        .await
    }

    async fn update_reach_out_status(
        &self,
        id: Uuid,
        status: ReachOutStatus,
        end: bool,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE reach_outs SET status = ?1, ended = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_str(), end as i64, ts(&Utc::now()), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_reach_out_status: {e}")))?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "reach_out".into(),
                id: id.to_string(),
            });
        }
        debug!(reach_out_id = %id, status = %status, "Reach-out status updated");
        Ok(())
    }

    async fn update_reach_out_user_info(
        &self,
        id: Uuid,
        info: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE reach_outs SET user_info = ?1, updated_at = ?2 WHERE id = ?3",
                params![info, ts(&Utc::now()), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_reach_out_user_info: {e}")))?;
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    message.id.to_string(),
                    message.jid.as_str(),
                    message.role.as_str(),
                    message.user_type.as_str(),
                    message.content.as_str(),
                    message.has_media as i64,
                    opt_text(message.media_type.as_deref()),
                    ts(&message.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        jid: &str,
        limit: usize,
    ) -> Result<Vec<Message>, DatabaseError> {
        let mut messages = self
            .query_all(
                "recent_messages",
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE jid = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ),
                params![jid, limit as i64],
                row_to_message,
            )
            .await?;
        messages.reverse();
        Ok(messages)
    }

    // ── Match jobs ──────────────────────────────────────────────────

    async fn enqueue_match_job(&self, query_id: Uuid) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        let now = ts(&Utc::now());
        self.conn()
            .execute(
                "INSERT INTO match_jobs (id, query_id, status, attempts, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', 0, ?3, ?3)",
                params![id.to_string(), query_id.to_string(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("enqueue_match_job: {e}")))?;
        debug!(job_id = %id, query_id = %query_id, "Match job enqueued");
        Ok(id)
    }

    async fn claim_next_match_job(&self) -> Result<Option<MatchJob>, DatabaseError> {
        let Some(job) = self
            .query_one(
                "claim_next_match_job",
                &format!(
                    "SELECT {JOB_COLUMNS} FROM match_jobs WHERE status = 'pending'
                     ORDER BY created_at ASC, rowid ASC LIMIT 1"
                ),
                (),
                row_to_job,
            )
            .await?
        else {
            return Ok(None);
        };

        let now = Utc::now();
        let affected = self
            .conn()
            .execute(
                "UPDATE match_jobs SET status = 'running', attempts = attempts + 1, updated_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                params![ts(&now), job.id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("claim_next_match_job: {e}")))?;
        if affected == 0 {
            return Ok(None);
        }

        Ok(Some(MatchJob {
            status: JobStatus::Running,
            attempts: job.attempts + 1,
            updated_at: now,
            ..job
        }))
    }

    async fn complete_match_job(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE match_jobs SET status = 'done', updated_at = ?1 WHERE id = ?2",
                params![ts(&Utc::now()), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_match_job: {e}")))?;
        Ok(())
    }

    async fn fail_match_job(
        &self,
        id: Uuid,
        error: &str,
        requeue: bool,
    ) -> Result<(), DatabaseError> {
        let status = if requeue {
            JobStatus::Pending
        } else {
            JobStatus::Failed
        };
        self.conn()
            .execute(
                "UPDATE match_jobs SET status = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_str(), error, ts(&Utc::now()), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fail_match_job: {e}")))?;
        Ok(())
    }

    async fn reset_running_match_jobs(&self) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE match_jobs SET status = 'pending', updated_at = ?1 WHERE status = 'running'",
                params![ts(&Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reset_running_match_jobs: {e}")))?;
        if count > 0 {
            info!(count, "Reset stale running match jobs to pending");
        }
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    async fn seed_user(db: &LibSqlBackend, jid: &str, user_type: UserType) -> User {
        let user = User::new(jid).with_type(user_type);
        db.insert_user(&user).await.unwrap();
        user
    }

    async fn seed_query(db: &LibSqlBackend, author: &User) -> Query {
        let query = Query::new(author.id, AuthorRole::Hr, "Senior backend engineer, remote");
        db.insert_query(&query).await.unwrap();
        query
    }

    // ── Users ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_get_user_by_jid() {
        let db = test_db().await;
        let user = User::new("4155550100")
            .with_name("Ada")
            .with_phone("+1 415 555 0100");
        db.insert_user(&user).await.unwrap();

        let fetched = db.get_user_by_jid("4155550100").await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.name.as_deref(), Some("Ada"));
        assert_eq!(fetched.user_type, UserType::New);
        assert!(fetched.current_reach_out.is_none());

        assert!(db.get_user_by_jid("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_user_engage_and_release() {
        let db = test_db().await;
        let user = seed_user(&db, "u1", UserType::Idol).await;
        let ro = Uuid::new_v4();

        let engaged = db
            .update_user(user.id, &UserPatch::engage(UserType::Roc, ro))
            .await
            .unwrap();
        assert_eq!(engaged.user_type, UserType::Roc);
        assert_eq!(engaged.current_reach_out, Some(ro));

        let stored = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.current_reach_out, Some(ro));

        let released = db.update_user(user.id, &UserPatch::release()).await.unwrap();
        assert_eq!(released.user_type, UserType::Idol);
        assert!(released.current_reach_out.is_none());
    }

    #[tokio::test]
    async fn update_user_rejects_invariant_violation() {
        let db = test_db().await;
        let user = seed_user(&db, "u1", UserType::Idol).await;

        let err = db
            .update_user(user.id, &UserPatch::with_type(UserType::Rof))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));

        let stored = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.user_type, UserType::Idol);
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_user(Uuid::new_v4(), &UserPatch::release())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn metadata_roundtrips() {
        let db = test_db().await;
        let user = seed_user(&db, "u1", UserType::Candidate).await;
        let meta = serde_json::json!({"skills": ["rust", "postgres"], "years": 7});
        db.update_user(user.id, &UserPatch::default().metadata(meta.clone()))
            .await
            .unwrap();
        let stored = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata, meta);
    }

    #[tokio::test]
    async fn list_users_by_types_filters() {
        let db = test_db().await;
        seed_user(&db, "a", UserType::Idol).await;
        seed_user(&db, "b", UserType::Hr).await;
        seed_user(&db, "c", UserType::Candidate).await;

        let found = db
            .list_users_by_types(&[UserType::Idol, UserType::Candidate])
            .await
            .unwrap();
        let jids: Vec<_> = found.iter().map(|u| u.jid.as_str()).collect();
        assert_eq!(jids, vec!["a", "c"]);
        assert!(db.list_users_by_types(&[]).await.unwrap().is_empty());
    }

    // ── Queries ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn query_crud() {
        let db = test_db().await;
        let author = seed_user(&db, "hr", UserType::Hr).await;
        let query = seed_query(&db, &author).await;

        let fetched = db.get_query(query.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, QueryStatus::Init);
        assert!(!fetched.reported);

        db.update_query_status(query.id, QueryStatus::Success)
            .await
            .unwrap();
        db.mark_query_reported(query.id).await.unwrap();
        let fetched = db.get_query(query.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, QueryStatus::Success);
        assert!(fetched.reported);

        let by_author = db.list_queries_by_author(author.id).await.unwrap();
        assert_eq!(by_author.len(), 1);
    }

    #[tokio::test]
    async fn update_missing_query_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_query_status(Uuid::new_v4(), QueryStatus::Fail)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    // ── Reach-outs ──────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_reach_out_is_idempotent_per_pair() {
        let db = test_db().await;
        let author = seed_user(&db, "hr", UserType::Hr).await;
        let target = seed_user(&db, "t", UserType::New).await;
        let query = seed_query(&db, &author).await;

        let first = ReachOut::new(target.id, query.id, ReachOutKind::Ask);
        let (stored, created) = db.insert_reach_out(&first).await.unwrap();
        assert!(created);
        assert_eq!(stored.id, first.id);

        let again = ReachOut::new(target.id, query.id, ReachOutKind::Notify);
        let (stored, created) = db.insert_reach_out(&again).await.unwrap();
        assert!(!created);
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.kind, ReachOutKind::Ask);

        assert_eq!(db.list_reach_outs_for_query(query.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn held_reach_outs_are_fifo() {
        let db = test_db().await;
        let author = seed_user(&db, "hr", UserType::Hr).await;
        let target = seed_user(&db, "t", UserType::Idol).await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            let query = seed_query(&db, &author).await;
            let ro = ReachOut::new(target.id, query.id, ReachOutKind::Notify);
            db.insert_reach_out(&ro).await.unwrap();
            ids.push(ro.id);
        }
        db.update_reach_out_status(ids[1], ReachOutStatus::Qualify, true)
            .await
            .unwrap();

        let held: Vec<_> = db
            .list_held_reach_outs(target.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(held, vec![ids[0], ids[2]]);
    }

    #[tokio::test]
    async fn reach_out_status_and_info_updates() {
        let db = test_db().await;
        let author = seed_user(&db, "hr", UserType::Hr).await;
        let target = seed_user(&db, "t", UserType::Idol).await;
        let query = seed_query(&db, &author).await;
        let ro = ReachOut::new(target.id, query.id, ReachOutKind::Ask);
        db.insert_reach_out(&ro).await.unwrap();

        db.update_reach_out_status(ro.id, ReachOutStatus::Qualify, true)
            .await
            .unwrap();
        db.update_reach_out_user_info(ro.id, "7 years of Rust")
            .await
            .unwrap();

        let stored = db.get_reach_out(ro.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReachOutStatus::Qualify);
        assert!(stored.end);
        assert_eq!(stored.user_info, "7 years of Rust");
    }

    // ── Messages ────────────────────────────────────────────────────

    #[tokio::test]
    async fn recent_messages_oldest_first_and_limited() {
        let db = test_db().await;
        for i in 0..5 {
            let msg = Message::new("u1", MessageRole::User, UserType::New, format!("m{i}"));
            db.insert_message(&msg).await.unwrap();
        }
        db.insert_message(&Message::new("u2", MessageRole::User, UserType::New, "other"))
            .await
            .unwrap();

        let recent = db.recent_messages("u1", 3).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn message_media_fields_roundtrip() {
        let db = test_db().await;
        let msg = Message::new("u1", MessageRole::User, UserType::Candidate, "cv.pdf")
            .with_media("application/pdf");
        db.insert_message(&msg).await.unwrap();
        let stored = db.recent_messages("u1", 1).await.unwrap();
        assert!(stored[0].has_media);
        assert_eq!(stored[0].media_type.as_deref(), Some("application/pdf"));
        assert_eq!(stored[0].user_type, UserType::Candidate);
    }

    // ── Match jobs ──────────────────────────────────────────────────

    #[tokio::test]
    async fn match_job_lifecycle() {
        let db = test_db().await;
        let author = seed_user(&db, "hr", UserType::Hr).await;
        let query = seed_query(&db, &author).await;
        let job_id = db.enqueue_match_job(query.id).await.unwrap();

        let job = db.claim_next_match_job().await.unwrap().unwrap();
        assert_eq!(job.id, job_id);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.attempts, 1);
        assert!(db.claim_next_match_job().await.unwrap().is_none());

        db.fail_match_job(job_id, "boom", true).await.unwrap();
        let job = db.claim_next_match_job().await.unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("boom"));

        db.complete_match_job(job_id).await.unwrap();
        assert!(db.claim_next_match_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn running_jobs_reset_on_startup() {
        let db = test_db().await;
        let author = seed_user(&db, "hr", UserType::Hr).await;
        let query = seed_query(&db, &author).await;
        db.enqueue_match_job(query.id).await.unwrap();
        db.claim_next_match_job().await.unwrap().unwrap();

        assert_eq!(db.reset_running_match_jobs().await.unwrap(), 1);
        assert!(db.claim_next_match_job().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn new_local_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("outreach.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        seed_user(&db, "u1", UserType::New).await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn migrations_rerun_cleanly() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
    }
}
