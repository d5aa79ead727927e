//! Candidate sourcing for dispatched queries.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OutreachError;
use crate::outreach::model::{Query, User, UserType};
use crate::store::Database;

/// Someone a query could be sent to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Seeded into the target's metadata when they have none.
    #[serde(default)]
    pub profile: serde_json::Value,
}

impl Candidate {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            name: None,
            profile: serde_json::Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Best matches first, at most `limit`, never the author.
    async fn find(
        &self,
        query: &Query,
        author: &User,
        limit: usize,
    ) -> Result<Vec<Candidate>, OutreachError>;
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "who", "are", "our", "you", "that", "this", "from", "have",
    "need", "needs", "looking", "want", "will", "can",
];

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Scores known users by keyword overlap between their profile and the
/// query text.
pub struct StoreCandidateSource {
    db: Arc<dyn Database>,
}

impl StoreCandidateSource {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CandidateSource for StoreCandidateSource {
    async fn find(
        &self,
        query: &Query,
        author: &User,
        limit: usize,
    ) -> Result<Vec<Candidate>, OutreachError> {
        let wanted = keywords(&query.text);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self
            .db
            .list_users_by_types(&[UserType::Idol, UserType::Candidate, UserType::Freelancer])
            .await?;

        let mut scored: Vec<(usize, User)> = pool
            .into_iter()
            .filter(|u| u.id != author.id && u.phone.is_some())
            .filter_map(|u| {
                let haystack = format!("{} {}", u.name.as_deref().unwrap_or_default(), u.metadata);
                let score = keywords(&haystack).intersection(&wanted).count();
                (score > 0).then_some((score, u))
            })
            .collect();
        // Stable sort keeps oldest users first among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let candidates: Vec<Candidate> = scored
            .into_iter()
            .take(limit)
            .filter_map(|(_, u)| {
                Some(Candidate {
                    phone: u.phone?,
                    name: u.name,
                    profile: u.metadata,
                })
            })
            .collect();
        tracing::debug!(query_id = %query.id, found = candidates.len(), "Candidates sourced");
        Ok(candidates)
    }
}
