//! Outreach data model: users, queries, reach-outs, messages.
//!
//! The per-user conversation state lives on [`User::user_type`]; there is
//! no separate machine object. `current_reach_out` is set exactly when the
//! user is engaged (`rof`/`roc`), and every mutation goes through
//! [`UserPatch`] so that rule can be checked in one place.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── User ────────────────────────────────────────────────────────────

/// Role/state of a conversation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    /// First contact, role not yet known.
    New,
    /// No active negotiation; eligible for outreach.
    Idol,
    Candidate,
    Freelancer,
    Client,
    Hr,
    /// Engaged in a reach-out authored by a client.
    Rof,
    /// Engaged in a reach-out authored by HR.
    Roc,
}

impl UserType {
    pub const ALL: [UserType; 8] = [
        Self::New,
        Self::Idol,
        Self::Candidate,
        Self::Freelancer,
        Self::Client,
        Self::Hr,
        Self::Rof,
        Self::Roc,
    ];

    /// Whether the user is in an active reach-out conversation.
    pub fn is_engaged(&self) -> bool {
        matches!(self, Self::Rof | Self::Roc)
    }

    /// Roles allowed to author queries.
    pub fn can_author_query(&self) -> bool {
        matches!(self, Self::Hr | Self::Client)
    }

    /// Types a session-end request may assign directly.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Self::Idol | Self::Candidate | Self::Freelancer | Self::Client | Self::Hr
        )
    }

    /// Check if a transition from `self` to `target` is valid.
    ///
    /// Engagement may start from any non-engaged type; an engaged user can
    /// only be released to `idol`. Nobody ever returns to `new`.
    pub fn can_transition_to(&self, target: UserType) -> bool {
        use UserType::*;
        if *self == target {
            return true;
        }
        match (self, target) {
            (_, New) => false,
            (Rof | Roc, Idol) => true,
            (Rof | Roc, _) => false,
            (_, Rof | Roc) => true,
            (New | Idol, _) => true,
            (Candidate | Freelancer | Client | Hr, Idol) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Idol => "idol",
            Self::Candidate => "candidate",
            Self::Freelancer => "freelancer",
            Self::Client => "client",
            Self::Hr => "hr",
            Self::Rof => "rof",
            Self::Roc => "roc",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown user type '{s}'"))
    }
}

/// A conversation participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Transport identifier.
    pub jid: String,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub user_type: UserType,
    pub current_reach_out: Option<Uuid>,
    /// Free-form profile blob.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A first-contact user.
    pub fn new(jid: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            jid: jid.into(),
            phone: None,
            name: None,
            user_type: UserType::New,
            current_reach_out: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_type(mut self, user_type: UserType) -> Self {
        self.user_type = user_type;
        self
    }

    /// `current_reach_out` is non-null iff the user is engaged.
    pub fn invariant_holds(&self) -> bool {
        self.current_reach_out.is_some() == self.user_type.is_engaged()
    }

    /// Name to show other parties.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.jid)
    }

    /// Whether the profile blob carries anything yet.
    pub fn has_profile(&self) -> bool {
        match &self.metadata {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }
}

/// Partial update of a [`User`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub user_type: Option<UserType>,
    /// `Some(None)` clears the field.
    pub current_reach_out: Option<Option<Uuid>>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl UserPatch {
    /// Change type outside any reach-out.
    pub fn with_type(user_type: UserType) -> Self {
        Self {
            user_type: Some(user_type),
            ..Default::default()
        }
    }

    /// Put the user into a negotiation.
    pub fn engage(user_type: UserType, reach_out: Uuid) -> Self {
        Self {
            user_type: Some(user_type),
            current_reach_out: Some(Some(reach_out)),
            ..Default::default()
        }
    }

    /// Back to `idol` with no active reach-out.
    pub fn release() -> Self {
        Self {
            user_type: Some(UserType::Idol),
            current_reach_out: Some(None),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply onto a copy of `user`.
    pub fn apply(&self, user: &User) -> User {
        let mut next = user.clone();
        if let Some(t) = self.user_type {
            next.user_type = t;
        }
        if let Some(ro) = self.current_reach_out {
            next.current_reach_out = ro;
        }
        if let Some(ref name) = self.name {
            next.name = Some(name.clone());
        }
        if let Some(ref phone) = self.phone {
            next.phone = Some(phone.clone());
        }
        if let Some(ref metadata) = self.metadata {
            next.metadata = metadata.clone();
        }
        next.updated_at = Utc::now();
        next
    }
}

/// Derive a transport identifier from a phone number.
///
/// Returns `None` when the number has fewer than `min_digits` digits.
pub fn jid_from_phone(phone: &str, min_digits: usize) -> Option<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= min_digits).then_some(digits)
}

// ── Query ───────────────────────────────────────────────────────────

/// Role under which a query was authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorRole {
    Hr,
    Client,
}

impl AuthorRole {
    pub fn from_user_type(user_type: UserType) -> Option<Self> {
        match user_type {
            UserType::Hr => Some(Self::Hr),
            UserType::Client => Some(Self::Client),
            _ => None,
        }
    }

    /// Engaged type a target takes while talking about this author's query.
    pub fn engaged_type(&self) -> UserType {
        match self {
            Self::Hr => UserType::Roc,
            Self::Client => UserType::Rof,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hr => "hr",
            Self::Client => "client",
        }
    }
}

impl FromStr for AuthorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hr" => Ok(Self::Hr),
            "client" => Ok(Self::Client),
            other => Err(format!("unknown author role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Init,
    Hold,
    Success,
    Fail,
}

impl QueryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Hold => "hold",
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "hold" => Ok(Self::Hold),
            "success" => Ok(Self::Success),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown query status '{other}'")),
        }
    }
}

/// An outreach request authored by an hr/client user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_role: AuthorRole,
    /// Need statement.
    pub text: String,
    pub status: QueryStatus,
    /// Whether the success summary was delivered to the author.
    pub reported: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Query {
    pub fn new(author_id: Uuid, author_role: AuthorRole, text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author_id,
            author_role,
            text: text.into(),
            status: QueryStatus::Init,
            reported: false,
            created_at: now,
            updated_at: now,
        }
    }
}

// ── ReachOut ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReachOutKind {
    /// Needs back-and-forth qualification.
    Ask,
    /// Informational; auto-qualifies.
    Notify,
}

impl ReachOutKind {
    /// Cold targets are asked, warm targets are notified.
    ///
    /// Client-authored queries always ask. HR-authored queries ask only
    /// targets that are still `new`.
    pub fn decide(author_role: AuthorRole, target_type: UserType) -> Self {
        match (author_role, target_type) {
            (AuthorRole::Client, _) => Self::Ask,
            (AuthorRole::Hr, UserType::New) => Self::Ask,
            (AuthorRole::Hr, _) => Self::Notify,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Notify => "notify",
        }
    }
}

impl FromStr for ReachOutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ask" => Ok(Self::Ask),
            "notify" => Ok(Self::Notify),
            other => Err(format!("unknown reach-out kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReachOutStatus {
    Hold,
    Init,
    Qualify,
    Fail,
}

impl ReachOutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Qualify | Self::Fail)
    }

    /// hold → init | qualify | fail, init → qualify | fail.
    pub fn can_transition_to(&self, target: ReachOutStatus) -> bool {
        use ReachOutStatus::*;
        matches!(
            (self, target),
            (Hold, Init) | (Hold, Qualify) | (Hold, Fail) | (Init, Qualify) | (Init, Fail)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::Init => "init",
            Self::Qualify => "qualify",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for ReachOutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReachOutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hold" => Ok(Self::Hold),
            "init" => Ok(Self::Init),
            "qualify" => Ok(Self::Qualify),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown reach-out status '{other}'")),
        }
    }
}

/// One outreach attempt: a target paired with a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachOut {
    pub id: Uuid,
    pub query_id: Uuid,
    pub target_id: Uuid,
    pub kind: ReachOutKind,
    pub status: ReachOutStatus,
    /// Classifier-written summary of the target.
    pub user_info: String,
    pub end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReachOut {
    /// A held reach-out.
    pub fn new(target_id: Uuid, query_id: Uuid, kind: ReachOutKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            query_id,
            target_id,
            kind,
            status: ReachOutStatus::Hold,
            user_info: String::new(),
            end: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_user_info(mut self, info: impl Into<String>) -> Self {
        self.user_info = info.into();
        self
    }
}

// ── Message ─────────────────────────────────────────────────────────

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Model,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            other => Err(format!("unknown message role '{other}'")),
        }
    }
}

/// Append-only conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub jid: String,
    pub role: MessageRole,
    /// Sender's type at the time of the message.
    pub user_type: UserType,
    pub content: String,
    pub has_media: bool,
    pub media_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        jid: impl Into<String>,
        role: MessageRole,
        user_type: UserType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            jid: jid.into(),
            role,
            user_type,
            content: content.into(),
            has_media: false,
            media_type: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_media(mut self, media_type: impl Into<String>) -> Self {
        self.has_media = true;
        self.media_type = Some(media_type.into());
        self
    }
}

/// Cached `{role, text}` pair used to build prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub text: String,
}

impl From<&Message> for HistoryEntry {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            text: msg.content.clone(),
        }
    }
}

// ── Match jobs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Queued request to find candidates for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchJob {
    pub id: Uuid,
    pub query_id: Uuid,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
