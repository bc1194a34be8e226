//! # Core Type Definitions
//!
//! This module contains the record types shared by the engine, the resolver
//! and every storage backend:
//! - Identifiers (`AssessmentId`, `TeamId`, `QuestionId`, `AnswerId`, ...)
//! - Assessment records (`Assessment`, `Response`, `SectionScore`)
//! - Query shapes (`Page`, `AssessmentFilter`)
//! - Error types (`MaturityError`, `ErrorKind`)
//!
//! Access-control records (roles, permissions, sessions) live in [`rbac`].

pub mod rbac;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

pub use rbac::{
    Action, Group, NewGroup, NewRole, NewTeam, Permission, ROLE_ADMIN, ROLE_EDITOR, ROLE_VIEWER,
    Resource, Role, SEEDED_PERMISSIONS, Session, Team, builtin_roles,
};

// =============================================================================
// NUMERIC IDENTIFIERS
// =============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of one assessment run.
    AssessmentId
);
numeric_id!(
    /// Identifier of a team.
    TeamId
);
numeric_id!(
    /// Identifier of a group of teams.
    GroupId
);
numeric_id!(
    /// Identifier of a user. Users themselves are owned by the
    /// user-management collaborator; the core only ever sees the id.
    UserId
);
numeric_id!(
    /// Identifier of a role.
    RoleId
);

// =============================================================================
// CATALOG IDENTIFIERS
// =============================================================================

/// Positional question identifier, e.g. `S1-Q3`.
///
/// Ordering is plain string ordering, which is the order responses are
/// listed in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub String);

impl QuestionId {
    /// Build the ID for the question at the given zero-based position.
    #[must_use]
    pub fn at(section_index: usize, question_index: usize) -> Self {
        Self(format!("S{}-Q{}", section_index + 1, question_index + 1))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Positional answer identifier, e.g. `S1-Q3-A2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerId(pub String);

impl AnswerId {
    /// Build the ID for the answer at the given zero-based position.
    #[must_use]
    pub fn at(section_index: usize, question_index: usize, answer_index: usize) -> Self {
        Self(format!(
            "S{}-Q{}-A{}",
            section_index + 1,
            question_index + 1,
            answer_index + 1
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnswerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnswerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// ASSESSMENT RECORDS
// =============================================================================

/// Lifecycle state of an assessment.
///
/// `InProgress -> Completed` is the only transition, and it is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    InProgress,
    Completed,
}

impl AssessmentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::InProgress => "in_progress",
            AssessmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One team's run through the questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub team_id: TeamId,
    pub created_by: UserId,
    /// Opaque correlation token tying the run to the session that started it.
    pub session_id: String,
    pub status: AssessmentStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, at the `InProgress -> Completed` transition.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Assessment {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == AssessmentStatus::Completed
    }
}

/// Insert shape for a new assessment. Backends assign the id.
#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub team_id: TeamId,
    pub created_by: UserId,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// The stored selection for one question of one assessment.
///
/// At most one response exists per (assessment, question); saving again
/// replaces the answer set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub assessment_id: AssessmentId,
    pub question_id: QuestionId,
    pub answer_ids: BTreeSet<AnswerId>,
}

impl Response {
    #[must_use]
    pub fn new(
        assessment_id: AssessmentId,
        question_id: QuestionId,
        answer_ids: impl IntoIterator<Item = AnswerId>,
    ) -> Self {
        Self {
            assessment_id,
            question_id,
            answer_ids: answer_ids.into_iter().collect(),
        }
    }
}

/// Score line for a section or a subcategory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionScore {
    /// Section name, or subcategory label for breakdown lines.
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
}

impl SectionScore {
    /// Build a score line, deriving the percentage (0 when `max_score` is 0).
    #[must_use]
    pub fn new(name: impl Into<String>, score: f64, max_score: f64) -> Self {
        let percentage = if max_score == 0.0 {
            0.0
        } else {
            score / max_score * 100.0
        };
        Self {
            name: name.into(),
            score,
            max_score,
            percentage,
        }
    }
}

// =============================================================================
// QUERY SHAPES
// =============================================================================

/// Offset/limit window for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// A window covering every row.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            offset: 0,
            limit: usize::MAX,
        }
    }

    /// Apply the window to an already ordered row set.
    #[must_use]
    pub fn apply<T>(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::all()
    }
}

/// Filter for team assessment listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssessmentFilter {
    /// Only return assessments in this state.
    pub status: Option<AssessmentStatus>,
}

impl AssessmentFilter {
    #[must_use]
    pub fn completed() -> Self {
        Self {
            status: Some(AssessmentStatus::Completed),
        }
    }

    #[must_use]
    pub fn matches(&self, assessment: &Assessment) -> bool {
        self.status.is_none_or(|s| s == assessment.status)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Boundary-facing classification of a [`MaturityError`].
///
/// Callers map these onto their own responses (status codes, exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidState,
    PermissionDenied,
    MalformedInput,
    Persistence,
    SessionExpired,
    SessionNotFound,
}

impl ErrorKind {
    /// Only storage failures are worth retrying. Session errors always
    /// require re-authentication.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Persistence)
    }
}

/// Errors that can occur in the assessment engine and access resolver.
///
/// - No silent failures
/// - Storage detail stays inside [`MaturityError::Persistence`] and is never
///   part of the rendered message
#[derive(Debug, Error)]
pub enum MaturityError {
    /// The catalog source could not be read.
    #[error("Question catalog unreadable: {0}")]
    CatalogUnreadable(String),

    /// The catalog source was read but is not a valid section list.
    #[error("Question catalog malformed: {0}")]
    CatalogMalformed(String),

    /// The advice source could not be read.
    #[error("Advice catalog unreadable: {0}")]
    AdviceUnreadable(String),

    /// The advice source was read but is not a valid advice map.
    #[error("Advice catalog malformed: {0}")]
    AdviceMalformed(String),

    #[error("Section not found: {0}")]
    SectionNotFound(String),

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    #[error("Assessment not found: {0}")]
    AssessmentNotFound(AssessmentId),

    /// Responses of a completed assessment cannot change.
    #[error("Assessment {0} is already completed")]
    AssessmentAlreadyCompleted(AssessmentId),

    /// Completion raced with another caller, or the run was already done.
    #[error("Assessment {0} is not in progress")]
    AssessmentNotInProgress(AssessmentId),

    #[error("Assessment {0} is not completed")]
    AssessmentNotCompleted(AssessmentId),

    #[error("Team {0} has no completed assessment")]
    NoCompletedAssessment(TeamId),

    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    #[error("Team not found: {0}")]
    UnknownTeam(String),

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// A unique name (team, group, role) is already taken.
    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    /// A permission string outside the closed vocabulary.
    #[error("Unknown permission: {0}")]
    UnknownPermission(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(Permission),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session has expired")]
    SessionExpired,

    /// The storage layer failed. `detail` is for logs only.
    #[error("Storage failure")]
    Persistence { detail: String },

    /// The caller's abort signal fired before the storage call finished.
    #[error("Storage call aborted")]
    Aborted,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MaturityError {
    /// Wrap a backend error, logging the raw detail before it is hidden.
    pub fn persistence(err: impl fmt::Display) -> Self {
        let detail = err.to_string();
        tracing::error!(event = "storage_failure", detail = %detail, "storage call failed");
        MaturityError::Persistence { detail }
    }

    /// Classify this error for the caller's boundary.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            MaturityError::SectionNotFound(_)
            | MaturityError::QuestionNotFound(_)
            | MaturityError::AssessmentNotFound(_)
            | MaturityError::NoCompletedAssessment(_)
            | MaturityError::TeamNotFound(_)
            | MaturityError::UnknownTeam(_)
            | MaturityError::GroupNotFound(_)
            | MaturityError::RoleNotFound(_) => ErrorKind::NotFound,
            MaturityError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            MaturityError::AssessmentAlreadyCompleted(_)
            | MaturityError::AssessmentNotInProgress(_)
            | MaturityError::AssessmentNotCompleted(_) => ErrorKind::InvalidState,
            MaturityError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            MaturityError::CatalogMalformed(_)
            | MaturityError::AdviceMalformed(_)
            | MaturityError::UnknownPermission(_)
            | MaturityError::Config(_) => ErrorKind::MalformedInput,
            MaturityError::CatalogUnreadable(_)
            | MaturityError::AdviceUnreadable(_)
            | MaturityError::Persistence { .. }
            | MaturityError::Aborted => ErrorKind::Persistence,
            MaturityError::SessionNotFound => ErrorKind::SessionNotFound,
            MaturityError::SessionExpired => ErrorKind::SessionExpired,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
