//! # Repository Traits
//!
//! The storage seams of the engine and the resolver. Every backend in
//! [`crate::storage`] implements all three traits.
//!
//! All methods take an [`AbortSignal`]. A backend checks it before opening a
//! transaction and again before committing; an aborted write transaction is
//! dropped uncommitted, so a multi-row write either lands whole or not at all.

use crate::types::{
    Assessment, AssessmentFilter, AssessmentId, Group, GroupId, MaturityError, NewAssessment,
    NewGroup, NewRole, NewTeam, Page, Response, Role, RoleId, SectionScore, Session, Team, TeamId,
    UserId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

// =============================================================================
// ABORT SIGNAL
// =============================================================================

/// Cancellation flag plus optional deadline, handed to every storage call.
///
/// Clones share the flag: aborting one clone aborts them all.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    deadline: Option<Instant>,
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    /// A signal that only fires when [`AbortSignal::abort`] is called.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    /// A signal that also fires once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with [`MaturityError::Aborted`] if the signal has fired.
    pub fn check(&self) -> Result<(), MaturityError> {
        if self.is_aborted() {
            tracing::debug!(event = "storage_aborted", "abort signal fired");
            return Err(MaturityError::Aborted);
        }
        Ok(())
    }
}

// =============================================================================
// ASSESSMENTS
// =============================================================================

/// Assessment, response and section-score rows.
pub trait AssessmentRepository: Send + Sync {
    /// Insert a new `in_progress` assessment. The backend assigns the id.
    fn insert_assessment(
        &self,
        signal: &AbortSignal,
        new: NewAssessment,
    ) -> Result<Assessment, MaturityError>;

    fn get_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Option<Assessment>, MaturityError>;

    /// Assessments of a team, newest first, with the unpaged total.
    fn list_team_assessments(
        &self,
        signal: &AbortSignal,
        team: TeamId,
        filter: AssessmentFilter,
        page: Page,
    ) -> Result<(Vec<Assessment>, usize), MaturityError>;

    /// Assessments created by a user, newest first, with the unpaged total.
    fn list_user_assessments(
        &self,
        signal: &AbortSignal,
        user: UserId,
        page: Page,
    ) -> Result<(Vec<Assessment>, usize), MaturityError>;

    /// Remove an assessment together with its responses and scores.
    fn delete_assessment(&self, signal: &AbortSignal, id: AssessmentId)
    -> Result<(), MaturityError>;

    /// Upsert a batch of responses in one transaction.
    ///
    /// Fails with `AssessmentNotFound` or `AssessmentAlreadyCompleted`,
    /// decided inside the same transaction as the writes.
    fn upsert_responses(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
        responses: &[Response],
    ) -> Result<(), MaturityError>;

    /// Responses of an assessment ordered by question id.
    fn list_responses(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Vec<Response>, MaturityError>;

    /// Persist section scores and move the assessment to `completed`.
    ///
    /// Conditional on the stored status being `in_progress`; otherwise
    /// nothing is written and `AssessmentNotInProgress` is returned.
    fn complete_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
        scores: &[SectionScore],
        completed_at: DateTime<Utc>,
    ) -> Result<Assessment, MaturityError>;

    /// Persisted section scores, in the order they were written.
    fn list_section_scores(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Vec<SectionScore>, MaturityError>;
}

// =============================================================================
// SESSIONS
// =============================================================================

pub trait SessionRepository: Send + Sync {
    fn insert_session(&self, signal: &AbortSignal, session: &Session)
    -> Result<(), MaturityError>;

    fn get_session(
        &self,
        signal: &AbortSignal,
        token: &str,
    ) -> Result<Option<Session>, MaturityError>;

    /// Refresh `last_seen_at` and return the updated row. Expiry is left
    /// alone. Returns `None` when the session no longer exists.
    fn touch_session(
        &self,
        signal: &AbortSignal,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, MaturityError>;

    /// Move the expiry of a session that has not yet expired at `now`.
    /// Returns `false` when no such session exists.
    fn extend_session(
        &self,
        signal: &AbortSignal,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, MaturityError>;

    /// Returns `true` if a row was removed.
    fn delete_session(&self, signal: &AbortSignal, token: &str) -> Result<bool, MaturityError>;

    /// Remove every session of a user. Returns the number removed.
    fn delete_user_sessions(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<usize, MaturityError>;

    /// Remove every session with `expires_at < now`. Returns the number removed.
    fn delete_expired_sessions(
        &self,
        signal: &AbortSignal,
        now: DateTime<Utc>,
    ) -> Result<usize, MaturityError>;

    /// Unexpired sessions of a user, newest first.
    fn list_user_sessions(
        &self,
        signal: &AbortSignal,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, MaturityError>;
}

// =============================================================================
// DIRECTORY
// =============================================================================

/// Roles, teams, groups and memberships.
///
/// The membership lookups are the permission-lookup capability the access
/// resolver unions over.
pub trait DirectoryRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the name is taken.
    fn insert_role(&self, signal: &AbortSignal, new: NewRole) -> Result<Role, MaturityError>;

    fn get_role(&self, signal: &AbortSignal, id: RoleId) -> Result<Option<Role>, MaturityError>;

    fn find_role(&self, signal: &AbortSignal, name: &str) -> Result<Option<Role>, MaturityError>;

    fn list_roles(&self, signal: &AbortSignal) -> Result<Vec<Role>, MaturityError>;

    /// Fails with `AlreadyExists` on a taken name and `GroupNotFound` on an
    /// unknown parent group.
    fn insert_team(&self, signal: &AbortSignal, new: NewTeam) -> Result<Team, MaturityError>;

    fn get_team(&self, signal: &AbortSignal, id: TeamId) -> Result<Option<Team>, MaturityError>;

    fn find_team(&self, signal: &AbortSignal, name: &str) -> Result<Option<Team>, MaturityError>;

    fn list_teams(&self, signal: &AbortSignal, page: Page) -> Result<Vec<Team>, MaturityError>;

    /// Fails with `AlreadyExists` when the name is taken.
    fn insert_group(&self, signal: &AbortSignal, new: NewGroup) -> Result<Group, MaturityError>;

    fn get_group(&self, signal: &AbortSignal, id: GroupId)
    -> Result<Option<Group>, MaturityError>;

    fn list_groups(&self, signal: &AbortSignal) -> Result<Vec<Group>, MaturityError>;

    /// Set (or replace) the user's role on a team.
    fn set_team_member(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
        role: RoleId,
    ) -> Result<(), MaturityError>;

    /// Set (or replace) the user's role on a group.
    fn set_group_member(
        &self,
        signal: &AbortSignal,
        user: UserId,
        group: GroupId,
        role: RoleId,
    ) -> Result<(), MaturityError>;

    /// Every `(team, role)` the user holds directly, ordered by team.
    fn team_memberships(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<Vec<(TeamId, RoleId)>, MaturityError>;

    /// Every `(group, role)` the user holds, ordered by group.
    fn group_memberships(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<Vec<(GroupId, RoleId)>, MaturityError>;

    fn team_role_of(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
    ) -> Result<Option<RoleId>, MaturityError>;

    fn group_role_of(
        &self,
        signal: &AbortSignal,
        user: UserId,
        group: GroupId,
    ) -> Result<Option<RoleId>, MaturityError>;
}
