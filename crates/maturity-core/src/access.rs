//! # Access Resolver
//!
//! Session validation and permission resolution.
//!
//! A user holds roles in two ways: directly on a team, and on a group of
//! teams. Resolution is plain set arithmetic over the injected
//! [`DirectoryRepository`]:
//!
//! - global: union of the permissions of every team role and group role
//! - team-scoped: the direct role on that team, unioned with the role on
//!   the team's parent group (if any)
//!
//! Membership anywhere else never grants a team-scoped permission.

use crate::primitives::{SESSION_TTL_HOURS, TOKEN_BYTES};
use crate::repository::{AbortSignal, DirectoryRepository, SessionRepository};
use crate::types::{
    Action, Group, GroupId, MaturityError, NewGroup, NewRole, NewTeam, Page, Permission,
    ROLE_ADMIN, Resource, Role, RoleId, Session, Team, TeamId, UserId, builtin_roles,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::{BTreeMap, BTreeSet};

/// Random opaque token from OS entropy, URL-safe base64.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE.encode(&buf)
}

pub struct AccessResolver<'a, R: SessionRepository + DirectoryRepository + ?Sized> {
    repo: &'a R,
    ttl: Duration,
}

impl<'a, R: SessionRepository + DirectoryRepository + ?Sized> AccessResolver<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self {
            repo,
            ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }

    /// Override the session validity window.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    /// Issue a fresh session valid for the configured window.
    pub fn issue_session(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<Session, MaturityError> {
        let now = Utc::now();
        let session = Session {
            token: random_token(TOKEN_BYTES),
            user_id: user,
            created_at: now,
            last_seen_at: now,
            expires_at: now + self.ttl,
        };
        self.repo.insert_session(signal, &session)?;
        tracing::info!(event = "session_issued", user = %user, "session issued");
        Ok(session)
    }

    /// Look a token up and refresh its activity timestamp.
    ///
    /// An expired session is deleted before `SessionExpired` is returned.
    /// Validation never extends the expiry.
    pub fn validate_session(
        &self,
        signal: &AbortSignal,
        token: &str,
    ) -> Result<Session, MaturityError> {
        let session = self
            .repo
            .get_session(signal, token)?
            .ok_or(MaturityError::SessionNotFound)?;

        let now = Utc::now();
        if session.is_expired_at(now) {
            self.repo.delete_session(signal, token)?;
            tracing::warn!(
                event = "session_expired",
                user = %session.user_id,
                "expired session removed"
            );
            return Err(MaturityError::SessionExpired);
        }

        // A concurrent logout may remove the row between the read and the touch.
        self.repo
            .touch_session(signal, token, now)?
            .ok_or(MaturityError::SessionNotFound)
    }

    /// Push the expiry of a live session to `now + ttl`.
    pub fn extend_session(
        &self,
        signal: &AbortSignal,
        token: &str,
    ) -> Result<Session, MaturityError> {
        let mut session = self
            .repo
            .get_session(signal, token)?
            .ok_or(MaturityError::SessionNotFound)?;

        let now = Utc::now();
        if session.is_expired_at(now) {
            return Err(MaturityError::SessionExpired);
        }
        let expires_at = now + self.ttl;
        if !self.repo.extend_session(signal, token, now, expires_at)? {
            return Err(MaturityError::SessionExpired);
        }
        session.expires_at = expires_at;
        Ok(session)
    }

    /// Delete one session. Returns whether it existed.
    pub fn logout(&self, signal: &AbortSignal, token: &str) -> Result<bool, MaturityError> {
        self.repo.delete_session(signal, token)
    }

    /// Delete every session of a user, e.g. after a password change.
    pub fn revoke_user_sessions(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<usize, MaturityError> {
        let removed = self.repo.delete_user_sessions(signal, user)?;
        tracing::info!(event = "sessions_revoked", user = %user, removed, "user sessions revoked");
        Ok(removed)
    }

    pub fn active_sessions(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<Vec<Session>, MaturityError> {
        self.repo.list_user_sessions(signal, user, Utc::now())
    }

    /// Remove sessions whose expiry has passed. Safe to run repeatedly and
    /// concurrently.
    pub fn sweep_expired_sessions(&self, signal: &AbortSignal) -> Result<usize, MaturityError> {
        let removed = self.repo.delete_expired_sessions(signal, Utc::now())?;
        if removed > 0 {
            tracing::info!(event = "session_sweep", removed, "expired sessions swept");
        }
        Ok(removed)
    }

    // =========================================================================
    // PERMISSION RESOLUTION
    // =========================================================================

    fn resolve_roles(
        &self,
        signal: &AbortSignal,
        ids: impl IntoIterator<Item = RoleId>,
    ) -> Result<BTreeMap<RoleId, Role>, MaturityError> {
        let mut roles = BTreeMap::new();
        for id in ids {
            if roles.contains_key(&id) {
                continue;
            }
            let role = self
                .repo
                .get_role(signal, id)?
                .ok_or_else(|| MaturityError::RoleNotFound(id.to_string()))?;
            roles.insert(id, role);
        }
        Ok(roles)
    }

    fn union(roles: &BTreeMap<RoleId, Role>) -> BTreeSet<Permission> {
        roles
            .values()
            .flat_map(|r| r.permissions.iter().copied())
            .collect()
    }

    /// Roles held through any team or group.
    fn member_roles(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<BTreeMap<RoleId, Role>, MaturityError> {
        let teams = self.repo.team_memberships(signal, user)?;
        let groups = self.repo.group_memberships(signal, user)?;
        let ids = teams
            .into_iter()
            .map(|(_, r)| r)
            .chain(groups.into_iter().map(|(_, r)| r));
        self.resolve_roles(signal, ids)
    }

    /// The direct role on `team` plus the role on its parent group.
    fn team_scoped_roles(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
    ) -> Result<BTreeMap<RoleId, Role>, MaturityError> {
        let Some(team_row) = self.repo.get_team(signal, team)? else {
            return Ok(BTreeMap::new());
        };
        let direct = self.repo.team_role_of(signal, user, team)?;
        let via_group = match team_row.group_id {
            Some(group) => self.repo.group_role_of(signal, user, group)?,
            None => None,
        };
        self.resolve_roles(signal, direct.into_iter().chain(via_group))
    }

    /// Distinct roles the user holds through any team or group.
    pub fn user_roles(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<Vec<Role>, MaturityError> {
        Ok(self.member_roles(signal, user)?.into_values().collect())
    }

    /// Union of every permission reachable through the user's memberships.
    pub fn effective_permissions(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<BTreeSet<Permission>, MaturityError> {
        Ok(Self::union(&self.member_roles(signal, user)?))
    }

    /// Permissions of the user on one team: the direct role plus the role
    /// on the team's group.
    pub fn team_permissions(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
    ) -> Result<BTreeSet<Permission>, MaturityError> {
        Ok(Self::union(&self.team_scoped_roles(signal, user, team)?))
    }

    pub fn has_permission(
        &self,
        signal: &AbortSignal,
        user: UserId,
        resource: Resource,
        action: Action,
    ) -> Result<bool, MaturityError> {
        let permission = Permission::new(resource, action);
        Ok(self
            .member_roles(signal, user)?
            .values()
            .any(|r| r.grants(permission)))
    }

    pub fn has_team_permission(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
        resource: Resource,
        action: Action,
    ) -> Result<bool, MaturityError> {
        let permission = Permission::new(resource, action);
        Ok(self
            .team_scoped_roles(signal, user, team)?
            .values()
            .any(|r| r.grants(permission)))
    }

    /// [`Self::has_permission`] as a gate.
    pub fn require_permission(
        &self,
        signal: &AbortSignal,
        user: UserId,
        resource: Resource,
        action: Action,
    ) -> Result<(), MaturityError> {
        if self.has_permission(signal, user, resource, action)? {
            return Ok(());
        }
        let permission = Permission::new(resource, action);
        tracing::debug!(event = "permission_denied", user = %user, %permission, "permission denied");
        Err(MaturityError::PermissionDenied(permission))
    }

    /// [`Self::has_team_permission`] as a gate.
    pub fn require_team_permission(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
        resource: Resource,
        action: Action,
    ) -> Result<(), MaturityError> {
        if self.has_team_permission(signal, user, team, resource, action)? {
            return Ok(());
        }
        let permission = Permission::new(resource, action);
        tracing::debug!(
            event = "permission_denied",
            user = %user,
            team = %team,
            %permission,
            "team permission denied"
        );
        Err(MaturityError::PermissionDenied(permission))
    }

    pub fn is_admin(&self, signal: &AbortSignal, user: UserId) -> Result<bool, MaturityError> {
        Ok(self
            .user_roles(signal, user)?
            .iter()
            .any(|r| r.name == ROLE_ADMIN))
    }

    /// The user's direct role on a team, if any.
    pub fn team_role(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
    ) -> Result<Option<Role>, MaturityError> {
        match self.repo.team_role_of(signal, user, team)? {
            Some(id) => self.repo.get_role(signal, id),
            None => Ok(None),
        }
    }

    // =========================================================================
    // DIRECTORY
    // =========================================================================

    /// Insert the built-in roles that are not present yet. Returns how many
    /// were created.
    pub fn seed_builtin_roles(&self, signal: &AbortSignal) -> Result<usize, MaturityError> {
        let mut created = 0;
        for role in builtin_roles() {
            if self.repo.find_role(signal, &role.name)?.is_none() {
                self.repo.insert_role(signal, role)?;
                created += 1;
            }
        }
        Ok(created)
    }

    pub fn create_role(
        &self,
        signal: &AbortSignal,
        name: &str,
        description: &str,
        permissions: BTreeSet<Permission>,
    ) -> Result<Role, MaturityError> {
        self.repo.insert_role(
            signal,
            NewRole {
                name: name.to_string(),
                description: description.to_string(),
                permissions,
            },
        )
    }

    pub fn create_group(
        &self,
        signal: &AbortSignal,
        name: &str,
        description: &str,
    ) -> Result<Group, MaturityError> {
        self.repo.insert_group(
            signal,
            NewGroup {
                name: name.to_string(),
                description: description.to_string(),
                created_at: Utc::now(),
            },
        )
    }

    pub fn create_team(
        &self,
        signal: &AbortSignal,
        name: &str,
        description: &str,
        group: Option<GroupId>,
    ) -> Result<Team, MaturityError> {
        self.repo.insert_team(
            signal,
            NewTeam {
                name: name.to_string(),
                description: description.to_string(),
                group_id: group,
                created_at: Utc::now(),
            },
        )
    }

    /// Teams ordered by id.
    pub fn list_teams(
        &self,
        signal: &AbortSignal,
        page: Page,
    ) -> Result<Vec<Team>, MaturityError> {
        self.repo.list_teams(signal, page)
    }

    pub fn team_named(&self, signal: &AbortSignal, name: &str) -> Result<Team, MaturityError> {
        self.repo
            .find_team(signal, name)?
            .ok_or_else(|| MaturityError::UnknownTeam(name.to_string()))
    }

    pub fn group(&self, signal: &AbortSignal, id: GroupId) -> Result<Group, MaturityError> {
        self.repo
            .get_group(signal, id)?
            .ok_or(MaturityError::GroupNotFound(id))
    }

    /// Groups ordered by id.
    pub fn list_groups(&self, signal: &AbortSignal) -> Result<Vec<Group>, MaturityError> {
        self.repo.list_groups(signal)
    }

    fn role_named(&self, signal: &AbortSignal, name: &str) -> Result<Role, MaturityError> {
        self.repo
            .find_role(signal, name)?
            .ok_or_else(|| MaturityError::RoleNotFound(name.to_string()))
    }

    /// Give the user the named role on a team, replacing any previous one.
    pub fn add_team_member(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
        role: &str,
    ) -> Result<(), MaturityError> {
        let role = self.role_named(signal, role)?;
        self.repo.set_team_member(signal, user, team, role.id)
    }

    /// Give the user the named role on a group, replacing any previous one.
    pub fn add_group_member(
        &self,
        signal: &AbortSignal,
        user: UserId,
        group: GroupId,
        role: &str,
    ) -> Result<(), MaturityError> {
        let role = self.role_named(signal, role)?;
        self.repo.set_group_member(signal, user, group, role.id)
    }
}
