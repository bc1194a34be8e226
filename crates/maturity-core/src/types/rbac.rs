//! # Access-Control Records
//!
//! The closed permission vocabulary, roles, the team/group directory and
//! sessions.

use super::{GroupId, MaturityError, RoleId, TeamId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// PERMISSION VOCABULARY
// =============================================================================

/// Resource half of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    User,
    Team,
    Group,
    Assessment,
    Report,
    System,
    Audit,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Resource::User,
        Resource::Team,
        Resource::Group,
        Resource::Assessment,
        Resource::Report,
        Resource::System,
        Resource::Audit,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::User => "user",
            Resource::Team => "team",
            Resource::Group => "group",
            Resource::Assessment => "assessment",
            Resource::Report => "report",
            Resource::System => "system",
            Resource::Audit => "audit",
        }
    }
}

impl FromStr for Resource {
    type Err = MaturityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| MaturityError::UnknownPermission(s.to_string()))
    }
}

/// Action half of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Export,
    Manage,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Export,
        Action::Manage,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Export => "export",
            Action::Manage => "manage",
        }
    }
}

impl FromStr for Action {
    type Err = MaturityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| MaturityError::UnknownPermission(s.to_string()))
    }
}

/// A `(resource, action)` pair. Rendered and parsed as `resource:action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
}

impl Permission {
    #[must_use]
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource.as_str(), self.action.as_str())
    }
}

impl FromStr for Permission {
    type Err = MaturityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, action) = s
            .split_once(':')
            .ok_or_else(|| MaturityError::UnknownPermission(s.to_string()))?;
        Ok(Self::new(resource.parse()?, action.parse()?))
    }
}

// =============================================================================
// ROLES
// =============================================================================

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_EDITOR: &str = "editor";
pub const ROLE_VIEWER: &str = "viewer";

/// A named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    pub permissions: BTreeSet<Permission>,
}

impl Role {
    #[must_use]
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Insert shape for a role. Backends assign the id.
#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: String,
    pub permissions: BTreeSet<Permission>,
}

#[cfg(test)]
impl NewRole {
    fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Permissions a fresh database knows about. Not every `resource:action`
/// combination is meaningful; admin holds exactly this list.
pub const SEEDED_PERMISSIONS: [Permission; 20] = {
    use Action::{Create, Delete, Export, Manage, Read, Update};
    use Resource::{Assessment, Audit, Report, System};
    [
        Permission::new(Resource::User, Create),
        Permission::new(Resource::User, Read),
        Permission::new(Resource::User, Update),
        Permission::new(Resource::User, Delete),
        Permission::new(Resource::Team, Create),
        Permission::new(Resource::Team, Read),
        Permission::new(Resource::Team, Update),
        Permission::new(Resource::Team, Delete),
        Permission::new(Resource::Group, Create),
        Permission::new(Resource::Group, Read),
        Permission::new(Resource::Group, Update),
        Permission::new(Resource::Group, Delete),
        Permission::new(Assessment, Create),
        Permission::new(Assessment, Read),
        Permission::new(Assessment, Update),
        Permission::new(Assessment, Delete),
        Permission::new(Report, Read),
        Permission::new(Report, Export),
        Permission::new(System, Manage),
        Permission::new(Audit, Read),
    ]
};

/// The three roles every fresh database is seeded with.
#[must_use]
pub fn builtin_roles() -> Vec<NewRole> {
    use Action::{Create, Export, Read, Update};
    use Resource::{Assessment, Report};

    let admin = SEEDED_PERMISSIONS.into_iter().collect();

    let editor = [
        (Assessment, Create),
        (Assessment, Read),
        (Assessment, Update),
        (Resource::Team, Read),
        (Resource::User, Read),
        (Resource::Group, Read),
        (Report, Read),
        (Report, Export),
    ];

    let viewer = [(Assessment, Read), (Resource::Team, Read), (Report, Read)];

    vec![
        NewRole {
            name: ROLE_ADMIN.to_string(),
            description: "Full system access with ability to manage users, teams, and all assessments"
                .to_string(),
            permissions: admin,
        },
        NewRole {
            name: ROLE_EDITOR.to_string(),
            description: "Can create and edit assessments, manage team assessments".to_string(),
            permissions: editor
                .into_iter()
                .map(|(r, a)| Permission::new(r, a))
                .collect(),
        },
        NewRole {
            name: ROLE_VIEWER.to_string(),
            description: "Can view assessments and results only".to_string(),
            permissions: viewer
                .into_iter()
                .map(|(r, a)| Permission::new(r, a))
                .collect(),
        },
    ]
}

// =============================================================================
// DIRECTORY
// =============================================================================

/// A team. Belongs to at most one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub description: String,
    pub group_id: Option<GroupId>,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for a team.
#[derive(Debug, Clone)]
pub struct NewTeam {
    pub name: String,
    pub description: String,
    pub group_id: Option<GroupId>,
    pub created_at: DateTime<Utc>,
}

/// A group of teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// SESSIONS
// =============================================================================

/// A server-issued, time-limited credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token; also the storage key.
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every successful validation.
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Expired strictly after `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn permission_round_trips_through_text() {
        let p: Permission = "assessment:read".parse().expect("parse");
        assert_eq!(p, Permission::new(Resource::Assessment, Action::Read));
        assert_eq!(p.to_string(), "assessment:read");
    }

    #[test]
    fn unknown_vocabulary_is_rejected() {
        assert!("assessment:approve".parse::<Permission>().is_err());
        assert!("billing:read".parse::<Permission>().is_err());
        assert!("assessment".parse::<Permission>().is_err());
    }

    #[test]
    fn builtin_roles_match_seed_table() {
        let roles = builtin_roles();
        assert_eq!(roles.len(), 3);

        let admin = &roles[0];
        assert_eq!(admin.permissions.len(), SEEDED_PERMISSIONS.len());
        assert!(admin.grants(Permission::new(Resource::System, Action::Manage)));
        assert!(admin.grants(Permission::new(Resource::Audit, Action::Read)));
        assert!(!admin.grants(Permission::new(Resource::Report, Action::Delete)));
        assert!(!admin.grants(Permission::new(Resource::Audit, Action::Manage)));
        for role in &roles[1..] {
            assert!(role.permissions.is_subset(&admin.permissions));
        }

        let editor = &roles[1];
        assert!(editor
            .permissions
            .contains(&Permission::new(Resource::Report, Action::Export)));
        assert!(!editor
            .permissions
            .contains(&Permission::new(Resource::Assessment, Action::Delete)));

        let viewer = &roles[2];
        assert_eq!(viewer.permissions.len(), 3);
        assert!(!viewer
            .permissions
            .contains(&Permission::new(Resource::Assessment, Action::Update)));
    }

    #[test]
    fn session_expires_strictly_after_deadline() {
        let now = Utc::now();
        let session = Session {
            token: "t".to_string(),
            user_id: UserId(1),
            created_at: now,
            last_seen_at: now,
            expires_at: now,
        };
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + Duration::seconds(1)));
    }
}
