//! # In-Memory Store
//!
//! All rows in `BTreeMap`s behind one `RwLock`. Each write method takes the
//! write lock once, so a multi-row write is all-or-nothing from the point of
//! view of every other caller.

use crate::repository::{
    AbortSignal, AssessmentRepository, DirectoryRepository, SessionRepository,
};
use crate::types::{
    Assessment, AssessmentFilter, AssessmentId, AssessmentStatus, Group, GroupId, MaturityError,
    NewAssessment, NewGroup, NewRole, NewTeam, Page, QuestionId, Response, Role, RoleId,
    SectionScore, Session, Team, TeamId, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    assessments: BTreeMap<AssessmentId, Assessment>,
    responses: BTreeMap<(AssessmentId, QuestionId), Response>,
    section_scores: BTreeMap<AssessmentId, Vec<SectionScore>>,
    sessions: BTreeMap<String, Session>,
    roles: BTreeMap<RoleId, Role>,
    teams: BTreeMap<TeamId, Team>,
    groups: BTreeMap<GroupId, Group>,
    team_members: BTreeMap<(UserId, TeamId), RoleId>,
    group_members: BTreeMap<(UserId, GroupId), RoleId>,
    next_assessment: u64,
    next_role: u64,
    next_team: u64,
    next_group: u64,
}

fn next_id(counter: &mut u64) -> u64 {
    *counter = counter.saturating_add(1);
    *counter
}

/// Newest first: by creation time, then by id.
fn newest_first(rows: &mut [Assessment]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

/// Process-local backend implementing every repository trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, signal: &AbortSignal) -> Result<RwLockReadGuard<'_, Tables>, MaturityError> {
        signal.check()?;
        self.tables
            .read()
            .map_err(|_| MaturityError::persistence("memory store lock poisoned"))
    }

    fn write(&self, signal: &AbortSignal) -> Result<RwLockWriteGuard<'_, Tables>, MaturityError> {
        signal.check()?;
        self.tables
            .write()
            .map_err(|_| MaturityError::persistence("memory store lock poisoned"))
    }
}

// =============================================================================
// ASSESSMENTS
// =============================================================================

impl AssessmentRepository for MemoryStore {
    fn insert_assessment(
        &self,
        signal: &AbortSignal,
        new: NewAssessment,
    ) -> Result<Assessment, MaturityError> {
        let mut t = self.write(signal)?;
        let assessment = Assessment {
            id: AssessmentId(next_id(&mut t.next_assessment)),
            team_id: new.team_id,
            created_by: new.created_by,
            session_id: new.session_id,
            status: AssessmentStatus::InProgress,
            created_at: new.created_at,
            completed_at: None,
        };
        t.assessments.insert(assessment.id, assessment.clone());
        Ok(assessment)
    }

    fn get_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Option<Assessment>, MaturityError> {
        Ok(self.read(signal)?.assessments.get(&id).cloned())
    }

    fn list_team_assessments(
        &self,
        signal: &AbortSignal,
        team: TeamId,
        filter: AssessmentFilter,
        page: Page,
    ) -> Result<(Vec<Assessment>, usize), MaturityError> {
        let t = self.read(signal)?;
        let mut rows: Vec<Assessment> = t
            .assessments
            .values()
            .filter(|a| a.team_id == team && filter.matches(a))
            .cloned()
            .collect();
        newest_first(&mut rows);
        let total = rows.len();
        Ok((page.apply(rows), total))
    }

    fn list_user_assessments(
        &self,
        signal: &AbortSignal,
        user: UserId,
        page: Page,
    ) -> Result<(Vec<Assessment>, usize), MaturityError> {
        let t = self.read(signal)?;
        let mut rows: Vec<Assessment> = t
            .assessments
            .values()
            .filter(|a| a.created_by == user)
            .cloned()
            .collect();
        newest_first(&mut rows);
        let total = rows.len();
        Ok((page.apply(rows), total))
    }

    fn delete_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<(), MaturityError> {
        let mut t = self.write(signal)?;
        if t.assessments.remove(&id).is_none() {
            return Err(MaturityError::AssessmentNotFound(id));
        }
        t.responses.retain(|(a, _), _| *a != id);
        t.section_scores.remove(&id);
        Ok(())
    }

    fn upsert_responses(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
        responses: &[Response],
    ) -> Result<(), MaturityError> {
        let mut t = self.write(signal)?;
        match t.assessments.get(&id) {
            None => return Err(MaturityError::AssessmentNotFound(id)),
            Some(a) if a.is_completed() => {
                return Err(MaturityError::AssessmentAlreadyCompleted(id));
            }
            Some(_) => {}
        }
        signal.check()?;
        for response in responses {
            let mut row = response.clone();
            row.assessment_id = id;
            t.responses.insert((id, row.question_id.clone()), row);
        }
        Ok(())
    }

    fn list_responses(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Vec<Response>, MaturityError> {
        let t = self.read(signal)?;
        Ok(t.responses
            .iter()
            .filter(|((a, _), _)| *a == id)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn complete_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
        scores: &[SectionScore],
        completed_at: DateTime<Utc>,
    ) -> Result<Assessment, MaturityError> {
        let mut t = self.write(signal)?;
        let completed = match t.assessments.get(&id) {
            None => return Err(MaturityError::AssessmentNotFound(id)),
            Some(a) if a.status == AssessmentStatus::InProgress => Assessment {
                status: AssessmentStatus::Completed,
                completed_at: Some(completed_at),
                ..a.clone()
            },
            Some(_) => return Err(MaturityError::AssessmentNotInProgress(id)),
        };
        signal.check()?;
        t.section_scores.insert(id, scores.to_vec());
        t.assessments.insert(id, completed.clone());
        Ok(completed)
    }

    fn list_section_scores(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Vec<SectionScore>, MaturityError> {
        Ok(self
            .read(signal)?
            .section_scores
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

impl SessionRepository for MemoryStore {
    fn insert_session(
        &self,
        signal: &AbortSignal,
        session: &Session,
    ) -> Result<(), MaturityError> {
        self.write(signal)?
            .sessions
            .insert(session.token.clone(), session.clone());
        Ok(())
    }

    fn get_session(
        &self,
        signal: &AbortSignal,
        token: &str,
    ) -> Result<Option<Session>, MaturityError> {
        Ok(self.read(signal)?.sessions.get(token).cloned())
    }

    fn touch_session(
        &self,
        signal: &AbortSignal,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, MaturityError> {
        Ok(self
            .write(signal)?
            .sessions
            .get_mut(token)
            .map(|session| {
                session.last_seen_at = now;
                session.clone()
            }))
    }

    fn extend_session(
        &self,
        signal: &AbortSignal,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, MaturityError> {
        let mut t = self.write(signal)?;
        match t.sessions.get_mut(token) {
            Some(session) if !session.is_expired_at(now) => {
                session.expires_at = expires_at;
                session.last_seen_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete_session(&self, signal: &AbortSignal, token: &str) -> Result<bool, MaturityError> {
        Ok(self.write(signal)?.sessions.remove(token).is_some())
    }

    fn delete_user_sessions(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<usize, MaturityError> {
        let mut t = self.write(signal)?;
        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.user_id != user);
        Ok(before - t.sessions.len())
    }

    fn delete_expired_sessions(
        &self,
        signal: &AbortSignal,
        now: DateTime<Utc>,
    ) -> Result<usize, MaturityError> {
        let mut t = self.write(signal)?;
        let before = t.sessions.len();
        t.sessions.retain(|_, s| !s.is_expired_at(now));
        Ok(before - t.sessions.len())
    }

    fn list_user_sessions(
        &self,
        signal: &AbortSignal,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, MaturityError> {
        let t = self.read(signal)?;
        let mut rows: Vec<Session> = t
            .sessions
            .values()
            .filter(|s| s.user_id == user && !s.is_expired_at(now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

// =============================================================================
// DIRECTORY
// =============================================================================

impl DirectoryRepository for MemoryStore {
    fn insert_role(&self, signal: &AbortSignal, new: NewRole) -> Result<Role, MaturityError> {
        let mut t = self.write(signal)?;
        if t.roles.values().any(|r| r.name == new.name) {
            return Err(MaturityError::AlreadyExists {
                kind: "role",
                name: new.name,
            });
        }
        let role = Role {
            id: RoleId(next_id(&mut t.next_role)),
            name: new.name,
            description: new.description,
            permissions: new.permissions,
        };
        t.roles.insert(role.id, role.clone());
        Ok(role)
    }

    fn get_role(&self, signal: &AbortSignal, id: RoleId) -> Result<Option<Role>, MaturityError> {
        Ok(self.read(signal)?.roles.get(&id).cloned())
    }

    fn find_role(&self, signal: &AbortSignal, name: &str) -> Result<Option<Role>, MaturityError> {
        Ok(self
            .read(signal)?
            .roles
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    fn list_roles(&self, signal: &AbortSignal) -> Result<Vec<Role>, MaturityError> {
        Ok(self.read(signal)?.roles.values().cloned().collect())
    }

    fn insert_team(&self, signal: &AbortSignal, new: NewTeam) -> Result<Team, MaturityError> {
        let mut t = self.write(signal)?;
        if t.teams.values().any(|team| team.name == new.name) {
            return Err(MaturityError::AlreadyExists {
                kind: "team",
                name: new.name,
            });
        }
        if let Some(group) = new.group_id {
            if !t.groups.contains_key(&group) {
                return Err(MaturityError::GroupNotFound(group));
            }
        }
        let team = Team {
            id: TeamId(next_id(&mut t.next_team)),
            name: new.name,
            description: new.description,
            group_id: new.group_id,
            created_at: new.created_at,
        };
        t.teams.insert(team.id, team.clone());
        Ok(team)
    }

    fn get_team(&self, signal: &AbortSignal, id: TeamId) -> Result<Option<Team>, MaturityError> {
        Ok(self.read(signal)?.teams.get(&id).cloned())
    }

    fn find_team(&self, signal: &AbortSignal, name: &str) -> Result<Option<Team>, MaturityError> {
        Ok(self
            .read(signal)?
            .teams
            .values()
            .find(|team| team.name == name)
            .cloned())
    }

    fn list_teams(&self, signal: &AbortSignal, page: Page) -> Result<Vec<Team>, MaturityError> {
        let rows = self.read(signal)?.teams.values().cloned().collect();
        Ok(page.apply(rows))
    }

    fn insert_group(&self, signal: &AbortSignal, new: NewGroup) -> Result<Group, MaturityError> {
        let mut t = self.write(signal)?;
        if t.groups.values().any(|g| g.name == new.name) {
            return Err(MaturityError::AlreadyExists {
                kind: "group",
                name: new.name,
            });
        }
        let group = Group {
            id: GroupId(next_id(&mut t.next_group)),
            name: new.name,
            description: new.description,
            created_at: new.created_at,
        };
        t.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn get_group(
        &self,
        signal: &AbortSignal,
        id: GroupId,
    ) -> Result<Option<Group>, MaturityError> {
        Ok(self.read(signal)?.groups.get(&id).cloned())
    }

    fn list_groups(&self, signal: &AbortSignal) -> Result<Vec<Group>, MaturityError> {
        Ok(self.read(signal)?.groups.values().cloned().collect())
    }

    fn set_team_member(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
        role: RoleId,
    ) -> Result<(), MaturityError> {
        let mut t = self.write(signal)?;
        if !t.teams.contains_key(&team) {
            return Err(MaturityError::TeamNotFound(team));
        }
        if !t.roles.contains_key(&role) {
            return Err(MaturityError::RoleNotFound(role.to_string()));
        }
        t.team_members.insert((user, team), role);
        Ok(())
    }

    fn set_group_member(
        &self,
        signal: &AbortSignal,
        user: UserId,
        group: GroupId,
        role: RoleId,
    ) -> Result<(), MaturityError> {
        let mut t = self.write(signal)?;
        if !t.groups.contains_key(&group) {
            return Err(MaturityError::GroupNotFound(group));
        }
        if !t.roles.contains_key(&role) {
            return Err(MaturityError::RoleNotFound(role.to_string()));
        }
        t.group_members.insert((user, group), role);
        Ok(())
    }

    fn team_memberships(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<Vec<(TeamId, RoleId)>, MaturityError> {
        let t = self.read(signal)?;
        Ok(t.team_members
            .range((user, TeamId(0))..=(user, TeamId(u64::MAX)))
            .map(|(&(_, team), &role)| (team, role))
            .collect())
    }

    fn group_memberships(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<Vec<(GroupId, RoleId)>, MaturityError> {
        let t = self.read(signal)?;
        Ok(t.group_members
            .range((user, GroupId(0))..=(user, GroupId(u64::MAX)))
            .map(|(&(_, group), &role)| (group, role))
            .collect())
    }

    fn team_role_of(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
    ) -> Result<Option<RoleId>, MaturityError> {
        Ok(self.read(signal)?.team_members.get(&(user, team)).copied())
    }

    fn group_role_of(
        &self,
        signal: &AbortSignal,
        user: UserId,
        group: GroupId,
    ) -> Result<Option<RoleId>, MaturityError> {
        Ok(self.read(signal)?.group_members.get(&(user, group)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnswerId;

    fn started(store: &MemoryStore, signal: &AbortSignal, team: u64) -> Assessment {
        store
            .insert_assessment(
                signal,
                NewAssessment {
                    team_id: TeamId(team),
                    created_by: UserId(1),
                    session_id: "c".to_string(),
                    created_at: Utc::now(),
                },
            )
            .expect("insert")
    }

    #[test]
    fn aborted_write_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let signal = AbortSignal::never();
        let a = started(&store, &signal, 1);

        let aborted = AbortSignal::never();
        aborted.abort();
        let result = store.upsert_responses(
            &aborted,
            a.id,
            &[Response::new(a.id, QuestionId::from("S1-Q1"), [AnswerId::from("S1-Q1-A1")])],
        );
        assert!(matches!(result, Err(MaturityError::Aborted)));
        assert!(store.list_responses(&signal, a.id).expect("list").is_empty());
    }

    #[test]
    fn second_completion_is_rejected() {
        let store = MemoryStore::new();
        let signal = AbortSignal::never();
        let a = started(&store, &signal, 1);
        let scores = [SectionScore::new("S", 1.0, 1.0)];

        store
            .complete_assessment(&signal, a.id, &scores, Utc::now())
            .expect("first");
        assert!(matches!(
            store.complete_assessment(&signal, a.id, &[], Utc::now()),
            Err(MaturityError::AssessmentNotInProgress(_))
        ));
        assert_eq!(store.list_section_scores(&signal, a.id).expect("scores").len(), 1);
    }

    #[test]
    fn team_listing_pages_newest_first() {
        let store = MemoryStore::new();
        let signal = AbortSignal::never();
        let ids: Vec<_> = (0..4).map(|_| started(&store, &signal, 5).id).collect();
        started(&store, &signal, 6);

        let (rows, total) = store
            .list_team_assessments(&signal, TeamId(5), AssessmentFilter::default(), Page::new(1, 2))
            .expect("list");
        assert_eq!(total, 4);
        assert_eq!(rows.iter().map(|a| a.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);
    }

    #[test]
    fn duplicate_team_name_is_rejected() {
        let store = MemoryStore::new();
        let signal = AbortSignal::never();
        let new = || NewTeam {
            name: "Core".to_string(),
            description: String::new(),
            group_id: None,
            created_at: Utc::now(),
        };
        store.insert_team(&signal, new()).expect("first");
        assert!(matches!(
            store.insert_team(&signal, new()),
            Err(MaturityError::AlreadyExists { kind: "team", .. })
        ));
    }
}
