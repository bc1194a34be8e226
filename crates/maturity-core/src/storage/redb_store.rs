//! # redb-backed Store
//!
//! Disk-backed implementation of every repository trait on the redb
//! embedded database:
//! - ACID write transactions (a section save, or score persistence plus the
//!   completion transition, commit as one unit)
//! - MVCC (concurrent readers, single writer)
//! - Rows are postcard-encoded serde values
//!
//! Status checks that guard a write (saving into a completed assessment,
//! completing twice) run inside the same write transaction as the write.
//! redb serializes writers, so two racing completions see each other.

use crate::repository::{
    AbortSignal, AssessmentRepository, DirectoryRepository, SessionRepository,
};
use crate::types::{
    Assessment, AssessmentFilter, AssessmentId, AssessmentStatus, Group, GroupId, MaturityError,
    NewAssessment, NewGroup, NewRole, NewTeam, Page, Response, Role, RoleId, SectionScore, Session,
    Team, TeamId, UserId,
};
use chrono::{DateTime, Utc};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Assessments: AssessmentId -> Assessment
const ASSESSMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("assessments");

/// Responses: (AssessmentId, QuestionId) -> Response
const RESPONSES: TableDefinition<(u64, &str), &[u8]> = TableDefinition::new("responses");

/// Section scores: (AssessmentId, position) -> SectionScore
const SECTION_SCORES: TableDefinition<(u64, u32), &[u8]> = TableDefinition::new("section_scores");

/// Sessions: token -> Session
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

const ROLES: TableDefinition<u64, &[u8]> = TableDefinition::new("roles");
const TEAMS: TableDefinition<u64, &[u8]> = TableDefinition::new("teams");
const GROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("groups");

/// Team membership: (UserId, TeamId) -> RoleId
const TEAM_MEMBERS: TableDefinition<(u64, u64), u64> = TableDefinition::new("team_members");

/// Group membership: (UserId, GroupId) -> RoleId
const GROUP_MEMBERS: TableDefinition<(u64, u64), u64> = TableDefinition::new("group_members");

/// Id counters: name -> last assigned id
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_ASSESSMENT: &str = "next_assessment";
const NEXT_ROLE: &str = "next_role";
const NEXT_TEAM: &str = "next_team";
const NEXT_GROUP: &str = "next_group";

// =============================================================================
// ROW CODEC
// =============================================================================

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MaturityError> {
    postcard::to_allocvec(value).map_err(MaturityError::persistence)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, MaturityError> {
    postcard::from_bytes(bytes).map_err(MaturityError::persistence)
}

/// Decode every row of a table, in key order.
fn decode_all<K, T, Tb>(table: &Tb) -> Result<Vec<T>, MaturityError>
where
    K: redb::Key + 'static,
    T: DeserializeOwned,
    Tb: ReadableTable<K, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.iter().map_err(MaturityError::persistence)? {
        let (_, value) = entry.map_err(MaturityError::persistence)?;
        rows.push(decode(value.value())?);
    }
    Ok(rows)
}

/// Bump and return a named id counter.
fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64, MaturityError> {
    let mut meta = txn
        .open_table(METADATA)
        .map_err(MaturityError::persistence)?;
    let next = meta
        .get(counter)
        .map_err(MaturityError::persistence)?
        .map(|v| v.value())
        .unwrap_or(0)
        .saturating_add(1);
    meta.insert(counter, next)
        .map_err(MaturityError::persistence)?;
    Ok(next)
}

fn newest_first(rows: &mut [Assessment]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

// =============================================================================
// STORE
// =============================================================================

/// A disk-backed store using redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MaturityError> {
        let db = Database::create(path.as_ref()).map_err(MaturityError::persistence)?;

        // Initialize tables if they don't exist
        {
            let txn = db.begin_write().map_err(MaturityError::persistence)?;
            txn.open_table(ASSESSMENTS)
                .map_err(MaturityError::persistence)?;
            txn.open_table(RESPONSES)
                .map_err(MaturityError::persistence)?;
            txn.open_table(SECTION_SCORES)
                .map_err(MaturityError::persistence)?;
            txn.open_table(SESSIONS)
                .map_err(MaturityError::persistence)?;
            txn.open_table(ROLES).map_err(MaturityError::persistence)?;
            txn.open_table(TEAMS).map_err(MaturityError::persistence)?;
            txn.open_table(GROUPS).map_err(MaturityError::persistence)?;
            txn.open_table(TEAM_MEMBERS)
                .map_err(MaturityError::persistence)?;
            txn.open_table(GROUP_MEMBERS)
                .map_err(MaturityError::persistence)?;
            txn.open_table(METADATA)
                .map_err(MaturityError::persistence)?;
            txn.commit().map_err(MaturityError::persistence)?;
        }

        tracing::debug!(event = "store_opened", path = %path.as_ref().display(), "redb store opened");
        Ok(Self { db })
    }

    fn read(&self, signal: &AbortSignal) -> Result<ReadTransaction, MaturityError> {
        signal.check()?;
        self.db.begin_read().map_err(MaturityError::persistence)
    }

    /// Run `f` in one write transaction.
    ///
    /// The transaction is aborted if `f` fails or the signal fires before
    /// commit.
    fn write<T>(
        &self,
        signal: &AbortSignal,
        f: impl FnOnce(&WriteTransaction) -> Result<T, MaturityError>,
    ) -> Result<T, MaturityError> {
        signal.check()?;
        let txn = self.db.begin_write().map_err(MaturityError::persistence)?;
        let out = match f(&txn).and_then(|out| signal.check().map(|()| out)) {
            Ok(out) => out,
            Err(e) => {
                txn.abort().map_err(MaturityError::persistence)?;
                return Err(e);
            }
        };
        txn.commit().map_err(MaturityError::persistence)?;
        Ok(out)
    }

    fn get_row<T: DeserializeOwned>(
        &self,
        signal: &AbortSignal,
        def: TableDefinition<u64, &'static [u8]>,
        id: u64,
    ) -> Result<Option<T>, MaturityError> {
        let txn = self.read(signal)?;
        let table = txn.open_table(def).map_err(MaturityError::persistence)?;
        let row = table.get(id).map_err(MaturityError::persistence)?;
        row.map(|v| decode(v.value())).transpose()
    }

    fn all_rows<T: DeserializeOwned>(
        &self,
        signal: &AbortSignal,
        def: TableDefinition<u64, &'static [u8]>,
    ) -> Result<Vec<T>, MaturityError> {
        let txn = self.read(signal)?;
        let table = txn.open_table(def).map_err(MaturityError::persistence)?;
        decode_all(&table)
    }

    fn all_sessions(&self, signal: &AbortSignal) -> Result<Vec<Session>, MaturityError> {
        let txn = self.read(signal)?;
        let table = txn
            .open_table(SESSIONS)
            .map_err(MaturityError::persistence)?;
        decode_all(&table)
    }
}

// =============================================================================
// ASSESSMENTS
// =============================================================================

fn load_assessment(
    txn: &WriteTransaction,
    id: AssessmentId,
) -> Result<Option<Assessment>, MaturityError> {
    let table = txn
        .open_table(ASSESSMENTS)
        .map_err(MaturityError::persistence)?;
    let row = table.get(id.0).map_err(MaturityError::persistence)?;
    row.map(|v| decode(v.value())).transpose()
}

fn store_assessment(txn: &WriteTransaction, assessment: &Assessment) -> Result<(), MaturityError> {
    let mut table = txn
        .open_table(ASSESSMENTS)
        .map_err(MaturityError::persistence)?;
    table
        .insert(assessment.id.0, encode(assessment)?.as_slice())
        .map_err(MaturityError::persistence)?;
    Ok(())
}

impl AssessmentRepository for RedbStore {
    fn insert_assessment(
        &self,
        signal: &AbortSignal,
        new: NewAssessment,
    ) -> Result<Assessment, MaturityError> {
        self.write(signal, |txn| {
            let assessment = Assessment {
                id: AssessmentId(next_id(txn, NEXT_ASSESSMENT)?),
                team_id: new.team_id,
                created_by: new.created_by,
                session_id: new.session_id,
                status: AssessmentStatus::InProgress,
                created_at: new.created_at,
                completed_at: None,
            };
            store_assessment(txn, &assessment)?;
            Ok(assessment)
        })
    }

    fn get_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Option<Assessment>, MaturityError> {
        self.get_row(signal, ASSESSMENTS, id.0)
    }

    fn list_team_assessments(
        &self,
        signal: &AbortSignal,
        team: TeamId,
        filter: AssessmentFilter,
        page: Page,
    ) -> Result<(Vec<Assessment>, usize), MaturityError> {
        let mut rows: Vec<Assessment> = self.all_rows(signal, ASSESSMENTS)?;
        rows.retain(|a| a.team_id == team && filter.matches(a));
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
        let mut rows: Vec<Assessment> = self.all_rows(signal, ASSESSMENTS)?;
        rows.retain(|a| a.created_by == user);
        newest_first(&mut rows);
        let total = rows.len();
        Ok((page.apply(rows), total))
    }

    fn delete_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<(), MaturityError> {
        self.write(signal, |txn| {
            {
                let mut table = txn
                    .open_table(ASSESSMENTS)
                    .map_err(MaturityError::persistence)?;
                let removed = table.remove(id.0).map_err(MaturityError::persistence)?;
                if removed.is_none() {
                    return Err(MaturityError::AssessmentNotFound(id));
                }
            }

            let mut responses = txn
                .open_table(RESPONSES)
                .map_err(MaturityError::persistence)?;
            let mut questions = Vec::new();
            for entry in responses
                .range((id.0, "")..(id.0.saturating_add(1), ""))
                .map_err(MaturityError::persistence)?
            {
                let (key, _) = entry.map_err(MaturityError::persistence)?;
                questions.push(key.value().1.to_string());
            }
            for question in &questions {
                responses
                    .remove((id.0, question.as_str()))
                    .map_err(MaturityError::persistence)?;
            }

            let mut scores = txn
                .open_table(SECTION_SCORES)
                .map_err(MaturityError::persistence)?;
            let mut positions = Vec::new();
            for entry in scores
                .range((id.0, 0u32)..=(id.0, u32::MAX))
                .map_err(MaturityError::persistence)?
            {
                let (key, _) = entry.map_err(MaturityError::persistence)?;
                positions.push(key.value().1);
            }
            for position in positions {
                scores
                    .remove((id.0, position))
                    .map_err(MaturityError::persistence)?;
            }
            Ok(())
        })
    }

    fn upsert_responses(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
        responses: &[Response],
    ) -> Result<(), MaturityError> {
        self.write(signal, |txn| {
            match load_assessment(txn, id)? {
                None => return Err(MaturityError::AssessmentNotFound(id)),
                Some(a) if a.is_completed() => {
                    return Err(MaturityError::AssessmentAlreadyCompleted(id));
                }
                Some(_) => {}
            }

            let mut table = txn
                .open_table(RESPONSES)
                .map_err(MaturityError::persistence)?;
            for response in responses {
                let mut row = response.clone();
                row.assessment_id = id;
                table
                    .insert((id.0, row.question_id.as_str()), encode(&row)?.as_slice())
                    .map_err(MaturityError::persistence)?;
            }
            Ok(())
        })
    }

    fn list_responses(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Vec<Response>, MaturityError> {
        let txn = self.read(signal)?;
        let table = txn
            .open_table(RESPONSES)
            .map_err(MaturityError::persistence)?;
        let mut rows = Vec::new();
        for entry in table
            .range((id.0, "")..(id.0.saturating_add(1), ""))
            .map_err(MaturityError::persistence)?
        {
            let (_, value) = entry.map_err(MaturityError::persistence)?;
            rows.push(decode(value.value())?);
        }
        Ok(rows)
    }

    fn complete_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
        scores: &[SectionScore],
        completed_at: DateTime<Utc>,
    ) -> Result<Assessment, MaturityError> {
        self.write(signal, |txn| {
            let mut assessment =
                load_assessment(txn, id)?.ok_or(MaturityError::AssessmentNotFound(id))?;
            if assessment.status != AssessmentStatus::InProgress {
                return Err(MaturityError::AssessmentNotInProgress(id));
            }

            {
                let mut table = txn
                    .open_table(SECTION_SCORES)
                    .map_err(MaturityError::persistence)?;
                for (position, score) in scores.iter().enumerate() {
                    table
                        .insert((id.0, position as u32), encode(score)?.as_slice())
                        .map_err(MaturityError::persistence)?;
                }
            }

            assessment.status = AssessmentStatus::Completed;
            assessment.completed_at = Some(completed_at);
            store_assessment(txn, &assessment)?;
            Ok(assessment)
        })
    }

    fn list_section_scores(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Vec<SectionScore>, MaturityError> {
        let txn = self.read(signal)?;
        let table = txn
            .open_table(SECTION_SCORES)
            .map_err(MaturityError::persistence)?;
        let mut rows = Vec::new();
        for entry in table
            .range((id.0, 0u32)..=(id.0, u32::MAX))
            .map_err(MaturityError::persistence)?
        {
            let (_, value) = entry.map_err(MaturityError::persistence)?;
            rows.push(decode(value.value())?);
        }
        Ok(rows)
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

fn load_session(txn: &WriteTransaction, token: &str) -> Result<Option<Session>, MaturityError> {
    let table = txn
        .open_table(SESSIONS)
        .map_err(MaturityError::persistence)?;
    let row = table.get(token).map_err(MaturityError::persistence)?;
    row.map(|v| decode(v.value())).transpose()
}

fn store_session(txn: &WriteTransaction, session: &Session) -> Result<(), MaturityError> {
    let mut table = txn
        .open_table(SESSIONS)
        .map_err(MaturityError::persistence)?;
    table
        .insert(session.token.as_str(), encode(session)?.as_slice())
        .map_err(MaturityError::persistence)?;
    Ok(())
}

/// Delete every session matching `doomed`. Returns the number removed.
fn delete_sessions_where(
    txn: &WriteTransaction,
    doomed: impl Fn(&Session) -> bool,
) -> Result<usize, MaturityError> {
    let mut table = txn
        .open_table(SESSIONS)
        .map_err(MaturityError::persistence)?;
    let tokens: Vec<String> = decode_all::<_, Session, _>(&table)?
        .into_iter()
        .filter(|s| doomed(s))
        .map(|s| s.token)
        .collect();
    for token in &tokens {
        table
            .remove(token.as_str())
            .map_err(MaturityError::persistence)?;
    }
    Ok(tokens.len())
}

impl SessionRepository for RedbStore {
    fn insert_session(
        &self,
        signal: &AbortSignal,
        session: &Session,
    ) -> Result<(), MaturityError> {
        self.write(signal, |txn| store_session(txn, session))
    }

    fn get_session(
        &self,
        signal: &AbortSignal,
        token: &str,
    ) -> Result<Option<Session>, MaturityError> {
        let txn = self.read(signal)?;
        let table = txn
            .open_table(SESSIONS)
            .map_err(MaturityError::persistence)?;
        let row = table.get(token).map_err(MaturityError::persistence)?;
        row.map(|v| decode(v.value())).transpose()
    }

    fn touch_session(
        &self,
        signal: &AbortSignal,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, MaturityError> {
        self.write(signal, |txn| {
            let Some(mut session) = load_session(txn, token)? else {
                return Ok(None);
            };
            session.last_seen_at = now;
            store_session(txn, &session)?;
            Ok(Some(session))
        })
    }

    fn extend_session(
        &self,
        signal: &AbortSignal,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, MaturityError> {
        self.write(signal, |txn| match load_session(txn, token)? {
            Some(mut session) if !session.is_expired_at(now) => {
                session.expires_at = expires_at;
                session.last_seen_at = now;
                store_session(txn, &session)?;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    fn delete_session(&self, signal: &AbortSignal, token: &str) -> Result<bool, MaturityError> {
        self.write(signal, |txn| {
            let mut table = txn
                .open_table(SESSIONS)
                .map_err(MaturityError::persistence)?;
            let removed = table.remove(token).map_err(MaturityError::persistence)?;
            Ok(removed.is_some())
        })
    }

    fn delete_user_sessions(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<usize, MaturityError> {
        self.write(signal, |txn| {
            delete_sessions_where(txn, |s| s.user_id == user)
        })
    }

    fn delete_expired_sessions(
        &self,
        signal: &AbortSignal,
        now: DateTime<Utc>,
    ) -> Result<usize, MaturityError> {
        self.write(signal, |txn| {
            delete_sessions_where(txn, |s| s.is_expired_at(now))
        })
    }

    fn list_user_sessions(
        &self,
        signal: &AbortSignal,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, MaturityError> {
        let mut rows = self.all_sessions(signal)?;
        rows.retain(|s| s.user_id == user && !s.is_expired_at(now));
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

// =============================================================================
// DIRECTORY
// =============================================================================

fn exists(
    txn: &WriteTransaction,
    def: TableDefinition<u64, &'static [u8]>,
    id: u64,
) -> Result<bool, MaturityError> {
    let table = txn.open_table(def).map_err(MaturityError::persistence)?;
    Ok(table.get(id).map_err(MaturityError::persistence)?.is_some())
}

fn memberships(
    txn: &ReadTransaction,
    def: TableDefinition<(u64, u64), u64>,
    user: UserId,
) -> Result<Vec<(u64, RoleId)>, MaturityError> {
    let table = txn.open_table(def).map_err(MaturityError::persistence)?;
    let mut rows = Vec::new();
    for entry in table
        .range((user.0, 0u64)..=(user.0, u64::MAX))
        .map_err(MaturityError::persistence)?
    {
        let (key, value) = entry.map_err(MaturityError::persistence)?;
        rows.push((key.value().1, RoleId(value.value())));
    }
    Ok(rows)
}

impl RedbStore {
    fn role_of(
        &self,
        signal: &AbortSignal,
        def: TableDefinition<(u64, u64), u64>,
        user: UserId,
        target: u64,
    ) -> Result<Option<RoleId>, MaturityError> {
        let txn = self.read(signal)?;
        let table = txn.open_table(def).map_err(MaturityError::persistence)?;
        let row = table
            .get((user.0, target))
            .map_err(MaturityError::persistence)?;
        Ok(row.map(|v| RoleId(v.value())))
    }

    /// Upsert a membership row after checking both ends exist.
    fn set_member(
        &self,
        signal: &AbortSignal,
        def: TableDefinition<(u64, u64), u64>,
        targets: TableDefinition<u64, &'static [u8]>,
        user: UserId,
        target: u64,
        role: RoleId,
        missing_target: MaturityError,
    ) -> Result<(), MaturityError> {
        self.write(signal, |txn| {
            if !exists(txn, targets, target)? {
                return Err(missing_target);
            }
            if !exists(txn, ROLES, role.0)? {
                return Err(MaturityError::RoleNotFound(role.to_string()));
            }
            let mut table = txn.open_table(def).map_err(MaturityError::persistence)?;
            table
                .insert((user.0, target), role.0)
                .map_err(MaturityError::persistence)?;
            Ok(())
        })
    }
}

impl DirectoryRepository for RedbStore {
    fn insert_role(&self, signal: &AbortSignal, new: NewRole) -> Result<Role, MaturityError> {
        self.write(signal, |txn| {
            let existing: Vec<Role> = {
                let table = txn.open_table(ROLES).map_err(MaturityError::persistence)?;
                decode_all(&table)?
            };
            if existing.iter().any(|r| r.name == new.name) {
                return Err(MaturityError::AlreadyExists {
                    kind: "role",
                    name: new.name,
                });
            }
            let role = Role {
                id: RoleId(next_id(txn, NEXT_ROLE)?),
                name: new.name,
                description: new.description,
                permissions: new.permissions,
            };
            let mut table = txn.open_table(ROLES).map_err(MaturityError::persistence)?;
            table
                .insert(role.id.0, encode(&role)?.as_slice())
                .map_err(MaturityError::persistence)?;
            Ok(role)
        })
    }

    fn get_role(&self, signal: &AbortSignal, id: RoleId) -> Result<Option<Role>, MaturityError> {
        self.get_row(signal, ROLES, id.0)
    }

    fn find_role(&self, signal: &AbortSignal, name: &str) -> Result<Option<Role>, MaturityError> {
        Ok(self
            .list_roles(signal)?
            .into_iter()
            .find(|r| r.name == name))
    }

    fn list_roles(&self, signal: &AbortSignal) -> Result<Vec<Role>, MaturityError> {
        self.all_rows(signal, ROLES)
    }

    fn insert_team(&self, signal: &AbortSignal, new: NewTeam) -> Result<Team, MaturityError> {
        self.write(signal, |txn| {
            let existing: Vec<Team> = {
                let table = txn.open_table(TEAMS).map_err(MaturityError::persistence)?;
                decode_all(&table)?
            };
            if existing.iter().any(|t| t.name == new.name) {
                return Err(MaturityError::AlreadyExists {
                    kind: "team",
                    name: new.name,
                });
            }
            if let Some(group) = new.group_id {
                if !exists(txn, GROUPS, group.0)? {
                    return Err(MaturityError::GroupNotFound(group));
                }
            }
            let team = Team {
                id: TeamId(next_id(txn, NEXT_TEAM)?),
                name: new.name,
                description: new.description,
                group_id: new.group_id,
                created_at: new.created_at,
            };
            let mut table = txn.open_table(TEAMS).map_err(MaturityError::persistence)?;
            table
                .insert(team.id.0, encode(&team)?.as_slice())
                .map_err(MaturityError::persistence)?;
            Ok(team)
        })
    }

    fn get_team(&self, signal: &AbortSignal, id: TeamId) -> Result<Option<Team>, MaturityError> {
        self.get_row(signal, TEAMS, id.0)
    }

    fn find_team(&self, signal: &AbortSignal, name: &str) -> Result<Option<Team>, MaturityError> {
        Ok(self
            .list_teams(signal, Page::all())?
            .into_iter()
            .find(|t| t.name == name))
    }

    fn list_teams(&self, signal: &AbortSignal, page: Page) -> Result<Vec<Team>, MaturityError> {
        Ok(page.apply(self.all_rows(signal, TEAMS)?))
    }

    fn insert_group(&self, signal: &AbortSignal, new: NewGroup) -> Result<Group, MaturityError> {
        self.write(signal, |txn| {
            let existing: Vec<Group> = {
                let table = txn.open_table(GROUPS).map_err(MaturityError::persistence)?;
                decode_all(&table)?
            };
            if existing.iter().any(|g| g.name == new.name) {
                return Err(MaturityError::AlreadyExists {
                    kind: "group",
                    name: new.name,
                });
            }
            let group = Group {
                id: GroupId(next_id(txn, NEXT_GROUP)?),
                name: new.name,
                description: new.description,
                created_at: new.created_at,
            };
            let mut table = txn.open_table(GROUPS).map_err(MaturityError::persistence)?;
            table
                .insert(group.id.0, encode(&group)?.as_slice())
                .map_err(MaturityError::persistence)?;
            Ok(group)
        })
    }

    fn get_group(
        &self,
        signal: &AbortSignal,
        id: GroupId,
    ) -> Result<Option<Group>, MaturityError> {
        self.get_row(signal, GROUPS, id.0)
    }

    fn list_groups(&self, signal: &AbortSignal) -> Result<Vec<Group>, MaturityError> {
        self.all_rows(signal, GROUPS)
    }

    fn set_team_member(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
        role: RoleId,
    ) -> Result<(), MaturityError> {
        self.set_member(
            signal,
            TEAM_MEMBERS,
            TEAMS,
            user,
            team.0,
            role,
            MaturityError::TeamNotFound(team),
        )
    }

    fn set_group_member(
        &self,
        signal: &AbortSignal,
        user: UserId,
        group: GroupId,
        role: RoleId,
    ) -> Result<(), MaturityError> {
        self.set_member(
            signal,
            GROUP_MEMBERS,
            GROUPS,
            user,
            group.0,
            role,
            MaturityError::GroupNotFound(group),
        )
    }

    fn team_memberships(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<Vec<(TeamId, RoleId)>, MaturityError> {
        let txn = self.read(signal)?;
        Ok(memberships(&txn, TEAM_MEMBERS, user)?
            .into_iter()
            .map(|(team, role)| (TeamId(team), role))
            .collect())
    }

    fn group_memberships(
        &self,
        signal: &AbortSignal,
        user: UserId,
    ) -> Result<Vec<(GroupId, RoleId)>, MaturityError> {
        let txn = self.read(signal)?;
        Ok(memberships(&txn, GROUP_MEMBERS, user)?
            .into_iter()
            .map(|(group, role)| (GroupId(group), role))
            .collect())
    }

    fn team_role_of(
        &self,
        signal: &AbortSignal,
        user: UserId,
        team: TeamId,
    ) -> Result<Option<RoleId>, MaturityError> {
        self.role_of(signal, TEAM_MEMBERS, user, team.0)
    }

    fn group_role_of(
        &self,
        signal: &AbortSignal,
        user: UserId,
        group: GroupId,
    ) -> Result<Option<RoleId>, MaturityError> {
        self.role_of(signal, GROUP_MEMBERS, user, group.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
