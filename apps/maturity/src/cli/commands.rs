//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Each command prints its outcome (human text, or JSON in `--json-mode`)
//! and also returns it, so the commands can be driven directly in tests.

use crate::config::AppConfig;
use maturity_core::{
    AbortSignal, AccessResolver, Action, AdviceCatalog, Assessment, AssessmentId,
    AssessmentLifecycle, AssessmentRepository, Catalog, FileCatalogSource, FormSelections, Group,
    GroupId, HistoryEntry, MaturityError, Page, Questionnaire, RedbStore, Resource, Results,
    Session, Team, TeamId, UserId,
};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

// =============================================================================
// CONTEXT
// =============================================================================

/// Everything a command needs: the open database, the catalog source and
/// the resolved limits.
pub struct AppContext {
    store: RedbStore,
    source: FileCatalogSource,
    ttl: chrono::Duration,
    timeout: std::time::Duration,
    json_mode: bool,
}

impl AppContext {
    /// Open (or create) the configured database.
    pub fn open(config: &AppConfig, json_mode: bool) -> Result<Self, MaturityError> {
        let store = RedbStore::open(&config.database)?;
        tracing::debug!(
            event = "database_opened",
            database = %config.database.display(),
            "database opened"
        );
        Ok(Self {
            store,
            source: FileCatalogSource::new(&config.questions, &config.advice),
            ttl: config.session_ttl(),
            timeout: config.storage_timeout(),
            json_mode,
        })
    }

    /// A fresh per-command deadline.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal::with_timeout(self.timeout)
    }

    pub fn store(&self) -> &RedbStore {
        &self.store
    }

    fn access(&self) -> AccessResolver<'_, RedbStore> {
        AccessResolver::new(&self.store).with_ttl(self.ttl)
    }

    fn lifecycle(&self) -> AssessmentLifecycle<'_, FileCatalogSource, RedbStore> {
        AssessmentLifecycle::new(&self.source, &self.store)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// Parse repeated `--select` values into form fields.
///
/// `KEY=VALUE` posts VALUE under KEY; a bare `KEY` posts `on`, which is
/// how a ticked checkbox arrives.
pub fn parse_form(fields: &[String]) -> FormSelections {
    let mut form = FormSelections::new();
    for field in fields {
        let (key, value) = field.split_once('=').unwrap_or((field.as_str(), "on"));
        form.entry(key.trim().to_string())
            .or_default()
            .push(value.trim().to_string());
    }
    form
}

/// Validate an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, MaturityError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let canonical_parent = parent.canonicalize().map_err(|e| {
        MaturityError::Config(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;
    if !canonical_parent.is_dir() {
        return Err(MaturityError::Config(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }
    let filename = path
        .file_name()
        .ok_or_else(|| MaturityError::Config("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

// =============================================================================
// AUTHORIZATION
// =============================================================================

/// Validate the token and require a permission on `team`.
fn authorize_team(
    ctx: &AppContext,
    signal: &AbortSignal,
    token: &str,
    team: TeamId,
    resource: Resource,
    action: Action,
) -> Result<UserId, MaturityError> {
    let access = ctx.access();
    let session = access.validate_session(signal, token)?;
    access.require_team_permission(signal, session.user_id, team, resource, action)?;
    Ok(session.user_id)
}

/// Validate the token and require a permission on the assessment's team.
fn authorize_assessment(
    ctx: &AppContext,
    signal: &AbortSignal,
    token: &str,
    id: AssessmentId,
    resource: Resource,
    action: Action,
) -> Result<Assessment, MaturityError> {
    let access = ctx.access();
    let session = access.validate_session(signal, token)?;
    let assessment = ctx
        .store
        .get_assessment(signal, id)?
        .ok_or(MaturityError::AssessmentNotFound(id))?;
    access.require_team_permission(signal, session.user_id, assessment.team_id, resource, action)?;
    Ok(assessment)
}

// =============================================================================
// INIT / CATALOG
// =============================================================================

/// Create the database and seed the built-in roles. Returns how many roles
/// were created.
pub fn cmd_init(ctx: &AppContext) -> Result<usize, MaturityError> {
    let created = ctx.access().seed_builtin_roles(&ctx.signal())?;

    if ctx.json_mode {
        print_json(&serde_json::json!({ "roles_created": created }));
    } else if created == 0 {
        println!("Database already initialized");
    } else {
        println!("Database initialized ({} built-in roles)", created);
    }
    Ok(created)
}

/// Load the catalog (and optionally the advice) and print a summary.
pub fn cmd_catalog(ctx: &AppContext, with_advice: bool) -> Result<(), MaturityError> {
    let catalog = Catalog::load(&ctx.source)?;
    let advice = if with_advice {
        Some(AdviceCatalog::load(&ctx.source)?)
    } else {
        None
    };

    if ctx.json_mode {
        let sections: Vec<_> = catalog
            .sections()
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "slug": s.slug(),
                    "radar_position": s.radar_position,
                    "questions": s.scored_questions().count(),
                    "has_subcategories": s.has_subcategories,
                })
            })
            .collect();
        print_json(&serde_json::json!({ "sections": sections, "advice": advice }));
        return Ok(());
    }

    println!("Question Catalog");
    println!("================");
    for section in catalog.sections() {
        println!(
            "{:>2}. {} [{}] - {} questions{}",
            section.radar_position,
            section.name,
            section.slug(),
            section.scored_questions().count(),
            if section.has_subcategories {
                ", subcategories"
            } else {
                ""
            }
        );
    }
    if let Some(advice) = advice {
        println!();
        println!("Advice ({} sections)", advice.len());
        for entry in advice.iter() {
            println!("  {}: {} link(s)", entry.section_name, entry.links.len());
        }
    }
    Ok(())
}

// =============================================================================
// DIRECTORY COMMANDS
// =============================================================================

pub fn cmd_team_create(
    ctx: &AppContext,
    name: &str,
    description: &str,
    group: Option<GroupId>,
) -> Result<Team, MaturityError> {
    let team = ctx
        .access()
        .create_team(&ctx.signal(), name, description, group)?;
    if ctx.json_mode {
        print_json(&team);
    } else {
        println!("Created team {} ({})", team.id, team.name);
    }
    Ok(team)
}

pub fn cmd_group_create(
    ctx: &AppContext,
    name: &str,
    description: &str,
) -> Result<Group, MaturityError> {
    let group = ctx.access().create_group(&ctx.signal(), name, description)?;
    if ctx.json_mode {
        print_json(&group);
    } else {
        println!("Created group {} ({})", group.id, group.name);
    }
    Ok(group)
}

/// List teams, optionally only those in `group`.
pub fn cmd_team_list(
    ctx: &AppContext,
    group: Option<GroupId>,
) -> Result<Vec<Team>, MaturityError> {
    let signal = ctx.signal();
    let access = ctx.access();
    if let Some(group) = group {
        access.group(&signal, group)?;
    }
    let teams: Vec<Team> = access
        .list_teams(&signal, Page::all())?
        .into_iter()
        .filter(|t| group.is_none() || t.group_id == group)
        .collect();

    if ctx.json_mode {
        print_json(&teams);
    } else if teams.is_empty() {
        println!("No teams");
    } else {
        for team in &teams {
            let group = team
                .group_id
                .map(|g| g.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:>6}  {:<24}  group {}", team.id, team.name, group);
        }
    }
    Ok(teams)
}

pub fn cmd_team_show(ctx: &AppContext, name: &str) -> Result<Team, MaturityError> {
    let team = ctx.access().team_named(&ctx.signal(), name)?;
    if ctx.json_mode {
        print_json(&team);
    } else {
        println!("Team {} ({})", team.id, team.name);
        if !team.description.is_empty() {
            println!("  {}", team.description);
        }
        if let Some(group) = team.group_id {
            println!("  group {}", group);
        }
    }
    Ok(team)
}

pub fn cmd_group_list(ctx: &AppContext) -> Result<Vec<Group>, MaturityError> {
    let groups = ctx.access().list_groups(&ctx.signal())?;
    if ctx.json_mode {
        print_json(&groups);
    } else if groups.is_empty() {
        println!("No groups");
    } else {
        for group in &groups {
            println!("{:>6}  {}", group.id, group.name);
        }
    }
    Ok(groups)
}

pub fn cmd_group_show(ctx: &AppContext, id: GroupId) -> Result<Group, MaturityError> {
    let group = ctx.access().group(&ctx.signal(), id)?;
    if ctx.json_mode {
        print_json(&group);
    } else {
        println!("Group {} ({})", group.id, group.name);
        if !group.description.is_empty() {
            println!("  {}", group.description);
        }
    }
    Ok(group)
}

pub fn cmd_member_team(
    ctx: &AppContext,
    user: UserId,
    team: TeamId,
    role: &str,
) -> Result<(), MaturityError> {
    ctx.access().add_team_member(&ctx.signal(), user, team, role)?;
    tracing::info!(event = "team_member_set", user = %user, team = %team, role, "team role set");
    if !ctx.json_mode {
        println!("User {} is now {} of team {}", user, role, team);
    }
    Ok(())
}

pub fn cmd_member_group(
    ctx: &AppContext,
    user: UserId,
    group: GroupId,
    role: &str,
) -> Result<(), MaturityError> {
    ctx.access()
        .add_group_member(&ctx.signal(), user, group, role)?;
    tracing::info!(event = "group_member_set", user = %user, group = %group, role, "group role set");
    if !ctx.json_mode {
        println!("User {} is now {} of group {}", user, role, group);
    }
    Ok(())
}

// =============================================================================
// SESSION COMMANDS
// =============================================================================

pub fn cmd_session_issue(ctx: &AppContext, user: UserId) -> Result<Session, MaturityError> {
    let session = ctx.access().issue_session(&ctx.signal(), user)?;
    if ctx.json_mode {
        print_json(&session);
    } else {
        println!("{}", session.token);
        println!("expires {}", session.expires_at.to_rfc3339());
    }
    Ok(session)
}

pub fn cmd_session_logout(ctx: &AppContext, token: &str) -> Result<(), MaturityError> {
    if !ctx.access().logout(&ctx.signal(), token)? {
        return Err(MaturityError::SessionNotFound);
    }
    if !ctx.json_mode {
        println!("Session removed");
    }
    Ok(())
}

pub fn cmd_session_revoke_all(ctx: &AppContext, user: UserId) -> Result<usize, MaturityError> {
    let removed = ctx.access().revoke_user_sessions(&ctx.signal(), user)?;
    if ctx.json_mode {
        print_json(&serde_json::json!({ "user": user, "removed": removed }));
    } else {
        println!("Removed {} session(s) of user {}", removed, user);
    }
    Ok(removed)
}

pub fn cmd_session_extend(ctx: &AppContext, token: &str) -> Result<Session, MaturityError> {
    let session = ctx.access().extend_session(&ctx.signal(), token)?;
    if ctx.json_mode {
        print_json(&session);
    } else {
        println!("Session extended until {}", session.expires_at.to_rfc3339());
    }
    Ok(session)
}

pub fn cmd_session_sweep(ctx: &AppContext) -> Result<usize, MaturityError> {
    let removed = ctx.access().sweep_expired_sessions(&ctx.signal())?;
    if ctx.json_mode {
        print_json(&serde_json::json!({ "removed": removed }));
    } else {
        println!("Swept {} expired session(s)", removed);
    }
    Ok(removed)
}

/// Sweep on a fixed interval until Ctrl+C. Transient storage failures are
/// logged and retried on the next tick.
pub async fn cmd_session_sweep_every(ctx: &AppContext, secs: u64) -> Result<(), MaturityError> {
    if secs == 0 {
        return Err(MaturityError::Config("--every must be positive".to_string()));
    }
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(secs));
    tracing::info!(event = "sweep_started", every_secs = secs, "session sweeper running");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match cmd_session_sweep(ctx) {
                    Ok(_) => {}
                    Err(e) if e.kind().is_retryable() => {
                        tracing::warn!(event = "sweep_failed", error = %e, "sweep failed, retrying");
                    }
                    Err(e) => return Err(e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(event = "sweep_stopped", "session sweeper stopped");
                return Ok(());
            }
        }
    }
}

// =============================================================================
// ASSESSMENT COMMANDS
// =============================================================================

pub fn cmd_assessment_start(
    ctx: &AppContext,
    token: &str,
    team: TeamId,
) -> Result<Assessment, MaturityError> {
    let signal = ctx.signal();
    let user = authorize_team(ctx, &signal, token, team, Resource::Assessment, Action::Create)?;
    let (assessment, catalog) = ctx.lifecycle().start(&signal, team, user, None)?;

    if ctx.json_mode {
        print_json(&assessment);
    } else {
        println!("Started assessment {} for team {}", assessment.id, team);
        println!("Sections:");
        for section in catalog.sections() {
            println!("  {} ({})", section.name, section.slug());
        }
    }
    Ok(assessment)
}

pub fn cmd_assessment_show(
    ctx: &AppContext,
    token: &str,
    id: AssessmentId,
) -> Result<Questionnaire, MaturityError> {
    let signal = ctx.signal();
    authorize_assessment(ctx, &signal, token, id, Resource::Assessment, Action::Read)?;
    let questionnaire = ctx.lifecycle().continue_assessment(&signal, id)?;

    if ctx.json_mode {
        print_json(&questionnaire);
        return Ok(questionnaire);
    }

    println!(
        "Assessment {} (team {}, {})",
        id, questionnaire.assessment.team_id, questionnaire.assessment.status
    );
    for section in questionnaire.catalog.sections() {
        println!();
        println!("## {} [{}]", section.name, section.slug());
        for question in &section.questions {
            let Some(qid) = &question.id else {
                println!("-- {} --", question.text);
                continue;
            };
            println!("{} {}", qid, question.text);
            for answer in &question.answers {
                let mark = if questionnaire.selections.is_checked(qid, &answer.id) {
                    "x"
                } else {
                    " "
                };
                println!("   [{}] {} {} ({:.1})", mark, answer.id, answer.text, answer.score);
            }
        }
    }
    Ok(questionnaire)
}

pub fn cmd_assessment_save(
    ctx: &AppContext,
    token: &str,
    id: AssessmentId,
    section: &str,
    form: &FormSelections,
) -> Result<usize, MaturityError> {
    let signal = ctx.signal();
    authorize_assessment(ctx, &signal, token, id, Resource::Assessment, Action::Update)?;
    let written = ctx.lifecycle().save_section(&signal, id, section, form)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({ "assessment": id, "section": section, "saved": written }));
    } else {
        println!("Saved {} question(s) in {}", written, section);
    }
    Ok(written)
}

fn print_results(results: &Results, advice: &AdviceCatalog) {
    println!(
        "Assessment {} (team {}) completed {}",
        results.assessment.id,
        results.assessment.team_id,
        results
            .assessment
            .completed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    );
    println!();
    for line in &results.section_scores {
        println!(
            "{:<40} {:>6.1} / {:<6.1} {:>5.1}%",
            line.name, line.score, line.max_score, line.percentage
        );
        if let Some(breakdown) = results
            .subcategory_scores
            .iter()
            .find(|b| b.section == line.name)
        {
            for sub in &breakdown.scores {
                println!(
                    "  {:<38} {:>6.1} / {:<6.1} {:>5.1}%",
                    sub.name, sub.score, sub.max_score, sub.percentage
                );
            }
        }
        if let Some(entry) = advice.get(&line.name) {
            println!("  advice: {}", entry.advice);
        }
    }
    println!();
    println!(
        "Overall: {:.1}%",
        maturity_core::scoring::overall_percentage(&results.section_scores)
    );
}

pub fn cmd_assessment_complete(
    ctx: &AppContext,
    token: &str,
    id: AssessmentId,
) -> Result<Results, MaturityError> {
    let signal = ctx.signal();
    authorize_assessment(ctx, &signal, token, id, Resource::Assessment, Action::Update)?;
    let results = ctx.lifecycle().complete(&signal, id)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "assessment": results.assessment,
            "section_scores": results.section_scores,
            "subcategory_scores": results.subcategory_scores,
        }));
    } else {
        print_results(&results, &AdviceCatalog::default());
    }
    Ok(results)
}

pub fn cmd_assessment_results(
    ctx: &AppContext,
    token: &str,
    id: AssessmentId,
) -> Result<Results, MaturityError> {
    let signal = ctx.signal();
    authorize_assessment(ctx, &signal, token, id, Resource::Report, Action::Read)?;
    let lifecycle = ctx.lifecycle();
    let results = lifecycle.results(&signal, id)?;
    let advice = lifecycle.advice()?;

    if ctx.json_mode {
        let advice: Vec<_> = results
            .section_scores
            .iter()
            .filter_map(|l| advice.get(&l.name))
            .collect();
        print_json(&serde_json::json!({
            "assessment": results.assessment,
            "section_scores": results.section_scores,
            "subcategory_scores": results.subcategory_scores,
            "advice": advice,
        }));
    } else {
        print_results(&results, &advice);
    }
    Ok(results)
}

/// Export as CSV to `output`, or stdout. Returns the number of rows.
pub fn cmd_assessment_export(
    ctx: &AppContext,
    token: &str,
    id: AssessmentId,
    output: Option<&Path>,
) -> Result<usize, MaturityError> {
    let signal = ctx.signal();
    authorize_assessment(ctx, &signal, token, id, Resource::Report, Action::Export)?;
    let path = output.map(validate_output_path).transpose()?;

    // A failed export must leave an existing file untouched.
    let mut csv = Vec::new();
    let rows = ctx.lifecycle().export_csv(&signal, id, &mut csv)?;

    let Some(path) = path else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&csv).map_err(MaturityError::persistence)?;
        stdout.flush().map_err(MaturityError::persistence)?;
        return Ok(rows);
    };
    std::fs::write(&path, &csv).map_err(MaturityError::persistence)?;

    tracing::info!(
        event = "assessment_exported",
        assessment = %id,
        rows,
        path = %path.display(),
        "assessment exported"
    );
    if !ctx.json_mode {
        println!("Exported {} row(s) to {}", rows, path.display());
    }
    Ok(rows)
}

pub fn cmd_assessment_history(
    ctx: &AppContext,
    token: &str,
    team: TeamId,
) -> Result<Vec<HistoryEntry>, MaturityError> {
    let signal = ctx.signal();
    authorize_team(ctx, &signal, token, team, Resource::Assessment, Action::Read)?;
    let history = ctx.lifecycle().team_history(&signal, team)?;

    if ctx.json_mode {
        print_json(&history);
    } else if history.is_empty() {
        println!("Team {} has no completed assessments", team);
    } else {
        for entry in &history {
            println!(
                "{:>6}  {}  {:>5.1}%",
                entry.assessment.id,
                entry
                    .assessment
                    .completed_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
                entry.overall_score
            );
        }
    }
    Ok(history)
}

// =============================================================================
// TESTS
// =============================================================================
