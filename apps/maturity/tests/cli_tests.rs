//! Integration tests for the Maturity CLI commands.
//!
//! Drives the command functions against a temporary redb database and the
//! sample catalog shipped in `configs/`.

use maturity::cli::{
    AppContext, cmd_assessment_complete, cmd_assessment_export, cmd_assessment_history,
    cmd_assessment_results, cmd_assessment_save, cmd_assessment_show, cmd_assessment_start,
    cmd_catalog, cmd_group_create, cmd_group_list, cmd_group_show, cmd_init, cmd_member_group,
    cmd_member_team, cmd_session_extend, cmd_session_issue, cmd_session_logout,
    cmd_session_revoke_all, cmd_session_sweep, cmd_team_list, cmd_team_show, parse_form,
};
use maturity::config::AppConfig;
use maturity_core::{
    AssessmentStatus, ErrorKind, GroupId, MaturityError, SessionRepository, TeamId, UserId,
};
use std::path::PathBuf;
use tempfile::{TempDir, tempdir};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn configs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../configs")
}

/// Open a fresh database in `dir` against the sample catalog.
fn context(dir: &TempDir) -> AppContext {
    let config = AppConfig {
        database: dir.path().join("maturity.redb"),
        questions: configs_dir().join("questions.json"),
        advice: configs_dir().join("advice.json"),
        ..AppConfig::default()
    };
    AppContext::open(&config, true).expect("open")
}

/// Seed roles, create one team and make `user` its `role`. Returns the
/// team and a session token for the user.
fn team_member(ctx: &AppContext, user: UserId, role: &str) -> (TeamId, String) {
    cmd_init(ctx).expect("init");
    let team = maturity::cli::cmd_team_create(ctx, "Platform", "", None).expect("team");
    cmd_member_team(ctx, user, team.id, role).expect("member");
    let session = cmd_session_issue(ctx, user).expect("session");
    (team.id, session.token)
}

fn select(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| (*f).to_string()).collect()
}

// =============================================================================
// INIT / CATALOG
// =============================================================================

#[test]
fn init_seeds_builtin_roles_once() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);

    assert_eq!(cmd_init(&ctx).expect("first"), 3);
    assert_eq!(cmd_init(&ctx).expect("second"), 0);
}

#[test]
fn sample_catalog_and_advice_load() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);

    cmd_catalog(&ctx, true).expect("catalog");
}

// =============================================================================
// ASSESSMENT FLOW
// =============================================================================

#[test]
fn editor_runs_an_assessment_end_to_end() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let (team, token) = team_member(&ctx, UserId(1), "editor");

    let assessment = cmd_assessment_start(&ctx, &token, team).expect("start");
    assert_eq!(assessment.status, AssessmentStatus::InProgress);

    let culture = parse_form(&select(&["S5-Q1=S5-Q1-A1", "S5-Q2=S5-Q2-A1", "S5-Q3=S5-Q3-A1"]));
    assert_eq!(
        cmd_assessment_save(&ctx, &token, assessment.id, "culture", &culture).expect("save"),
        3
    );
    let source_control = parse_form(&select(&["S1-Q4-A1", "S1-Q4-A4"]));
    assert_eq!(
        cmd_assessment_save(&ctx, &token, assessment.id, "source-control", &source_control)
            .expect("save"),
        1
    );

    let shown = cmd_assessment_show(&ctx, &token, assessment.id).expect("show");
    assert!(
        shown
            .selections
            .is_checked(&"S1-Q4".into(), &"S1-Q4-A4".into())
    );

    let results = cmd_assessment_complete(&ctx, &token, assessment.id).expect("complete");
    let culture_line = results
        .section_scores
        .iter()
        .find(|l| l.name == "Culture")
        .expect("culture line");
    assert_eq!(culture_line.percentage, 100.0);
    let source_line = results
        .section_scores
        .iter()
        .find(|l| l.name == "Source Control")
        .expect("source line");
    assert_eq!((source_line.score, source_line.max_score), (2.0, 8.0));

    let again = cmd_assessment_results(&ctx, &token, assessment.id).expect("results");
    assert_eq!(again.section_scores, results.section_scores);

    let out = dir.path().join("results.csv");
    let rows = cmd_assessment_export(&ctx, &token, assessment.id, Some(&out)).expect("export");
    assert_eq!(rows, 15);
    let csv = std::fs::read_to_string(&out).expect("read export");
    assert!(csv.starts_with("Section,Sub Category,Question,"));
    assert!(csv.contains("Culture,,Are incident reviews blameless?,\"Choose one of:\nYes (1.0)\nNo (0.0)\",1.0,Yes,1.0\n"));
    assert_eq!(csv.matches("Source Control,").count(), 3);

    let history = cmd_assessment_history(&ctx, &token, team).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].assessment.id, assessment.id);
}

#[test]
fn completed_assessment_is_read_only() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let (team, token) = team_member(&ctx, UserId(1), "editor");

    let assessment = cmd_assessment_start(&ctx, &token, team).expect("start");
    cmd_assessment_complete(&ctx, &token, assessment.id).expect("complete");

    let err = cmd_assessment_complete(&ctx, &token, assessment.id).expect_err("twice");
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let form = parse_form(&select(&["S5-Q1=S5-Q1-A1"]));
    let err = cmd_assessment_save(&ctx, &token, assessment.id, "culture", &form)
        .expect_err("save after completion");
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn export_requires_completion() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let (team, token) = team_member(&ctx, UserId(1), "editor");

    let assessment = cmd_assessment_start(&ctx, &token, team).expect("start");
    let out = dir.path().join("open.csv");
    let err = cmd_assessment_export(&ctx, &token, assessment.id, Some(&out)).expect_err("open");
    assert!(matches!(err, MaturityError::AssessmentNotCompleted(_)));
    assert!(!out.exists());
}

#[test]
fn failed_export_keeps_previous_file() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let (team, token) = team_member(&ctx, UserId(1), "editor");

    let done = cmd_assessment_start(&ctx, &token, team).expect("start");
    cmd_assessment_complete(&ctx, &token, done.id).expect("complete");
    let out = dir.path().join("results.csv");
    cmd_assessment_export(&ctx, &token, done.id, Some(&out)).expect("export");
    let previous = std::fs::read_to_string(&out).expect("read export");

    let open = cmd_assessment_start(&ctx, &token, team).expect("start");
    let err = cmd_assessment_export(&ctx, &token, open.id, Some(&out)).expect_err("open");
    assert!(matches!(err, MaturityError::AssessmentNotCompleted(_)));
    assert_eq!(std::fs::read_to_string(&out).expect("read again"), previous);
}

#[test]
fn export_rejects_missing_output_directory() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let (team, token) = team_member(&ctx, UserId(1), "editor");

    let assessment = cmd_assessment_start(&ctx, &token, team).expect("start");
    cmd_assessment_complete(&ctx, &token, assessment.id).expect("complete");

    let out = dir.path().join("missing").join("results.csv");
    let err = cmd_assessment_export(&ctx, &token, assessment.id, Some(&out)).expect_err("dir");
    assert!(matches!(err, MaturityError::Config(_)));
}

// =============================================================================
// PERMISSION GATES
// =============================================================================

#[test]
fn viewer_cannot_start_or_export() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let (team, editor_token) = team_member(&ctx, UserId(1), "editor");
    cmd_member_team(&ctx, UserId(2), team, "viewer").expect("viewer");
    let viewer_token = cmd_session_issue(&ctx, UserId(2)).expect("session").token;

    let err = cmd_assessment_start(&ctx, &viewer_token, team).expect_err("viewer start");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let assessment = cmd_assessment_start(&ctx, &editor_token, team).expect("start");
    cmd_assessment_complete(&ctx, &editor_token, assessment.id).expect("complete");

    cmd_assessment_results(&ctx, &viewer_token, assessment.id).expect("viewer reads results");
    let out = dir.path().join("viewer.csv");
    let err = cmd_assessment_export(&ctx, &viewer_token, assessment.id, Some(&out))
        .expect_err("viewer export");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[test]
fn outsider_is_denied_on_foreign_team() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let (team, _) = team_member(&ctx, UserId(1), "editor");
    let other = maturity::cli::cmd_team_create(&ctx, "Payments", "", None).expect("team");
    cmd_member_team(&ctx, UserId(3), other.id, "admin").expect("admin elsewhere");
    let token = cmd_session_issue(&ctx, UserId(3)).expect("session").token;

    let err = cmd_assessment_start(&ctx, &token, team).expect_err("foreign team");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[test]
fn group_role_reaches_member_teams() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    cmd_init(&ctx).expect("init");
    let group = cmd_group_create(&ctx, "Digital", "").expect("group");
    let team =
        maturity::cli::cmd_team_create(&ctx, "Web", "", Some(group.id)).expect("team in group");
    cmd_member_group(&ctx, UserId(4), group.id, "editor").expect("group member");
    let token = cmd_session_issue(&ctx, UserId(4)).expect("session").token;

    cmd_assessment_start(&ctx, &token, team.id).expect("start via group role");
}

#[test]
fn unknown_token_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let (team, _) = team_member(&ctx, UserId(1), "editor");

    let err = cmd_assessment_start(&ctx, "not-a-token", team).expect_err("bogus");
    assert_eq!(err.kind(), ErrorKind::SessionNotFound);
}

// =============================================================================
// DIRECTORY COMMANDS
// =============================================================================

#[test]
fn teams_and_groups_are_listed() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let digital = cmd_group_create(&ctx, "Digital", "Customer facing").expect("group");
    cmd_group_create(&ctx, "Core", "").expect("group");
    let web = maturity::cli::cmd_team_create(&ctx, "Web", "", Some(digital.id)).expect("team");
    maturity::cli::cmd_team_create(&ctx, "Billing", "", None).expect("team");

    assert_eq!(cmd_team_list(&ctx, None).expect("all").len(), 2);
    let in_group = cmd_team_list(&ctx, Some(digital.id)).expect("in group");
    assert_eq!(in_group, vec![web.clone()]);
    let err = cmd_team_list(&ctx, Some(GroupId(42))).expect_err("unknown group");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(cmd_team_show(&ctx, "Web").expect("show"), web);
    let err = cmd_team_show(&ctx, "Mobile").expect_err("unknown team");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(cmd_group_list(&ctx).expect("groups").len(), 2);
    assert_eq!(cmd_group_show(&ctx, digital.id).expect("group"), digital);
}

// =============================================================================
// SESSION COMMANDS
// =============================================================================

#[test]
fn session_commands() {
    let dir = tempdir().expect("tempdir");
    let ctx = context(&dir);
    let (team, token) = team_member(&ctx, UserId(1), "editor");

    let extended = cmd_session_extend(&ctx, &token).expect("extend");
    let stored = ctx
        .store()
        .get_session(&ctx.signal(), &token)
        .expect("get")
        .expect("present");
    assert_eq!(stored.expires_at, extended.expires_at);

    assert_eq!(cmd_session_sweep(&ctx).expect("sweep"), 0);

    cmd_session_logout(&ctx, &token).expect("logout");
    let err = cmd_session_logout(&ctx, &token).expect_err("already gone");
    assert_eq!(err.kind(), ErrorKind::SessionNotFound);
    let err = cmd_assessment_start(&ctx, &token, team).expect_err("logged out");
    assert_eq!(err.kind(), ErrorKind::SessionNotFound);

    cmd_session_issue(&ctx, UserId(1)).expect("issue");
    cmd_session_issue(&ctx, UserId(1)).expect("issue");
    assert_eq!(cmd_session_revoke_all(&ctx, UserId(1)).expect("revoke"), 2);
}

#[test]
fn database_persists_across_contexts() {
    let dir = tempdir().expect("tempdir");
    let (team, token) = {
        let ctx = context(&dir);
        team_member(&ctx, UserId(1), "editor")
    };

    let ctx = context(&dir);
    cmd_assessment_start(&ctx, &token, team).expect("start after reopen");
}
