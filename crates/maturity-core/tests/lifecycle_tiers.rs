//! # Lifecycle Tier Tests (T0-T4)
//!
//! End-to-end scenarios run against every storage backend.
//!
//! ## Tiers
//! - T0: Catalog and Ledger
//! - T1: Completion and Scoring
//! - T2: Results, Export and History
//! - T3: Scoped Permissions
//! - T4: Sessions and Concurrency

use chrono::Duration;
use maturity_core::{
    AbortSignal, AccessResolver, Action, AssessmentFilter, AssessmentId, AssessmentLifecycle,
    AssessmentRepository, AssessmentStatus, DirectoryRepository, ErrorKind, FormSelections,
    GroupId, MaturityError, MemoryStore, Page, QuestionId, RedbStore, Resource, ResponseLedger,
    SessionRepository, StaticCatalogSource, TeamId, UserId,
};
use tempfile::{TempDir, tempdir};

// =============================================================================
// FIXTURES
// =============================================================================

const QUESTIONS: &str = r#"[
    {"SectionName": "Build, Test", "SpiderPos": 1, "Questions": [
        {"Type": "Banner", "QuestionText": "Automation"},
        {"Type": "Option", "QuestionText": "Do you build on every commit?",
         "Answers": [{"Answer": "Always", "Score": 2}, {"Answer": "Never", "Score": 0}]},
        {"Type": "Checkbox", "SubCategory": "Tools", "QuestionText": "Which tools?",
         "Answers": [{"Answer": "CI", "Score": 1}, {"Answer": "CD", "Score": 1}]}
    ]},
    {"SectionName": "Culture", "SpiderPos": 2, "Questions": [
        {"Type": "Option", "QuestionText": "Blameless post-mortems?"}
    ]}
]"#;

const ADVICE: &str = r#"{
    "//": "authoring notes",
    "Culture": {"Advice": "Run retrospectives", "ReadMore": "", "Links": []}
}"#;

trait Store: AssessmentRepository + SessionRepository + DirectoryRepository {}
impl<T: AssessmentRepository + SessionRepository + DirectoryRepository> Store for T {}

/// Run a scenario against the in-memory and the redb backend.
fn for_each_backend(scenario: impl Fn(&dyn Store)) {
    scenario(&MemoryStore::new());

    let dir: TempDir = tempdir().expect("tempdir");
    let store = RedbStore::open(dir.path().join("maturity.redb")).expect("open");
    scenario(&store);
}

fn source() -> StaticCatalogSource {
    StaticCatalogSource::new(QUESTIONS, ADVICE)
}

fn form(fields: &[(&str, &str)]) -> FormSelections {
    fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), vec![(*v).to_string()]))
        .collect()
}

/// Answer everything with the best answers.
fn answer_all<R: AssessmentRepository + ?Sized>(
    lifecycle: &AssessmentLifecycle<'_, StaticCatalogSource, R>,
    id: AssessmentId,
) {
    let signal = AbortSignal::never();
    let build = form(&[
        ("S1-Q2", "S1-Q2-A1"),
        ("S1-Q3-A1", "on"),
        ("S1-Q3-A2", "on"),
    ]);
    assert_eq!(
        lifecycle
            .save_section(&signal, id, "build-test", &build)
            .expect("save build"),
        2
    );
    let culture = form(&[("S2-Q1", "S2-Q1-A1")]);
    assert_eq!(
        lifecycle
            .save_section(&signal, id, "culture", &culture)
            .expect("save culture"),
        1
    );
}

// =============================================================================
// TIER T0: CATALOG AND LEDGER
// =============================================================================

mod t0_catalog_and_ledger {
    use super::*;

    /// T0.1: Start hands back the catalog and an in-progress record.
    #[test]
    fn start_creates_in_progress_assessment() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();

            let (assessment, catalog) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");
            assert_eq!(assessment.status, AssessmentStatus::InProgress);
            assert!(assessment.completed_at.is_none());
            assert!(!assessment.session_id.is_empty());
            assert_eq!(catalog.sections().len(), 2);
        });
    }

    /// T0.2: A supplied correlation token is kept.
    #[test]
    fn start_keeps_correlation_token() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let (assessment, _) = lifecycle
                .start(&AbortSignal::never(), TeamId(1), UserId(10), Some("abc".into()))
                .expect("start");
            assert_eq!(assessment.session_id, "abc");
        });
    }

    /// T0.3: A broken catalog leaves no assessment behind.
    #[test]
    fn broken_catalog_creates_nothing() {
        for_each_backend(|store| {
            let source = StaticCatalogSource::new("{not json", ADVICE);
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();

            let err = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect_err("malformed");
            assert_eq!(err.kind(), ErrorKind::MalformedInput);
            let (rows, total) = store
                .list_team_assessments(&signal, TeamId(1), AssessmentFilter::default(), Page::all())
                .expect("list");
            assert!(rows.is_empty());
            assert_eq!(total, 0);
        });
    }

    /// T0.4: Saving a question twice replaces its answers.
    #[test]
    fn saving_replaces_previous_answers() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");

            lifecycle
                .save_section(&signal, assessment.id, "build-test", &form(&[("S1-Q2", "S1-Q2-A1")]))
                .expect("first");
            lifecycle
                .save_section(&signal, assessment.id, "build-test", &form(&[("S1-Q2", "S1-Q2-A2")]))
                .expect("second");

            let responses = ResponseLedger::new(store)
                .list_by_assessment(&signal, assessment.id)
                .expect("list");
            assert_eq!(responses.len(), 1);
            let chosen: Vec<_> = responses[0].answer_ids.iter().map(|a| a.as_str()).collect();
            assert_eq!(chosen, vec!["S1-Q2-A2"]);
        });
    }

    /// T0.5: A question with nothing selected keeps its stored answer.
    #[test]
    fn empty_submission_leaves_answers_untouched() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");

            lifecycle
                .save_section(&signal, assessment.id, "build-test", &form(&[("S1-Q3-A1", "on")]))
                .expect("save");
            let written = lifecycle
                .save_section(&signal, assessment.id, "build-test", &FormSelections::new())
                .expect("empty save");
            assert_eq!(written, 0);

            let questionnaire = lifecycle
                .continue_assessment(&signal, assessment.id)
                .expect("continue");
            let tools = QuestionId::from("S1-Q3");
            assert!(questionnaire.selections.is_checked(&tools, &"S1-Q3-A1".into()));
            assert!(!questionnaire.selections.is_checked(&tools, &"S1-Q3-A2".into()));
        });
    }

    /// T0.6: An unknown section slug is rejected.
    #[test]
    fn unknown_section_is_not_found() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");

            let err = lifecycle
                .save_section(&signal, assessment.id, "security", &FormSelections::new())
                .expect_err("unknown");
            assert!(matches!(err, MaturityError::SectionNotFound(_)));
        });
    }
}

// =============================================================================
// TIER T1: COMPLETION AND SCORING
// =============================================================================

mod t1_completion {
    use super::*;

    /// T1.1: Best answers everywhere score 100% in every section.
    #[test]
    fn full_marks_score_one_hundred() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");
            answer_all(&lifecycle, assessment.id);

            let results = lifecycle.complete(&signal, assessment.id).expect("complete");
            assert_eq!(results.assessment.status, AssessmentStatus::Completed);
            assert!(results.assessment.completed_at.is_some());

            let lines: Vec<_> = results
                .section_scores
                .iter()
                .map(|l| (l.name.as_str(), l.score, l.max_score, l.percentage))
                .collect();
            assert_eq!(
                lines,
                vec![("Build, Test", 4.0, 4.0, 100.0), ("Culture", 1.0, 1.0, 100.0)]
            );
            assert_eq!(results.subcategory_scores.len(), 1);
            assert_eq!(results.subcategory_scores[0].scores[0].name, "Tools");
        });
    }

    /// T1.2: Completing an unanswered assessment scores zero.
    #[test]
    fn unanswered_assessment_scores_zero() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");

            let results = lifecycle.complete(&signal, assessment.id).expect("complete");
            assert!(results.section_scores.iter().all(|l| l.score == 0.0));
            assert!(results.subcategory_scores.is_empty());
        });
    }

    /// T1.3: Completed is terminal.
    #[test]
    fn completed_is_terminal() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");
            lifecycle.complete(&signal, assessment.id).expect("complete");

            let again = lifecycle.complete(&signal, assessment.id).expect_err("twice");
            assert_eq!(again.kind(), ErrorKind::InvalidState);

            let save = lifecycle
                .save_section(&signal, assessment.id, "culture", &form(&[("S2-Q1", "S2-Q1-A1")]))
                .expect_err("save after completion");
            assert_eq!(save.kind(), ErrorKind::InvalidState);

            let cont = lifecycle
                .continue_assessment(&signal, assessment.id)
                .expect_err("continue after completion");
            assert!(matches!(cont, MaturityError::AssessmentAlreadyCompleted(_)));
        });
    }

    /// T1.4: Unknown assessments are not found.
    #[test]
    fn unknown_assessment_is_not_found() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let err = lifecycle
                .complete(&AbortSignal::never(), AssessmentId(404))
                .expect_err("missing");
            assert_eq!(err.kind(), ErrorKind::NotFound);
        });
    }

    /// T1.5: A fired signal aborts the call and leaves the record untouched.
    #[test]
    fn aborted_signal_stops_completion() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");

            let fired = AbortSignal::never();
            fired.abort();
            let err = lifecycle.complete(&fired, assessment.id).expect_err("aborted");
            assert!(matches!(err, MaturityError::Aborted));

            let stored = store
                .get_assessment(&signal, assessment.id)
                .expect("get")
                .expect("present");
            assert_eq!(stored.status, AssessmentStatus::InProgress);
        });
    }
}

// =============================================================================
// TIER T2: RESULTS, EXPORT AND HISTORY
// =============================================================================

mod t2_results {
    use super::*;

    /// T2.1: Results require a completed assessment.
    #[test]
    fn results_require_completion() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");

            let err = lifecycle.results(&signal, assessment.id).expect_err("open");
            assert!(matches!(err, MaturityError::AssessmentNotCompleted(_)));
        });
    }

    /// T2.2: Persisted results match the completion result.
    #[test]
    fn results_are_persisted() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");
            lifecycle
                .save_section(&signal, assessment.id, "build-test", &form(&[("S1-Q3-A1", "on")]))
                .expect("save");
            let completed = lifecycle.complete(&signal, assessment.id).expect("complete");

            let results = lifecycle.results(&signal, assessment.id).expect("results");
            assert_eq!(results.section_scores, completed.section_scores);
            assert_eq!(results.subcategory_scores, completed.subcategory_scores);
            assert_eq!(results.section_scores[0].percentage, 25.0);
        });
    }

    /// T2.3: The CSV export has a header and one row per scoreable question.
    #[test]
    fn export_writes_every_question() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");
            answer_all(&lifecycle, assessment.id);
            lifecycle.complete(&signal, assessment.id).expect("complete");

            let mut out = Vec::new();
            let rows = lifecycle
                .export_csv(&signal, assessment.id, &mut out)
                .expect("export");
            assert_eq!(rows, 3);

            let text = String::from_utf8(out).expect("utf8");
            assert!(text.starts_with(
                "Section,Sub Category,Question,Possible Answers,Max Score,Answer(s),Score\n"
            ));
            assert!(text.contains("\"Build, Test\",Tools,Which tools?,\"Choose all that apply:\nCI (1.0)\nCD (1.0)\",2.0,\"CI\nCD\",2.0\n"));
            assert!(text.ends_with("Culture,,Blameless post-mortems?,\"Choose one of:\nYes (1.0)\nNo (0.0)\",1.0,Yes,1.0\n"));
        });
    }

    /// T2.4: History lists completed assessments only, newest first.
    #[test]
    fn history_is_newest_first() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let team = TeamId(3);

            let (first, _) = lifecycle.start(&signal, team, UserId(1), None).expect("start");
            lifecycle.complete(&signal, first.id).expect("complete");
            let (second, _) = lifecycle.start(&signal, team, UserId(1), None).expect("start");
            answer_all(&lifecycle, second.id);
            lifecycle.complete(&signal, second.id).expect("complete");
            let (open, _) = lifecycle.start(&signal, team, UserId(1), None).expect("start");

            let history = lifecycle.team_history(&signal, team).expect("history");
            let ids: Vec<_> = history.iter().map(|h| h.assessment.id).collect();
            assert_eq!(ids, vec![second.id, first.id]);
            assert_eq!(history[0].overall_score, 100.0);
            assert_eq!(history[1].overall_score, 0.0);

            let latest = lifecycle.latest_completed(&signal, team).expect("latest");
            assert_eq!(latest.id, second.id);

            let (all, total) = lifecycle
                .list_team_assessments(&signal, team, AssessmentFilter::default(), Page::new(0, 2))
                .expect("list");
            assert_eq!(total, 3);
            assert_eq!(all[0].id, open.id);

            let err = lifecycle
                .latest_completed(&signal, TeamId(99))
                .expect_err("no history");
            assert!(matches!(err, MaturityError::NoCompletedAssessment(_)));
        });
    }

    /// T2.5: Deleting an assessment removes it and its responses.
    #[test]
    fn delete_cascades() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let signal = AbortSignal::never();
            let (assessment, _) = lifecycle
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");
            answer_all(&lifecycle, assessment.id);

            lifecycle
                .delete_assessment(&signal, assessment.id)
                .expect("delete");
            assert!(store
                .get_assessment(&signal, assessment.id)
                .expect("get")
                .is_none());
            assert!(store
                .list_responses(&signal, assessment.id)
                .expect("responses")
                .is_empty());
        });
    }

    /// T2.6: Advice is served with comment entries dropped.
    #[test]
    fn advice_is_loaded() {
        for_each_backend(|store| {
            let source = source();
            let lifecycle = AssessmentLifecycle::new(&source, store);
            let advice = lifecycle.advice().expect("advice");
            assert_eq!(advice.len(), 1);
            assert!(advice.get("Culture").is_some());
        });
    }
}

// =============================================================================
// TIER T3: SCOPED PERMISSIONS
// =============================================================================

mod t3_permissions {
    use super::*;

    /// T3.1: Team roles apply to their team; group roles reach member teams.
    #[test]
    fn team_and_group_scopes() {
        for_each_backend(|store| {
            let access = AccessResolver::new(store);
            let signal = AbortSignal::never();
            assert_eq!(access.seed_builtin_roles(&signal).expect("seed"), 3);

            let platform = access
                .create_group(&signal, "Platform", "Platform teams")
                .expect("group");
            let infra = access
                .create_team(&signal, "Infra", "", Some(platform.id))
                .expect("team");
            let web = access.create_team(&signal, "Web", "", None).expect("team");

            let alice = UserId(1);
            let bob = UserId(2);
            access
                .add_team_member(&signal, alice, web.id, "editor")
                .expect("alice");
            access
                .add_group_member(&signal, bob, platform.id, "viewer")
                .expect("bob");

            assert!(access
                .has_team_permission(&signal, alice, web.id, Resource::Assessment, Action::Create)
                .expect("check"));
            assert!(!access
                .has_team_permission(&signal, alice, infra.id, Resource::Assessment, Action::Read)
                .expect("check"));

            assert!(access
                .has_team_permission(&signal, bob, infra.id, Resource::Assessment, Action::Read)
                .expect("check"));
            let denied = access
                .require_team_permission(&signal, bob, infra.id, Resource::Assessment, Action::Create)
                .expect_err("viewer cannot create");
            assert_eq!(denied.kind(), ErrorKind::PermissionDenied);

            assert!(!access.is_admin(&signal, alice).expect("admin"));
            assert_eq!(
                access
                    .team_role(&signal, alice, web.id)
                    .expect("role")
                    .map(|r| r.name),
                Some("editor".to_string())
            );
        });
    }

    /// T3.2: Unknown roles and teams are rejected.
    #[test]
    fn unknown_role_or_team() {
        for_each_backend(|store| {
            let access = AccessResolver::new(store);
            let signal = AbortSignal::never();
            access.seed_builtin_roles(&signal).expect("seed");
            let team = access.create_team(&signal, "Web", "", None).expect("team");

            let err = access
                .add_team_member(&signal, UserId(1), team.id, "owner")
                .expect_err("role");
            assert!(matches!(err, MaturityError::RoleNotFound(_)));

            let err = access
                .add_team_member(&signal, UserId(1), TeamId(999), "viewer")
                .expect_err("team");
            assert!(matches!(err, MaturityError::TeamNotFound(_)));

            let dup = access.create_team(&signal, "Web", "", None).expect_err("dup");
            assert_eq!(dup.kind(), ErrorKind::AlreadyExists);
        });
    }

    /// T3.3: Teams and groups can be listed and looked up.
    #[test]
    fn directory_queries() {
        for_each_backend(|store| {
            let access = AccessResolver::new(store);
            let signal = AbortSignal::never();
            let digital = access.create_group(&signal, "Digital", "").expect("group");
            access.create_group(&signal, "Core", "").expect("group");
            for name in ["Web", "Mobile", "Payments"] {
                access
                    .create_team(&signal, name, "", Some(digital.id))
                    .expect("team");
            }

            let names: Vec<String> = access
                .list_teams(&signal, Page::all())
                .expect("teams")
                .into_iter()
                .map(|t| t.name)
                .collect();
            assert_eq!(names, ["Web", "Mobile", "Payments"]);
            let second = access.list_teams(&signal, Page::new(1, 1)).expect("page");
            assert_eq!(second.len(), 1);
            assert_eq!(second[0].name, "Mobile");

            let mobile = access.team_named(&signal, "Mobile").expect("by name");
            assert_eq!(mobile.group_id, Some(digital.id));
            let err = access.team_named(&signal, "Ops").expect_err("unknown");
            assert_eq!(err.kind(), ErrorKind::NotFound);

            assert_eq!(access.group(&signal, digital.id).expect("group").name, "Digital");
            assert_eq!(access.list_groups(&signal).expect("groups").len(), 2);
            let err = access
                .group(&signal, GroupId(99))
                .expect_err("unknown group");
            assert!(matches!(err, MaturityError::GroupNotFound(_)));
        });
    }
}

// =============================================================================
// TIER T4: SESSIONS AND CONCURRENCY
// =============================================================================

mod t4_sessions_and_concurrency {
    use super::*;

    /// T4.1: A valid session validates; logout removes it.
    #[test]
    fn session_round_trip() {
        for_each_backend(|store| {
            let access = AccessResolver::new(store);
            let signal = AbortSignal::never();

            let session = access.issue_session(&signal, UserId(5)).expect("issue");
            let validated = access
                .validate_session(&signal, &session.token)
                .expect("validate");
            assert_eq!(validated.user_id, UserId(5));
            assert_eq!(validated.expires_at, session.expires_at);

            assert!(access.logout(&signal, &session.token).expect("logout"));
            let err = access
                .validate_session(&signal, &session.token)
                .expect_err("gone");
            assert_eq!(err.kind(), ErrorKind::SessionNotFound);
        });
    }

    /// T4.2: An expired session is rejected once, then gone.
    #[test]
    fn expired_session_is_removed() {
        for_each_backend(|store| {
            let access = AccessResolver::new(store).with_ttl(Duration::seconds(-1));
            let signal = AbortSignal::never();

            let session = access.issue_session(&signal, UserId(5)).expect("issue");
            let err = access
                .validate_session(&signal, &session.token)
                .expect_err("expired");
            assert_eq!(err.kind(), ErrorKind::SessionExpired);

            let err = access
                .validate_session(&signal, &session.token)
                .expect_err("removed");
            assert_eq!(err.kind(), ErrorKind::SessionNotFound);
        });
    }

    /// T4.3: The sweep removes only expired sessions.
    #[test]
    fn sweep_keeps_live_sessions() {
        for_each_backend(|store| {
            let signal = AbortSignal::never();
            let expired = AccessResolver::new(store).with_ttl(Duration::seconds(-1));
            let live = AccessResolver::new(store);

            expired.issue_session(&signal, UserId(1)).expect("issue");
            expired.issue_session(&signal, UserId(2)).expect("issue");
            let kept = live.issue_session(&signal, UserId(1)).expect("issue");

            assert_eq!(live.sweep_expired_sessions(&signal).expect("sweep"), 2);
            let active = live.active_sessions(&signal, UserId(1)).expect("active");
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].token, kept.token);
        });
    }

    /// T4.4: Touching a session that was deleted reports it missing.
    #[test]
    fn touch_after_logout_finds_nothing() {
        for_each_backend(|store| {
            let access = AccessResolver::new(store);
            let signal = AbortSignal::never();
            let session = access.issue_session(&signal, UserId(6)).expect("issue");

            let later = session.last_seen_at + Duration::seconds(5);
            let touched = store
                .touch_session(&signal, &session.token, later)
                .expect("touch")
                .expect("present");
            assert_eq!(touched.last_seen_at, later);
            assert_eq!(touched.expires_at, session.expires_at);

            assert!(access.logout(&signal, &session.token).expect("logout"));
            assert!(store
                .touch_session(&signal, &session.token, later)
                .expect("touch")
                .is_none());
        });
    }

    /// T4.5: Two racing completions yield exactly one success.
    #[test]
    fn concurrent_completion_succeeds_once() {
        for_each_backend(|store| {
            let source = source();
            let signal = AbortSignal::never();
            let (assessment, _) = AssessmentLifecycle::new(&source, store)
                .start(&signal, TeamId(1), UserId(10), None)
                .expect("start");

            let outcomes: Vec<Result<_, MaturityError>> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|_| {
                        scope.spawn(|| {
                            AssessmentLifecycle::new(&source, store)
                                .complete(&AbortSignal::never(), assessment.id)
                                .map(|r| r.assessment.id)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("join"))
                    .collect()
            });

            assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
            assert!(outcomes
                .iter()
                .filter_map(|o| o.as_ref().err())
                .all(|e| e.kind() == ErrorKind::InvalidState));
        });
    }
}
