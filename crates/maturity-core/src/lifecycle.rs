//! # Assessment Lifecycle
//!
//! The two-state machine of one assessment:
//!
//! ```text
//! in_progress ──complete──▶ completed
//! ```
//!
//! `completed` is terminal. Responses of a completed assessment cannot
//! change, and completing twice fails. The transition itself is a
//! conditional write in the repository, so two racing completions yield
//! exactly one success.

use crate::access::random_token;
use crate::catalog::{AdviceCatalog, Catalog, CatalogSource, QuestionKind};
use crate::export::write_csv;
use crate::ledger::ResponseLedger;
use crate::primitives::CORRELATION_BYTES;
use crate::repository::{AbortSignal, AssessmentRepository};
use crate::scoring::{
    Selections, SubCategoryBreakdown, apply_responses, overall_percentage, section_scores,
    subcategory_breakdowns,
};
use crate::types::{
    AnswerId, Assessment, AssessmentFilter, AssessmentId, MaturityError, NewAssessment, Page,
    Response, SectionScore, TeamId, UserId,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

/// Submitted form fields: field key to the values posted under it.
///
/// `Option` questions are keyed by question ID; each `Checkbox` answer is
/// its own key, and presence means selected.
pub type FormSelections = BTreeMap<String, Vec<String>>;

/// A catalog with the stored answers of one assessment overlaid.
#[derive(Debug, Clone, Serialize)]
pub struct Questionnaire {
    pub assessment: Assessment,
    pub catalog: Catalog,
    pub selections: Selections,
}

/// Scores of a completed assessment.
#[derive(Debug, Clone, Serialize)]
pub struct Results {
    pub assessment: Assessment,
    pub section_scores: Vec<SectionScore>,
    pub subcategory_scores: Vec<SubCategoryBreakdown>,
    pub catalog: Catalog,
    pub selections: Selections,
}

/// One completed assessment in a team's history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub assessment: Assessment,
    pub section_scores: Vec<SectionScore>,
    pub overall_score: f64,
}

pub struct AssessmentLifecycle<'a, C: CatalogSource + ?Sized, R: AssessmentRepository + ?Sized> {
    source: &'a C,
    repo: &'a R,
}

impl<'a, C: CatalogSource + ?Sized, R: AssessmentRepository + ?Sized> AssessmentLifecycle<'a, C, R> {
    pub fn new(source: &'a C, repo: &'a R) -> Self {
        Self { source, repo }
    }

    fn catalog(&self) -> Result<Catalog, MaturityError> {
        Catalog::load(self.source)
    }

    fn find(&self, signal: &AbortSignal, id: AssessmentId) -> Result<Assessment, MaturityError> {
        self.repo
            .get_assessment(signal, id)?
            .ok_or(MaturityError::AssessmentNotFound(id))
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Create an `in_progress` assessment and hand back the catalog.
    ///
    /// A correlation token is generated when the caller has none.
    pub fn start(
        &self,
        signal: &AbortSignal,
        team_id: TeamId,
        user_id: UserId,
        correlation: Option<String>,
    ) -> Result<(Assessment, Catalog), MaturityError> {
        let catalog = self.catalog()?;
        let session_id = match correlation {
            Some(token) if !token.is_empty() => token,
            _ => random_token(CORRELATION_BYTES),
        };
        let assessment = self.repo.insert_assessment(
            signal,
            NewAssessment {
                team_id,
                created_by: user_id,
                session_id,
                created_at: Utc::now(),
            },
        )?;
        tracing::info!(
            event = "assessment_started",
            assessment = %assessment.id,
            team = %team_id,
            user = %user_id,
            "assessment started"
        );
        Ok((assessment, catalog))
    }

    /// Reload an `in_progress` assessment with its saved answers applied.
    pub fn continue_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<Questionnaire, MaturityError> {
        let assessment = self.find(signal, id)?;
        if assessment.is_completed() {
            return Err(MaturityError::AssessmentAlreadyCompleted(id));
        }
        let catalog = self.catalog()?;
        let responses = ResponseLedger::new(self.repo).list_by_assessment(signal, id)?;
        let selections = apply_responses(&catalog, &responses);
        Ok(Questionnaire {
            assessment,
            catalog,
            selections,
        })
    }

    /// Save the submitted answers of one section.
    ///
    /// Only questions with at least one selection are written; a question
    /// with nothing selected keeps whatever was stored before. Returns the
    /// number of questions written.
    pub fn save_section(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
        section_slug: &str,
        form: &FormSelections,
    ) -> Result<usize, MaturityError> {
        let assessment = self.find(signal, id)?;
        if assessment.is_completed() {
            return Err(MaturityError::AssessmentAlreadyCompleted(id));
        }
        let catalog = self.catalog()?;
        let section = catalog.section_by_slug(section_slug)?;

        let mut responses = Vec::new();
        for question in section.scored_questions() {
            let Some(question_id) = &question.id else {
                continue;
            };
            let chosen: BTreeSet<AnswerId> = match question.kind {
                QuestionKind::Option => form
                    .get(question_id.as_str())
                    .and_then(|values| values.first())
                    .filter(|value| !value.is_empty())
                    .map(|value| AnswerId(value.clone()))
                    .into_iter()
                    .collect(),
                QuestionKind::Checkbox => question
                    .answers
                    .iter()
                    .filter(|a| form.contains_key(a.id.as_str()))
                    .map(|a| a.id.clone())
                    .collect(),
                QuestionKind::Banner => continue,
            };
            if !chosen.is_empty() {
                responses.push(Response {
                    assessment_id: id,
                    question_id: question_id.clone(),
                    answer_ids: chosen,
                });
            }
        }

        ResponseLedger::new(self.repo).save_all(signal, id, &responses)?;
        tracing::debug!(
            event = "section_saved",
            assessment = %id,
            section = %section.name,
            questions = responses.len(),
            "section saved"
        );
        Ok(responses.len())
    }

    /// Score the stored answers, persist section scores and close the
    /// assessment.
    pub fn complete(&self, signal: &AbortSignal, id: AssessmentId) -> Result<Results, MaturityError> {
        self.find(signal, id)?;
        let catalog = self.catalog()?;
        let responses = ResponseLedger::new(self.repo).list_by_assessment(signal, id)?;
        let selections = apply_responses(&catalog, &responses);
        let scores = section_scores(&catalog, &selections);

        let assessment = self
            .repo
            .complete_assessment(signal, id, &scores, Utc::now())?;
        let subcategory_scores = subcategory_breakdowns(&catalog, &selections);

        tracing::info!(
            event = "assessment_completed",
            assessment = %id,
            sections = scores.len(),
            overall = overall_percentage(&scores),
            "assessment completed"
        );
        Ok(Results {
            assessment,
            section_scores: scores,
            subcategory_scores,
            catalog,
            selections,
        })
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    /// Results of a completed assessment.
    ///
    /// Section scores are the persisted ones. Subcategory breakdowns are
    /// recomputed from the stored responses on every call.
    pub fn results(&self, signal: &AbortSignal, id: AssessmentId) -> Result<Results, MaturityError> {
        let assessment = self.find(signal, id)?;
        if !assessment.is_completed() {
            return Err(MaturityError::AssessmentNotCompleted(id));
        }
        let section_scores = self.repo.list_section_scores(signal, id)?;
        let catalog = self.catalog()?;
        let responses = ResponseLedger::new(self.repo).list_by_assessment(signal, id)?;
        let selections = apply_responses(&catalog, &responses);
        let subcategory_scores = subcategory_breakdowns(&catalog, &selections);
        Ok(Results {
            assessment,
            section_scores,
            subcategory_scores,
            catalog,
            selections,
        })
    }

    /// Write the CSV export of a completed assessment. Returns the row count.
    pub fn export_csv<W: Write>(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
        sink: &mut W,
    ) -> Result<usize, MaturityError> {
        let results = self.results(signal, id)?;
        write_csv(&results.catalog, &results.selections, sink)
    }

    /// Advice for the results page.
    pub fn advice(&self) -> Result<AdviceCatalog, MaturityError> {
        AdviceCatalog::load(self.source)
    }

    /// Completed assessments of a team, newest first, with their scores.
    pub fn team_history(
        &self,
        signal: &AbortSignal,
        team_id: TeamId,
    ) -> Result<Vec<HistoryEntry>, MaturityError> {
        let (completed, _) = self.repo.list_team_assessments(
            signal,
            team_id,
            AssessmentFilter::completed(),
            Page::all(),
        )?;
        completed
            .into_iter()
            .map(|assessment| {
                let section_scores = self.repo.list_section_scores(signal, assessment.id)?;
                Ok(HistoryEntry {
                    overall_score: overall_percentage(&section_scores),
                    assessment,
                    section_scores,
                })
            })
            .collect()
    }

    /// The most recently created completed assessment of a team.
    pub fn latest_completed(
        &self,
        signal: &AbortSignal,
        team_id: TeamId,
    ) -> Result<Assessment, MaturityError> {
        let (mut rows, _) = self.repo.list_team_assessments(
            signal,
            team_id,
            AssessmentFilter::completed(),
            Page::new(0, 1),
        )?;
        rows.pop()
            .ok_or(MaturityError::NoCompletedAssessment(team_id))
    }

    pub fn list_team_assessments(
        &self,
        signal: &AbortSignal,
        team_id: TeamId,
        filter: AssessmentFilter,
        page: Page,
    ) -> Result<(Vec<Assessment>, usize), MaturityError> {
        self.repo.list_team_assessments(signal, team_id, filter, page)
    }

    pub fn list_user_assessments(
        &self,
        signal: &AbortSignal,
        user_id: UserId,
        page: Page,
    ) -> Result<(Vec<Assessment>, usize), MaturityError> {
        self.repo.list_user_assessments(signal, user_id, page)
    }

    pub fn delete_assessment(
        &self,
        signal: &AbortSignal,
        id: AssessmentId,
    ) -> Result<(), MaturityError> {
        self.repo.delete_assessment(signal, id)?;
        tracing::info!(event = "assessment_deleted", assessment = %id, "assessment deleted");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
