//! # Response Ledger
//!
//! Idempotent persistence of selected answers, one row per
//! (assessment, question). Saving again replaces the answer set.

use crate::repository::{AbortSignal, AssessmentRepository};
use crate::types::{AnswerId, AssessmentId, MaturityError, QuestionId, Response};
use std::collections::BTreeSet;

pub struct ResponseLedger<'a, R: AssessmentRepository + ?Sized> {
    repo: &'a R,
}

impl<'a, R: AssessmentRepository + ?Sized> ResponseLedger<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    /// Upsert one question's answer set. An empty set clears the question.
    pub fn save(
        &self,
        signal: &AbortSignal,
        assessment_id: AssessmentId,
        question_id: QuestionId,
        answer_ids: BTreeSet<AnswerId>,
    ) -> Result<(), MaturityError> {
        let response = Response {
            assessment_id,
            question_id,
            answer_ids,
        };
        self.repo
            .upsert_responses(signal, assessment_id, std::slice::from_ref(&response))
    }

    /// Upsert several questions at once. Either all land or none do.
    pub fn save_all(
        &self,
        signal: &AbortSignal,
        assessment_id: AssessmentId,
        responses: &[Response],
    ) -> Result<(), MaturityError> {
        if responses.is_empty() {
            return Ok(());
        }
        self.repo.upsert_responses(signal, assessment_id, responses)
    }

    /// Stored responses ordered by question id.
    pub fn list_by_assessment(
        &self,
        signal: &AbortSignal,
        assessment_id: AssessmentId,
    ) -> Result<Vec<Response>, MaturityError> {
        self.repo.list_responses(signal, assessment_id)
    }
}
