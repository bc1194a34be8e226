//! # Scoring Engine
//!
//! Pure functions over a [`Catalog`] and a [`Selections`] overlay. No I/O.
//!
//! The catalog is never annotated in place. Which answers are "checked"
//! lives in the overlay, so one catalog can be shared by concurrent callers.

use crate::catalog::{Catalog, Question, QuestionKind};
use crate::types::{AnswerId, AssessmentId, QuestionId, Response, SectionScore};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// SELECTION OVERLAY
// =============================================================================

/// Checked answers per question. Questions absent from the map are
/// unanswered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selections {
    checked: BTreeMap<QuestionId, BTreeSet<AnswerId>>,
}

impl Selections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the checked set of a question.
    pub fn set(&mut self, question: QuestionId, answers: BTreeSet<AnswerId>) {
        self.checked.insert(question, answers);
    }

    #[must_use]
    pub fn is_checked(&self, question: &QuestionId, answer: &AnswerId) -> bool {
        self.checked
            .get(question)
            .is_some_and(|set| set.contains(answer))
    }

    #[must_use]
    pub fn checked(&self, question: &QuestionId) -> Option<&BTreeSet<AnswerId>> {
        self.checked.get(question)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &BTreeSet<AnswerId>)> {
        self.checked.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checked.values().all(BTreeSet::is_empty)
    }
}

/// Build the overlay for a set of stored responses.
///
/// For every question matching a response, the checked set becomes exactly
/// the response's answer IDs that belong to that question. Responses for
/// unknown questions and answer IDs foreign to the question are ignored.
#[must_use]
pub fn apply_responses(catalog: &Catalog, responses: &[Response]) -> Selections {
    let by_question: BTreeMap<&QuestionId, &BTreeSet<AnswerId>> = responses
        .iter()
        .map(|r| (&r.question_id, &r.answer_ids))
        .collect();

    let mut selections = Selections::new();
    for question in catalog.questions() {
        let Some(id) = &question.id else { continue };
        if let Some(answer_ids) = by_question.get(id) {
            let owned = answer_ids
                .iter()
                .filter(|a| question.owns_answer(a))
                .cloned()
                .collect();
            selections.set(id.clone(), owned);
        }
    }
    selections
}

/// The inverse of [`apply_responses`]: one response per question with at
/// least one checked answer, in catalog order.
#[must_use]
pub fn extract_responses(
    catalog: &Catalog,
    selections: &Selections,
    assessment_id: AssessmentId,
) -> Vec<Response> {
    catalog
        .questions()
        .filter_map(|question| {
            let id = question.id.as_ref()?;
            let checked: BTreeSet<AnswerId> = question
                .answers
                .iter()
                .filter(|a| selections.is_checked(id, &a.id))
                .map(|a| a.id.clone())
                .collect();
            (!checked.is_empty()).then(|| Response {
                assessment_id,
                question_id: id.clone(),
                answer_ids: checked,
            })
        })
        .collect()
}

// =============================================================================
// QUESTION SCORES
// =============================================================================

/// Sum of the scores of the checked answers. Banners score 0.
#[must_use]
pub fn question_score(question: &Question, selections: &Selections) -> f64 {
    let Some(id) = &question.id else { return 0.0 };
    question
        .answers
        .iter()
        .filter(|a| selections.is_checked(id, &a.id))
        .map(|a| a.score)
        .sum()
}

/// Best achievable score: the top answer for `Option`, all answers for
/// `Checkbox`, 0 for `Banner`.
#[must_use]
pub fn question_max_score(question: &Question) -> f64 {
    match question.kind {
        QuestionKind::Option => question
            .answers
            .iter()
            .map(|a| a.score)
            .fold(0.0, f64::max),
        QuestionKind::Checkbox => question.answers.iter().map(|a| a.score).sum(),
        QuestionKind::Banner => 0.0,
    }
}

// =============================================================================
// SECTION SCORES
// =============================================================================

/// One line per section with a positive max score, in catalog order.
#[must_use]
pub fn section_scores(catalog: &Catalog, selections: &Selections) -> Vec<SectionScore> {
    catalog
        .sections()
        .iter()
        .filter_map(|section| {
            let (score, max) = section.questions.iter().fold((0.0, 0.0), |(s, m), q| {
                (s + question_score(q, selections), m + question_max_score(q))
            });
            (max > 0.0).then(|| SectionScore::new(section.name.clone(), score, max))
        })
        .collect()
}

/// Per-subcategory lines for one section, in order of first appearance.
///
/// Only labelled questions count, and only groups with a positive max score
/// are returned. An unknown section yields an empty list.
#[must_use]
pub fn subcategory_scores(
    catalog: &Catalog,
    selections: &Selections,
    section_name: &str,
) -> Vec<SectionScore> {
    let Ok(section) = catalog.section_by_name(section_name) else {
        return Vec::new();
    };

    let mut groups: Vec<(&str, f64, f64)> = Vec::new();
    for question in &section.questions {
        let Some(label) = question.subcategory.as_deref() else {
            continue;
        };
        let score = question_score(question, selections);
        let max = question_max_score(question);
        match groups.iter_mut().find(|(name, _, _)| *name == label) {
            Some(group) => {
                group.1 += score;
                group.2 += max;
            }
            None => groups.push((label, score, max)),
        }
    }

    groups
        .into_iter()
        .filter(|(_, _, max)| *max > 0.0)
        .map(|(name, score, max)| SectionScore::new(name, score, max))
        .collect()
}

/// Subcategory lines of one section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubCategoryBreakdown {
    pub section: String,
    pub scores: Vec<SectionScore>,
}

/// Breakdowns for every section that has subcategories, in catalog order.
/// Sections where no subcategory scores are omitted.
#[must_use]
pub fn subcategory_breakdowns(
    catalog: &Catalog,
    selections: &Selections,
) -> Vec<SubCategoryBreakdown> {
    catalog
        .sections()
        .iter()
        .filter(|s| s.has_subcategories)
        .filter_map(|s| {
            let scores = subcategory_scores(catalog, selections, &s.name);
            (!scores.is_empty()).then(|| SubCategoryBreakdown {
                section: s.name.clone(),
                scores,
            })
        })
        .collect()
}

/// `Σscore / Σmax * 100` over a set of lines, 0 when there is nothing to score.
#[must_use]
pub fn overall_percentage(lines: &[SectionScore]) -> f64 {
    let (score, max) = lines
        .iter()
        .fold((0.0, 0.0), |(s, m), l| (s + l.score, m + l.max_score));
    if max > 0.0 { score / max * 100.0 } else { 0.0 }
}

// =============================================================================
// TESTS
// =============================================================================
