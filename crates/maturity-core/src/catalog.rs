//! # Question Catalog
//!
//! Builds the immutable questionnaire from a [`CatalogSource`].
//!
//! IDs are not authored. A single indexed pass over the parsed sections
//! assigns `S{s}-Q{q}` to every non-banner question and `S{s}-Q{q}-A{a}` to
//! its answers, so loading the same source twice yields identical IDs.
//! Selections never live on the catalog; see [`crate::scoring::Selections`].

use crate::primitives::{ADVICE_COMMENT_KEY, DEFAULT_ANSWERS};
use crate::types::{AnswerId, MaturityError, QuestionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

// =============================================================================
// CATALOG SOURCE
// =============================================================================

/// Supplies the raw question and advice documents.
pub trait CatalogSource: Send + Sync {
    fn questions(&self) -> io::Result<Vec<u8>>;
    fn advice(&self) -> io::Result<Vec<u8>>;
}

/// Reads both documents from disk on every call.
#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    questions: PathBuf,
    advice: PathBuf,
}

impl FileCatalogSource {
    pub fn new(questions: impl AsRef<Path>, advice: impl AsRef<Path>) -> Self {
        Self {
            questions: questions.as_ref().to_path_buf(),
            advice: advice.as_ref().to_path_buf(),
        }
    }
}

impl CatalogSource for FileCatalogSource {
    fn questions(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.questions)
    }

    fn advice(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.advice)
    }
}

/// In-memory documents, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogSource {
    questions: String,
    advice: String,
}

impl StaticCatalogSource {
    pub fn new(questions: impl Into<String>, advice: impl Into<String>) -> Self {
        Self {
            questions: questions.into(),
            advice: advice.into(),
        }
    }
}

impl CatalogSource for StaticCatalogSource {
    fn questions(&self) -> io::Result<Vec<u8>> {
        Ok(self.questions.as_bytes().to_vec())
    }

    fn advice(&self) -> io::Result<Vec<u8>> {
        Ok(self.advice.as_bytes().to_vec())
    }
}

// =============================================================================
// RAW DOCUMENT SHAPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawSection {
    #[serde(rename = "SectionName")]
    name: String,
    #[serde(rename = "SpiderPos", default)]
    spider_pos: i64,
    #[serde(rename = "Questions", default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(rename = "Type")]
    kind: QuestionKind,
    #[serde(rename = "SubCategory", default)]
    subcategory: String,
    #[serde(rename = "QuestionText", default)]
    text: String,
    #[serde(rename = "Answers", default)]
    answers: Vec<RawAnswer>,
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    #[serde(rename = "Answer")]
    text: String,
    #[serde(rename = "Score", default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct RawAdvice {
    #[serde(rename = "Advice", default)]
    advice: String,
    #[serde(rename = "ReadMore", default)]
    read_more: Option<String>,
    #[serde(rename = "Links", default)]
    links: Vec<AdviceLink>,
}

// =============================================================================
// CATALOG MODEL
// =============================================================================

/// How a question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionKind {
    /// Single select.
    Option,
    /// Multi select.
    Checkbox,
    /// Non-scoring separator.
    Banner,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub id: AnswerId,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    /// `None` for banners.
    pub id: Option<QuestionId>,
    pub kind: QuestionKind,
    pub subcategory: Option<String>,
    pub text: String,
    /// Always empty for banners.
    pub answers: Vec<Answer>,
}

impl Question {
    #[must_use]
    pub fn is_banner(&self) -> bool {
        self.kind == QuestionKind::Banner
    }

    #[must_use]
    pub fn answer(&self, id: &AnswerId) -> Option<&Answer> {
        self.answers.iter().find(|a| &a.id == id)
    }

    #[must_use]
    pub fn owns_answer(&self, id: &AnswerId) -> bool {
        self.answer(id).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub name: String,
    /// Ordinal position on the results radar chart.
    pub radar_position: i64,
    pub questions: Vec<Question>,
    /// True iff any question carries a subcategory label.
    pub has_subcategories: bool,
}

impl Section {
    #[must_use]
    pub fn slug(&self) -> String {
        slug(&self.name)
    }

    /// Non-banner questions, in catalog order.
    pub fn scored_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(|q| !q.is_banner())
    }
}

/// URL-friendly section name: commas dropped, spaces to hyphens, lowercase.
#[must_use]
pub fn slug(name: &str) -> String {
    name.replace(',', "").replace(' ', "-").to_lowercase()
}

/// The full, immutable questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    sections: Vec<Section>,
    #[serde(skip)]
    question_index: BTreeMap<QuestionId, (usize, usize)>,
}

impl Catalog {
    /// Read and build the catalog from a source.
    pub fn load<S: CatalogSource + ?Sized>(source: &S) -> Result<Self, MaturityError> {
        let bytes = source
            .questions()
            .map_err(|e| MaturityError::CatalogUnreadable(e.to_string()))?;
        Self::from_json(&bytes)
    }

    /// Parse and build the catalog from a JSON section list.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MaturityError> {
        let raw: Vec<RawSection> = serde_json::from_slice(bytes)
            .map_err(|e| MaturityError::CatalogMalformed(e.to_string()))?;
        let catalog = Self::build(raw);
        tracing::debug!(
            event = "catalog_loaded",
            sections = catalog.sections.len(),
            questions = catalog.question_index.len(),
            "catalog built"
        );
        Ok(catalog)
    }

    fn build(raw: Vec<RawSection>) -> Self {
        let mut question_index = BTreeMap::new();
        let mut sections = Vec::with_capacity(raw.len());

        for (s, raw_section) in raw.into_iter().enumerate() {
            let mut questions = Vec::with_capacity(raw_section.questions.len());

            for (q, raw_question) in raw_section.questions.into_iter().enumerate() {
                let subcategory = Some(raw_question.subcategory).filter(|c| !c.is_empty());

                if raw_question.kind == QuestionKind::Banner {
                    questions.push(Question {
                        id: None,
                        kind: QuestionKind::Banner,
                        subcategory,
                        text: raw_question.text,
                        answers: Vec::new(),
                    });
                    continue;
                }

                let authored: Vec<(String, f64)> = if raw_question.answers.is_empty() {
                    DEFAULT_ANSWERS
                        .iter()
                        .map(|(text, score)| ((*text).to_string(), *score))
                        .collect()
                } else {
                    raw_question
                        .answers
                        .into_iter()
                        .map(|a| (a.text, a.score))
                        .collect()
                };

                let answers = authored
                    .into_iter()
                    .enumerate()
                    .map(|(a, (text, score))| Answer {
                        id: AnswerId::at(s, q, a),
                        text,
                        score,
                    })
                    .collect();

                let id = QuestionId::at(s, q);
                question_index.insert(id.clone(), (s, questions.len()));
                questions.push(Question {
                    id: Some(id),
                    kind: raw_question.kind,
                    subcategory,
                    text: raw_question.text,
                    answers,
                });
            }

            let has_subcategories = questions.iter().any(|q| q.subcategory.is_some());
            sections.push(Section {
                name: raw_section.name,
                radar_position: raw_section.spider_pos,
                questions,
                has_subcategories,
            });
        }

        Self {
            sections,
            question_index,
        }
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Every non-banner question, in catalog order.
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.iter().flat_map(Section::scored_questions)
    }

    pub fn section_by_name(&self, name: &str) -> Result<&Section, MaturityError> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| MaturityError::SectionNotFound(name.to_string()))
    }

    pub fn section_by_slug(&self, section_slug: &str) -> Result<&Section, MaturityError> {
        self.sections
            .iter()
            .find(|s| s.slug() == section_slug)
            .ok_or_else(|| MaturityError::SectionNotFound(section_slug.to_string()))
    }

    pub fn question_by_id(&self, id: &QuestionId) -> Result<&Question, MaturityError> {
        self.question_index
            .get(id)
            .and_then(|&(s, q)| self.sections.get(s)?.questions.get(q))
            .ok_or_else(|| MaturityError::QuestionNotFound(id.to_string()))
    }
}

// =============================================================================
// ADVICE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceLink {
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "Text", default)]
    pub text: String,
    #[serde(rename = "Href", default)]
    pub href: String,
    #[serde(rename = "Paid", default, skip_serializing_if = "Option::is_none")]
    pub paid: Option<String>,
}

/// Improvement advice for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advice {
    pub section_name: String,
    pub advice: String,
    pub read_more: Option<String>,
    pub links: Vec<AdviceLink>,
}

/// Advice keyed by section name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdviceCatalog {
    entries: BTreeMap<String, Advice>,
}

impl AdviceCatalog {
    pub fn load<S: CatalogSource + ?Sized>(source: &S) -> Result<Self, MaturityError> {
        let bytes = source
            .advice()
            .map_err(|e| MaturityError::AdviceUnreadable(e.to_string()))?;
        Self::from_json(&bytes)
    }

    /// Parse an advice map. Entries keyed `"//"` are comments and skipped.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MaturityError> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)
            .map_err(|e| MaturityError::AdviceMalformed(e.to_string()))?;

        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            if key == ADVICE_COMMENT_KEY {
                continue;
            }
            let parsed: RawAdvice = serde_json::from_value(value)
                .map_err(|e| MaturityError::AdviceMalformed(format!("{key}: {e}")))?;
            entries.insert(
                key.clone(),
                Advice {
                    section_name: key,
                    advice: parsed.advice,
                    read_more: parsed.read_more.filter(|r| !r.is_empty()),
                    links: parsed.links,
                },
            );
        }
        Ok(Self { entries })
    }

    /// Advice for a section, if any was authored.
    #[must_use]
    pub fn get(&self, section_name: &str) -> Option<&Advice> {
        self.entries.get(section_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Advice> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
