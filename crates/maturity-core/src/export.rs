//! # CSV Export
//!
//! The one byte-exact wire format of the system. Each scoreable question
//! becomes one row, in catalog order:
//!
//! ```text
//! Section,Sub Category,Question,Possible Answers,Max Score,Answer(s),Score
//! ```
//!
//! Scores carry exactly one decimal digit. The two list cells are
//! newline-separated and trimmed. Quoting follows the classic rule: a field
//! is quoted when it contains a comma, a quote, CR or LF, or starts with
//! whitespace; inner quotes are doubled; records end with `\n`.

use crate::catalog::{Catalog, Question, QuestionKind};
use crate::primitives::CSV_HEADER;
use crate::scoring::{Selections, question_max_score, question_score};
use crate::types::MaturityError;
use std::io::Write;

/// Write the header and one row per scoreable question.
pub fn write_csv<W: Write>(
    catalog: &Catalog,
    selections: &Selections,
    sink: &mut W,
) -> Result<usize, MaturityError> {
    write_record(sink, &CSV_HEADER)?;

    let mut rows = 0;
    for section in catalog.sections() {
        for question in &section.questions {
            if question.answers.is_empty() {
                continue;
            }
            let row = question_row(&section.name, question, selections);
            let fields: Vec<&str> = row.iter().map(String::as_str).collect();
            write_record(sink, &fields)?;
            rows += 1;
        }
    }

    sink.flush().map_err(MaturityError::persistence)?;
    Ok(rows)
}

fn question_row(section: &str, question: &Question, selections: &Selections) -> [String; 7] {
    let mut possible = String::new();
    match question.kind {
        QuestionKind::Option => possible.push_str("Choose one of:\n"),
        QuestionKind::Checkbox => possible.push_str("Choose all that apply:\n"),
        QuestionKind::Banner => {}
    }
    for answer in &question.answers {
        possible.push_str(&format!("{} ({:.1})\n", answer.text, answer.score));
    }

    let mut chosen = String::new();
    if let Some(id) = &question.id {
        for answer in &question.answers {
            if selections.is_checked(id, &answer.id) {
                chosen.push_str(&answer.text);
                chosen.push('\n');
            }
        }
    }

    [
        section.to_string(),
        question.subcategory.clone().unwrap_or_default(),
        question.text.clone(),
        possible.trim().to_string(),
        format!("{:.1}", question_max_score(question)),
        chosen.trim().to_string(),
        format!("{:.1}", question_score(question, selections)),
    ]
}

fn write_record<W: Write>(sink: &mut W, fields: &[&str]) -> Result<(), MaturityError> {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        if needs_quotes(field) {
            line.push('"');
            line.push_str(&field.replace('"', "\"\""));
            line.push('"');
        } else {
            line.push_str(field);
        }
    }
    line.push('\n');
    sink.write_all(line.as_bytes())
        .map_err(MaturityError::persistence)
}

fn needs_quotes(field: &str) -> bool {
    if field.is_empty() {
        return false;
    }
    if field == r"\." {
        return true;
    }
    if field.contains([',', '"', '\r', '\n']) {
        return true;
    }
    field.chars().next().is_some_and(char::is_whitespace)
}
