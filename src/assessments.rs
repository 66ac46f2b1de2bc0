//! Assessments: scored questionnaires imported and exported as their own
//! tabular file.
//!
//! One row carries one question; the first row for a `(slug, locale)` also
//! carries the assessment-level fields (title, inflection thresholds, result
//! pages) and later rows append further questions, mirroring how content
//! page rows append messages. Result pages reference content pages by slug
//! and must exist before the import.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ImportError, ValidationError};
use crate::importer::{parse_table, FileKind};
use crate::progress::ProgressSink;
use crate::repo::ContentStore;
use crate::rows::{join_list, split_list};

/// Fixed column order, shared by the exporter and the import examples.
pub const ASSESSMENT_FIELDNAMES: [&str; 20] = [
    "title",
    "slug",
    "version",
    "tags",
    "question_type",
    "locale",
    "high_result_page",
    "high_inflection",
    "medium_result_page",
    "medium_inflection",
    "low_result_page",
    "generic_error",
    "question",
    "explainer",
    "error",
    "min",
    "max",
    "answers",
    "scores",
    "semantic_ids",
];

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnswerBlock {
    pub answer: String,
    pub score: f64,
    pub semantic_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QuestionBlock {
    pub question: String,
    pub question_type: String,
    pub explainer: String,
    pub error: String,
    pub min: String,
    pub max: String,
    pub answers: Vec<AnswerBlock>,
}

/// A scored questionnaire. Scores accumulate over the answers given and the
/// two inflection points split the total into high, medium and low bands,
/// each pointing at a result content page.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Assessment {
    pub slug: String,
    pub locale: String,
    /// 1-based data-row number of the row that created this assessment.
    pub row_num: usize,
    pub title: String,
    pub version: String,
    pub tags: Vec<String>,
    pub high_result_page: String,
    pub high_inflection: f64,
    pub medium_result_page: String,
    pub medium_inflection: f64,
    pub low_result_page: String,
    pub generic_error: String,
    pub questions: Vec<QuestionBlock>,
}

#[derive(Default)]
struct AssessmentRow {
    slug: String,
    title: String,
    version: String,
    tags: Vec<String>,
    question_type: String,
    locale: String,
    high_result_page: String,
    high_inflection: String,
    medium_result_page: String,
    medium_inflection: String,
    low_result_page: String,
    generic_error: String,
    question: String,
    explainer: String,
    error: String,
    min: String,
    max: String,
    answers: Vec<String>,
    scores: Vec<String>,
    semantic_ids: Vec<String>,
}

impl AssessmentRow {
    fn from_cells<'a>(cells: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut row = AssessmentRow::default();
        for (name, value) in cells {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.trim() {
                "title" => row.title = value.to_string(),
                "slug" => row.slug = value.to_string(),
                "version" => row.version = value.to_string(),
                "tags" => row.tags = split_list(value),
                "question_type" => row.question_type = value.to_string(),
                "locale" => row.locale = value.to_string(),
                "high_result_page" => row.high_result_page = value.to_string(),
                "high_inflection" => row.high_inflection = value.to_string(),
                "medium_result_page" => row.medium_result_page = value.to_string(),
                "medium_inflection" => row.medium_inflection = value.to_string(),
                "low_result_page" => row.low_result_page = value.to_string(),
                "generic_error" => row.generic_error = value.to_string(),
                "question" => row.question = value.to_string(),
                "explainer" => row.explainer = value.to_string(),
                "error" => row.error = value.to_string(),
                "min" => row.min = value.to_string(),
                "max" => row.max = value.to_string(),
                "answers" => row.answers = split_list(value),
                "scores" => row.scores = split_list(value),
                "semantic_ids" => row.semantic_ids = split_list(value),
                _ => {}
            }
        }
        row
    }
}

pub struct AssessmentImporter {
    content: Vec<u8>,
    kind: FileKind,
    purge: bool,
    locale: Option<String>,
}

impl AssessmentImporter {
    pub fn new(content: Vec<u8>, kind: FileKind) -> Self {
        Self {
            content,
            kind,
            purge: false,
            locale: None,
        }
    }

    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    pub fn perform_import(
        &self,
        store: &mut ContentStore,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), ImportError> {
        store.transaction(|store| self.run(store, progress))
    }

    fn run(
        &self,
        store: &mut ContentStore,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), ImportError> {
        let records = parse_table(&self.content, self.kind)?;
        if self.purge {
            store.delete_all_assessments(self.locale.as_deref());
        }
        progress.send(10);

        let mut assessments: IndexMap<(String, String), Assessment> = IndexMap::new();
        for (i, record) in records.iter().enumerate() {
            let row_num = i + 1;
            let row = AssessmentRow::from_cells(
                record.iter().map(|(name, value)| (name.as_str(), value.as_str())),
            );
            let locale = if row.locale.is_empty() {
                store.default_locale().to_string()
            } else {
                row.locale.clone()
            };
            if let Some(target) = &self.locale {
                if &locale != target {
                    continue;
                }
            }
            if row.slug.is_empty() {
                return Err(ValidationError::new("slug", "row has no slug").at_row(row_num));
            }

            let key = (row.slug.clone(), locale.clone());
            if !assessments.contains_key(&key) {
                let assessment =
                    new_assessment(&row, locale, row_num).map_err(|e| e.at_row(row_num))?;
                assessments.insert(key.clone(), assessment);
            }
            if let Some(question) = parse_question(&row).map_err(|e| e.at_row(row_num))? {
                // contains_key checked above
                if let Some(assessment) = assessments.get_mut(&key) {
                    assessment.questions.push(question);
                }
            }
        }

        let total = assessments.len().max(1);
        for (i, assessment) in assessments.into_values().enumerate() {
            check_result_pages(store, &assessment)?;
            store.upsert_assessment(assessment);
            progress.send((10 + 90 * (i + 1) / total) as u8);
        }
        info!("assessment import complete");
        progress.send(100);
        Ok(())
    }
}

fn new_assessment(
    row: &AssessmentRow,
    locale: String,
    row_num: usize,
) -> Result<Assessment, ValidationError> {
    Ok(Assessment {
        slug: row.slug.clone(),
        locale,
        row_num,
        title: row.title.clone(),
        version: row.version.clone(),
        tags: row.tags.clone(),
        high_result_page: row.high_result_page.clone(),
        high_inflection: parse_inflection(&row.high_inflection, "high_inflection")?,
        medium_result_page: row.medium_result_page.clone(),
        medium_inflection: parse_inflection(&row.medium_inflection, "medium_inflection")?,
        low_result_page: row.low_result_page.clone(),
        generic_error: row.generic_error.clone(),
        questions: Vec::new(),
    })
}

fn parse_inflection(value: &str, field: &str) -> Result<f64, ValidationError> {
    value
        .parse()
        .map_err(|_| ValidationError::new(field, format!("'{value}' is not a number")))
}

/// Build this row's question, if it carries one. Scores must pair with
/// answers one to one; semantic ids may be left out entirely.
fn parse_question(row: &AssessmentRow) -> Result<Option<QuestionBlock>, ValidationError> {
    if row.question.is_empty() && row.answers.is_empty() {
        return Ok(None);
    }
    if row.scores.len() != row.answers.len() {
        return Err(ValidationError::new(
            "scores",
            format!(
                "{} scores given for {} answers",
                row.scores.len(),
                row.answers.len()
            ),
        ));
    }
    if !row.semantic_ids.is_empty() && row.semantic_ids.len() != row.answers.len() {
        return Err(ValidationError::new(
            "semantic_ids",
            format!(
                "{} semantic ids given for {} answers",
                row.semantic_ids.len(),
                row.answers.len()
            ),
        ));
    }
    let mut answers = Vec::with_capacity(row.answers.len());
    for (i, answer) in row.answers.iter().enumerate() {
        let score: f64 = row.scores[i].parse().map_err(|_| {
            ValidationError::new("scores", format!("'{}' is not a number", row.scores[i]))
        })?;
        answers.push(AnswerBlock {
            answer: answer.clone(),
            score,
            semantic_id: row.semantic_ids.get(i).cloned().unwrap_or_default(),
        });
    }
    Ok(Some(QuestionBlock {
        question: row.question.clone(),
        question_type: row.question_type.clone(),
        explainer: row.explainer.clone(),
        error: row.error.clone(),
        min: row.min.clone(),
        max: row.max.clone(),
        answers,
    }))
}

fn check_result_pages(store: &ContentStore, assessment: &Assessment) -> Result<(), ImportError> {
    for slug in [
        &assessment.high_result_page,
        &assessment.medium_result_page,
        &assessment.low_result_page,
    ] {
        if slug.is_empty() {
            continue;
        }
        let exists = store
            .pages()
            .any(|p| &p.node.slug == slug && !p.node.is_index);
        if !exists {
            return Err(ImportError::reference(
                assessment.row_num,
                format!(
                    "assessment '{}' references the result page with slug '{slug}' \
                     which does not exist",
                    assessment.slug
                ),
            ));
        }
    }
    Ok(())
}

/// Render every assessment as one row per question, in
/// `ASSESSMENT_FIELDNAMES` column order.
pub fn export_assessments(store: &ContentStore) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    for assessment in store.assessments() {
        for question in &assessment.questions {
            records.push(question_record(assessment, question));
        }
    }
    records
}

fn question_record(assessment: &Assessment, question: &QuestionBlock) -> Vec<String> {
    let answers: Vec<String> = question.answers.iter().map(|a| a.answer.clone()).collect();
    let scores: Vec<String> = question
        .answers
        .iter()
        .map(|a| a.score.to_string())
        .collect();
    let semantic_ids: Vec<String> = question
        .answers
        .iter()
        .map(|a| a.semantic_id.clone())
        .collect();
    let semantic_ids = if semantic_ids.iter().all(|id| id.is_empty()) {
        String::new()
    } else {
        join_list(&semantic_ids)
    };
    vec![
        assessment.title.clone(),
        assessment.slug.clone(),
        assessment.version.clone(),
        join_list(&assessment.tags),
        question.question_type.clone(),
        assessment.locale.clone(),
        assessment.high_result_page.clone(),
        assessment.high_inflection.to_string(),
        assessment.medium_result_page.clone(),
        assessment.medium_inflection.to_string(),
        assessment.low_result_page.clone(),
        assessment.generic_error.clone(),
        question.question.clone(),
        question.explainer.clone(),
        question.error.clone(),
        question.min.clone(),
        question.max.clone(),
        join_list(&answers),
        join_list(&scores),
        semantic_ids,
    ]
}
