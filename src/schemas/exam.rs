use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::QuestionType;

/// Fully structured, not-yet-persisted exam definition produced by the
/// markdown parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamDocument {
    pub title: String,
    pub subject: String,
    pub duration_minutes: i32,
    pub description: Option<String>,
    pub questions: Vec<QuestionDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub text: String,
    pub question_type: QuestionType,
    pub points: f64,
    /// 1-based position of the question in the document.
    pub order: i32,
    pub options: Vec<OptionDraft>,
    /// Advisory reference answer for text questions; never graded against.
    pub sample_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDraft {
    pub text: String,
    pub is_correct: bool,
    /// 1-based position of appearance in the question block.
    pub order: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ImportMarkdownRequest {
    #[serde(alias = "markdownContent")]
    #[validate(length(min = 10, message = "markdown content is too short (minimum 10 characters)"))]
    pub markdown_content: String,
}
