use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, ExamStatus, QuestionType};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Exam {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub status: ExamStatus,
    pub passing_score: f64,
    /// None means unlimited attempts.
    pub max_attempts: Option<i32>,
    pub created_by: String,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: String,
    pub exam_id: String,
    pub question_text: String,
    pub question_type: QuestionType,
    pub points: f64,
    pub order_index: i32,
    pub sample_answer: Option<String>,
    pub created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionOption {
    pub id: String,
    pub question_id: String,
    pub option_text: String,
    pub is_correct: bool,
    pub order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: String,
    pub exam_id: String,
    pub student_id: String,
    pub status: AttemptStatus,
    pub started_at: PrimitiveDateTime,
    pub submitted_at: Option<PrimitiveDateTime>,
    pub time_spent_minutes: Option<i32>,
    /// Percentage 0..=100, set once at submission time.
    pub score: Option<f64>,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: String,
    pub attempt_id: String,
    pub question_id: String,
    pub selected_option_id: Option<String>,
    pub answer_text: Option<String>,
    pub is_correct: bool,
    pub points: f64,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}
