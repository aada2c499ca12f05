mod postgres;

pub use postgres::PgExamStore;

use async_trait::async_trait;
use time::PrimitiveDateTime;

use crate::db::models::{Answer, Attempt, Exam, Question, QuestionOption};
use crate::schemas::exam::ExamDocument;

/// Passing score recorded on freshly imported exams; editable later through
/// the exam management surface.
pub const DEFAULT_PASSING_SCORE: f64 = 50.0;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A storage-level uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Backend(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct QuestionWithOptions {
    pub question: Question,
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone)]
pub struct ExamBundle {
    pub exam: Exam,
    /// Ordered by `order_index`.
    pub questions: Vec<QuestionWithOptions>,
}

#[derive(Debug, Clone)]
pub struct AttemptWithAnswers {
    pub attempt: Attempt,
    pub answers: Vec<Answer>,
}

#[derive(Debug)]
pub struct NewAttempt<'a> {
    pub id: &'a str,
    pub exam_id: &'a str,
    pub student_id: &'a str,
    pub started_at: PrimitiveDateTime,
    pub now: PrimitiveDateTime,
}

#[derive(Debug)]
pub struct UpsertAnswer<'a> {
    /// Used when the answer row does not exist yet; existing rows keep their id.
    pub id: &'a str,
    pub attempt_id: &'a str,
    pub question_id: &'a str,
    pub selected_option_id: Option<&'a str>,
    pub answer_text: Option<&'a str>,
    pub is_correct: bool,
    pub points: f64,
    pub now: PrimitiveDateTime,
}

#[derive(Debug)]
pub struct FinalizeAttempt {
    pub submitted_at: PrimitiveDateTime,
    pub time_spent_minutes: i32,
    pub score: f64,
}

/// Narrow persistence contract consumed by the attempt engine and the exam
/// import pipeline. Implementations must enforce the uniqueness guarantees
/// the schema declares: one attempt per (student, exam) and one answer per
/// (attempt, question).
#[async_trait]
pub trait ExamStore: Send + Sync {
    /// Persists an exam together with its questions and options in one
    /// transaction. The exam is created as a draft owned by `created_by`.
    async fn create_exam(
        &self,
        id: &str,
        document: &ExamDocument,
        created_by: &str,
        now: PrimitiveDateTime,
    ) -> Result<Exam, StoreError>;

    async fn find_exam_with_questions(
        &self,
        exam_id: &str,
    ) -> Result<Option<ExamBundle>, StoreError>;

    async fn find_question_with_options(
        &self,
        question_id: &str,
    ) -> Result<Option<QuestionWithOptions>, StoreError>;

    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError>;

    async fn find_attempt_by_student_and_exam(
        &self,
        student_id: &str,
        exam_id: &str,
    ) -> Result<Option<Attempt>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when an attempt for the same
    /// (student, exam) pair already exists.
    async fn create_attempt(&self, attempt: NewAttempt<'_>) -> Result<Attempt, StoreError>;

    /// Last-write-wins upsert keyed by (attempt, question).
    async fn upsert_answer(&self, answer: UpsertAnswer<'_>) -> Result<Answer, StoreError>;

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError>;

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        update: FinalizeAttempt,
    ) -> Result<Attempt, StoreError>;

    /// Returns None when no answer row exists for the (attempt, question) pair.
    async fn update_answer_points(
        &self,
        attempt_id: &str,
        question_id: &str,
        points: f64,
        now: PrimitiveDateTime,
    ) -> Result<Option<Answer>, StoreError>;

    /// Most-recent-start-first.
    async fn list_attempts_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttemptWithAnswers>, StoreError>;

    /// Most-recently-submitted-first.
    async fn list_attempts_by_exam(&self, exam_id: &str) -> Result<Vec<Attempt>, StoreError>;

    /// Submitted attempts on exams created by `teacher_id` that contain at
    /// least one free-text answer.
    async fn list_attempts_needing_grading(
        &self,
        teacher_id: &str,
    ) -> Result<Vec<Attempt>, StoreError>;

    async fn delete_attempt(&self, attempt_id: &str) -> Result<bool, StoreError>;
}
