use std::collections::HashMap;

use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{Answer, Attempt, Exam, Question, QuestionOption};
use crate::db::types::{AttemptStatus, ExamStatus, QuestionType};
use crate::schemas::exam::ExamDocument;
use crate::store::{
    AttemptWithAnswers, ExamBundle, ExamStore, FinalizeAttempt, NewAttempt, QuestionWithOptions,
    StoreError, UpsertAnswer, DEFAULT_PASSING_SCORE,
};

const EXAM_COLUMNS: &str = "\
    id, title, subject, description, duration_minutes, status, passing_score, \
    max_attempts, created_by, created_at, updated_at";

const QUESTION_COLUMNS: &str = "\
    id, exam_id, question_text, question_type, points, order_index, sample_answer, created_at";

const OPTION_COLUMNS: &str = "id, question_id, option_text, is_correct, order_index";

const ATTEMPT_COLUMNS: &str = "\
    id, exam_id, student_id, status, started_at, submitted_at, time_spent_minutes, \
    score, created_at, updated_at";

const ANSWER_COLUMNS: &str = "\
    id, attempt_id, question_id, selected_option_id, answer_text, is_correct, points, \
    created_at, updated_at";

#[derive(Clone)]
pub struct PgExamStore {
    pool: PgPool,
}

impl PgExamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_options_for(
        &self,
        question_ids: &[String],
    ) -> Result<HashMap<String, Vec<QuestionOption>>, sqlx::Error> {
        if question_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let options = sqlx::query_as::<_, QuestionOption>(&format!(
            "SELECT {OPTION_COLUMNS} FROM question_options \
             WHERE question_id = ANY($1) ORDER BY question_id, order_index"
        ))
        .bind(question_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<String, Vec<QuestionOption>> = HashMap::new();
        for option in options {
            grouped.entry(option.question_id.clone()).or_default().push(option);
        }
        Ok(grouped)
    }
}

#[async_trait::async_trait]
impl ExamStore for PgExamStore {
    async fn create_exam(
        &self,
        id: &str,
        document: &ExamDocument,
        created_by: &str,
        now: PrimitiveDateTime,
    ) -> Result<Exam, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let exam = sqlx::query_as::<_, Exam>(&format!(
            "INSERT INTO exams (id, title, subject, description, duration_minutes, status, \
             passing_score, max_attempts, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8, $9, $9) \
             RETURNING {EXAM_COLUMNS}"
        ))
        .bind(id)
        .bind(&document.title)
        .bind(&document.subject)
        .bind(&document.description)
        .bind(document.duration_minutes)
        .bind(ExamStatus::Draft)
        .bind(DEFAULT_PASSING_SCORE)
        .bind(created_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        for question in &document.questions {
            let question_id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO questions (id, exam_id, question_text, question_type, points, \
                 order_index, sample_answer, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(&question_id)
            .bind(id)
            .bind(&question.text)
            .bind(question.question_type)
            .bind(question.points)
            .bind(question.order)
            .bind(&question.sample_answer)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

            for option in &question.options {
                sqlx::query(
                    "INSERT INTO question_options (id, question_id, option_text, is_correct, \
                     order_index) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&question_id)
                .bind(&option.text)
                .bind(option.is_correct)
                .bind(option.order)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?;
            }
        }

        tx.commit().await.map_err(StoreError::from)?;
        Ok(exam)
    }

    async fn find_exam_with_questions(
        &self,
        exam_id: &str,
    ) -> Result<Option<ExamBundle>, StoreError> {
        let exam = sqlx::query_as::<_, Exam>(&format!(
            "SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1"
        ))
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(exam) = exam else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY order_index"
        ))
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;

        let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        let mut options = self.fetch_options_for(&question_ids).await?;

        let questions = questions
            .into_iter()
            .map(|question| {
                let options = options.remove(&question.id).unwrap_or_default();
                QuestionWithOptions { question, options }
            })
            .collect();

        Ok(Some(ExamBundle { exam, questions }))
    }

    async fn find_question_with_options(
        &self,
        question_id: &str,
    ) -> Result<Option<QuestionWithOptions>, StoreError> {
        let question = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(question) = question else {
            return Ok(None);
        };

        let options = sqlx::query_as::<_, QuestionOption>(&format!(
            "SELECT {OPTION_COLUMNS} FROM question_options \
             WHERE question_id = $1 ORDER BY order_index"
        ))
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(QuestionWithOptions { question, options }))
    }

    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn find_attempt_by_student_and_exam(
        &self,
        student_id: &str,
        exam_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE student_id = $1 AND exam_id = $2"
        ))
        .bind(student_id)
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn create_attempt(&self, attempt: NewAttempt<'_>) -> Result<Attempt, StoreError> {
        let created = sqlx::query_as::<_, Attempt>(&format!(
            "INSERT INTO attempts (id, exam_id, student_id, status, started_at, submitted_at, \
             time_spent_minutes, score, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NULL, NULL, NULL, $6, $6) \
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(attempt.id)
        .bind(attempt.exam_id)
        .bind(attempt.student_id)
        .bind(AttemptStatus::InProgress)
        .bind(attempt.started_at)
        .bind(attempt.now)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn upsert_answer(&self, answer: UpsertAnswer<'_>) -> Result<Answer, StoreError> {
        let stored = sqlx::query_as::<_, Answer>(&format!(
            "INSERT INTO answers (id, attempt_id, question_id, selected_option_id, answer_text, \
             is_correct, points, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             ON CONFLICT (attempt_id, question_id) DO UPDATE SET \
             selected_option_id = EXCLUDED.selected_option_id, \
             answer_text = EXCLUDED.answer_text, \
             is_correct = EXCLUDED.is_correct, \
             points = EXCLUDED.points, \
             updated_at = EXCLUDED.updated_at \
             RETURNING {ANSWER_COLUMNS}"
        ))
        .bind(answer.id)
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(answer.selected_option_id)
        .bind(answer.answer_text)
        .bind(answer.is_correct)
        .bind(answer.points)
        .bind(answer.now)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError> {
        let answers = sqlx::query_as::<_, Answer>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE attempt_id = $1 ORDER BY created_at"
        ))
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        update: FinalizeAttempt,
    ) -> Result<Attempt, StoreError> {
        let attempt = sqlx::query_as::<_, Attempt>(&format!(
            "UPDATE attempts SET status = $1, submitted_at = $2, time_spent_minutes = $3, \
             score = $4, updated_at = $2 WHERE id = $5 \
             RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(AttemptStatus::Submitted)
        .bind(update.submitted_at)
        .bind(update.time_spent_minutes)
        .bind(update.score)
        .bind(attempt_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn update_answer_points(
        &self,
        attempt_id: &str,
        question_id: &str,
        points: f64,
        now: PrimitiveDateTime,
    ) -> Result<Option<Answer>, StoreError> {
        let answer = sqlx::query_as::<_, Answer>(&format!(
            "UPDATE answers SET points = $1, updated_at = $2 \
             WHERE attempt_id = $3 AND question_id = $4 \
             RETURNING {ANSWER_COLUMNS}"
        ))
        .bind(points)
        .bind(now)
        .bind(attempt_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(answer)
    }

    async fn list_attempts_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttemptWithAnswers>, StoreError> {
        let attempts = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE student_id = $1 \
             ORDER BY started_at DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        let attempt_ids: Vec<String> = attempts.iter().map(|a| a.id.clone()).collect();
        let mut grouped: HashMap<String, Vec<Answer>> = HashMap::new();
        if !attempt_ids.is_empty() {
            let answers = sqlx::query_as::<_, Answer>(&format!(
                "SELECT {ANSWER_COLUMNS} FROM answers WHERE attempt_id = ANY($1)"
            ))
            .bind(&attempt_ids)
            .fetch_all(&self.pool)
            .await?;
            for answer in answers {
                grouped.entry(answer.attempt_id.clone()).or_default().push(answer);
            }
        }

        Ok(attempts
            .into_iter()
            .map(|attempt| {
                let answers = grouped.remove(&attempt.id).unwrap_or_default();
                AttemptWithAnswers { attempt, answers }
            })
            .collect())
    }

    async fn list_attempts_by_exam(&self, exam_id: &str) -> Result<Vec<Attempt>, StoreError> {
        let attempts = sqlx::query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE exam_id = $1 \
             ORDER BY submitted_at DESC NULLS LAST"
        ))
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn list_attempts_needing_grading(
        &self,
        teacher_id: &str,
    ) -> Result<Vec<Attempt>, StoreError> {
        let attempts = sqlx::query_as::<_, Attempt>(
            "SELECT a.id, a.exam_id, a.student_id, a.status, a.started_at, a.submitted_at, \
                    a.time_spent_minutes, a.score, a.created_at, a.updated_at \
             FROM attempts a \
             JOIN exams e ON e.id = a.exam_id \
             WHERE e.created_by = $1 \
               AND a.status = $2 \
               AND EXISTS ( \
                   SELECT 1 FROM answers ans \
                   JOIN questions q ON q.id = ans.question_id \
                   WHERE ans.attempt_id = a.id AND q.question_type = $3) \
             ORDER BY a.submitted_at DESC NULLS LAST",
        )
        .bind(teacher_id)
        .bind(AttemptStatus::Submitted)
        .bind(QuestionType::Text)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }

    async fn delete_attempt(&self, attempt_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM attempts WHERE id = $1")
            .bind(attempt_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
