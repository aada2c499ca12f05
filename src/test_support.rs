//! In-memory [`ExamStore`] plus fixture builders shared by service tests.

use std::sync::Mutex;

use async_trait::async_trait;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Attempt, Exam, Question, QuestionOption};
use crate::db::types::{AttemptStatus, ExamStatus, QuestionType, UserRole};
use crate::schemas::auth::Actor;
use crate::schemas::exam::{ExamDocument, OptionDraft, QuestionDraft};
use crate::store::{
    AttemptWithAnswers, ExamBundle, ExamStore, FinalizeAttempt, NewAttempt, QuestionWithOptions,
    StoreError, UpsertAnswer, DEFAULT_PASSING_SCORE,
};

pub fn student(id: &str) -> Actor {
    Actor::new(id, UserRole::Student)
}

pub fn teacher(id: &str) -> Actor {
    Actor::new(id, UserRole::Teacher)
}

pub fn admin(id: &str) -> Actor {
    Actor::new(id, UserRole::Admin)
}

pub fn choice_question(text: &str, points: f64, correct_index: usize) -> QuestionDraft {
    let options = (0..4)
        .map(|index| OptionDraft {
            text: format!("option {}", index + 1),
            is_correct: index == correct_index,
            order: index as i32 + 1,
        })
        .collect();
    QuestionDraft {
        text: text.to_string(),
        question_type: QuestionType::MultipleChoice,
        points,
        order: 0,
        options,
        sample_answer: None,
    }
}

pub fn essay_question(text: &str, points: f64) -> QuestionDraft {
    QuestionDraft {
        text: text.to_string(),
        question_type: QuestionType::Text,
        points,
        order: 0,
        options: Vec::new(),
        sample_answer: Some("reference answer".to_string()),
    }
}

pub fn document(questions: Vec<QuestionDraft>) -> ExamDocument {
    let questions = questions
        .into_iter()
        .enumerate()
        .map(|(index, mut question)| {
            question.order = index as i32 + 1;
            question
        })
        .collect();
    ExamDocument {
        title: "Fixture exam".to_string(),
        subject: "Testing".to_string(),
        duration_minutes: 45,
        description: None,
        questions,
    }
}

#[derive(Default)]
struct State {
    exams: Vec<Exam>,
    questions: Vec<Question>,
    options: Vec<QuestionOption>,
    attempts: Vec<Attempt>,
    answers: Vec<Answer>,
}

/// Vec-backed store with the same uniqueness semantics the schema enforces.
#[derive(Default)]
pub struct MemoryExamStore {
    state: Mutex<State>,
}

impl MemoryExamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists `document` as a published exam owned by `created_by` and
    /// returns it with questions attached, ready for attempts.
    pub async fn seed_exam(&self, document: &ExamDocument, created_by: &str) -> ExamBundle {
        let exam = self
            .create_exam(&Uuid::new_v4().to_string(), document, created_by, primitive_now_utc())
            .await
            .expect("seed exam");
        self.set_exam_status(&exam.id, ExamStatus::Published);
        self.find_exam_with_questions(&exam.id).await.expect("seeded exam").expect("seeded exam")
    }

    pub fn set_exam_status(&self, exam_id: &str, status: ExamStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(exam) = state.exams.iter_mut().find(|exam| exam.id == exam_id) {
            exam.status = status;
        }
    }

    fn bundle_for(state: &State, exam: &Exam) -> ExamBundle {
        let mut questions: Vec<QuestionWithOptions> = state
            .questions
            .iter()
            .filter(|question| question.exam_id == exam.id)
            .map(|question| QuestionWithOptions {
                question: question.clone(),
                options: Self::options_for(state, &question.id),
            })
            .collect();
        questions.sort_by_key(|entry| entry.question.order_index);
        ExamBundle { exam: exam.clone(), questions }
    }

    fn options_for(state: &State, question_id: &str) -> Vec<QuestionOption> {
        let mut options: Vec<QuestionOption> = state
            .options
            .iter()
            .filter(|option| option.question_id == question_id)
            .cloned()
            .collect();
        options.sort_by_key(|option| option.order_index);
        options
    }

    fn answers_for(state: &State, attempt_id: &str) -> Vec<Answer> {
        state.answers.iter().filter(|answer| answer.attempt_id == attempt_id).cloned().collect()
    }
}

#[async_trait]
impl ExamStore for MemoryExamStore {
    async fn create_exam(
        &self,
        id: &str,
        document: &ExamDocument,
        created_by: &str,
        now: PrimitiveDateTime,
    ) -> Result<Exam, StoreError> {
        let mut state = self.state.lock().unwrap();

        let exam = Exam {
            id: id.to_string(),
            title: document.title.clone(),
            subject: document.subject.clone(),
            description: document.description.clone(),
            duration_minutes: document.duration_minutes,
            status: ExamStatus::Draft,
            passing_score: DEFAULT_PASSING_SCORE,
            max_attempts: None,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };

        for draft in &document.questions {
            let question_id = Uuid::new_v4().to_string();
            state.questions.push(Question {
                id: question_id.clone(),
                exam_id: exam.id.clone(),
                question_text: draft.text.clone(),
                question_type: draft.question_type,
                points: draft.points,
                order_index: draft.order,
                sample_answer: draft.sample_answer.clone(),
                created_at: now,
            });
            for option in &draft.options {
                state.options.push(QuestionOption {
                    id: Uuid::new_v4().to_string(),
                    question_id: question_id.clone(),
                    option_text: option.text.clone(),
                    is_correct: option.is_correct,
                    order_index: option.order,
                });
            }
        }

        state.exams.push(exam.clone());
        Ok(exam)
    }

    async fn find_exam_with_questions(
        &self,
        exam_id: &str,
    ) -> Result<Option<ExamBundle>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .exams
            .iter()
            .find(|exam| exam.id == exam_id)
            .map(|exam| Self::bundle_for(&state, exam)))
    }

    async fn find_question_with_options(
        &self,
        question_id: &str,
    ) -> Result<Option<QuestionWithOptions>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.questions.iter().find(|question| question.id == question_id).map(|question| {
            QuestionWithOptions {
                question: question.clone(),
                options: Self::options_for(&state, &question.id),
            }
        }))
    }

    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.attempts.iter().find(|attempt| attempt.id == attempt_id).cloned())
    }

    async fn find_attempt_by_student_and_exam(
        &self,
        student_id: &str,
        exam_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .attempts
            .iter()
            .find(|attempt| attempt.student_id == student_id && attempt.exam_id == exam_id)
            .cloned())
    }

    async fn create_attempt(&self, attempt: NewAttempt<'_>) -> Result<Attempt, StoreError> {
        let mut state = self.state.lock().unwrap();
        let duplicate = state.attempts.iter().any(|existing| {
            existing.student_id == attempt.student_id && existing.exam_id == attempt.exam_id
        });
        if duplicate {
            return Err(StoreError::Conflict(
                "duplicate key value violates unique constraint \"uq_attempts_student_exam\""
                    .to_string(),
            ));
        }

        let row = Attempt {
            id: attempt.id.to_string(),
            exam_id: attempt.exam_id.to_string(),
            student_id: attempt.student_id.to_string(),
            status: AttemptStatus::InProgress,
            started_at: attempt.started_at,
            submitted_at: None,
            time_spent_minutes: None,
            score: None,
            created_at: attempt.now,
            updated_at: attempt.now,
        };
        state.attempts.push(row.clone());
        Ok(row)
    }

    async fn upsert_answer(&self, answer: UpsertAnswer<'_>) -> Result<Answer, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.answers.iter_mut().find(|existing| {
            existing.attempt_id == answer.attempt_id && existing.question_id == answer.question_id
        }) {
            existing.selected_option_id = answer.selected_option_id.map(str::to_string);
            existing.answer_text = answer.answer_text.map(str::to_string);
            existing.is_correct = answer.is_correct;
            existing.points = answer.points;
            existing.updated_at = answer.now;
            return Ok(existing.clone());
        }

        let row = Answer {
            id: answer.id.to_string(),
            attempt_id: answer.attempt_id.to_string(),
            question_id: answer.question_id.to_string(),
            selected_option_id: answer.selected_option_id.map(str::to_string),
            answer_text: answer.answer_text.map(str::to_string),
            is_correct: answer.is_correct,
            points: answer.points,
            created_at: answer.now,
            updated_at: answer.now,
        };
        state.answers.push(row.clone());
        Ok(row)
    }

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(Self::answers_for(&state, attempt_id))
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        update: FinalizeAttempt,
    ) -> Result<Attempt, StoreError> {
        let mut state = self.state.lock().unwrap();
        let attempt = state
            .attempts
            .iter_mut()
            .find(|attempt| attempt.id == attempt_id)
            .ok_or_else(|| StoreError::Backend("attempt row not found".to_string()))?;
        attempt.status = AttemptStatus::Submitted;
        attempt.submitted_at = Some(update.submitted_at);
        attempt.time_spent_minutes = Some(update.time_spent_minutes);
        attempt.score = Some(update.score);
        attempt.updated_at = update.submitted_at;
        Ok(attempt.clone())
    }

    async fn update_answer_points(
        &self,
        attempt_id: &str,
        question_id: &str,
        points: f64,
        now: PrimitiveDateTime,
    ) -> Result<Option<Answer>, StoreError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .answers
            .iter_mut()
            .find(|answer| answer.attempt_id == attempt_id && answer.question_id == question_id)
            .map(|answer| {
                answer.points = points;
                answer.updated_at = now;
                answer.clone()
            }))
    }

    async fn list_attempts_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttemptWithAnswers>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut attempts: Vec<Attempt> = state
            .attempts
            .iter()
            .filter(|attempt| attempt.student_id == student_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(attempts
            .into_iter()
            .map(|attempt| AttemptWithAnswers {
                answers: Self::answers_for(&state, &attempt.id),
                attempt,
            })
            .collect())
    }

    async fn list_attempts_by_exam(&self, exam_id: &str) -> Result<Vec<Attempt>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut attempts: Vec<Attempt> = state
            .attempts
            .iter()
            .filter(|attempt| attempt.exam_id == exam_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(attempts)
    }

    async fn list_attempts_needing_grading(
        &self,
        teacher_id: &str,
    ) -> Result<Vec<Attempt>, StoreError> {
        let state = self.state.lock().unwrap();
        let attempts = state
            .attempts
            .iter()
            .filter(|attempt| attempt.status == AttemptStatus::Submitted)
            .filter(|attempt| {
                state
                    .exams
                    .iter()
                    .any(|exam| exam.id == attempt.exam_id && exam.created_by == teacher_id)
            })
            .filter(|attempt| {
                state.answers.iter().any(|answer| {
                    answer.attempt_id == attempt.id
                        && state.questions.iter().any(|question| {
                            question.id == answer.question_id
                                && question.question_type == QuestionType::Text
                        })
                })
            })
            .cloned()
            .collect();
        Ok(attempts)
    }

    async fn delete_attempt(&self, attempt_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.attempts.len();
        state.attempts.retain(|attempt| attempt.id != attempt_id);
        state.answers.retain(|answer| answer.attempt_id != attempt_id);
        Ok(state.attempts.len() < before)
    }
}
