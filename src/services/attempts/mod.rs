//! Attempt lifecycle engine: starting attempts, recording answers, scoring at
//! submission, and manual grading of essay answers.
//!
//! Every operation takes the caller as an explicit [`Actor`] and enforces
//! ownership and role checks itself; the transport layer only authenticates.

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Attempt};
use crate::db::types::{AttemptStatus, ExamStatus, UserRole};
use crate::schemas::attempt::{AnswerSubmission, GradeEssayRequest, SubmitAttemptRequest};
use crate::schemas::auth::Actor;
use crate::services::errors::ServiceError;
use crate::store::{ExamStore, FinalizeAttempt, NewAttempt, StoreError, UpsertAnswer};


/// Attempt row plus answer tallies, for the student's own attempt list.
#[derive(Debug, Clone)]
pub struct AttemptSummary {
    pub attempt: Attempt,
    pub answered_questions: usize,
    pub correct_answers: usize,
}

#[derive(Debug, Clone)]
pub struct AttemptDetail {
    pub attempt: Attempt,
    pub answers: Vec<Answer>,
}

pub struct AttemptService {
    store: Arc<dyn ExamStore>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn ExamStore>) -> Self {
        Self { store }
    }

    /// Opens a new attempt on a published exam. A student gets exactly one
    /// attempt per exam; the storage uniqueness constraint backs this up
    /// against concurrent starts.
    pub async fn start_attempt(
        &self,
        actor: &Actor,
        exam_id: &str,
    ) -> Result<Attempt, ServiceError> {
        let bundle = self
            .store
            .find_exam_with_questions(exam_id)
            .await?
            .ok_or_else(|| exam_not_found(exam_id))?;

        if bundle.exam.status == ExamStatus::Archived {
            return Err(ServiceError::Conflict(
                "This exam is archived and cannot be attempted".to_string(),
            ));
        }
        if bundle.questions.is_empty() {
            return Err(ServiceError::InvalidInput("This exam has no questions".to_string()));
        }

        if self
            .store
            .find_attempt_by_student_and_exam(&actor.user_id, exam_id)
            .await?
            .is_some()
        {
            return Err(already_attempted());
        }

        let now = primitive_now_utc();
        let attempt = self
            .store
            .create_attempt(NewAttempt {
                id: &Uuid::new_v4().to_string(),
                exam_id,
                student_id: &actor.user_id,
                started_at: now,
                now,
            })
            .await
            .map_err(|err| match err {
                // lost the race against a concurrent start by the same student
                StoreError::Conflict(_) => already_attempted(),
                other => other.into(),
            })?;

        metrics::counter!("attempts_started_total").increment(1);
        tracing::info!(attempt_id = %attempt.id, exam_id, "attempt started");

        Ok(attempt)
    }

    /// Records or replaces the answer to one question. Objective answers are
    /// scored immediately; essay answers stay at zero points until graded.
    pub async fn submit_answer(
        &self,
        actor: &Actor,
        attempt_id: &str,
        submission: &AnswerSubmission,
    ) -> Result<Answer, ServiceError> {
        submission.validate().map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

        let attempt = self.require_attempt(attempt_id).await?;
        if attempt.student_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "You can only submit answers to your own attempt".to_string(),
            ));
        }
        if attempt.status != AttemptStatus::InProgress {
            return Err(ServiceError::Conflict(
                "This attempt has already been submitted".to_string(),
            ));
        }

        let found = self
            .store
            .find_question_with_options(&submission.question_id)
            .await?
            .filter(|found| found.question.exam_id == attempt.exam_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Question with ID {} not found in this exam",
                    submission.question_id
                ))
            })?;

        let (is_correct, points) = if found.question.question_type.requires_manual_grading() {
            (false, 0.0)
        } else {
            let correct = submission
                .selected_option_id
                .as_deref()
                .map(|selected| {
                    found
                        .options
                        .iter()
                        .any(|option| option.id == selected && option.is_correct)
                })
                .unwrap_or(false);
            (correct, if correct { found.question.points } else { 0.0 })
        };

        let answer = self
            .store
            .upsert_answer(UpsertAnswer {
                id: &Uuid::new_v4().to_string(),
                attempt_id,
                question_id: &submission.question_id,
                selected_option_id: submission.selected_option_id.as_deref(),
                answer_text: submission.answer_text.as_deref(),
                is_correct,
                points,
                now: primitive_now_utc(),
            })
            .await?;

        Ok(answer)
    }

    /// Closes the attempt and computes its score as a percentage of the
    /// exam's total points. Essay answers contribute whatever points they
    /// carry at this moment, which is zero unless they were graded early.
    pub async fn submit_attempt(
        &self,
        actor: &Actor,
        attempt_id: &str,
        request: &SubmitAttemptRequest,
    ) -> Result<Attempt, ServiceError> {
        request.validate().map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

        let attempt = self.require_attempt(attempt_id).await?;
        if attempt.student_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "You can only submit your own attempt".to_string(),
            ));
        }
        if attempt.status != AttemptStatus::InProgress {
            return Err(ServiceError::Conflict(
                "This attempt has already been submitted".to_string(),
            ));
        }

        let bundle = self
            .store
            .find_exam_with_questions(&attempt.exam_id)
            .await?
            .ok_or_else(|| exam_not_found(&attempt.exam_id))?;
        let answers = self.store.list_answers(attempt_id).await?;

        let max_points: f64 = bundle.questions.iter().map(|entry| entry.question.points).sum();
        let earned_points: f64 = answers.iter().map(|answer| answer.points).sum();
        let score = compute_score(earned_points, max_points);

        let attempt = self
            .store
            .finalize_attempt(
                attempt_id,
                FinalizeAttempt {
                    submitted_at: primitive_now_utc(),
                    time_spent_minutes: request.time_spent_minutes,
                    score,
                },
            )
            .await?;

        metrics::counter!("attempts_submitted_total").increment(1);
        tracing::info!(attempt_id, score, "attempt submitted");

        Ok(attempt)
    }

    /// Assigns points to one essay answer of a submitted attempt. The stored
    /// attempt score is not recomputed here; it keeps the value fixed at
    /// submission time.
    pub async fn grade_essay_answer(
        &self,
        actor: &Actor,
        attempt_id: &str,
        request: &GradeEssayRequest,
    ) -> Result<Answer, ServiceError> {
        request.validate().map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

        if !actor.is_instructor() {
            return Err(ServiceError::Forbidden(
                "Only teachers can grade essay answers".to_string(),
            ));
        }

        let attempt = self.require_attempt(attempt_id).await?;
        if attempt.status == AttemptStatus::InProgress {
            return Err(ServiceError::Conflict(
                "This attempt has not been submitted yet".to_string(),
            ));
        }

        let bundle = self
            .store
            .find_exam_with_questions(&attempt.exam_id)
            .await?
            .ok_or_else(|| exam_not_found(&attempt.exam_id))?;

        if actor.role != UserRole::Admin && bundle.exam.created_by != actor.user_id {
            return Err(ServiceError::Forbidden(
                "You can only grade attempts for your own exams".to_string(),
            ));
        }

        let question = bundle
            .questions
            .iter()
            .map(|entry| &entry.question)
            .find(|question| question.id == request.question_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Question with ID {} not found in this exam",
                    request.question_id
                ))
            })?;

        if !question.question_type.requires_manual_grading() {
            return Err(ServiceError::InvalidInput(format!(
                "Question {} is not an essay question",
                question.id
            )));
        }
        if request.points < 0.0 || request.points > question.points {
            return Err(ServiceError::InvalidInput(format!(
                "Points ({}) must be between 0 and the question maximum ({})",
                request.points, question.points
            )));
        }

        let answer = self
            .store
            .update_answer_points(attempt_id, &question.id, request.points, primitive_now_utc())
            .await?
            .ok_or_else(|| {
                ServiceError::Conflict(format!(
                    "No answer recorded for question {} in this attempt",
                    question.id
                ))
            })?;

        metrics::counter!("essay_answers_graded_total").increment(1);

        Ok(answer)
    }

    /// The caller's own attempts, newest first, with answer tallies.
    pub async fn get_student_attempts(
        &self,
        actor: &Actor,
    ) -> Result<Vec<AttemptSummary>, ServiceError> {
        let rows = self.store.list_attempts_by_student(&actor.user_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| AttemptSummary {
                answered_questions: row.answers.len(),
                correct_answers: row.answers.iter().filter(|answer| answer.is_correct).count(),
                attempt: row.attempt,
            })
            .collect())
    }

    /// One attempt with its answers. Visible to the attempt's student, the
    /// teacher who created the exam, and admins.
    pub async fn get_attempt(
        &self,
        actor: &Actor,
        attempt_id: &str,
    ) -> Result<AttemptDetail, ServiceError> {
        let attempt = self.require_attempt(attempt_id).await?;

        if attempt.student_id != actor.user_id && actor.role != UserRole::Admin {
            let owns_exam = self
                .store
                .find_exam_with_questions(&attempt.exam_id)
                .await?
                .map(|bundle| bundle.exam.created_by == actor.user_id)
                .unwrap_or(false);
            if !(actor.is_instructor() && owns_exam) {
                return Err(ServiceError::Forbidden(
                    "You do not have permission to view this attempt".to_string(),
                ));
            }
        }

        let answers = self.store.list_answers(attempt_id).await?;
        Ok(AttemptDetail { attempt, answers })
    }

    /// All attempts on one exam, most recently submitted first.
    pub async fn get_exam_attempts(
        &self,
        actor: &Actor,
        exam_id: &str,
    ) -> Result<Vec<Attempt>, ServiceError> {
        if !actor.is_instructor() {
            return Err(ServiceError::Forbidden(
                "Only teachers can view exam attempts".to_string(),
            ));
        }
        Ok(self.store.list_attempts_by_exam(exam_id).await?)
    }

    /// Submitted attempts on the caller's exams that contain at least one
    /// essay answer awaiting points.
    pub async fn get_attempts_needing_grading(
        &self,
        actor: &Actor,
    ) -> Result<Vec<Attempt>, ServiceError> {
        if !actor.is_instructor() {
            return Err(ServiceError::Forbidden(
                "Only teachers can view attempts needing grading".to_string(),
            ));
        }
        Ok(self.store.list_attempts_needing_grading(&actor.user_id).await?)
    }

    pub async fn delete_attempt(
        &self,
        actor: &Actor,
        attempt_id: &str,
    ) -> Result<(), ServiceError> {
        let attempt = self.require_attempt(attempt_id).await?;
        if attempt.student_id != actor.user_id {
            return Err(ServiceError::Forbidden(
                "You can only delete your own attempt".to_string(),
            ));
        }
        if !self.store.delete_attempt(attempt_id).await? {
            return Err(attempt_not_found(attempt_id));
        }
        tracing::info!(attempt_id, "attempt deleted");
        Ok(())
    }

    async fn require_attempt(&self, attempt_id: &str) -> Result<Attempt, ServiceError> {
        self.store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| attempt_not_found(attempt_id))
    }
}

/// Percentage of `max` earned, rounded to two decimal places. An exam whose
/// questions carry no points scores zero.
pub(crate) fn compute_score(earned: f64, max: f64) -> f64 {
    if max > 0.0 {
        ((earned / max) * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    }
}

fn already_attempted() -> ServiceError {
    ServiceError::Conflict("You have already attempted this exam".to_string())
}

fn exam_not_found(exam_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("Exam with ID {exam_id} not found"))
}

fn attempt_not_found(attempt_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("Attempt with ID {attempt_id} not found"))
}
