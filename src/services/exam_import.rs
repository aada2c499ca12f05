//! Import pipeline turning teacher-authored markdown into a persisted draft
//! exam: authorize, validate the payload, parse, store.

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::core::time::primitive_now_utc;
use crate::db::models::Exam;
use crate::schemas::auth::Actor;
use crate::schemas::exam::ImportMarkdownRequest;
use crate::services::errors::ServiceError;
use crate::services::markdown_import::parse_markdown_exam;
use crate::store::ExamStore;

pub struct ExamImportService {
    store: Arc<dyn ExamStore>,
}

impl ExamImportService {
    pub fn new(store: Arc<dyn ExamStore>) -> Self {
        Self { store }
    }

    /// Parses the markdown payload and persists the resulting exam as a draft
    /// owned by the importing teacher. The whole exam is written in one
    /// transaction; a parse failure leaves nothing behind.
    pub async fn import_markdown(
        &self,
        actor: &Actor,
        request: &ImportMarkdownRequest,
    ) -> Result<Exam, ServiceError> {
        if !actor.is_instructor() {
            return Err(ServiceError::Forbidden(
                "Only teachers can import exams".to_string(),
            ));
        }

        request.validate().map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

        let document = parse_markdown_exam(&request.markdown_content)?;

        let now = primitive_now_utc();
        let exam = self
            .store
            .create_exam(&Uuid::new_v4().to_string(), &document, &actor.user_id, now)
            .await?;

        metrics::counter!("exams_imported_total").increment(1);
        metrics::counter!("exam_questions_imported_total")
            .increment(document.questions.len() as u64);
        tracing::info!(
            exam_id = %exam.id,
            questions = document.questions.len(),
            "imported markdown exam"
        );

        Ok(exam)
    }
}
