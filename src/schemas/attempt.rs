use serde::Deserialize;
use validator::Validate;

/// One answer submission for a single question inside an attempt.
/// `selected_option_id` carries the choice for objective questions,
/// `answer_text` the free-text body for essay questions.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnswerSubmission {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question id must not be empty"))]
    pub question_id: String,
    #[serde(default)]
    #[serde(alias = "selectedOptionId")]
    pub selected_option_id: Option<String>,
    #[serde(default)]
    #[serde(alias = "answerText")]
    pub answer_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    #[serde(alias = "timeSpent")]
    #[validate(range(min = 0, message = "time spent must not be negative"))]
    pub time_spent_minutes: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GradeEssayRequest {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question id must not be empty"))]
    pub question_id: String,
    #[validate(range(min = 0.0, message = "points must not be negative"))]
    pub points: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_submission_accepts_camel_case_payloads() {
        let payload = r#"{"questionId": "q-1", "selectedOptionId": "o-2"}"#;
        let submission: AnswerSubmission = serde_json::from_str(payload).unwrap();
        assert_eq!(submission.question_id, "q-1");
        assert_eq!(submission.selected_option_id.as_deref(), Some("o-2"));
        assert!(submission.answer_text.is_none());
    }

    #[test]
    fn submit_request_accepts_both_field_spellings() {
        let camel: SubmitAttemptRequest = serde_json::from_str(r#"{"timeSpent": 25}"#).unwrap();
        assert_eq!(camel.time_spent_minutes, 25);
        let snake: SubmitAttemptRequest =
            serde_json::from_str(r#"{"time_spent_minutes": 25}"#).unwrap();
        assert_eq!(snake.time_spent_minutes, 25);
    }
}
