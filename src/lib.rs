//! Core of an online exam portal: a markdown-to-exam parser for bulk question
//! import and the attempt lifecycle engine (start, answer, submit, grade).
//! Persistence sits behind the [`store::ExamStore`] trait; [`store::PgExamStore`]
//! is the Postgres implementation.

pub mod core;
pub mod db;
pub mod schemas;
pub mod services;
pub mod store;

#[cfg(test)]
mod test_support;

pub use schemas::auth::Actor;
pub use services::attempts::{AttemptDetail, AttemptService, AttemptSummary};
pub use services::errors::ServiceError;
pub use services::exam_import::ExamImportService;
pub use services::markdown_import::{parse_markdown_exam, ValidationError};
