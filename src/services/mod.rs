pub mod attempts;
pub mod errors;
pub mod exam_import;
pub mod markdown_import;
