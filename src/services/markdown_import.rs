//! Parser for the teacher-authored markdown exam format.
//!
//! The format is a fixed convention, not arbitrary markdown: a level-1 title,
//! `**Môn học:**` / `**Thời gian:**` metadata markers, then one `## Câu N:`
//! block per question. The marker words are literal tokens of the source
//! format and are matched as-is. Parsing is a flat sequence of independent
//! extract-or-default / extract-or-fail steps rather than a grammar.

use std::sync::OnceLock;

use regex::Regex;

use crate::db::types::QuestionType;
use crate::schemas::exam::{ExamDocument, OptionDraft, QuestionDraft};

/// Structural problem in an imported markdown document. The reason names the
/// missing or malformed marker and is shown to the importing teacher as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub reason: String,
}

impl ValidationError {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

struct Patterns {
    title: Regex,
    question_heading: Regex,
    question_marker: Regex,
    subject_marker: Regex,
    subject: Regex,
    duration_marker: Regex,
    duration: Regex,
    description: Regex,
    question_type: Regex,
    points: Regex,
    text_terminator: Regex,
    sample_answer: Regex,
    answer_key: Regex,
    option: Regex,
    trailing_rule: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        title: Regex::new(r"(?m)^#\s+(.+)$").expect("title pattern"),
        question_heading: Regex::new(r"(?m)^##\s+Câu\s+\d+").expect("question heading pattern"),
        question_marker: Regex::new(r"(?m)^##\s+Câu\s+(\d+):[^\n]*$")
            .expect("question marker pattern"),
        subject_marker: Regex::new(r"\*\*Môn học:\*\*").expect("subject marker pattern"),
        subject: Regex::new(r"\*\*Môn học:\*\*\s*(.+)").expect("subject pattern"),
        duration_marker: Regex::new(r"\*\*Thời gian:\*\*").expect("duration marker pattern"),
        duration: Regex::new(r"\*\*Thời gian:\*\*\s*(\d+)\s*phút").expect("duration pattern"),
        description: Regex::new(r"\*\*Mô tả:\*\*\s*(.+)").expect("description pattern"),
        question_type: Regex::new(r"(?i)\*\*Loại:\*\*\s*(multiple-choice|multiple-select|text)")
            .expect("question type pattern"),
        points: Regex::new(r"\*\*Điểm:\*\*\s*(\d+)").expect("points pattern"),
        text_terminator: Regex::new(r"\n-\s+[A-Z]\.|\n\*\*Đáp án").expect("terminator pattern"),
        sample_answer: Regex::new(r"(?s)\*\*Đáp án mẫu:\*\*\s*\n(.+)")
            .expect("sample answer pattern"),
        answer_key: Regex::new(r"\*\*Đáp án:\*\*\s*([A-Z,\s]+)").expect("answer key pattern"),
        option: Regex::new(r"-\s*([A-Z])\.\s*([^\n]+)").expect("option pattern"),
        trailing_rule: Regex::new(r"\n*---\s*$").expect("trailing rule pattern"),
    })
}

/// Converts raw markdown into an [`ExamDocument`] or fails with the first
/// structural problem found. Validation short-circuits in a fixed order:
/// empty content, missing title, missing question marker, missing subject,
/// missing duration.
pub fn parse_markdown_exam(content: &str) -> Result<ExamDocument, ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::new("content must not be empty"));
    }

    validate_structure(content)?;

    let header = parse_header(content);
    let questions = parse_questions(content)?;

    Ok(ExamDocument {
        title: header.title,
        subject: header.subject,
        duration_minutes: header.duration_minutes,
        description: header.description,
        questions,
    })
}

fn validate_structure(content: &str) -> Result<(), ValidationError> {
    let patterns = patterns();

    if !patterns.title.is_match(content) {
        return Err(ValidationError::new("must have a title"));
    }
    if !patterns.question_heading.is_match(content) {
        return Err(ValidationError::new("must have at least one question"));
    }
    if !patterns.subject_marker.is_match(content) {
        return Err(ValidationError::new("missing subject"));
    }
    if !patterns.duration_marker.is_match(content) {
        return Err(ValidationError::new("missing duration"));
    }
    Ok(())
}

struct Header {
    title: String,
    subject: String,
    duration_minutes: i32,
    description: Option<String>,
}

fn parse_header(content: &str) -> Header {
    let patterns = patterns();

    let title = patterns
        .title
        .captures(content)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| "Untitled Exam".to_string());

    let subject = patterns
        .subject
        .captures(content)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    let duration_minutes = patterns
        .duration
        .captures(content)
        .and_then(|caps| caps[1].parse::<i32>().ok())
        .unwrap_or(60);

    let description = patterns.description.captures(content).map(|caps| caps[1].trim().to_string());

    Header { title, subject, duration_minutes, description }
}

fn parse_questions(content: &str) -> Result<Vec<QuestionDraft>, ValidationError> {
    let patterns = patterns();

    let markers: Vec<regex::Match<'_>> = patterns.question_marker.find_iter(content).collect();

    let mut segments = Vec::new();
    for (index, marker) in markers.iter().enumerate() {
        let body_start = marker.end();
        let body_end = markers.get(index + 1).map(|next| next.start()).unwrap_or(content.len());
        let body = content[body_start..body_end].trim();
        let body = patterns.trailing_rule.replace(body, "");
        let body = body.trim();
        if body.is_empty() {
            continue;
        }
        segments.push(body.to_string());
    }

    if segments.is_empty() {
        return Err(ValidationError::new("no questions found"));
    }

    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| parse_question(segment, index as i32 + 1))
        .collect()
}

fn parse_question(content: &str, order: i32) -> Result<QuestionDraft, ValidationError> {
    let patterns = patterns();

    let question_type = match patterns.question_type.captures(content) {
        Some(caps) => match caps[1].to_ascii_lowercase().as_str() {
            "multiple-select" => QuestionType::MultipleSelect,
            "text" => QuestionType::Text,
            _ => QuestionType::MultipleChoice,
        },
        None => QuestionType::MultipleChoice,
    };

    let points = patterns
        .points
        .captures(content)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .unwrap_or(1.0);

    let text = extract_question_text(content);

    if question_type == QuestionType::Text {
        let sample_answer =
            patterns.sample_answer.captures(content).map(|caps| caps[1].trim().to_string());
        return Ok(QuestionDraft {
            text,
            question_type,
            points,
            order,
            options: Vec::new(),
            sample_answer,
        });
    }

    let answer_letters: Vec<String> = patterns
        .answer_key
        .captures(content)
        .map(|caps| caps[1].split(',').map(|letter| letter.trim().to_string()).collect())
        .unwrap_or_default();

    let options: Vec<OptionDraft> = patterns
        .option
        .captures_iter(content)
        .enumerate()
        .map(|(index, caps)| OptionDraft {
            text: caps[2].trim().to_string(),
            is_correct: answer_letters.iter().any(|letter| letter == &caps[1]),
            order: index as i32 + 1,
        })
        .collect();

    if options.is_empty() {
        return Err(ValidationError::new(format!("Question {order}: no options found")));
    }

    Ok(QuestionDraft { text, question_type, points, order, options, sample_answer: None })
}

/// The question text sits between the points marker line and the first option
/// line or answer marker. Both boundaries are required; without them the
/// extraction gives up and falls back to a placeholder.
fn extract_question_text(content: &str) -> String {
    let patterns = patterns();

    let Some(points_match) = patterns.points.find(content) else {
        return "No question text".to_string();
    };

    let rest = &content[points_match.end()..];
    let gap_len = rest.len() - rest.trim_start().len();
    let (gap, body) = rest.split_at(gap_len);
    if !gap.contains('\n') {
        return "No question text".to_string();
    }

    match patterns.text_terminator.find(body) {
        Some(terminator) => body[..terminator.start()].trim().to_string(),
        None => "No question text".to_string(),
    }
}
