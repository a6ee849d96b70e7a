use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An exam as created by instructor tooling. Immutable for this core;
/// `total_points` is the sum of its questions' points.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Exam {
    pub id: Uuid,
    pub title: String,
    pub total_points: i32,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
}

impl QuestionType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "multiple_choice" => Some(QuestionType::MultipleChoice),
            "true_false" => Some(QuestionType::TrueFalse),
            _ => None,
        }
    }
}

/// A canonical question. Never reordered; `position` is the stable join key
/// every variant permutes over.
///
/// `correct_answer` holds the text of the correct option — for true/false
/// questions that is the `True`/`False` literal itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub position: i32,
    pub question_type: String,
    pub prompt: String,
    pub options: sqlx::types::Json<Vec<String>>,
    pub correct_answer: String,
    pub points: i32,
    pub difficulty: Option<String>,
    pub topic: Option<String>,
}

impl Question {
    pub fn kind(&self) -> Option<QuestionType> {
        QuestionType::parse(&self.question_type)
    }

    /// Canonical index of the correct option within `options`.
    pub fn correct_option_index(&self) -> Option<usize> {
        self.options
            .iter()
            .position(|o| o.trim().eq_ignore_ascii_case(self.correct_answer.trim()))
    }
}
