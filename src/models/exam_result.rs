use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One student's scored sitting of an exam, produced by a successful
/// ingestion + persistence call.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamResult {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub student_id: String,
    pub student_name: Option<String>,
    pub term_id: String,
    pub course_id: String,
    pub variant_code: String,
    pub score: i32,
    pub total_points: i32,
    pub percentage: f64,
    pub upload_token: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A single graded answer, owned by its `ExamResult` (destroyed with it).
///
/// `answer` is the raw cell the student wrote (a variant-local option label
/// or a True/False literal); `selected_option` is the canonical option text
/// it resolved to, which is what cross-variant distractor analysis pools on.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudentAnswer {
    pub id: Uuid,
    pub result_id: Uuid,
    pub question_id: Uuid,
    pub answer: String,
    pub selected_option: Option<String>,
    pub is_correct: bool,
    pub points: i32,
}
