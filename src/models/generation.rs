use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Randomization switches for one "generate variants" action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub number_of_variants: i32,
    pub randomize_question_order: bool,
    pub randomize_option_order: bool,
    pub randomize_true_false: bool,
}

/// Generation lifecycle states, stored as text.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

/// A batch of variants created together under one randomization config.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Generation {
    pub id: Uuid,
    pub exam_id: Uuid,
    pub number_of_variants: i32,
    pub randomize_question_order: bool,
    pub randomize_option_order: bool,
    pub randomize_true_false: bool,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One shuffled rendering of an exam. Immutable once created.
///
/// `question_order[p]` is the canonical question index shown at local
/// position `p`; `option_orders[c]` is the option permutation (local option
/// position → canonical option index) for the question at canonical index
/// `c`. Both are bijections over their respective ranges.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Variant {
    pub id: Uuid,
    pub generation_id: Uuid,
    pub variant_number: i32,
    pub variant_code: String,
    pub question_order: Vec<i32>,
    pub option_orders: sqlx::types::Json<Vec<Vec<i32>>>,
    pub created_at: Option<DateTime<Utc>>,
}
