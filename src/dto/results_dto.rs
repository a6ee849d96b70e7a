use serde::Deserialize;
use validator::Validate;

use crate::services::ingest_service::RosterStudent;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UploadResultsPayload {
    #[validate(length(min = 1, message = "Term id cannot be empty"))]
    pub term_id: String,
    #[validate(length(min = 1, message = "Course id cannot be empty"))]
    pub course_id: String,
    /// The raw comma-separated answer table.
    #[validate(length(min = 1, message = "Upload content cannot be empty"))]
    pub content: String,
    /// Enrolled-student roster from the caller, for display names.
    #[serde(default)]
    pub roster: Vec<RosterStudent>,
    /// Optional idempotency key: replays with the same token return the
    /// originally persisted batch instead of appending.
    pub upload_token: Option<String>,
}
