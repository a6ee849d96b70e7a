use crate::{
    dto::results_dto::UploadResultsPayload,
    error::Result,
    services::ingest_service::{ResultIngestor, UploadContext},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

/// Upload an answer table against a generation: the five-stage validation
/// pipeline runs entirely in memory first, and only a fully valid batch
/// reaches the atomic persistence transaction.
#[axum::debug_handler]
pub async fn upload_results(
    State(state): State<AppState>,
    Path(generation_id): Path<Uuid>,
    Json(payload): Json<UploadResultsPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let (generation, variants) = state.variant_service.get_generation(generation_id).await?;
    let exam = state.variant_service.load_exam(generation.exam_id).await?;
    let questions = state
        .variant_service
        .load_questions(generation.exam_id)
        .await?;

    let ctx = UploadContext {
        questions: &questions,
        variants: &variants,
        number_of_variants: generation.number_of_variants,
        total_points: exam.total_points,
        roster: &payload.roster,
    };
    let scores = ResultIngestor::ingest(&payload.content, &ctx)?;

    let outcome = state
        .score_service
        .save_scores(
            exam.id,
            &payload.term_id,
            &payload.course_id,
            &scores,
            exam.total_points,
            payload.upload_token.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "count": outcome.count,
            "saved_results": outcome.saved_results,
            "replayed": outcome.replayed,
        })),
    ))
}

pub async fn list_results(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let results = state.score_service.list_results(exam_id).await?;
    Ok(Json(results))
}
