use crate::{dto::generation_dto::GenerateVariantsPayload, error::Result, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

#[axum::debug_handler]
pub async fn create_generation(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
    Json(payload): Json<GenerateVariantsPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let (generation, variants) = state
        .variant_service
        .create_generation(exam_id, payload.into_config())
        .await?;

    let response = json!({
        "generation": generation,
        "variants": variants
            .iter()
            .map(|v| json!({
                "id": v.id,
                "variant_number": v.variant_number,
                "variant_code": v.variant_code,
            }))
            .collect::<Vec<_>>(),
    });

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_generations(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let generations = state.variant_service.list_generations(exam_id).await?;
    Ok(Json(generations))
}

pub async fn get_generation(
    State(state): State<AppState>,
    Path(generation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (generation, variants) = state.variant_service.get_generation(generation_id).await?;
    Ok(Json(json!({
        "generation": generation,
        "variants": variants,
    })))
}
