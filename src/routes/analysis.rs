use crate::{
    error::Result,
    services::export_service::{ExportSections, ExportService, ExportView},
    services::psychometrics::AnalysisOptions,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

#[derive(Debug, serde::Deserialize, Default)]
#[serde(default)]
pub struct AnalysisQuery {
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub confidence: Option<f64>,
}

impl AnalysisQuery {
    fn into_options(self) -> AnalysisOptions {
        let percentile_range = match (self.from, self.to) {
            (None, None) => None,
            (from, to) => Some((from.unwrap_or(0.0), to.unwrap_or(100.0))),
        };
        AnalysisOptions {
            percentile_range,
            confidence_level: self
                .confidence
                .unwrap_or_else(|| crate::config::get_config().analysis_confidence),
        }
    }
}

pub async fn get_analysis(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
    Query(query): Query<AnalysisQuery>,
) -> Result<impl IntoResponse> {
    let analysis = state
        .analysis_service
        .analyze_exam(exam_id, query.into_options())
        .await?;
    Ok(Json(analysis))
}

#[derive(Debug, serde::Deserialize, Default)]
#[serde(default)]
pub struct ExportQuery {
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub confidence: Option<f64>,
    pub view: Option<String>,
    /// Comma-separated statistic sections to include; absent means all.
    pub sections: Option<String>,
}

pub async fn export_analysis(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse> {
    let view = match &query.view {
        Some(raw) => ExportView::parse(raw).ok_or_else(|| {
            crate::error::Error::BadRequest(format!("unknown export view '{}'", raw))
        })?,
        None => ExportView::Items,
    };
    let sections = parse_sections(query.sections.as_deref());

    let options = AnalysisQuery {
        from: query.from,
        to: query.to,
        confidence: query.confidence,
    }
    .into_options();

    let analysis = state.analysis_service.analyze_exam(exam_id, options).await?;

    let (body, filename) = match view {
        ExportView::Items => (
            ExportService::render_items_csv(&analysis, &sections),
            format!("exam_{}_items.csv", exam_id),
        ),
        ExportView::Students => (
            ExportService::render_students_csv(&analysis),
            format!("exam_{}_students.csv", exam_id),
        ),
    };
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

fn parse_sections(raw: Option<&str>) -> ExportSections {
    match raw {
        None => ExportSections::default(),
        Some(list) => {
            let names: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            ExportSections {
                significance: names.iter().any(|n| n == "significance"),
                distractors: names.iter().any(|n| n == "distractors"),
            }
        }
    }
}
