pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    analysis_service::AnalysisService, score_service::ScoreService,
    variant_service::VariantService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub variant_service: VariantService,
    pub score_service: ScoreService,
    pub analysis_service: AnalysisService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let variant_service = VariantService::new(pool.clone());
        let score_service = ScoreService::new(pool.clone());
        let analysis_service = AnalysisService::new(pool.clone());

        Self {
            pool,
            variant_service,
            score_service,
            analysis_service,
        }
    }
}
