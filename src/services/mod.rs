pub mod analysis_service;
pub mod answer_key;
pub mod export_service;
pub mod ingest_service;
pub mod psychometrics;
pub mod score_service;
pub mod variant_service;
