use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use examgen_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    let app = Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/exams/:exam_id/generations",
            get(routes::generation::list_generations).post(routes::generation::create_generation),
        )
        .route(
            "/api/generations/:generation_id",
            get(routes::generation::get_generation),
        )
        .route(
            "/api/generations/:generation_id/results",
            post(routes::results::upload_results),
        )
        .route(
            "/api/exams/:exam_id/results",
            get(routes::results::list_results),
        )
        .route(
            "/api/exams/:exam_id/analysis",
            get(routes::analysis::get_analysis),
        )
        .route(
            "/api/exams/:exam_id/analysis/export",
            get(routes::analysis::export_analysis),
        )
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
