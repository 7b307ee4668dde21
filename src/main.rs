use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use examination_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes,
    services::question_bank::QuestionBank,
    storage::postgres::PgStore,
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
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

    let bank = Arc::new(QuestionBank::load(&config.question_bank_path)?);
    info!(
        questions = bank.len(),
        sections = bank.section_counts().len(),
        "Question bank loaded"
    );

    // Detection backends plug in through the FaceDetector trait; without
    // one the monitor runs advisory and client-reported violations still
    // flow through the violation endpoint.
    let detector = None;
    if config.face_model_path.is_some() {
        tracing::warn!(
            "FACE_MODEL_PATH is set but no detection backend is compiled in; running advisory"
        );
    }

    let store = Arc::new(PgStore::new(pool));
    let app_state = AppState::new(store, bank, detector);

    {
        let state = app_state.clone();
        tokio::spawn(async move {
            loop {
                match state.assignment_service.expire_overdue_at(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => info!(expired = n, "Expiry sweep finished"),
                    Err(e) => tracing::error!("Expiry sweep error: {:?}", e),
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });
    }

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let admin_api = Router::new()
        .route(
            "/api/admin/assignments",
            get(routes::assignments::list_assignments).post(routes::assignments::create_assignment),
        )
        .route("/api/admin/scores", get(routes::assignments::list_scores))
        .route(
            "/api/admin/attempts/:email",
            get(routes::assignments::get_attempts),
        )
        .layer(axum::middleware::from_fn(
            examination_backend::middleware::auth::require_admin,
        ));

    let exam_api = Router::new()
        .route(
            "/api/exam/assignments",
            post(routes::assignments::create_own_assignment),
        )
        .route(
            "/api/exam/my-assignments",
            get(routes::assignments::my_assignments),
        )
        .route("/api/exam/attempts", get(routes::assignments::my_attempts))
        .route(
            "/api/exam/assignments/:id/questions",
            get(routes::assignments::get_questions),
        )
        .route(
            "/api/exam/assignments/:id/status",
            get(routes::assignments::get_status),
        )
        .route(
            "/api/exam/assignments/:id/score",
            post(routes::assignments::submit_score),
        )
        .route(
            "/api/exam/assignments/:id/frame",
            post(routes::proctoring::submit_frame),
        )
        .route(
            "/api/exam/assignments/:id/reference",
            post(routes::proctoring::setup_reference),
        )
        .route(
            "/api/exam/assignments/:id/violation",
            post(routes::proctoring::report_violation),
        )
        .route("/api/exam/sections", get(routes::assignments::list_sections))
        .route(
            "/api/exam/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/api/exam/notifications/read",
            post(routes::notifications::mark_notifications_read),
        )
        .layer(axum::middleware::from_fn(
            examination_backend::middleware::auth::require_bearer_auth,
        ));

    let app = base_routes
        .merge(admin_api)
        .merge(exam_api)
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
