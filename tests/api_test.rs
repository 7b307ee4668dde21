use std::env;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use examination_backend::middleware::auth::Claims;
use examination_backend::routes;
use examination_backend::services::question_bank::QuestionBank;
use examination_backend::storage::memory::MemStore;
use examination_backend::AppState;

const JWT_SECRET: &str = "test_secret_key";
const ADMIN: &str = "admin@example.com";
const CANDIDATE: &str = "pilot@example.com";

fn token(email: &str, role: Option<&str>) -> String {
    let claims = Claims {
        sub: email.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        role: role.map(str::to_string),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode token")
}

fn test_bank() -> Arc<QuestionBank> {
    let mut questions = String::new();
    for id in 1..=40 {
        if id > 1 {
            questions.push(',');
        }
        questions.push_str(&format!(
            r#"{{"id": {}, "question": "Q{}", "options": {{"A": "a", "B": "b"}}, "correct_answer": "A"}}"#,
            id, id
        ));
    }
    let raw = format!(
        r#"{{"quiz_data": {{"categories": [{{"name": "Navigation", "questions": [{}]}}]}}}}"#,
        questions
    );
    Arc::new(QuestionBank::from_json(&raw).expect("bank"))
}

fn app() -> Router {
    let store = Arc::new(MemStore::new());
    let state = AppState::new(store, test_bank(), None);

    let admin_api = Router::new()
        .route(
            "/api/admin/assignments",
            get(routes::assignments::list_assignments).post(routes::assignments::create_assignment),
        )
        .route("/api/admin/scores", get(routes::assignments::list_scores))
        .layer(axum::middleware::from_fn(
            examination_backend::middleware::auth::require_admin,
        ));

    let exam_api = Router::new()
        .route(
            "/api/exam/my-assignments",
            get(routes::assignments::my_assignments),
        )
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
        .route("/api/exam/sections", get(routes::assignments::list_sections))
        .route(
            "/api/exam/notifications",
            get(routes::notifications::list_notifications),
        )
        .layer(axum::middleware::from_fn(
            examination_backend::middleware::auth::require_bearer_auth,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(admin_api)
        .merge(exam_api)
        .with_state(state)
}

async fn body_json(response: axum::response::Response) -> JsonValue {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn exam_api_end_to_end() {
    env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
    env::set_var("DATABASE_URL", "postgres://unused");
    env::set_var("JWT_SECRET", JWT_SECRET);
    env::set_var("QUESTION_BANK_PATH", "unused.json");
    examination_backend::config::init_config().expect("init config");

    let app = app();
    let admin_token = token(ADMIN, Some("admin"));
    let candidate_token = token(CANDIDATE, None);

    // Health is open.
    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // No token, no entry.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/exam/my-assignments")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A candidate token cannot reach the admin surface.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/admin/assignments")
                .header("Authorization", format!("Bearer {}", candidate_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin assigns a 10-question exam.
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/admin/assignments")
                .header("Authorization", format!("Bearer {}", admin_token))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"candidate_email": CANDIDATE, "total_questions": 10}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().expect("assignment id").to_string();
    assert_eq!(created["duration_seconds"], 600);

    // Candidate sees it in their listing.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/exam/my-assignments")
                .header("Authorization", format!("Bearer {}", candidate_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    assert_eq!(listing.as_array().unwrap().len(), 1);

    // Materializing starts the exam and returns the documents.
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/exam/assignments/{}/questions", id))
                .header("Authorization", format!("Bearer {}", candidate_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let exam = body_json(response).await;
    let questions = exam["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 10);
    assert_eq!(exam["expired"], false);

    // Status shows a running clock.
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/exam/assignments/{}/status", id))
                .header("Authorization", format!("Bearer {}", candidate_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = body_json(response).await;
    assert_eq!(status["started"], true);
    assert_eq!(status["finished"], false);
    assert!(status["remaining_seconds"].as_i64().unwrap() <= 600);

    // Submit a passing answer sheet built from the served questions.
    let answers: Vec<JsonValue> = questions
        .iter()
        .map(|q| json!({"section": q["section"], "id": q["id"], "answer": "A"}))
        .collect();
    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/api/exam/assignments/{}/score", id))
                .header("Authorization", format!("Bearer {}", candidate_token))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({"answers": answers}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["score"], 10);
    assert_eq!(outcome["passed"], true);

    // Outcome is visible on the admin score board.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/admin/scores")
                .header("Authorization", format!("Bearer {}", admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let scores = body_json(response).await;
    assert_eq!(scores.as_array().unwrap().len(), 1);
    assert_eq!(scores[0]["passed"], true);

    // Section listing and the stored notification round out the flow.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/exam/sections")
                .header("Authorization", format!("Bearer {}", candidate_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let sections = body_json(response).await;
    assert_eq!(sections["Navigation"], 40);

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/exam/notifications")
                .header("Authorization", format!("Bearer {}", candidate_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let notifications = body_json(response).await;
    let kinds: Vec<&str> = notifications
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"assignment_created"));
    assert!(kinds.contains(&"exam_passed"));
}
