//! End-to-end tests for the underwriting API

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Local};
use microloan::api::{create_router, AppState};
use microloan::core::training::{train, TrainingConfig};
use microloan::models::{RateLimitConfig, ServerConfig};
use microloan::{Database, ModelArtifact, UnderwritingModel};
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tower::ServiceExt;

fn artifact() -> ModelArtifact {
    static ARTIFACT: OnceLock<ModelArtifact> = OnceLock::new();
    ARTIFACT
        .get_or_init(|| train(&TrainingConfig::default()).unwrap().0)
        .clone()
}

fn app_with(config: ServerConfig) -> Router {
    let model = UnderwritingModel::new(artifact()).unwrap();
    let db = Database::in_memory().unwrap();
    create_router(Arc::new(AppState::new(config, model, db)))
}

fn app() -> Router {
    app_with(ServerConfig::default())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Top of every sampled range
fn strong_applicant(user_id: &str, amount: f64) -> Value {
    json!({
        "user_id": user_id,
        "loan_amount": amount,
        "transaction_frequency": 20.0,
        "avg_transaction_amount": 200.0,
        "utility_payment_consistency": 1.0,
        "airtime_topup_frequency": 10.0,
    })
}

/// Bottom of every sampled range
fn weak_applicant(user_id: &str) -> Value {
    json!({
        "user_id": user_id,
        "loan_amount": 500.0,
        "transaction_frequency": 0.0,
        "avg_transaction_amount": 10.0,
        "utility_payment_consistency": 0.0,
        "airtime_topup_frequency": 0.0,
    })
}

fn repayment(user_id: &str, loan_id: &str, amount: f64, days_from_today: i64) -> Value {
    let date = Local::now().date_naive() + ChronoDuration::days(days_from_today);
    json!({
        "user_id": user_id,
        "loan_id": loan_id,
        "payment_date": date.format("%Y-%m-%d").to_string(),
        "amount": amount,
    })
}

async fn approved_loan(app: &Router, user_id: &str, amount: f64) -> String {
    let (status, body) = send(app, post("/loan/apply", &strong_applicant(user_id, amount))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "approve");
    body["loan_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_at_root_and_v1() {
    let app = app();
    for uri in ["/health", "/v1/health"] {
        let (status, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_version"], 1);
    }
}

#[tokio::test]
async fn test_apply_approves_strong_applicant() {
    let app = app();
    let (status, body) = send(&app, post("/loan/apply", &strong_applicant("user123", 1000.0))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "approve");
    assert!(body["score"].as_f64().unwrap() > 70.0);
    assert!(body["loan_id"].as_str().unwrap().starts_with("Luser123_"));
    assert_eq!(body["points_earned"], 50);
    assert_eq!(body["badges_earned"], json!(["First Application"]));

    let explanation = body["explanation"].as_object().unwrap();
    assert_eq!(explanation.len(), 4);
    assert!(explanation["utility_payment_consistency"].as_f64().unwrap() > 0.0);

    let due = (Local::now().date_naive() + ChronoDuration::days(30))
        .format("%Y-%m-%d")
        .to_string();
    assert_eq!(body["due_date"], due.as_str());
    assert_eq!(
        body["message"],
        format!("Loan approve! Repay by {} to earn 50 points.", due)
    );
}

#[tokio::test]
async fn test_first_application_badge_awarded_once() {
    let app = app();
    let first = approved_loan(&app, "repeat", 100.0).await;
    let (_, body) = send(&app, post("/v1/loan/apply", &strong_applicant("repeat", 100.0))).await;

    assert_ne!(body["loan_id"].as_str().unwrap(), first);
    assert_eq!(body["badges_earned"], json!([]));

    let (_, progress) = send(&app, get("/user/progress/repeat")).await;
    assert_eq!(progress["gamification"]["points_earned"], 100);
    assert_eq!(
        progress["gamification"]["badges_earned"],
        json!(["First Application"])
    );
}

#[tokio::test]
async fn test_denied_loan_cannot_be_repaid() {
    let app = app();
    let (status, body) = send(&app, post("/loan/apply", &weak_applicant("thin_file"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "deny");
    assert!(body["score"].as_f64().unwrap() <= 70.0);

    let loan_id = body["loan_id"].as_str().unwrap();
    let (status, body) = send(
        &app,
        post("/repayment/record", &repayment("thin_file", loan_id, 500.0, 0)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Loan was not approved");
}

#[tokio::test]
async fn test_on_time_repayment_flow() {
    let app = app();
    let loan_id = approved_loan(&app, "payer", 250.0).await;

    let (status, body) = send(
        &app,
        post("/repayment/record", &repayment("payer", &loan_id, 250.0, 0)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "on-time");
    assert_eq!(body["new_repayment_streak"], 1);
    assert_eq!(body["points_earned"], 50);
    assert_eq!(body["message"], "Repayment recorded! You earned 50 points.");
    assert!(body["new_score"].as_f64().unwrap() > 70.0);

    let (status, progress) = send(&app, get("/user/progress/payer")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["alternative_data"]["transaction_frequency"], 20.0);
    let gamification = &progress["gamification"];
    assert_eq!(gamification["repayment_streak"], 1);
    assert_eq!(gamification["points_earned"], 100);
    let history = gamification["progress_map"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["status"], "on-time");
    assert_eq!(history[0]["amount"], 250.0);
}

#[tokio::test]
async fn test_duplicate_repayment_conflicts() {
    let app = app();
    let loan_id = approved_loan(&app, "twice", 80.0).await;
    let body = repayment("twice", &loan_id, 80.0, 0);

    let (status, _) = send(&app, post("/repayment/record", &body)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, post("/repayment/record", &body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Loan already repaid");
    assert_eq!(body["code"], "API_CONFLICT");
}

#[tokio::test]
async fn test_late_repayment_resets_streak() {
    let app = app();
    let first = approved_loan(&app, "late", 60.0).await;
    let second = approved_loan(&app, "late", 60.0).await;

    let (_, body) = send(&app, post("/repayment/record", &repayment("late", &first, 60.0, 1))).await;
    assert_eq!(body["new_repayment_streak"], 1);

    let (status, body) = send(
        &app,
        post("/repayment/record", &repayment("late", &second, 60.0, 40)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "late");
    assert_eq!(body["new_repayment_streak"], 0);
    assert_eq!(body["points_earned"], 0);
    assert_eq!(body["message"], "Repayment recorded.");
}

#[tokio::test]
async fn test_streak_milestone_badge() {
    let app = app();
    let mut last = Value::Null;
    for _ in 0..3 {
        let loan_id = approved_loan(&app, "streaker", 120.0).await;
        let (status, body) = send(
            &app,
            post("/repayment/record", &repayment("streaker", &loan_id, 120.0, 0)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        last = body;
    }

    assert_eq!(last["new_repayment_streak"], 3);
    assert_eq!(last["points_earned"], 150);
    assert_eq!(last["badges_earned"], json!(["Consistent Payer"]));

    let (_, progress) = send(&app, get("/user/progress/streaker")).await;
    assert_eq!(
        progress["gamification"]["badges_earned"],
        json!(["First Application", "Consistent Payer"])
    );
    // 3 applications, 3 repayments, one bonus
    assert_eq!(progress["gamification"]["points_earned"], 400);
}

#[tokio::test]
async fn test_reliable_borrower_after_five_on_time() {
    let app = app();
    let mut outcomes = Vec::new();
    for _ in 0..5 {
        let loan_id = approved_loan(&app, "steady", 75.0).await;
        let (status, body) = send(
            &app,
            post("/repayment/record", &repayment("steady", &loan_id, 75.0, 0)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        outcomes.push(body);
    }

    assert_eq!(outcomes[3]["points_earned"], 50);
    assert_eq!(outcomes[3]["badges_earned"], json!([]));

    let fifth = &outcomes[4];
    assert_eq!(fifth["new_repayment_streak"], 5);
    assert_eq!(fifth["points_earned"], 250);
    assert_eq!(fifth["badges_earned"], json!(["Reliable Borrower"]));
    assert_eq!(
        fifth["message"],
        "Repayment recorded! You earned 250 points. New badge: Reliable Borrower."
    );

    let (_, progress) = send(&app, get("/user/progress/steady")).await;
    assert_eq!(
        progress["gamification"]["badges_earned"],
        json!(["First Application", "Consistent Payer", "Reliable Borrower"])
    );
    // 5 applications, 5 repayments, 100 + 200 bonuses
    assert_eq!(progress["gamification"]["points_earned"], 800);
}

#[tokio::test]
async fn test_invalid_repayments_rejected() {
    let app = app();
    let loan_id = approved_loan(&app, "owner", 300.0).await;
    approved_loan(&app, "intruder", 300.0).await;

    let cases = [
        repayment("owner", "L_missing_1", 300.0, 0),
        repayment("owner", &loan_id, 299.0, 0),
        repayment("intruder", &loan_id, 300.0, 0),
    ];
    for case in &cases {
        let (status, body) = send(&app, post("/repayment/record", case)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Invalid loan or amount");
        assert_eq!(body["code"], "API_BAD_REQUEST");
    }

    // Within tolerance
    let (status, _) = send(
        &app,
        post("/repayment/record", &repayment("owner", &loan_id, 300.005, 0)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_user_progress_not_found() {
    let app = app();
    let (status, body) = send(&app, get("/user/progress/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "User not found");
}

#[tokio::test]
async fn test_unmatched_routes_return_error_body() {
    let app = app();

    for uri in ["/nope", "/v1/nope"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["content-type"], "application/json");
        let (_, body) = send(&app, get(uri)).await;
        assert_eq!(body["detail"], "Not Found");
        assert_eq!(body["code"], "API_NOT_FOUND");
    }

    let (status, body) = send(&app, get("/loan/apply")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["detail"], "Method Not Allowed");
    assert_eq!(body["code"], "API_METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn test_validation_failures() {
    let app = app();

    let mut negative = strong_applicant("v", 100.0);
    negative["loan_amount"] = json!(-5.0);
    let (status, body) = send(&app, post("/loan/apply", &negative)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "API_VALIDATION_FAILED");

    let missing = json!({ "user_id": "v", "loan_amount": 100.0 });
    let (status, _) = send(&app, post("/loan/apply", &missing)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut bad_date = repayment("v", "Lv_1", 100.0, 0);
    bad_date["payment_date"] = json!("14/09/2024");
    let (status, body) = send(&app, post("/repayment/record", &bad_date)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("payment_date"));

    let malformed = Request::post("/loan/apply")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_stats_track_activity() {
    let app = app();
    let loan_id = approved_loan(&app, "stats", 90.0).await;
    send(&app, post("/loan/apply", &weak_applicant("stats_weak"))).await;
    send(&app, post("/repayment/record", &repayment("stats", &loan_id, 90.0, 0))).await;

    let (status, body) = send(&app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_applications"], 2);
    assert_eq!(body["total_approved"], 1);
    assert_eq!(body["total_denied"], 1);
    assert_eq!(body["on_time_repayments"], 1);
    assert_eq!(body["database"]["users"], 2);
    assert_eq!(body["database"]["loans"], 2);
    assert_eq!(body["database"]["repayments"], 1);
}

#[tokio::test]
async fn test_rate_limit_enforced() {
    let app = app_with(ServerConfig {
        rate_limit: RateLimitConfig {
            requests_per_window: 2,
            window_duration: Duration::from_secs(60),
        },
        ..ServerConfig::default()
    });

    let response = app.clone().oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "1");

    let (status, _) = send(&app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, get("/stats")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "API_RATE_LIMITED");

    // Health is exempt, other clients have their own budget
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let other = Request::get("/stats")
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, other).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rotating_api_keys_share_client_bucket() {
    let limited = RateLimitConfig {
        requests_per_window: 2,
        window_duration: Duration::from_secs(60),
    };
    for api_keys in [Vec::new(), vec!["sk_test".to_string()]] {
        let app = app_with(ServerConfig {
            rate_limit: limited.clone(),
            api_keys,
            ..ServerConfig::default()
        });

        let mut throttled = 0;
        for i in 0..10 {
            let request = Request::get("/stats")
                .header("x-api-key", format!("junk{}", i))
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::empty())
                .unwrap();
            let (status, _) = send(&app, request).await;
            if status == StatusCode::TOO_MANY_REQUESTS {
                throttled += 1;
            }
        }
        assert_eq!(throttled, 8);
    }
}

#[tokio::test]
async fn test_configured_api_key_has_own_bucket() {
    let app = app_with(ServerConfig {
        rate_limit: RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_secs(60),
        },
        api_keys: vec!["sk_test".to_string()],
        ..ServerConfig::default()
    });
    let with_key = || {
        Request::get("/stats")
            .header("x-api-key", "sk_test")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&app, with_key()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, with_key()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // The IP bucket is untouched by the keyed requests
    let anonymous = Request::get("/stats")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let app = app_with(ServerConfig {
        api_keys: vec!["sk_test".to_string()],
        ..ServerConfig::default()
    });

    let (status, _) = send(&app, get("/stats")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::get("/stats")
        .header("x-api-key", "sk_wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let valid = Request::get("/stats")
        .header("x-api-key", "sk_test")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, valid).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_propagated() {
    let app = app();

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(generated.len(), 36);

    let tagged = Request::get("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(tagged).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}
