//! HTTP surface tests against the in-memory harness.

mod common;

use actix_web::{http::header, http::StatusCode, test, App};
use common::{Harness, TEST_EMAIL, TEST_NAME, TEST_PASSWORD, TEST_USERNAME};
use keygate_service::http;
use serde_json::{json, Value};

macro_rules! app {
    ($harness:expr) => {{
        let state = $harness.state.clone();
        test::init_service(App::new().configure(move |cfg| http::configure(cfg, &state))).await
    }};
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

#[actix_web::test]
async fn test_health() {
    let harness = Harness::new();
    let app = app!(harness);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_readiness_follows_store() {
    let harness = Harness::new();
    let app = app!(harness);

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/readiness").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    harness.store.set_unavailable(true);
    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/readiness").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn test_signup_login_home_logout() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/signup/request-otp")
        .set_json(json!({ "email": TEST_EMAIL }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let code = harness.email.last_code().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/signup/verify-otp")
        .set_json(json!({
            "name": TEST_NAME,
            "username": TEST_USERNAME,
            "email": TEST_EMAIL,
            "password": TEST_PASSWORD,
            "otp": code,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["username"], TEST_USERNAME);
    assert!(body["user"].get("passwordHash").is_none());

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({ "email": TEST_EMAIL, "password": TEST_PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["expiresIn"], 3600);
    let token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/v1/home")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["email"], TEST_EMAIL);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/logout")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/v1/home")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_second_login_supersedes_first() {
    let harness = Harness::new();
    let accounts = &harness.state.accounts;
    accounts.request_signup_otp(TEST_EMAIL).await.unwrap();
    let code = harness.email.last_code().unwrap();
    accounts
        .complete_signup(keygate_service::services::SignupInput {
            name: TEST_NAME.into(),
            username: TEST_USERNAME.into(),
            email: TEST_EMAIL.into(),
            password: TEST_PASSWORD.into(),
            otp: code,
        })
        .await
        .unwrap();
    let app = app!(harness);

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({ "username": TEST_USERNAME, "password": TEST_PASSWORD }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        tokens.push(body["token"].as_str().unwrap().to_string());
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/home")
        .insert_header(bearer(&tokens[0]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/v1/home")
        .insert_header(bearer(&tokens[1]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_missing_or_garbage_token_is_unauthorized() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::get().uri("/api/v1/home").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/home")
        .insert_header(bearer("not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_request_otp_is_rate_limited() {
    let harness = Harness::new();
    let app = app!(harness);

    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/signup/request-otp")
            .set_json(json!({ "email": TEST_EMAIL }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/signup/request-otp")
        .set_json(json!({ "email": TEST_EMAIL }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = resp
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=30).contains(&retry_after));

    // The handler never ran for the rejected request.
    assert_eq!(harness.email.sent().len(), 3);
}

#[actix_web::test]
async fn test_malformed_json_is_bad_request() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{\"email\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid JSON syntax");
}

#[actix_web::test]
async fn test_missing_fields_are_named() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/login")
        .set_json(json!({ "email": TEST_EMAIL }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "password cannot be empty");

    let req = test::TestRequest::post()
        .uri("/api/v1/users/password/reset/verify-otp")
        .set_json(json!({ "email": TEST_EMAIL, "otp": "ABC123" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "newpassword cannot be empty");
}

#[actix_web::test]
async fn test_wrong_signup_code_is_unauthorized() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/signup/verify-otp")
        .set_json(json!({
            "name": TEST_NAME,
            "username": TEST_USERNAME,
            "email": TEST_EMAIL,
            "password": TEST_PASSWORD,
            "otp": "NOPE00",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(harness.users.count(), 0);
}

#[actix_web::test]
async fn test_store_outage_fails_closed() {
    let harness = Harness::new();
    let app = app!(harness);
    harness.store.set_unavailable(true);

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/signup/request-otp")
        .set_json(json!({ "email": TEST_EMAIL }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(harness.email.sent().is_empty());
}
