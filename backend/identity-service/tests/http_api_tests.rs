//! HTTP API tests for identity-service
//!
//! Drives the real routes through `actix_web::test` with in-memory stores
//! and a stub social verifier.

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use chrono::Duration;
use crypto_core::JwtKeys;
use identity_service::{
    configure,
    db::MemoryIdentityRepository,
    models::{OtpPolicy, SocialProfile, SocialProvider},
    security::{InMemoryOtpStore, InMemoryRevocationStore, TokenService},
    services::{AuthOptions, LogOtpSender, SocialVerifier},
    AppState, IdentityError,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Accepts any token as the provider user id, except ones starting with `bad`
struct StubVerifier;

#[async_trait]
impl SocialVerifier for StubVerifier {
    async fn verify(
        &self,
        provider: SocialProvider,
        token: &str,
    ) -> identity_service::Result<SocialProfile> {
        if token.starts_with("bad") {
            return Err(IdentityError::ProviderVerification("rejected by stub".into()));
        }
        Ok(SocialProfile {
            provider,
            provider_user_id: token.to_string(),
            email: None,
            display_name: Some("Social User".to_string()),
            avatar_url: None,
        })
    }
}

fn build_state() -> AppState {
    AppState::new(
        Arc::new(MemoryIdentityRepository::new()),
        Arc::new(InMemoryOtpStore::new(OtpPolicy::default())),
        Arc::new(TokenService::new(
            JwtKeys::from_secret("http-api-test-secret-0123456789abcdef").unwrap(),
            Duration::minutes(15),
            Duration::days(7),
            Arc::new(InMemoryRevocationStore::new()),
        )),
        Arc::new(LogOtpSender::default()),
        Arc::new(StubVerifier),
        AuthOptions {
            default_country_code: "+249".to_string(),
            expose_code: true,
        },
    )
}

macro_rules! init_app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(build_state()))
                .configure(configure),
        )
        .await
    };
}

fn other_code(code: &str) -> String {
    if code.chars().all(|c| c == '0') {
        "1".repeat(code.len())
    } else {
        "0".repeat(code.len())
    }
}

#[actix_web::test]
async fn test_health() {
    let app = init_app!();
    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"status": "ok"}));
}

#[actix_web::test]
async fn test_register_and_duplicate() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"name": "Amna", "phone": "0912345678", "role": "buyer"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["phone"], "+249912345678");
    assert_eq!(body["role"], "buyer");
    assert_eq!(body["name"], "Amna");

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"name": "Other", "phone": "+249912345678"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "phone_in_use");
}

#[actix_web::test]
async fn test_validation_errors() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"name": "Amna", "phone": "+12ab34567"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "validation_error");

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"name": "Amna", "phone": "+1112223333", "role": "admin"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/auth/verify")
        .set_json(json!({"phone": "+1112223333", "otp": "12a4"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "validation_error");
}

#[actix_web::test]
async fn test_login_flow_and_me() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"name": "Amna", "phone": "+1112223333"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"phone": "+1112223333"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "otp_sent");
    assert_eq!(body["expires_in"], 300);
    let otp = body["dev_otp"].as_str().unwrap().to_string();
    assert_eq!(otp.len(), 4);

    let req = test::TestRequest::post()
        .uri("/auth/verify")
        .set_json(json!({"phone": "+1112223333", "otp": otp}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let pair: Value = test::read_body_json(resp).await;
    assert_eq!(pair["token_type"], "bearer");
    assert_eq!(pair["expires_in"], 900);
    let access = pair["access_token"].as_str().unwrap();

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", access)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let me: Value = test::read_body_json(resp).await;
    assert_eq!(me["phone"], "+1112223333");
    assert_eq!(me["phone_verified"], true);
    assert_eq!(me["role"], "seller");
    assert_eq!(me["scope"], "user");
}

#[actix_web::test]
async fn test_login_unknown_phone_is_not_found() {
    let app = init_app!();
    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"phone": "+1999888777"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "not_found");
}

#[actix_web::test]
async fn test_lockout_returns_429_with_retry_after() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"name": "Amna", "phone": "+1112223333"}))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"phone": "+1112223333"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let otp = body["dev_otp"].as_str().unwrap().to_string();
    let wrong = other_code(&otp);

    for attempt in 1..=5 {
        let req = test::TestRequest::post()
            .uri("/auth/verify")
            .set_json(json!({"phone": "+1112223333", "otp": wrong}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        if attempt < 5 {
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "attempt {}", attempt);
        } else {
            assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        }
    }

    let req = test::TestRequest::post()
        .uri("/auth/verify")
        .set_json(json!({"phone": "+1112223333", "otp": otp}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: i64 = resp
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 900);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "otp_locked");
}

/// Register `+1112223333`, log in and return the token pair JSON
macro_rules! login_pair {
    ($app:expr) => {{
        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({"name": "Amna", "phone": "+1112223333"}))
            .to_request();
        test::call_service($app, req).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"phone": "+1112223333"}))
            .to_request();
        let body: Value = test::call_and_read_body_json($app, req).await;

        let req = test::TestRequest::post()
            .uri("/auth/verify")
            .set_json(json!({"phone": "+1112223333", "otp": body["dev_otp"]}))
            .to_request();
        let pair: Value = test::call_and_read_body_json($app, req).await;
        pair
    }};
}

#[actix_web::test]
async fn test_refresh_rotates() {
    let app = init_app!();
    let pair = login_pair!(&app);
    let refresh = pair["refresh_token"].as_str().unwrap();

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({"refresh_token": refresh}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated: Value = test::read_body_json(resp).await;
    assert_ne!(rotated["refresh_token"], pair["refresh_token"]);

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({"refresh_token": refresh}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unauthorized");

    // An access token is not a refresh token
    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({"refresh_token": rotated["access_token"]}))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn test_logout_revokes_tokens() {
    let app = init_app!();
    let pair = login_pair!(&app);
    let access = pair["access_token"].as_str().unwrap();

    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", format!("Bearer {}", access)))
        .set_json(json!({"refresh_token": pair["refresh_token"]}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", access)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({"refresh_token": pair["refresh_token"]}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_logout_without_body() {
    let app = init_app!();
    let pair = login_pair!(&app);
    let access = pair["access_token"].as_str().unwrap();

    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", format!("Bearer {}", access)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn test_me_requires_user_scope() {
    let app = init_app!();

    let req = test::TestRequest::get().uri("/auth/me").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "missing_token");

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/auth/social/google")
        .set_json(json!({"token": "g-42"}))
        .to_request();
    let social: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(social["scope"], "link_phone");
    assert_eq!(social["token_type"], "bearer");

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header((
            "Authorization",
            format!("Bearer {}", social["access_token"].as_str().unwrap()),
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "insufficient_scope");
}

#[actix_web::test]
async fn test_link_phone_rejects_user_scope() {
    let app = init_app!();
    let pair = login_pair!(&app);

    let req = test::TestRequest::post()
        .uri("/auth/link-phone")
        .insert_header((
            "Authorization",
            format!("Bearer {}", pair["access_token"].as_str().unwrap()),
        ))
        .set_json(json!({"phone": "+1444555666"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_social_provider_rejection_is_unauthorized() {
    let app = init_app!();
    let req = test::TestRequest::post()
        .uri("/auth/social/facebook")
        .set_json(json!({"token": "bad-token"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unauthorized");
}

#[actix_web::test]
async fn test_social_link_flow() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/auth/social/facebook")
        .set_json(json!({"token": "fb-1001"}))
        .to_request();
    let social: Value = test::call_and_read_body_json(&app, req).await;
    let link_token = social["access_token"].as_str().unwrap().to_string();
    let bearer = format!("Bearer {}", link_token);

    let req = test::TestRequest::post()
        .uri("/auth/link-phone")
        .insert_header(("Authorization", bearer.clone()))
        .set_json(json!({"phone": "0912000111"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "otp_sent");
    let code = body["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert!(body.get("access_token").is_none());

    let req = test::TestRequest::post()
        .uri("/auth/verify-otp")
        .insert_header(("Authorization", bearer.clone()))
        .set_json(json!({"phone": "+249912000111", "code": code}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let pair: Value = test::read_body_json(resp).await;

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header((
            "Authorization",
            format!("Bearer {}", pair["access_token"].as_str().unwrap()),
        ))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["phone"], "+249912000111");
    assert_eq!(me["phone_verified"], true);
    assert_eq!(me["name"], "Social User");

    // The link_phone session ends once a full session exists
    let req = test::TestRequest::post()
        .uri("/auth/link-phone")
        .insert_header(("Authorization", bearer))
        .set_json(json!({"phone": "+249912000111"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    // A later social login for the same account reports it as already linked
    let req = test::TestRequest::post()
        .uri("/auth/social/facebook")
        .set_json(json!({"token": "fb-1001"}))
        .to_request();
    let social: Value = test::call_and_read_body_json(&app, req).await;
    let req = test::TestRequest::post()
        .uri("/auth/link-phone")
        .insert_header((
            "Authorization",
            format!("Bearer {}", social["access_token"].as_str().unwrap()),
        ))
        .set_json(json!({"phone": "+249912000111"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "already_verified");
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert!(body.get("code").is_none());
}

#[actix_web::test]
async fn test_link_phone_conflict_with_unverified_owner() {
    let app = init_app!();

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"name": "Pending", "phone": "+1112223333"}))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/auth/social/google")
        .set_json(json!({"token": "g-7"}))
        .to_request();
    let social: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/auth/link-phone")
        .insert_header((
            "Authorization",
            format!("Bearer {}", social["access_token"].as_str().unwrap()),
        ))
        .set_json(json!({"phone": "+1112223333"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "phone_in_use");
}

#[actix_web::test]
async fn test_link_phone_response_does_not_reveal_registered_number() {
    let app = init_app!();

    // Proven owner of +1112223333
    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"name": "Owner", "phone": "+1112223333"}))
        .to_request();
    test::call_service(&app, req).await;
    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"phone": "+1112223333"}))
        .to_request();
    let login: Value = test::call_and_read_body_json(&app, req).await;
    let req = test::TestRequest::post()
        .uri("/auth/verify")
        .set_json(json!({"phone": "+1112223333", "otp": login["dev_otp"]}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let mut bodies = Vec::new();
    for (token, phone) in [("g-owned", "+1112223333"), ("g-fresh", "+1444555666")] {
        let req = test::TestRequest::post()
            .uri("/auth/social/google")
            .set_json(json!({"token": token}))
            .to_request();
        let social: Value = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/auth/link-phone")
            .insert_header((
                "Authorization",
                format!("Bearer {}", social["access_token"].as_str().unwrap()),
            ))
            .set_json(json!({"phone": phone}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let mut body: Value = test::read_body_json(resp).await;
        assert!(body["code"].is_string());
        body.as_object_mut().unwrap().remove("code");
        bodies.push(body);
    }

    assert_eq!(bodies[0], json!({"message": "otp_sent"}));
    assert_eq!(bodies[0], bodies[1]);
}
