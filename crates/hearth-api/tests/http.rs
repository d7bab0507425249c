mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::Harness;
use hearth_api::router::router;

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, cookie, body)
}

fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::get(uri);
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    req.body(Body::empty()).unwrap()
}

/// `token=<jwt>` from a Set-Cookie header.
fn session_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn register_login_and_list_chats() {
    let h = Harness::new();
    let app = router(h.state.clone());

    let (status, cookie, body) = call(
        &app,
        post_json(
            "/api/auth/register",
            json!({
                "name": "Kavya",
                "email": "Kavya@Example.com",
                "password": "hunter2hunter2",
                "role": "admin",
                "phone": "+15550123"
            }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(cookie.unwrap().contains("HttpOnly"));
    let family_code = body["familyId"].as_str().unwrap().to_string();
    assert_eq!(family_code.len(), 16);

    let (status, _, body) = call(
        &app,
        post_json(
            "/api/auth/register",
            json!({
                "name": "Rohan",
                "email": "rohan@example.com",
                "password": "password123",
                "role": "child",
                "familyCode": family_code
            }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["familyId"], family_code.as_str());

    let (status, cookie, _) = call(
        &app,
        post_json(
            "/api/auth/login",
            json!({ "email": "kavya@example.com", "password": "hunter2hunter2" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session = session_pair(&cookie.unwrap());

    let (status, _, body) = call(&app, get("/api/communication/chats", Some(&session))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let chats = body["chats"].as_array().unwrap();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0]["chatName"], "Family Group");
    assert!(chats[1]["id"].as_str().unwrap().starts_with("virtual-"));
    assert_eq!(chats[1]["isVirtual"], true);

    let (status, _, body) = call(&app, get("/api/family/members", Some(&session))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn registration_rules() {
    let h = Harness::new();
    let app = router(h.state.clone());

    let (status, _, body) = call(
        &app,
        post_json(
            "/api/auth/register",
            json!({ "name": "Kid", "email": "kid@example.com", "password": "password123", "role": "child", "familyCode": "0000000000000000" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _, _) = call(
        &app,
        post_json(
            "/api/auth/register",
            json!({ "name": "Short", "email": "short@example.com", "password": "short", "role": "admin" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let admin = json!({ "name": "Dup", "email": "dup@example.com", "password": "password123", "role": "admin" });
    let (status, _, _) = call(&app, post_json("/api/auth/register", admin.clone(), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _, _) = call(&app, post_json("/api/auth/register", admin, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = call(
        &app,
        post_json(
            "/api/auth/login",
            json!({ "email": "dup@example.com", "password": "not-the-password" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let h = Harness::new();
    let app = router(h.state.clone());

    let (status, _, body) = call(&app, get("/api/communication/chats", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _, _) = call(&app, get("/api/emergency/history", Some("token=garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_header_is_accepted_and_bad_ids_are_rejected() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");
    let app = router(h.state.clone());
    let token = hearth_api::auth::create_token(common::JWT_SECRET, admin.id, &admin.name).unwrap();

    let req = Request::get(format!("/api/communication/messages/virtual-{}", arjun.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"], json!([]));

    let req = Request::get("/api/communication/messages/not-a-chat")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_bodies_get_the_validation_envelope() {
    let h = Harness::new();
    let (admin, _, _) = h.family("fam1");
    let app = router(h.state.clone());
    let token = hearth_api::auth::create_token(common::JWT_SECRET, admin.id, &admin.name).unwrap();
    let session = format!("token={}", token);

    let (status, _, body) = call(
        &app,
        post_json(
            "/api/communication/messages",
            json!({ "content": "hi", "chatId": "virtual-x" }),
            Some(&session),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("chatId"));

    let (status, _, body) = call(
        &app,
        post_json("/api/communication/polls", json!({ "question": "Pizza night?" }), Some(&session)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("options"));

    let req = Request::post("/api/emergency/trigger")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, &session)
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn send_vote_and_alert_over_http() {
    let h = Harness::new();
    let (admin, arjun, _) = h.family("fam1");
    let app = router(h.state.clone());
    let token = hearth_api::auth::create_token(common::JWT_SECRET, admin.id, &admin.name).unwrap();
    let session = format!("token={}", token);

    let (status, _, body) = call(
        &app,
        post_json(
            "/api/communication/messages",
            json!({ "content": "hi", "chatId": format!("virtual-{}", arjun.id), "recipientId": arjun.id }),
            Some(&session),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let chat_id = body["message"]["chatId"].as_str().unwrap().to_string();
    assert_eq!(body["message"]["chat"]["isVirtual"], false);

    let req = Request::put(format!("/api/communication/messages/{}/read", chat_id))
        .header(header::COOKIE, &session)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 1);

    let (status, _, body) = call(
        &app,
        post_json(
            "/api/communication/polls",
            json!({ "question": "Movie night?", "options": ["Friday", "Saturday"] }),
            Some(&session),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let poll_id = body["poll"]["id"].as_str().unwrap().to_string();
    let option_id = body["poll"]["options"][1]["id"].as_str().unwrap().to_string();

    let (status, _, body) = call(
        &app,
        post_json(
            &format!("/api/communication/polls/vote/{}", poll_id),
            json!({ "optionId": option_id }),
            Some(&session),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["poll"]["options"][1]["percentage"], 100.0);

    let (status, _, body) = call(
        &app,
        post_json("/api/emergency/trigger", json!({ "lat": 12.9, "lng": 77.6 }), Some(&session)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["alert"]["status"], "active");
    assert_eq!(body["notifiedContacts"], 0);

    let (status, _, body) = call(
        &app,
        post_json("/api/emergency/trigger", json!({ "lat": 12.9, "lng": 77.6 }), Some(&session)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "You already have an active alert.");
}
