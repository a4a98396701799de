// ABOUTME: Behavioral tests for the REST surface through the full router and auth middleware

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::fixtures::{TestApp, ADMIN_TOKEN};

#[tokio::test]
async fn test_missing_token_rejected_admin_accepted() {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/api/sessions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["message"], "missing token");

    let (status, body) = app
        .request(Method::GET, "/api/sessions", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid token");

    let (status, body) = app
        .request(Method::GET, "/api/sessions", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_health_check_is_open() {
    let app = TestApp::new();
    let (status, body) = app.request(Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_token_query_parameter_fallback() {
    let app = TestApp::new();
    let uri = format!("/api/sessions?token={ADMIN_TOKEN}");
    let (status, _) = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_pairing_flow_issues_working_device_token() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/pair/initiate",
            Some(ADMIN_TOKEN),
            Some(json!({ "device_name": "Pixel" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let code = body["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert!(body["expires_at"].is_string());

    let status_uri = format!("/api/pair/status?code={code}");
    let (_, body) = app
        .request(Method::GET, &status_uri, Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(body, json!({ "claimed": false, "device_name": "Pixel" }));

    // Completion is open: the new device has no token yet
    let (status, body) = app
        .request(Method::POST, "/api/pair/complete", None, Some(json!({ "code": code })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device_name"], "Pixel");
    let token = body["token"].as_str().unwrap().to_string();
    let device_id = body["device_id"].as_str().unwrap().to_string();

    let (status, _) = app.request(Method::GET, "/api/sessions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .request(Method::GET, &status_uri, Some(&token), None)
        .await;
    assert_eq!(body["claimed"], true);

    let (status, body) = app
        .request(Method::POST, "/api/pair/complete", None, Some(json!({ "code": code })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "code_used");

    let stored = app.devices.list();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, device_id);

    let audit = app.audit_log();
    assert!(audit.contains("pairing_initiated"));
    assert!(audit.contains("pairing_completed"));
    assert!(audit.contains("pairing_failed"));
    assert!(!audit.contains(&token));
}

#[tokio::test]
async fn test_pairing_errors_are_distinct() {
    let app = TestApp::new();

    let (status, body) = app
        .request(Method::POST, "/api/pair/complete", None, Some(json!({ "code": "AAAAAA" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_code");

    let (status, body) = app
        .request(Method::POST, "/api/pair/complete", None, Some(json!({ "nope": 1 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/pair/initiate",
            Some(ADMIN_TOKEN),
            Some(json!({ "device_name": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_device_write_keeps_code_usable() {
    let app = TestApp::new();
    let (_, body) = app
        .request(
            Method::POST,
            "/api/pair/initiate",
            Some(ADMIN_TOKEN),
            Some(json!({ "device_name": "Pixel" })),
        )
        .await;
    let code = body["code"].as_str().unwrap().to_string();

    let devices_file = app.devices.path().to_path_buf();
    std::fs::write(&devices_file, "{ not json").unwrap();

    let (status, body) = app
        .request(Method::POST, "/api/pair/complete", None, Some(json!({ "code": code })))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal");

    let status_uri = format!("/api/pair/status?code={code}");
    let (_, body) = app
        .request(Method::GET, &status_uri, Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(body["claimed"], false);

    // Once the operator repairs the file the same code still pairs
    std::fs::remove_file(&devices_file).unwrap();
    let (status, body) = app
        .request(Method::POST, "/api/pair/complete", None, Some(json!({ "code": code })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(app.devices.list().len(), 1);

    let audit = app.audit_log();
    assert!(!audit.contains("pairing_failed"));
}

#[tokio::test]
async fn test_device_cannot_use_admin_routes() {
    let app = TestApp::new();
    let paired = app.pair_device("Phone").await;

    for (method, uri, body) in [
        (Method::POST, "/api/pair/initiate", Some(json!({ "device_name": "Other" }))),
        (Method::GET, "/api/devices", None),
        (Method::DELETE, "/api/devices/whatever", None),
    ] {
        let (status, body) = app.request(method, uri, Some(&paired.token), body).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body["error"], "forbidden");
    }
}

#[tokio::test]
async fn test_device_list_and_revoke() {
    let app = TestApp::new();
    let paired = app.pair_device("Phone").await;

    let (status, body) = app.request(Method::GET, "/api/devices", Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], paired.device_id.as_str());
    assert_eq!(body[0]["name"], "Phone");
    assert!(body[0].get("token").is_none());
    assert!(!body.to_string().contains(&paired.token));

    let uri = format!("/api/devices/{}", paired.device_id);
    let (status, _) = app.request(Method::DELETE, &uri, Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .request(Method::GET, "/api/sessions", Some(&paired.token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid token");

    let (status, body) = app.request(Method::DELETE, &uri, Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    assert!(app.audit_log().contains("device_revoked"));
}

#[tokio::test]
async fn test_session_reads() {
    let app = TestApp::new();
    app.source.add_session("api", &[("nvim", "buffer"), ("claude", "> ready")]);
    app.monitor.poll_once().await;

    let (status, body) = app
        .request(Method::GET, "/api/sessions/api", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "api");
    assert_eq!(body["status"], "active");
    assert_eq!(body["panes"][0]["type"], "editor");
    assert_eq!(body["panes"][0]["content"], "");
    assert!(body["panes"][0]["status"].is_null());
    assert_eq!(body["panes"][1]["type"], "agent");
    assert_eq!(body["panes"][1]["content"], "> ready");
    assert!(body.get("prev_content").is_none());

    let (status, body) = app
        .request(Method::GET, "/api/sessions/ghost", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_session_control() {
    let app = TestApp::new();
    let paired = app.pair_device("Phone").await;
    app.source.add_session("api", &[("zsh", "$"), ("claude", ">")]);
    app.monitor.poll_once().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/sessions/api/send",
            Some(&paired.token),
            Some(json!({ "text": "run the tests\n" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pane"], 1);
    assert_eq!(app.source.sent()[0].2, "run the tests\n");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/sessions/api/send",
            Some(&paired.token),
            Some(json!({ "pane": 7, "text": "x" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/sessions/api/send",
            Some(&paired.token),
            Some(json!({ "text": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let dir = app.dir.path().display().to_string();
    let (status, body) = app
        .request(
            Method::POST,
            "/api/sessions",
            Some(&paired.token),
            Some(json!({ "name": "web.app", "dir": dir, "command": "claude" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "web_app");

    let (status, body) = app
        .request(
            Method::POST,
            "/api/sessions",
            Some(&paired.token),
            Some(json!({ "name": "web.app", "dir": dir })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/sessions",
            Some(&paired.token),
            Some(json!({ "name": "rel", "dir": "relative/path" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.monitor.poll_once().await;
    let (status, _) = app
        .request(Method::DELETE, "/api/sessions/web_app", Some(&paired.token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(Method::DELETE, "/api/sessions/ghost", Some(&paired.token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let audit = app.audit_log();
    assert!(audit.contains("text_sent"));
    assert!(audit.contains("session_created"));
    assert!(audit.contains("session_killed"));
    assert!(!audit.contains("run the tests"));
}

#[tokio::test]
async fn test_diff_requires_git_repo() {
    let app = TestApp::new();
    app.source.add_session("api", &[("zsh", "$")]);
    app.monitor.poll_once().await;

    let (status, body) = app
        .request(Method::POST, "/api/sessions/api/diff", Some(ADMIN_TOKEN), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_cors_preflight_needs_no_token() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/sessions")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
