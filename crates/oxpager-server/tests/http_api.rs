mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use common::{
    build_test_context, build_test_context_with, corrupt_rule_condition, custom_rule,
    metric_condition, request_json, standard_seed, TEAM,
};
use oxpager_common::types::Resolution;
use oxpager_server::app;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

fn cpu_alert_body(id: &str) -> Value {
    json!({
        "id": id,
        "rule_id": "rule-cpu",
        "metric_name": "cpu_high",
        "severity": "high",
        "team_id": TEAM,
        "labels": { "host": "web-1" }
    })
}

#[tokio::test]
async fn health_reports_storage_and_counters() {
    let ctx = build_test_context().unwrap();
    let (status, body, trace_id) = request_json(&ctx.app, "GET", "/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["err_code"], 0);
    assert_eq!(body["data"]["storage_status"], "ok");
    assert_eq!(body["data"]["audit_write_failures"], 0);
    assert_eq!(body["data"]["dispatch_failures"], 0);
    let trace_id = trace_id.expect("trace id header");
    assert_eq!(trace_id.len(), 16);
    assert_eq!(body["trace_id"], trace_id);
}

#[tokio::test]
async fn incoming_trace_id_is_echoed() {
    let ctx = build_test_context().unwrap();
    let req = Request::builder()
        .uri("/v1/health")
        .header("X-Trace-Id", "0123456789abcdef")
        .body(Body::empty())
        .unwrap();
    let resp = ctx.app.clone().oneshot(req).await.unwrap();
    assert_eq!(
        resp.headers().get("x-trace-id").unwrap(),
        "0123456789abcdef"
    );
}

#[tokio::test]
async fn ingest_routes_and_then_suppresses_the_repeat() {
    let ctx = build_test_context().unwrap();

    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/alerts", Some(cpu_alert_body("a-1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let data = &body["data"];
    assert_eq!(data["alert_id"], "a-1");
    assert_eq!(data["decision"]["suppressed"], false);
    assert_eq!(data["decision"]["reason"], "no_suppression");
    assert_eq!(data["routing"]["responder"]["user_id"], "alice");
    assert_eq!(data["routing"]["assignment"]["expected_response_minutes"], 30);
    assert_eq!(ctx.dispatcher.sent().len(), 1);

    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/alerts", Some(cpu_alert_body("a-2"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["decision"]["suppressed"], true);
    assert_eq!(body["data"]["decision"]["reason"], "duplicate_alert");
    assert!(body["data"]["routing"].is_null());
    assert_eq!(body["data"]["group"]["alert_count"], 2);

    let group_id = body["data"]["group"]["id"].as_str().unwrap().to_string();
    let (status, body, _) =
        request_json(&ctx.app, "GET", &format!("/v1/groups/{group_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["group_key"], "cpu_high");
    assert_eq!(body["data"]["highest_severity"], "high");
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 2);

    let (status, body, _) =
        request_json(&ctx.app, "GET", "/v1/alerts/a-2/suppression-logs", None).await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["data"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["reason"], "duplicate_alert");
}

#[tokio::test]
async fn ingest_rejects_bad_input() {
    let ctx = build_test_context().unwrap();

    let mut body = cpu_alert_body("a-1");
    body["team_id"] = json!(" ");
    let (status, resp, _) = request_json(&ctx.app, "POST", "/v1/alerts", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["err_code"], 1001);

    let mut body = cpu_alert_body("a-1");
    body["rule_id"] = json!("rule-missing");
    let (status, resp, _) = request_json(&ctx.app, "POST", "/v1/alerts", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(resp["err_code"], 1201);

    let (status, _, _) =
        request_json(&ctx.app, "POST", "/v1/alerts", Some(cpu_alert_body("a-1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, resp, _) =
        request_json(&ctx.app, "POST", "/v1/alerts", Some(cpu_alert_body("a-1"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(resp["err_code"], 1005);
}

#[tokio::test]
async fn acknowledge_requires_team_membership() {
    let ctx = build_test_context().unwrap();
    request_json(&ctx.app, "POST", "/v1/alerts", Some(cpu_alert_body("a-1"))).await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alerts/a-1/acknowledge",
        Some(json!({ "user_id": "mallory" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["err_code"], 1003);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alerts/a-1/acknowledge",
        Some(json!({ "user_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["alert_updated"], true);
    assert_eq!(body["data"]["assignment"]["assigned_to"], "alice");

    let (status, body, _) =
        request_json(&ctx.app, "GET", "/v1/alerts/a-1/assignments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["assignments"].as_array().unwrap().len(), 1);
    assert!(!body["data"]["assignments"][0]["acknowledged_at"].is_null());

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alerts/missing/acknowledge",
        Some(json!({ "user_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn acknowledging_a_resolved_alert_conflicts() {
    let ctx = build_test_context().unwrap();
    request_json(&ctx.app, "POST", "/v1/alerts", Some(cpu_alert_body("a-1"))).await;
    ctx.state
        .store
        .read(|view| view.resolve_alert("a-1", Utc::now(), Resolution::Manual))
        .unwrap();

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alerts/a-1/acknowledge",
        Some(json!({ "user_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["err_code"], 1005);

    let (_, body, _) = request_json(&ctx.app, "GET", "/v1/alerts/a-1/assignments", None).await;
    assert!(body["data"]["assignments"][0]["acknowledged_at"].is_null());
}

#[tokio::test]
async fn malformed_rule_condition_is_a_config_error() {
    let mut seed = standard_seed();
    seed.suppression_rules.push(custom_rule("rule-broken", metric_condition()));
    let ctx = build_test_context_with(seed).unwrap();
    corrupt_rule_condition(&ctx, "rule-broken", r#"{"op":"any","conditions":[]}"#);

    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/alerts", Some(cpu_alert_body("a-1"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["err_code"], 1203);
    assert!(body["err_msg"].as_str().unwrap().contains("rule-broken"));
}

#[tokio::test]
async fn unknown_alert_and_group_are_not_found() {
    let ctx = build_test_context().unwrap();

    let (status, body, _) =
        request_json(&ctx.app, "GET", "/v1/alerts/nope/assignments", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["err_code"], 1004);

    let (status, _, _) = request_json(&ctx.app, "GET", "/v1/groups/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body, _) =
        request_json(&ctx.app, "GET", "/v1/alerts/nope/suppression-logs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn on_call_lookup_defaults_to_high_severity() {
    let ctx = build_test_context().unwrap();

    let (status, body, _) =
        request_json(&ctx.app, "GET", &format!("/v1/teams/{TEAM}/on-call"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["severity"], "high");
    assert_eq!(body["data"]["on_call"]["user_id"], "alice");
    assert_eq!(body["data"]["on_call"]["backup_user"], "bob");

    let (status, body, _) = request_json(
        &ctx.app,
        "GET",
        "/v1/teams/team-unknown/on-call?severity=critical",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["severity"], "critical");
    assert!(body["data"]["on_call"].is_null());
}

#[tokio::test]
async fn stop_signal_cancels_the_token_and_drains_connections() {
    let ctx = build_test_context().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(app::serve_until(
        listener,
        ctx.app.clone(),
        shutdown.clone(),
        async move {
            let _ = stop_rx.await;
        },
    ));

    // Keep-alive connection that has been served once.
    let mut conn = TcpStream::connect(addr).await.unwrap();
    conn.write_all(b"GET /v1/health HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut buf = vec![0u8; 4096];
    let mut response = Vec::new();
    while !response.ends_with(b"}") {
        let n = conn.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before the response finished");
        response.extend_from_slice(&buf[..n]);
    }
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200"));

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server drains after the stop signal")
        .unwrap();
    assert!(result.is_ok());
    assert!(shutdown.is_cancelled());

    // The idle connection was closed by the drain.
    let n = conn.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn cancelled_token_stops_the_server() {
    let ctx = build_test_context().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(app::serve_until(
        listener,
        ctx.app.clone(),
        shutdown.clone(),
        std::future::pending::<()>(),
    ));

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server stops once the token is cancelled")
        .unwrap();
    assert!(result.is_ok());
}
