// tests/chat_api_test.rs — End-to-end chat scenarios over the router

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use tower::ServiceExt;

use common::{harness, ScriptedProvider};
use skiff::api::build_router;
use skiff::chat::{ChatSendRequest, EntryRole};

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

fn send_request(user_content: &str, context_id: &str) -> ChatSendRequest {
    ChatSendRequest {
        model: "m".into(),
        parameters: String::new(),
        context_id: context_id.into(),
        supplier_name: "mock".into(),
        search: String::new(),
        rag_list: Vec::new(),
        temp_chat: false,
        user_content: user_content.into(),
        doc_files: Vec::new(),
        images: Vec::new(),
        regenerate_id: None,
    }
}

/// Scenario: sending against an unknown model is a 404 and the implicit
/// conversation is never persisted.
#[tokio::test]
async fn test_unknown_model_is_404_without_persisting() {
    let h = harness(ScriptedProvider::new(&["x"]));
    let app = build_router(h.state.clone());

    let resp = app
        .oneshot(post(
            "/chat/chat",
            serde_json::json!({
                "model": "nope",
                "supplierName": "mock",
                "user_content": "hello",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let v = body_json(resp).await;
    assert_eq!(v["code"], 404);
    assert!(v["error_msg"].as_str().unwrap().contains("nope"));
    assert!(h.sessions.list().unwrap().is_empty());
}

/// Scenario: a streamed reply reaches the client delta by delta and the
/// turn pair lands in history on completion.
#[tokio::test]
async fn test_stream_and_persist() {
    let h = harness(ScriptedProvider::new(&["he", "llo"]));
    let app = build_router(h.state.clone());

    let resp = app
        .clone()
        .oneshot(post(
            "/chat/chat",
            serde_json::json!({
                "model": "m",
                "supplierName": "mock",
                "user_content": "hi",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let context_id = resp
        .headers()
        .get("x-context-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let text = String::from_utf8(body_bytes(resp).await).unwrap();
    assert_eq!(text, "hello");

    let info = app
        .oneshot(post(
            "/chat/get_chat_info",
            serde_json::json!({ "context_id": context_id }),
        ))
        .await
        .unwrap();
    assert_eq!(info.status(), StatusCode::OK);
    let v = body_json(info).await;
    let history = v["message"]["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[0]["content"], "hi");
    assert_eq!(history[1]["role"], "assistant");
    assert_eq!(history[1]["content"], "hello");
    // Upstream stats captured on completion.
    assert_eq!(history[1]["stat"]["eval_count"], 2);
    // The implicit create titled the conversation from the first message.
    assert_eq!(v["message"]["config"]["title"], "hi");
}

/// Scenario: stop_generate mid-stream finalises the pair with the
/// buffered prefix plus the interrupted token.
#[tokio::test]
async fn test_stop_generate_finalizes_interrupted() {
    let h = harness(ScriptedProvider::hanging(&["he"]));

    let outcome = h
        .engine
        .start_chat(send_request("hi", ""))
        .await
        .unwrap();
    let mut rx = outcome.rx;

    let first = rx.recv().await.unwrap();
    assert_eq!(first, "he");

    h.engine.stop_generate(&outcome.context_id);
    while rx.recv().await.is_some() {}

    let history = h.sessions.history(&outcome.context_id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, EntryRole::User);
    assert_eq!(history[1].role, EntryRole::Assistant);
    assert_eq!(history[1].content, "he[generation interrupted]");
}

/// stop_generate with nothing in flight is a successful no-op.
#[tokio::test]
async fn test_stop_generate_idempotent() {
    let h = harness(ScriptedProvider::new(&[]));
    let app = build_router(h.state.clone());

    let resp = app
        .oneshot(post(
            "/chat/stop_generate",
            serde_json::json!({ "context_id": "nothing-here" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

/// Scenario: regeneration replaces the turn and keeps the log length.
#[tokio::test]
async fn test_regenerate_replaces_turn() {
    let h = harness(ScriptedProvider::sequence(&[&["he", "llo"], &["hey"]]));
    let app = build_router(h.state.clone());

    let resp = app
        .clone()
        .oneshot(post(
            "/chat/chat",
            serde_json::json!({
                "model": "m",
                "supplierName": "mock",
                "user_content": "hi",
            }),
        ))
        .await
        .unwrap();
    let context_id = resp
        .headers()
        .get("x-context-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let _ = body_bytes(resp).await;

    let assistant_id = h.sessions.history(&context_id).unwrap()[1].id.clone();

    let resp = app
        .clone()
        .oneshot(post(
            "/chat/chat",
            serde_json::json!({
                "model": "m",
                "supplierName": "mock",
                "context_id": context_id,
                "user_content": "hi",
                "regenerate_id": assistant_id,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(resp).await).unwrap();
    assert_eq!(text, "hey");

    let history = h.sessions.history(&context_id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "hi");
    assert_eq!(history[1].content, "hey");
}

/// Scenario: removing a supplier leaves its conversations readable but
/// new sends fail as invalid requests.
#[tokio::test]
async fn test_removed_supplier_blocks_new_sends_only() {
    let h = harness(ScriptedProvider::new(&["ok"]));
    let app = build_router(h.state.clone());

    let resp = app
        .clone()
        .oneshot(post(
            "/chat/chat",
            serde_json::json!({
                "model": "m",
                "supplierName": "mock",
                "user_content": "hi",
            }),
        ))
        .await
        .unwrap();
    let context_id = resp
        .headers()
        .get("x-context-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let _ = body_bytes(resp).await;

    h.registry.remove("mock").unwrap();
    assert!(h.registry.get("mock").unwrap().is_none());

    let resp = app
        .clone()
        .oneshot(post(
            "/chat/chat",
            serde_json::json!({
                "model": "m",
                "supplierName": "mock",
                "context_id": context_id,
                "user_content": "again",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let info = app
        .oneshot(post(
            "/chat/get_chat_info",
            serde_json::json!({ "context_id": context_id }),
        ))
        .await
        .unwrap();
    assert_eq!(info.status(), StatusCode::OK);
    let v = body_json(info).await;
    assert_eq!(v["message"]["history"].as_array().unwrap().len(), 2);
}

/// A temp chat streams normally but leaves no trace on disk.
#[tokio::test]
async fn test_temp_chat_not_persisted() {
    let h = harness(ScriptedProvider::new(&["yo"]));

    let mut req = send_request("hi", "");
    req.temp_chat = true;
    let outcome = h.engine.start_chat(req).await.unwrap();
    let mut rx = outcome.rx;
    let mut text = String::new();
    while let Some(chunk) = rx.recv().await {
        text.push_str(&chunk);
    }
    assert_eq!(text, "yo");
    assert!(h.sessions.list().unwrap().is_empty());
}

/// A second send on the same conversation cancels and replaces the first.
#[tokio::test]
async fn test_cancel_and_replace_on_same_conversation() {
    let h = harness(ScriptedProvider::hanging(&["partial"]));

    let first = h
        .engine
        .start_chat(send_request("one", ""))
        .await
        .unwrap();
    let context_id = first.context_id.clone();
    let mut rx1 = first.rx;
    assert_eq!(rx1.recv().await.unwrap(), "partial");

    let second = h
        .engine
        .start_chat(send_request("two", &context_id))
        .await
        .unwrap();

    // The first stream ends (canceled), the second keeps the slot.
    while rx1.recv().await.is_some() {}
    assert!(h.engine.has_active(&context_id));

    let mut rx2 = second.rx;
    assert_eq!(rx2.recv().await.unwrap(), "partial");
    h.engine.stop_generate(&context_id);
    while rx2.recv().await.is_some() {}
}

/// Supplier round-trip law through the registry endpoints.
#[tokio::test]
async fn test_supplier_round_trip_via_api() {
    let h = harness(ScriptedProvider::new(&[]));
    let app = build_router(h.state.clone());

    let before = body_json(
        app.clone()
            .oneshot(post("/model/list_suppliers", serde_json::json!({})))
            .await
            .unwrap(),
    )
    .await;
    let before_names: Vec<String> = before["message"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();

    let added = body_json(
        app.clone()
            .oneshot(post(
                "/model/add_supplier",
                serde_json::json!({ "base_url": "http://x.test/v1", "title": "X" }),
            ))
            .await
            .unwrap(),
    )
    .await;
    let name = added["message"]["name"].as_str().unwrap().to_string();
    assert_eq!(name.len(), 10);

    let removed = app
        .clone()
        .oneshot(post(
            "/model/remove_supplier",
            serde_json::json!({ "supplierName": name }),
        ))
        .await
        .unwrap();
    assert_eq!(removed.status(), StatusCode::OK);

    let after = body_json(
        app.oneshot(post("/model/list_suppliers", serde_json::json!({})))
            .await
            .unwrap(),
    )
    .await;
    let after_names: Vec<String> = after["message"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(before_names, after_names);
}

#[tokio::test]
async fn test_version_and_visible_models() {
    let h = harness(ScriptedProvider::new(&[]));
    let app = build_router(h.state.clone());

    let version = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/index/get_version")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(version.status(), StatusCode::OK);
    let v = body_json(version).await;
    assert_eq!(v["code"], 200);
    assert!(v["message"].as_str().unwrap().contains('.'));

    let catalog = body_json(
        app.oneshot(post("/manager/list_visible_models", serde_json::json!({})))
            .await
            .unwrap(),
    )
    .await;
    assert!(!catalog["message"].as_array().unwrap().is_empty());
}
