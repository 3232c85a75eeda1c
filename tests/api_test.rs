use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use sora::services::auth_service::{AuthClient, AuthStore};
use sora::{ApiError, ChatApi, ChatMessage, HttpChatApi, SessionController, SessionError};

const GOOD_TOKEN: &str = "good-token";

fn bearer_ok(headers: &HeaderMap) -> bool {
    matches!(
        headers.get("authorization").and_then(|value| value.to_str().ok()),
        Some(value) if value == format!("Bearer {}", GOOD_TOKEN)
    )
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "No token provided" })),
    )
        .into_response()
}

fn chat_c1() -> Value {
    json!({
        "_id": "c1",
        "title": "First",
        "messages": [{ "role": "user", "content": "hello" }]
    })
}

async fn list_chats(headers: HeaderMap) -> Response {
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    Json(json!([chat_c1()])).into_response()
}

async fn get_chat(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    if id == "c1" {
        Json(chat_c1()).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "message": "Chat not found" }))).into_response()
    }
}

async fn create_chat(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    Json(json!({
        "_id": "srv-1",
        "title": body["title"],
        "messages": body["messages"]
    }))
    .into_response()
}

async fn update_chat(headers: HeaderMap, Path(id): Path<String>, Json(body): Json<Value>) -> Response {
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    if id != "c1" {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Chat not found" }))).into_response();
    }
    let mut chat = chat_c1();
    if let Some(title) = body.get("title") {
        chat["title"] = title.clone();
    }
    if let Some(messages) = body.get("messages") {
        chat["messages"] = messages.clone();
    }
    Json(chat).into_response()
}

async fn delete_chat(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    if id == "c1" {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "message": "Chat not found" }))).into_response()
    }
}

async fn send_message(headers: HeaderMap, Path(id): Path<String>, Json(body): Json<Value>) -> Response {
    if !bearer_ok(&headers) {
        return unauthorized();
    }
    if id != "c1" {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Chat not found" }))).into_response();
    }
    Json(json!({
        "_id": "c1",
        "title": "First",
        "messages": [
            { "role": "user", "content": "hello" },
            body,
            { "role": "assistant", "content": "Noted!" }
        ]
    }))
    .into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["email"] == "maya@example.com" && body["password"] == "secret123" {
        Json(json!({
            "token": GOOD_TOKEN,
            "user": { "_id": "u1", "name": "Maya", "email": "maya@example.com" }
        }))
        .into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Invalid credentials" })),
        )
            .into_response()
    }
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["email"] == "maya@example.com" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Email already registered" })),
        )
            .into_response();
    }
    Json(json!({
        "token": GOOD_TOKEN,
        "user": { "_id": "u2", "name": body["name"], "email": body["email"] }
    }))
    .into_response()
}

/// Stand-in for the remote chat service, bound to an ephemeral port.
async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/chat", get(list_chats).post(create_chat))
        .route("/chat/{id}", get(get_chat).put(update_chat).delete(delete_chat))
        .route("/chat/{id}/message", post(send_message))
        .route("/auth/login", post(login))
        .route("/auth/register", post(register));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn requests_attach_the_bearer_credential() {
    let base = spawn_backend().await;
    let api = HttpChatApi::new(&base);

    // without a credential every call is a 401
    assert!(matches!(api.list_chats().await, Err(ApiError::Unauthorized)));

    api.set_credential(Some(GOOD_TOKEN));
    let chats = api.list_chats().await.unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].id, "c1");
    assert_eq!(chats[0].messages[0].content, "hello");

    // dropping the credential drops the header again
    api.set_credential(None);
    assert!(matches!(api.list_chats().await, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn unknown_chats_map_to_not_found() {
    let base = spawn_backend().await;
    let api = HttpChatApi::new(&base);
    api.set_credential(Some(GOOD_TOKEN));

    assert!(matches!(api.get_chat("ghost").await, Err(ApiError::NotFound)));
    assert!(matches!(api.delete_chat("ghost").await, Err(ApiError::NotFound)));
}

#[tokio::test]
async fn create_returns_the_server_assigned_identity() {
    let base = spawn_backend().await;
    let api = HttpChatApi::new(&base);
    api.set_credential(Some(GOOD_TOKEN));

    let chat = api.create_chat("", &[]).await.unwrap();
    assert_eq!(chat.id, "srv-1");
    assert!(chat.title.is_empty());
    assert!(chat.messages.is_empty());
}

#[tokio::test]
async fn update_applies_partial_bodies() {
    let base = spawn_backend().await;
    let api = HttpChatApi::new(&base);
    api.set_credential(Some(GOOD_TOKEN));

    let renamed = api
        .update_chat("c1", sora::models::ChatUpdate::with_title("Renamed"))
        .await
        .unwrap();
    assert_eq!(renamed.title, "Renamed");
    assert_eq!(renamed.messages.len(), 1);

    let cleared = api
        .update_chat("c1", sora::models::ChatUpdate::with_messages(Vec::new()))
        .await
        .unwrap();
    assert_eq!(cleared.title, "First");
    assert!(cleared.messages.is_empty());
}

#[tokio::test]
async fn send_message_round_trips_the_updated_chat() {
    let base = spawn_backend().await;
    let api = HttpChatApi::new(&base);
    api.set_credential(Some(GOOD_TOKEN));

    let chat = api.send_message("c1", "how are you?").await.unwrap();
    assert_eq!(chat.messages.len(), 3);
    assert_eq!(chat.messages[1], ChatMessage::user("how are you?"));
    assert_eq!(chat.messages[2].content, "Noted!");

    let deleted = api.delete_chat("c1").await;
    assert!(deleted.is_ok());
}

#[tokio::test]
async fn login_yields_token_and_user() {
    let base = spawn_backend().await;
    let auth = AuthClient::new(&base);

    let response = auth.login("maya@example.com", "secret123").await.unwrap();
    assert_eq!(response.token, GOOD_TOKEN);
    assert_eq!(response.user.name, "Maya");

    let rejected = auth.login("maya@example.com", "wrong").await;
    assert!(matches!(rejected, Err(ApiError::Api { status: 400, .. })));
}

#[tokio::test]
async fn signup_reports_conflicts_as_bad_requests() {
    let base = spawn_backend().await;
    let auth = AuthClient::new(&base);

    let created = auth
        .signup("Noah", "noah@example.com", "secret123")
        .await
        .unwrap();
    assert_eq!(created.user.email, "noah@example.com");

    let conflict = auth.signup("Maya", "maya@example.com", "secret123").await;
    assert!(matches!(conflict, Err(ApiError::Api { status: 400, .. })));
}

#[tokio::test]
async fn signing_in_wires_the_whole_session() {
    let base = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let controller = SessionController::with_data_dir(
        HttpChatApi::new(&base),
        AuthClient::new(&base),
        dir.path().to_path_buf(),
    )
    .unwrap();

    // wrong password: surfaced, nothing persisted
    assert!(matches!(
        controller.sign_in("maya@example.com", "wrong").await,
        Err(SessionError::Api(ApiError::Api { status: 400, .. }))
    ));
    assert!(!controller.is_authenticated());

    // success: credential attached, list loaded through the cache
    let user = controller
        .sign_in("maya@example.com", "secret123")
        .await
        .unwrap();
    assert_eq!(user.name, "Maya");
    assert!(controller.is_authenticated());
    assert_eq!(controller.chats().len(), 1);

    // token and user survive on disk for the next start
    let persisted = AuthStore::open(dir.path()).load().unwrap();
    assert_eq!(persisted.token.as_deref(), Some(GOOD_TOKEN));
    assert_eq!(persisted.user.unwrap().name, "Maya");
}
