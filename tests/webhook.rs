//! End-to-end tests for the HTTP surface.
//!
//! The real axum router is served on an ephemeral port; Telegram and Gemini
//! are replaced with in-process recorders.
//!
//! Run with: cargo test --test webhook

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use exam_share_bot::bot::{
    AppState, Assistant, BotEngine, EngineConfig, InlineButton, MaterialStore, Messenger, server,
};
use exam_share_bot::error::FALLBACK_REPLY;

const ADMIN: i64 = 1;

#[derive(Default)]
struct Recorder {
    texts: Mutex<Vec<(i64, String)>>,
    documents: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl Messenger for Recorder {
    async fn send_text(&self, chat_id: i64, text: &str, _buttons: &[InlineButton]) -> Result<(), String> {
        self.texts.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, file_ref: &str, _caption: &str) -> Result<(), String> {
        self.documents.lock().unwrap().push((chat_id, file_ref.to_string()));
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, file_ref: &str, _caption: &str) -> Result<(), String> {
        self.documents.lock().unwrap().push((chat_id, file_ref.to_string()));
        Ok(())
    }

    async fn download_file(&self, _file_ref: &str) -> Result<(Vec<u8>, String), String> {
        Ok((vec![1, 2, 3], "image/jpeg".to_string()))
    }

    async fn answer_button(&self, _query_id: &str, _text: &str) -> Result<(), String> {
        Ok(())
    }

    async fn send_typing(&self, _chat_id: i64) -> Result<(), String> {
        Ok(())
    }

    async fn register_webhook(&self, _url: &str, _secret: Option<&str>) -> Result<(), String> {
        Ok(())
    }
}

/// Gemini stand-in that is always down.
struct Unavailable;

#[async_trait]
impl Assistant for Unavailable {
    async fn ask(&self, _question: &str) -> Result<String, String> {
        Err("HTTP error: operation timed out".to_string())
    }

    async fn describe_image(&self, _image: Vec<u8>, _media_type: &str, _question: &str) -> Result<String, String> {
        Err("HTTP error: operation timed out".to_string())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    base: String,
    recorder: Arc<Recorder>,
    store: Arc<MaterialStore>,
    http: reqwest::Client,
}

async fn start() -> Harness {
    start_with_secret(None).await
}

async fn start_with_secret(secret: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MaterialStore::open(&dir.path().join("materials.db")).unwrap());

    let recorder = Arc::new(Recorder::default());
    let engine = BotEngine::new(
        EngineConfig {
            admin_ids: HashSet::from([ADMIN]),
            bot_username: "exam_share_bot".to_string(),
        },
        store.clone(),
        recorder.clone(),
        Arc::new(Unavailable),
    );
    let state = AppState {
        engine: Arc::new(engine),
        webhook_url: Some("https://bot.example.com/webhook".to_string()),
        webhook_secret: secret.map(str::to_string),
    };

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(state)).await.unwrap();
    });

    Harness {
        _dir: dir,
        base: format!("http://{addr}"),
        recorder,
        store,
        http: reqwest::Client::new(),
    }
}

impl Harness {
    async fn post(&self, body: &str) -> reqwest::StatusCode {
        self.post_with(body, None).await
    }

    async fn post_with(&self, body: &str, secret: Option<&str>) -> reqwest::StatusCode {
        let mut request = self
            .http
            .post(format!("{}/webhook", self.base))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(secret) = secret {
            request = request.header("X-Telegram-Bot-Api-Secret-Token", secret);
        }
        request.send().await.unwrap().status()
    }

    fn texts(&self) -> Vec<String> {
        self.recorder.texts.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

fn text_update(update_id: i64, user_id: i64, text: &str) -> String {
    serde_json::json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 1706529600,
            "chat": {"id": 500, "type": "private"},
            "from": {"id": user_id, "is_bot": false, "first_name": "User"},
            "text": text,
        }
    })
    .to_string()
}

fn document_update(update_id: i64, user_id: i64, file_id: &str, caption: &str) -> String {
    serde_json::json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 1706529600,
            "chat": {"id": 500, "type": "private"},
            "from": {"id": user_id, "is_bot": false, "first_name": "User"},
            "document": {"file_id": file_id, "file_unique_id": "u1", "file_name": "calc.pdf"},
            "caption": caption,
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_upload_and_fetch_over_http() {
    let h = start().await;

    let status = h.post(&document_update(1, ADMIN, "file-abc", "/upload exam1 | Calc Midterm")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(h.store.count().unwrap(), 1);

    assert_eq!(h.post(&text_update(2, 42, "/get exam1")).await, reqwest::StatusCode::OK);
    assert_eq!(
        h.recorder.documents.lock().unwrap().clone(),
        vec![(500, "file-abc".to_string())]
    );

    h.post(&text_update(3, 42, "/get examX")).await;
    assert_eq!(h.texts().last().unwrap(), "Material 'examX' not found.");
}

#[tokio::test]
async fn test_student_upload_denied() {
    let h = start().await;

    h.post(&document_update(1, 42, "file-abc", "/upload exam1 | Calc Midterm")).await;

    assert_eq!(h.store.count().unwrap(), 0);
    assert_eq!(h.texts(), vec!["Only admins may upload or delete materials."]);
}

#[tokio::test]
async fn test_secret_token_required_when_configured() {
    let h = start_with_secret(Some("s3cret")).await;
    let upload = document_update(1, ADMIN, "file-abc", "/upload exam1 | Calc Midterm");

    assert_eq!(h.post_with(&upload, Some("s3cret")).await, reqwest::StatusCode::OK);
    assert_eq!(h.store.count().unwrap(), 1);

    // Anyone can claim to be the admin in the body.
    let forged = text_update(2, ADMIN, "/delete exam1");
    assert_eq!(h.post(&forged).await, reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(h.post_with(&forged, Some("wrong")).await, reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(h.store.count().unwrap(), 1);
}

#[tokio::test]
async fn test_malformed_body() {
    let h = start().await;

    assert_eq!(h.post("{not json").await, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(h.post(r#"{"message":{}}"#).await, reqwest::StatusCode::BAD_REQUEST);

    assert!(h.texts().is_empty());
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_ai_outage_gives_fallback() {
    let h = start().await;

    h.post(&text_update(1, 42, "what is an eigenvalue?")).await;

    assert_eq!(h.texts(), vec![FALLBACK_REPLY]);
}

#[tokio::test]
async fn test_index_and_health() {
    let h = start().await;

    let index = h.http.get(format!("{}/", h.base)).send().await.unwrap();
    assert_eq!(index.status(), reqwest::StatusCode::OK);
    assert!(index.text().await.unwrap().contains("Webhook set to https://bot.example.com/webhook"));

    let health = h.http.get(format!("{}/health", h.base)).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "OK");
}
