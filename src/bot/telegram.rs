//! Telegram client using teloxide.

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, ChatAction, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile,
};
use tracing::{info, warn};

/// Telegram rejects text messages longer than this (in UTF-16 units; chars are a safe bound).
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// A callback button attached under a text message.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineButton {
    pub label: String,
    pub data: String,
}

/// Outbound side of the bot. [`TelegramClient`] talks to the real API.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str, buttons: &[InlineButton]) -> Result<(), String>;

    async fn send_document(&self, chat_id: i64, file_ref: &str, caption: &str) -> Result<(), String>;

    async fn send_photo(&self, chat_id: i64, file_ref: &str, caption: &str) -> Result<(), String>;

    /// Download a file by id. Returns (bytes, media_type).
    async fn download_file(&self, file_ref: &str) -> Result<(Vec<u8>, String), String>;

    async fn answer_button(&self, query_id: &str, text: &str) -> Result<(), String>;

    /// Show "typing..." in the chat until the next message is sent.
    async fn send_typing(&self, chat_id: i64) -> Result<(), String>;

    /// Point Telegram's update delivery at `url`, replacing any previous webhook.
    /// With a `secret`, Telegram echoes it in `X-Telegram-Bot-Api-Secret-Token`.
    async fn register_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), String>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Split text into pieces Telegram will accept, preferring line breaks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len <= max_chars {
            current.push_str(line);
            current_len += line_len;
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        // A single line longer than the limit gets hard-split.
        let mut chars = line.chars().peekable();
        while chars.peek().is_some() {
            let piece: String = chars.by_ref().take(max_chars).collect();
            let piece_len = piece.chars().count();
            if piece_len == max_chars {
                chunks.push(piece);
            } else {
                current = piece;
                current_len = piece_len;
            }
        }
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Guess a media type from a Telegram file path.
fn media_type_for(file_path: &str) -> &'static str {
    let lower = file_path.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".pdf") {
        "application/pdf"
    } else {
        "image/jpeg" // Default for Telegram images
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str, buttons: &[InlineButton]) -> Result<(), String> {
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut request = self.bot.send_message(ChatId(chat_id), chunk);

            if i == last && !buttons.is_empty() {
                let row = buttons
                    .iter()
                    .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
                    .collect::<Vec<_>>();
                request = request.reply_markup(InlineKeyboardMarkup::new(vec![row]));
            }

            request.await.map_err(|e| {
                let msg = format!("Failed to send: {e}");
                warn!("{}", msg);
                msg
            })?;
        }
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, file_ref: &str, caption: &str) -> Result<(), String> {
        info!("📄 Sending document to chat {}", chat_id);

        let file = InputFile::file_id(FileId(file_ref.to_string()));
        self.bot
            .send_document(ChatId(chat_id), file)
            .caption(caption)
            .await
            .map_err(|e| {
                let msg = format!("Failed to send document: {e}");
                warn!("{}", msg);
                msg
            })?;

        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, file_ref: &str, caption: &str) -> Result<(), String> {
        info!("📷 Sending photo to chat {}", chat_id);

        let file = InputFile::file_id(FileId(file_ref.to_string()));
        self.bot
            .send_photo(ChatId(chat_id), file)
            .caption(caption)
            .await
            .map_err(|e| {
                let msg = format!("Failed to send photo: {e}");
                warn!("{}", msg);
                msg
            })?;

        Ok(())
    }

    async fn download_file(&self, file_ref: &str) -> Result<(Vec<u8>, String), String> {
        let file = self
            .bot
            .get_file(FileId(file_ref.to_string()))
            .await
            .map_err(|e| format!("Failed to get file info: {e}"))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| format!("Failed to download file: {e}"))?;

        let media_type = media_type_for(&file.path);
        info!("📥 Downloaded file ({} bytes, {})", data.len(), media_type);
        Ok((data, media_type.to_string()))
    }

    async fn answer_button(&self, query_id: &str, text: &str) -> Result<(), String> {
        self.bot
            .answer_callback_query(CallbackQueryId(query_id.to_owned()))
            .text(text)
            .await
            .map_err(|e| {
                let msg = format!("Failed to answer callback: {e}");
                warn!("{}", msg);
                msg
            })?;

        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), String> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map_err(|e| format!("Failed to send typing action: {e}"))?;
        Ok(())
    }

    async fn register_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), String> {
        let url = reqwest::Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;

        self.bot
            .delete_webhook()
            .await
            .map_err(|e| format!("could not remove old webhook: {e}"))?;

        let mut request = self.bot.set_webhook(url.clone());
        if let Some(secret) = secret {
            request = request.secret_token(secret);
        }
        request.await.map_err(|e| e.to_string())?;

        info!("🔗 Webhook set to {}", url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
        assert_eq!(split_message("", 10), vec![""]);
    }

    #[test]
    fn test_split_on_line_breaks() {
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc"]);
    }

    #[test]
    fn test_long_line_hard_split() {
        let chunks = split_message(&"x".repeat(25), 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "xxxxx");
        assert_eq!(chunks.concat(), "x".repeat(25));
    }

    #[test]
    fn test_split_preserves_text_and_respects_limit() {
        let text = "Ответ: ".repeat(1500);
        let chunks = split_message(&text, MAX_MESSAGE_CHARS);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_MESSAGE_CHARS));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_media_type_guess() {
        assert_eq!(media_type_for("photos/file_1.PNG"), "image/png");
        assert_eq!(media_type_for("photos/file_2.jpg"), "image/jpeg");
        assert_eq!(media_type_for("documents/a.pdf"), "application/pdf");
    }

    fn client_for(server: &mockito::Server) -> TelegramClient {
        let api_url = reqwest::Url::parse(&server.url()).unwrap();
        TelegramClient::new(Bot::new("123456:test-token").set_api_url(api_url))
    }

    fn method(name: &str) -> mockito::Matcher {
        // Telegram method names are case-insensitive.
        mockito::Matcher::Regex(format!("(?i)/bot123456:test-token/{name}$"))
    }

    const OK_TRUE: &str = r#"{"ok":true,"result":true}"#;

    #[tokio::test]
    async fn test_answer_button_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", method("answerCallbackQuery"))
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "callback_query_id": "q1",
                "text": "Sent!"
            })))
            .with_header("content-type", "application/json")
            .with_body(OK_TRUE)
            .create_async()
            .await;

        let client = client_for(&server);
        client.answer_button("q1", "Sent!").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_typing_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", method("sendChatAction"))
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "chat_id": 500,
                "action": "typing"
            })))
            .with_header("content-type", "application/json")
            .with_body(OK_TRUE)
            .create_async()
            .await;

        let client = client_for(&server);
        client.send_typing(500).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_register_webhook_sends_secret() {
        let mut server = mockito::Server::new_async().await;
        let delete = server
            .mock("POST", method("deleteWebhook"))
            .with_header("content-type", "application/json")
            .with_body(OK_TRUE)
            .create_async()
            .await;
        let set = server
            .mock("POST", method("setWebhook"))
            .match_body(mockito::Matcher::Regex("s3cret".into()))
            .with_header("content-type", "application/json")
            .with_body(OK_TRUE)
            .create_async()
            .await;

        let client = client_for(&server);
        client
            .register_webhook("https://bot.example.com/webhook", Some("s3cret"))
            .await
            .unwrap();

        delete.assert_async().await;
        set.assert_async().await;
    }

    #[tokio::test]
    async fn test_register_webhook_error_is_unprefixed() {
        let mut server = mockito::Server::new_async().await;
        let _delete = server
            .mock("POST", method("deleteWebhook"))
            .with_header("content-type", "application/json")
            .with_body(OK_TRUE)
            .create_async()
            .await;
        let _set = server
            .mock("POST", method("setWebhook"))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok":false,"error_code":400,"description":"Bad Request: bad webhook: HTTPS url must be provided for webhook"}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .register_webhook("https://bot.example.com/webhook", None)
            .await
            .unwrap_err();

        assert!(!err.is_empty());
        assert!(!err.contains("Failed to set webhook"), "{err}");
    }
}
