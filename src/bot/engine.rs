//! Bot engine - routes each inbound event to the store, the AI relay or a static reply.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::bot::commands::{
    Action, Command, GET_BUTTON_PREFIX, UploadRequest, classify, parse_upload_caption,
};
use crate::bot::gemini::{Assistant, DEFAULT_IMAGE_PROMPT};
use crate::bot::materials::{Material, MaterialKind, MaterialStore};
use crate::bot::telegram::{InlineButton, Messenger};
use crate::bot::update::Event;
use crate::error::BotError;

/// Max hits returned by a search.
pub const SEARCH_LIMIT: usize = 10;

pub const WELCOME_TEXT: &str = "Welcome to the Exam Share Bot 🎓\n\n\
I help students get past exams, tutorial sheets and module PDFs, \
and I can answer study questions. Send any question as a normal message, \
or send a photo of a problem to get help with it.";

pub const UNKNOWN_COMMAND_REPLY: &str =
    "Sorry, I don't know that command. Send /help to see what I can do.";

pub const PROCESSING_IMAGE_REPLY: &str = "Processing image... (may take a few seconds)";

pub const BUTTON_FAILED_ACK: &str = "Could not send the file, please try again.";

/// Engine configuration, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Users allowed to upload and delete materials.
    pub admin_ids: HashSet<i64>,
    /// Bot username without `@`, used to accept `/cmd@botname`.
    pub bot_username: String,
}

/// The bot engine.
pub struct BotEngine {
    config: EngineConfig,
    store: Arc<MaterialStore>,
    messenger: Arc<dyn Messenger>,
    assistant: Arc<dyn Assistant>,
}

impl BotEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<MaterialStore>,
        messenger: Arc<dyn Messenger>,
        assistant: Arc<dyn Assistant>,
    ) -> Self {
        Self {
            config,
            store,
            messenger,
            assistant,
        }
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.config.admin_ids.contains(&user_id)
    }

    pub async fn register_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), String> {
        self.messenger.register_webhook(url, secret).await
    }

    /// Handle one event end to end. Failures turn into a reply to the user.
    pub async fn handle_event(&self, event: Event) {
        let action = classify(&event, &self.config.bot_username);
        info!(
            "📨 {} ({}) in chat {} → {}",
            event.sender_name,
            event.sender_id,
            event.chat_id,
            action_name(&action)
        );

        if let Err(e) = self.dispatch(&event, action).await {
            self.report(&event, e).await;
        }
    }

    async fn report(&self, event: &Event, err: BotError) {
        match &err {
            BotError::Store(_) => error!("Storage failure for chat {}: {err}", event.chat_id),
            BotError::Upstream(_) => warn!("Upstream failure for chat {}: {err}", event.chat_id),
            _ => info!("Rejected request from {}: {err}", event.sender_id),
        }

        if let Err(e) = self
            .messenger
            .send_text(event.chat_id, &err.user_message(), &[])
            .await
        {
            warn!("Could not deliver error reply to chat {}: {e}", event.chat_id);
        }
    }

    async fn dispatch(&self, event: &Event, action: Action) -> Result<(), BotError> {
        let chat_id = event.chat_id;

        match action {
            Action::Help => {
                let text = format!("{WELCOME_TEXT}\n\n{}", Command::descriptions());
                self.reply(chat_id, &text).await
            }
            Action::List { category } => self.list(chat_id, category.as_deref()).await,
            Action::Get { id } => self.send_material(chat_id, &id).await,
            Action::Search { query } => self.search(chat_id, &query).await,
            Action::Ask { question } => {
                if let Err(e) = self.messenger.send_typing(chat_id).await {
                    debug!("Typing indicator failed for chat {}: {e}", chat_id);
                }
                let answer = self
                    .assistant
                    .ask(&question)
                    .await
                    .map_err(BotError::Upstream)?;
                self.reply(chat_id, &answer).await
            }
            Action::AskImage { file_id, question } => {
                self.reply(chat_id, PROCESSING_IMAGE_REPLY).await?;
                let (bytes, media_type) = self
                    .messenger
                    .download_file(&file_id)
                    .await
                    .map_err(BotError::Upstream)?;
                let prompt = question.as_deref().unwrap_or(DEFAULT_IMAGE_PROMPT);
                let answer = self
                    .assistant
                    .describe_image(bytes, &media_type, prompt)
                    .await
                    .map_err(BotError::Upstream)?;
                self.reply(chat_id, &answer).await
            }
            Action::Upload(request) => {
                self.require_admin(event)?;
                self.upload(event, request).await
            }
            Action::Delete { id } => {
                self.require_admin(event)?;
                self.store.delete(&id)?;
                info!("🗑️ Material {} deleted by {}", id, event.sender_id);
                self.reply(chat_id, &format!("Deleted material '{id}'.")).await
            }
            Action::GetFromButton { query_id, id } => {
                let ack = match self.send_material(chat_id, &id).await {
                    Ok(()) => "Sent!",
                    Err(BotError::NotFound(_)) => "Material not found.",
                    Err(e) => {
                        // Unanswered queries leave the button spinning.
                        if let Err(ack_err) = self
                            .messenger
                            .answer_button(&query_id, BUTTON_FAILED_ACK)
                            .await
                        {
                            warn!("Could not answer button {}: {ack_err}", query_id);
                        }
                        return Err(e);
                    }
                };
                self.messenger
                    .answer_button(&query_id, ack)
                    .await
                    .map_err(BotError::Upstream)
            }
            Action::StaleButton { query_id } => self
                .messenger
                .answer_button(&query_id, "This button has expired.")
                .await
                .map_err(BotError::Upstream),
            Action::Usage(usage) => self.reply(chat_id, usage).await,
            Action::Unrecognized => self.reply(chat_id, UNKNOWN_COMMAND_REPLY).await,
            Action::Ignore => Ok(()),
        }
    }

    fn require_admin(&self, event: &Event) -> Result<(), BotError> {
        if self.is_admin(event.sender_id) {
            Ok(())
        } else {
            Err(BotError::Unauthorized)
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        self.messenger
            .send_text(chat_id, text, &[])
            .await
            .map_err(BotError::Upstream)
    }

    async fn list(&self, chat_id: i64, category: Option<&str>) -> Result<(), BotError> {
        let materials = self.store.list(category)?;

        if materials.is_empty() {
            let text = match category {
                Some(c) => format!("No materials for {c} yet."),
                None => "No materials uploaded yet.".to_string(),
            };
            return self.reply(chat_id, &text).await;
        }

        let mut text = match category {
            Some(c) => format!("Materials for {c}:\n"),
            None => "Recent materials:\n".to_string(),
        };
        for m in &materials {
            text.push_str(&m.summary());
            text.push('\n');
        }
        text.push_str("\nUse /get <id> to download.");
        self.reply(chat_id, &text).await
    }

    async fn search(&self, chat_id: i64, query: &str) -> Result<(), BotError> {
        let hits = self.store.search(query, SEARCH_LIMIT)?;
        if hits.is_empty() {
            return self.reply(chat_id, "No matches found.").await;
        }

        for m in &hits {
            let text = format!(
                "{}. {}\nCourse: {}\nDept: {}",
                m.id,
                m.title,
                or_na(&m.category),
                or_na(&m.department)
            );
            let button = InlineButton {
                label: "Download".to_string(),
                data: format!("{GET_BUTTON_PREFIX}{}", m.id),
            };
            self.messenger
                .send_text(chat_id, &text, &[button])
                .await
                .map_err(BotError::Upstream)?;
        }
        Ok(())
    }

    async fn send_material(&self, chat_id: i64, id: &str) -> Result<(), BotError> {
        let material = self.store.get(id)?;
        let caption = material.caption();

        let sent = match material.kind {
            MaterialKind::Document => {
                self.messenger
                    .send_document(chat_id, &material.file_ref, &caption)
                    .await
            }
            MaterialKind::Photo => {
                self.messenger
                    .send_photo(chat_id, &material.file_ref, &caption)
                    .await
            }
        };
        sent.map_err(BotError::Upstream)
    }

    async fn upload(&self, event: &Event, request: UploadRequest) -> Result<(), BotError> {
        let spec = parse_upload_caption(request.caption.as_deref(), request.file_name.as_deref())
            .map_err(BotError::InvalidInput)?;

        let material = Material {
            id: spec.id,
            title: spec.title,
            category: spec.category,
            department: spec.department,
            kind: request.kind,
            file_ref: request.file_id,
            uploaded_by: event.sender_id,
            uploaded_at: Utc::now().to_rfc3339(),
        };
        self.store.add(&material)?;
        info!("📚 Material {} uploaded by {}", material.id, event.sender_id);

        let text = format!(
            "Uploaded: {} (id: {}, course: {})",
            material.title,
            material.id,
            or_na(&material.category)
        );
        self.reply(event.chat_id, &text).await
    }
}

fn or_na(s: &str) -> &str {
    if s.is_empty() { "N/A" } else { s }
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::Help => "help",
        Action::List { .. } => "list",
        Action::Get { .. } => "get",
        Action::Search { .. } => "search",
        Action::Ask { .. } => "ask",
        Action::AskImage { .. } => "ask_image",
        Action::Upload(_) => "upload",
        Action::Delete { .. } => "delete",
        Action::GetFromButton { .. } => "get_button",
        Action::StaleButton { .. } => "stale_button",
        Action::Usage(_) => "usage",
        Action::Unrecognized => "unrecognized",
        Action::Ignore => "ignore",
    }
}
