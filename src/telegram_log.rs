use std::time::Duration;

use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram caps messages at 4096 chars; leave room for the ellipsis.
const MAX_LOG_CHARS: usize = 4000;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BUFFERED: usize = 50;

/// Log message with priority.
#[derive(Debug, PartialEq)]
enum LogMessage {
    /// WARN/ERROR - send immediately
    Urgent(String),
    /// INFO - batch and send periodically
    Info(String),
}

/// Forwards bot log lines to an admin chat.
pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl TelegramLogLayer {
    /// Must be called inside a tokio runtime.
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        let chat_id = ChatId(chat_id);
        let (tx, mut rx) = mpsc::unbounded_channel::<LogMessage>();

        tokio::spawn(async move {
            let mut info_buffer: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(LogMessage::Urgent(text)) => send_log(&bot, chat_id, &text).await,
                            Some(LogMessage::Info(text)) => {
                                info_buffer.push(text);
                                if info_buffer.len() >= MAX_BUFFERED {
                                    flush_buffer(&bot, chat_id, &mut info_buffer).await;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = interval.tick() => flush_buffer(&bot, chat_id, &mut info_buffer).await,
                }
            }
        });

        Self { tx }
    }
}

fn truncate_log(text: &str) -> String {
    if text.chars().count() > MAX_LOG_CHARS {
        let truncated: String = text.chars().take(MAX_LOG_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

async fn send_log(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, truncate_log(text)).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

async fn flush_buffer(bot: &Bot, chat_id: ChatId, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let combined = buffer.join("\n");
    buffer.clear();
    send_log(bot, chat_id, &combined).await;
}

/// Events from the HTTP stack would echo our own log traffic back.
fn is_forwardable(target: &str, level: Level) -> bool {
    level <= Level::INFO
        && !["teloxide", "reqwest", "hyper", "h2", "rustls"]
            .iter()
            .any(|prefix| target.starts_with(prefix))
}

fn classify(level: Level, message: String) -> LogMessage {
    match level {
        Level::ERROR => LogMessage::Urgent(format!("❌ {}", message)),
        Level::WARN => LogMessage::Urgent(format!("⚠️ {}", message)),
        _ => LogMessage::Info(message),
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        if !is_forwardable(metadata.target(), level) {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        if self.tx.send(classify(level, visitor.message)).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
