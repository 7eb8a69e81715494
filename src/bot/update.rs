//! Inbound webhook payloads and their normalized form.
//!
//! Only the slice of the Telegram `Update` schema the bot acts on is
//! modelled; unknown fields are ignored by serde.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TgMessage>,
    pub callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: TgChat,
    pub from: Option<TgUser>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<Vec<TgPhotoSize>>,
    pub document: Option<TgDocument>,
}

#[derive(Debug, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TgUser {
    pub id: i64,
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Deserialize)]
pub struct TgPhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct TgDocument {
    pub file_id: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TgCallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub message: Option<TgCallbackMessage>,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TgCallbackMessage {
    pub chat: TgChat,
}

/// What the user sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Document {
        file_id: String,
        file_name: Option<String>,
        caption: Option<String>,
    },
    /// Inline keyboard press.
    Button { query_id: String, data: String },
}

/// A normalized inbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub content: Content,
}

/// Parse a raw webhook body.
pub fn parse(body: &[u8]) -> Result<Update, serde_json::Error> {
    serde_json::from_slice(body)
}

impl Update {
    /// Normalize into an [`Event`]; `None` for updates the bot ignores.
    pub fn into_event(self) -> Option<Event> {
        if let Some(msg) = self.message {
            return message_to_event(msg);
        }

        let query = self.callback_query?;
        let chat_id = query.message.as_ref().map(|m| m.chat.id).unwrap_or(query.from.id);
        Some(Event {
            chat_id,
            sender_id: query.from.id,
            sender_name: display_name(&query.from),
            content: Content::Button {
                query_id: query.id,
                data: query.data.unwrap_or_default(),
            },
        })
    }
}

fn message_to_event(msg: TgMessage) -> Option<Event> {
    let from = msg.from?;
    let caption = msg.caption.filter(|c| !c.trim().is_empty());

    let content = if let Some(text) = msg.text {
        Content::Text(text)
    } else if let Some(largest) = msg
        .photo
        .and_then(|sizes| sizes.into_iter().max_by_key(|p| u64::from(p.width) * u64::from(p.height)))
    {
        Content::Photo {
            file_id: largest.file_id,
            caption,
        }
    } else if let Some(doc) = msg.document {
        Content::Document {
            file_id: doc.file_id,
            file_name: doc.file_name,
            caption,
        }
    } else {
        return None;
    };

    Some(Event {
        chat_id: msg.chat.id,
        sender_id: from.id,
        sender_name: display_name(&from),
        content,
    })
}

fn display_name(user: &TgUser) -> String {
    user.username
        .clone()
        .unwrap_or_else(|| user.first_name.clone())
}
