//! Command parsing and classification of inbound events.

use teloxide::utils::command::{BotCommands, ParseError};

use crate::bot::materials::{MaterialKind, is_valid_id};
use crate::bot::update::{Content, Event};

/// Prefix of inline button data that fetches a material.
pub const GET_BUTTON_PREFIX: &str = "get:";

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the welcome message.")]
    Start,
    #[command(description = "show this help.")]
    Help,
    #[command(description = "list recent materials, optionally for one course: /list MATH101")]
    List(String),
    #[command(description = "download a material by id: /get exam1")]
    Get(String),
    #[command(description = "search by title, course code or department.")]
    Search(String),
    #[command(description = "ask the study assistant a question.")]
    Ask(String),
    #[command(description = "(admins) send a file with caption: /upload id | title | course | department")]
    Upload(String),
    #[command(description = "(admins) delete a material: /delete exam1")]
    Delete(String),
}

/// What the router should do with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Help,
    List { category: Option<String> },
    Get { id: String },
    Search { query: String },
    Ask { question: String },
    AskImage { file_id: String, question: Option<String> },
    Upload(UploadRequest),
    Delete { id: String },
    /// Button press that fetches a material.
    GetFromButton { query_id: String, id: String },
    /// Button press with data the bot does not know.
    StaleButton { query_id: String },
    /// A known command used without its required argument.
    Usage(&'static str),
    Unrecognized,
    /// Command addressed to a different bot.
    Ignore,
}

/// A file an admin wants to store, with its raw caption.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub kind: MaterialKind,
    pub file_id: String,
    pub file_name: Option<String>,
    pub caption: Option<String>,
}

/// Metadata parsed out of an upload caption.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSpec {
    pub id: String,
    pub title: String,
    pub category: String,
    pub department: String,
}

pub const UPLOAD_USAGE: &str =
    "To upload, send a file with the caption: /upload <id> | <title> | <course code> | <department>";

/// Classify an event into a single action.
pub fn classify(event: &Event, bot_name: &str) -> Action {
    match &event.content {
        Content::Text(text) => classify_text(text, bot_name),
        Content::Photo { file_id, caption } => match caption {
            Some(c) if is_upload_caption(c) => Action::Upload(UploadRequest {
                kind: MaterialKind::Photo,
                file_id: file_id.clone(),
                file_name: None,
                caption: Some(c.clone()),
            }),
            _ => Action::AskImage {
                file_id: file_id.clone(),
                question: caption.clone(),
            },
        },
        Content::Document {
            file_id,
            file_name,
            caption,
        } => Action::Upload(UploadRequest {
            kind: MaterialKind::Document,
            file_id: file_id.clone(),
            file_name: file_name.clone(),
            caption: caption.clone(),
        }),
        Content::Button { query_id, data } => match data.strip_prefix(GET_BUTTON_PREFIX) {
            Some(id) if !id.is_empty() => Action::GetFromButton {
                query_id: query_id.clone(),
                id: id.to_string(),
            },
            _ => Action::StaleButton {
                query_id: query_id.clone(),
            },
        },
    }
}

fn classify_text(text: &str, bot_name: &str) -> Action {
    let text = text.trim();

    if !text.starts_with('/') {
        if let Some(query) = strip_prefix_ci(text, "search:") {
            return non_empty(query)
                .map(|query| Action::Search { query })
                .unwrap_or(Action::Usage("Usage: search: <course name, code or department>"));
        }
        return Action::Ask {
            question: text.to_string(),
        };
    }

    let command = match Command::parse(text, bot_name) {
        Ok(command) => command,
        Err(ParseError::WrongBotName(_)) => return Action::Ignore,
        // Deep links arrive as `/start <payload>`.
        Err(_) if is_command(text, "/start") || is_command(text, "/help") => return Action::Help,
        Err(_) => return Action::Unrecognized,
    };

    match command {
        Command::Start | Command::Help => Action::Help,
        Command::List(category) => Action::List {
            category: non_empty(&category),
        },
        Command::Get(id) => non_empty(&id)
            .map(|id| Action::Get { id })
            .unwrap_or(Action::Usage("Usage: /get <material id>")),
        Command::Search(query) => non_empty(&query)
            .map(|query| Action::Search { query })
            .unwrap_or(Action::Usage("Usage: /search <course name, code or department>")),
        Command::Ask(question) => non_empty(&question)
            .map(|question| Action::Ask { question })
            .unwrap_or(Action::Usage("Usage: /ask <your question>")),
        Command::Upload(_) => Action::Usage(UPLOAD_USAGE),
        Command::Delete(id) => non_empty(&id)
            .map(|id| Action::Delete { id })
            .unwrap_or(Action::Usage("Usage: /delete <material id>")),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

fn is_upload_caption(caption: &str) -> bool {
    upload_token_len(caption.trim_start()).is_some()
}

fn is_command(text: &str, name: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|first| first.split('@').next())
        .is_some_and(|first| first.eq_ignore_ascii_case(name))
}

/// Length of a leading `/upload` or `/upload@botname` token.
fn upload_token_len(s: &str) -> Option<usize> {
    let first = s.split_whitespace().next()?;
    let name = first.split('@').next()?;
    name.eq_ignore_ascii_case("/upload").then_some(first.len())
}

/// Parse `[/upload] <id> | <title> | <course> | <department>`.
///
/// Everything but the id is optional; without a caption the id comes from
/// the file name stem.
pub fn parse_upload_caption(
    caption: Option<&str>,
    file_name: Option<&str>,
) -> Result<UploadSpec, String> {
    let caption = caption.map(str::trim).unwrap_or("");
    let caption = match upload_token_len(caption) {
        Some(len) => caption[len..].trim(),
        None => caption,
    };

    let mut fields = caption.splitn(4, '|').map(str::trim);
    let id = match fields.next().filter(|s| !s.is_empty()) {
        Some(id) => id.to_string(),
        None => file_name
            .map(id_from_file_name)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| UPLOAD_USAGE.to_string())?,
    };

    if !is_valid_id(&id) {
        return Err(format!(
            "Invalid material id '{id}'. Use up to 60 letters, digits, '_', '.' or '-'."
        ));
    }

    let title = fields
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| file_name.map(str::to_string))
        .unwrap_or_else(|| id.clone());
    let category = fields.next().unwrap_or("").to_string();
    let department = fields.next().unwrap_or("").to_string();

    Ok(UploadSpec {
        id,
        title,
        category,
        department,
    })
}

fn id_from_file_name(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(60)
        .collect()
}
