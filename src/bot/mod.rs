//! Bot module - webhook in, materials or Gemini answers out.

pub mod commands;
pub mod engine;
pub mod gemini;
pub mod materials;
pub mod server;
pub mod telegram;
pub mod update;


pub use engine::{BotEngine, EngineConfig};
pub use gemini::{Assistant, GeminiClient};
pub use materials::{Material, MaterialKind, MaterialStore, StoreError};
pub use server::AppState;
pub use telegram::{InlineButton, Messenger, TelegramClient};
pub use update::{Content, Event};
