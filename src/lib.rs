//! Telegram bot that serves exam materials and relays study questions to Gemini.

pub mod bot;
pub mod config;
pub mod error;
pub mod telegram_log;
