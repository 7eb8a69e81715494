//! Create the materials database.
//!
//! Usage: cargo run --bin init_db
//!
//! Reads DATABASE_PATH (or DATA_DIR) from the environment / .env, like the bot.

use std::process::ExitCode;

use exam_share_bot::bot::MaterialStore;
use exam_share_bot::config::storage_paths;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let (_, path) = storage_paths(|key| std::env::var(key).ok());
    match MaterialStore::open(&path).and_then(|store| store.count()) {
        Ok(count) => {
            println!("{} initialized ({} materials).", path.display(), count);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to initialize {}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}
