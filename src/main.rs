use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use exam_share_bot::bot::{AppState, BotEngine, EngineConfig, GeminiClient, MaterialStore, TelegramClient, server};
use exam_share_bot::config::Config;
use exam_share_bot::telegram_log::TelegramLogLayer;

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal in production.
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut bot = Bot::new(&config.telegram_bot_token);
    if let Some(ref api_url) = config.telegram_api_url {
        match reqwest::Url::parse(api_url) {
            Ok(url) => bot = bot.set_api_url(url),
            Err(e) => {
                eprintln!("Invalid TELEGRAM_API_URL: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("exam-bot.log"));
    let (file_layer, _guard) = match log_file {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Logging to stdout only, cannot open log file: {e}");
            (None, None)
        }
    };
    let tg_layer = config
        .log_chat_id
        .map(|chat_id| TelegramLogLayer::new(bot.clone(), chat_id));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(env_filter()),
        )
        .with(file_layer)
        .with(tg_layer)
        .init();

    info!("🚀 Starting exam-share-bot...");
    info!("Admin IDs: {:?}", config.admin_ids);

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            me.username().to_string()
        }
        Err(e) => {
            warn!("Failed to get bot info: {e}");
            String::new()
        }
    };

    let store = match MaterialStore::open(&config.database_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open {:?}: {e}", config.database_path);
            return ExitCode::FAILURE;
        }
    };

    let gemini = match config.gemini_api_url {
        Some(ref url) => GeminiClient::with_base_url(config.gemini_api_key.clone(), url.clone()),
        None => GeminiClient::new(config.gemini_api_key.clone()),
    };
    let gemini = match gemini {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = BotEngine::new(
        EngineConfig {
            admin_ids: config.admin_ids.clone(),
            bot_username,
        },
        store,
        Arc::new(TelegramClient::new(bot)),
        gemini,
    );

    let state = AppState {
        engine: Arc::new(engine),
        webhook_url: config.webhook_url(),
        webhook_secret: config.webhook_secret.clone(),
    };
    if state.webhook_url.is_none() {
        warn!("PUBLIC_URL not set; GET / cannot register the webhook");
    }
    if state.webhook_secret.is_none() {
        warn!("WEBHOOK_SECRET not set; webhook calls are not authenticated");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    if let Err(e) = server::serve(addr, state).await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
