//! OCR Bot - Telegram bot that extracts text from PDFs and images with Mistral OCR.

mod acquire;
mod config;
mod delivery;
mod error;
mod normalize;
mod ocr;
mod pipeline;
mod session;
mod telegram;

use anyhow::Context;
use config::BotConfig;
use ocr::mistral::MistralOcrProvider;
use ocr::OcrProvider;
use session::SessionStore;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use telegram::Command;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_bot=debug,teloxide=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BotConfig::from_env().context("Failed to load bot configuration")?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("ocr-bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let provider: Arc<dyn OcrProvider> = Arc::new(MistralOcrProvider::new(&config, http.clone()));
    info!(
        "OCR provider {} initialized (model {})",
        provider.name(),
        config.ocr_model
    );

    let bot = Bot::new(config.bot_token.clone());
    let me = bot.get_me().await.context("Failed to reach Telegram with BOT_TOKEN")?;
    info!("Starting as @{}", me.username());

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Could not register bot commands: {}", e);
    }

    Dispatcher::builder(bot, telegram::schema())
        .dependencies(dptree::deps![
            provider,
            SessionStore::new(),
            http,
            Arc::new(config)
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");
    Ok(())
}
