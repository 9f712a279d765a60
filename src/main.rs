mod bot;
mod config;
mod health;

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::prelude::*;

use bot::handlers::{handle_callback, handle_command, handle_text};
use bot::{BotState, Command, GeminiClient};
use config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.txt".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting saathi...");
    info!("Loaded config from {config_path}");
    info!("Owner ID: {}", config.owner_id);

    let gemini = match GeminiClient::new(config.gemini_api_keys.clone()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    info!(
        "Gemini client ready ({} keys, model {})",
        config.gemini_api_keys.len(),
        gemini.current_model()
    );

    let bot = Bot::new(&config.telegram_bot_token);
    let health_port = config.health_port;
    let state = Arc::new(BotState::new(config, gemini));

    tokio::spawn(health::serve(health_port));

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_message().endpoint(handle_text))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
