use anyhow::Result;
use serenity::{http::Http, prelude::*};
use std::sync::Arc;
use tracing::{info, error};

mod bot;
mod channel;
mod commands;
mod config;
mod data;
mod error;
mod feed;
mod handler;
mod matcher;
mod notifier;
mod scheduler;
mod time;
mod utils;

#[cfg(test)]
mod testing;

use bot::Bot;
use config::Config;
use handler::Handler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging with environment-based configuration
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "xgoods_notifier_bot=info,serenity=warn".to_string())
        )
        .init();

    info!("Starting xgoods notifier bot...");

    let config = Config::load()?;
    let token = config.discord_token.clone();

    // The notifier sends through its own Http handle so it can exist before the client.
    let http = Arc::new(Http::new(&token));
    let bot = Bot::new(config, http).await?;

    let handler = Handler {
        notifier: bot.notifier.clone(),
        scheduler: bot.scheduler.clone(),
    };

    let mut client = Client::builder(&token, GatewayIntents::GUILDS)
        .event_handler(handler)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Discord client: {}", e))?;

    info!("Bot initialized successfully, connecting to Discord...");

    if let Err(why) = client.start().await {
        error!("Discord client error: {}", why);
        return Err(anyhow::anyhow!("Discord client failed: {}", why));
    }

    Ok(())
}
