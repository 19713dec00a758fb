use serenity::{
    async_trait,
    model::{
        application::Interaction,
        gateway::Ready,
    },
    prelude::*,
};
use std::sync::Arc;
use tracing::{info, error};
use crate::{bot::SharedNotifier, commands, scheduler::DailyScheduler};

pub struct Handler {
    pub notifier: SharedNotifier,
    pub scheduler: Arc<DailyScheduler>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);

        if let Err(why) = commands::register_commands(&ctx).await {
            error!("Failed to register slash commands: {}", why);
        } else {
            info!("Successfully registered slash commands");
        }

        // Ready fires again after a reconnect; start() only spawns once.
        if self.scheduler.start() {
            info!("Daily xgoods scheduler started");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Err(why) = commands::handle_command(&ctx, &interaction, self.notifier.clone()).await {
            error!("Error handling command: {}", why);
        }
    }
}
