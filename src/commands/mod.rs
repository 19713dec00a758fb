pub mod xgoods;

use serenity::{
    model::application::{Command, Interaction},
    prelude::*,
};
use crate::bot::SharedNotifier;

pub async fn register_commands(ctx: &Context) -> serenity::Result<()> {
    let commands = vec![xgoods::register()];

    Command::set_global_commands(&ctx.http, commands).await?;
    Ok(())
}

pub async fn handle_command(
    ctx: &Context,
    interaction: &Interaction,
    notifier: SharedNotifier,
) -> serenity::Result<()> {
    if let Interaction::Command(command) = interaction {
        match command.data.name.as_str() {
            "xgoods" => xgoods::run(ctx, command, notifier).await?,
            _ => {
                tracing::warn!("Unknown command: {}", command.data.name);
            }
        }
    }
    Ok(())
}
