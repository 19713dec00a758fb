use serenity::{
    builder::{CreateCommand, CreateCommandOption, EditInteractionResponse},
    model::application::{CommandInteraction, CommandOptionType},
    prelude::*,
};
use crate::{
    bot::SharedNotifier,
    notifier::{RunOptions, StatusSnapshot},
    utils::{
        command_helpers::{get_bool_sub_option, get_subcommand, has_manage_guild},
        responses::ephemeral_response,
    },
};
use tracing::{debug, info, warn};

/// Discord rejects message content over 2000 characters.
const MAX_REPLY_CHARS: usize = 1900;

pub const PERMISSION_DENIED: &str = "This action requires the Manage Server permission.";

pub fn register() -> CreateCommand {
    CreateCommand::new("xgoods")
        .description("Daily goods-deadline notifier")
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "status",
            "Show the notifier state and the last check",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "on",
            "Enable the daily notification (Manage Server)",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "off",
            "Disable the daily notification (Manage Server)",
        ))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "test",
                "Run one check now (Manage Server)",
            )
            .add_sub_option(
                CreateCommandOption::new(
                    CommandOptionType::Boolean,
                    "force",
                    "Ignore the enabled flag, today's dedup and the result cache",
                )
                .required(false),
            ),
        )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XgoodsCommand {
    Status,
    On,
    Off,
    Test { force: bool },
}

impl XgoodsCommand {
    pub fn from_parts(subcommand: &str, force: Option<bool>) -> Option<Self> {
        match subcommand {
            "status" => Some(XgoodsCommand::Status),
            "on" => Some(XgoodsCommand::On),
            "off" => Some(XgoodsCommand::Off),
            "test" => Some(XgoodsCommand::Test {
                force: force.unwrap_or(false),
            }),
            _ => None,
        }
    }

    pub fn requires_permission(&self) -> bool {
        !matches!(self, XgoodsCommand::Status)
    }

    /// Commands that may outlive the interaction's immediate-reply window.
    pub fn is_deferred(&self) -> bool {
        matches!(self, XgoodsCommand::Test { .. })
    }
}

/// Command logic without any Discord plumbing. Returns the reply text.
pub async fn execute(notifier: &SharedNotifier, cmd: XgoodsCommand, can_manage: bool) -> String {
    if cmd.requires_permission() && !can_manage {
        return PERMISSION_DENIED.to_string();
    }

    match cmd {
        XgoodsCommand::Status => format_status(&notifier.status().await),
        XgoodsCommand::On => {
            notifier.set_enabled(true).await;
            "xgoods notification is now **ON**.".to_string()
        }
        XgoodsCommand::Off => {
            notifier.set_enabled(false).await;
            "xgoods notification is now **OFF**.".to_string()
        }
        XgoodsCommand::Test { force } => {
            let result = notifier.run_once(RunOptions::manual_test(force)).await;
            let mut reply = format!("Test run finished: {}", result.summary());
            if let Some(url) = result.post_url() {
                reply.push('\n');
                reply.push_str(url);
            }
            reply
        }
    }
}

pub fn format_status(status: &StatusSnapshot) -> String {
    let mut lines = vec![
        format!(
            "**xgoods notifier**: {}{}",
            if status.enabled { "ON" } else { "OFF" },
            if status.enabled_override.is_none() { " (default)" } else { "" }
        ),
        format!("Account: @{}", status.username),
        format!(
            "Channel: {}",
            status
                .channel_id
                .map(|id| format!("<#{}>", id))
                .unwrap_or_else(|| "(unset)".to_string())
        ),
        format!(
            "X credential: {}",
            if status.credential_configured { "set" } else { "missing" }
        ),
    ];

    lines.push(match (&status.last_notified_post_id, status.last_notified_date_local) {
        (Some(id), Some(date)) => format!("Last notified: {} ({})", id, date),
        (Some(id), None) => format!("Last notified: {}", id),
        _ => "Last notified: never".to_string(),
    });

    match (&status.last_fetch_at, &status.last_fetch_result) {
        (Some(at), Some(result)) => {
            lines.push(format!("Last check: {} -> {}", at.format("%Y-%m-%d %H:%M:%S UTC"), result.summary()));
            if let Ok(json) = serde_json::to_string_pretty(result) {
                lines.push(format!("```json\n{}\n```", json));
            }
        }
        _ => lines.push("Last check: never".to_string()),
    }

    lines.push(format!("State: `{}`", status.state_location));
    truncate_reply(lines.join("\n"))
}

fn truncate_reply(text: String) -> String {
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_REPLY_CHARS).collect();
    cut.push('…');
    cut
}

pub async fn run(
    ctx: &Context,
    command: &CommandInteraction,
    notifier: SharedNotifier,
) -> serenity::Result<()> {
    let (name, options) = get_subcommand(command)?;
    let Some(cmd) = XgoodsCommand::from_parts(name, get_bool_sub_option(options, "force")) else {
        warn!("Unknown xgoods subcommand: {}", name);
        return Ok(());
    };
    info!("xgoods {:?} executed by user {}", cmd, command.user.id);

    let can_manage = has_manage_guild(command);

    if !cmd.is_deferred() || !can_manage {
        let reply = execute(&notifier, cmd, can_manage).await;
        command.create_response(&ctx.http, ephemeral_response(&reply)).await?;
        return Ok(());
    }

    // The interaction token may already be gone by the time the run finishes.
    if let Err(e) = command.defer_ephemeral(&ctx.http).await {
        warn!("Failed to defer xgoods {:?}: {}", cmd, e);
    }

    let reply = execute(&notifier, cmd, can_manage).await;
    match command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
        .await
    {
        Ok(_) => debug!("Edited deferred xgoods reply"),
        Err(e) => warn!("Could not deliver xgoods {:?} reply: {}", cmd, e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryStateStore, SkipReason};
    use std::sync::Arc;
    use crate::testing::*;

    #[test]
    fn test_from_parts() {
        assert_eq!(XgoodsCommand::from_parts("status", None), Some(XgoodsCommand::Status));
        assert_eq!(
            XgoodsCommand::from_parts("test", None),
            Some(XgoodsCommand::Test { force: false })
        );
        assert_eq!(
            XgoodsCommand::from_parts("test", Some(true)),
            Some(XgoodsCommand::Test { force: true })
        );
        assert_eq!(XgoodsCommand::from_parts("reset", None), None);

        assert!(!XgoodsCommand::Status.requires_permission());
        assert!(XgoodsCommand::Off.requires_permission());
        assert!(XgoodsCommand::Test { force: false }.is_deferred());
        assert!(!XgoodsCommand::On.is_deferred());
    }

    #[tokio::test]
    async fn test_toggle_requires_permission() {
        let h = harness(Vec::new());

        let reply = execute(&h.notifier, XgoodsCommand::Off, false).await;
        assert_eq!(reply, PERMISSION_DENIED);
        assert_eq!(h.store.get().await.enabled, None);

        let reply = execute(&h.notifier, XgoodsCommand::Off, true).await;
        assert!(reply.contains("OFF"));
        assert_eq!(h.store.get().await.enabled, Some(false));

        // Idempotent.
        execute(&h.notifier, XgoodsCommand::Off, true).await;
        assert_eq!(h.store.get().await.enabled, Some(false));

        execute(&h.notifier, XgoodsCommand::On, true).await;
        assert_eq!(h.store.get().await.enabled, Some(true));
    }

    #[tokio::test]
    async fn test_manual_test_without_permission_does_not_run() {
        let h = harness(vec![post(POST_ID, MATCHING_TEXT, at_jst(10, 6, 30))]);

        let reply = execute(&h.notifier, XgoodsCommand::Test { force: true }, false).await;

        assert_eq!(reply, PERMISSION_DENIED);
        assert_eq!(h.feed.total_calls(), 0);
        assert_eq!(h.channel.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_test_respects_same_day_dedup() {
        let h = harness(vec![post(POST_ID, MATCHING_TEXT, at_jst(10, 6, 30))]);

        let reply = execute(&h.notifier, XgoodsCommand::Test { force: false }, true).await;
        assert!(reply.contains("notified"));
        assert!(reply.contains("https://x.com/zutapoke/status/"));

        let reply = execute(&h.notifier, XgoodsCommand::Test { force: false }, true).await;
        assert!(reply.contains(SkipReason::AlreadyNotifiedTodayNoFetch.as_str()));
        assert_eq!(h.channel.sent_count(), 1);
        assert_eq!(h.channel.sent.lock().unwrap()[0].1.embed.footer, "source: @zutapoke / manual_test");
    }

    #[tokio::test]
    async fn test_status_is_open_to_everyone() {
        let h = harness(vec![post(POST_ID, MATCHING_TEXT, at_jst(10, 6, 30))]);

        let before = execute(&h.notifier, XgoodsCommand::Status, false).await;
        assert!(before.contains("ON (default)"));
        assert!(before.contains("<#42>"));
        assert!(before.contains("Last notified: never"));
        assert!(before.contains("Last check: never"));

        h.notifier.run_once(RunOptions::scheduled()).await;

        let after = execute(&h.notifier, XgoodsCommand::Status, false).await;
        assert!(after.contains(&format!("Last notified: {} (2026-02-10)", POST_ID)));
        assert!(after.contains("```json"));
        assert!(after.contains("\"status\": \"notified\""));
        assert!(after.contains("State: `memory`"));
    }

    #[tokio::test]
    async fn test_status_without_channel() {
        let mut config = test_config();
        config.channel_id = None;
        config.bearer_token = None;
        let h = harness_with(
            config,
            Arc::new(MemoryStateStore::default()),
            MockFeed::default(),
            MockChannel::default(),
            at_jst(10, 6, 35),
        );

        let reply = execute(&h.notifier, XgoodsCommand::Status, false).await;
        assert!(reply.contains("Channel: (unset)"));
        assert!(reply.contains("X credential: missing"));
    }

    #[test]
    fn test_long_reply_is_truncated() {
        let reply = truncate_reply("a".repeat(5000));
        assert_eq!(reply.chars().count(), MAX_REPLY_CHARS + 1);
        assert!(reply.ends_with('…'));
    }
}
