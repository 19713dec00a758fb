use crate::error::ChannelError;
use async_trait::async_trait;
use serenity::{
    builder::{CreateAllowedMentions, CreateEmbed, CreateEmbedFooter, CreateMessage},
    http::Http,
    model::{channel::Channel, id::ChannelId},
};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEmbed {
    pub title: String,
    pub url: String,
    pub description: String,
    pub footer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub content: String,
    pub embed: NotificationEmbed,
}

#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Post `notification` to `channel_id` and return the new message id.
    async fn send(&self, channel_id: u64, notification: &Notification) -> Result<String, ChannelError>;
}

pub struct SerenityChannelSender {
    http: Arc<Http>,
}

impl SerenityChannelSender {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelSender for SerenityChannelSender {
    async fn send(&self, channel_id: u64, notification: &Notification) -> Result<String, ChannelError> {
        let channel_id = ChannelId::new(channel_id);

        let channel = channel_id.to_channel(self.http.as_ref()).await.map_err(|e| {
            debug!("Could not resolve channel {}: {}", channel_id, e);
            ChannelError::NotFound {
                channel_id: channel_id.get(),
            }
        })?;

        let text_based = match &channel {
            Channel::Guild(guild_channel) => guild_channel.is_text_based(),
            Channel::Private(_) => true,
            _ => false,
        };
        if !text_based {
            return Err(ChannelError::NotTextCapable {
                channel_id: channel_id.get(),
            });
        }

        let embed = CreateEmbed::new()
            .title(&notification.embed.title)
            .url(&notification.embed.url)
            .description(&notification.embed.description)
            .footer(CreateEmbedFooter::new(&notification.embed.footer));

        // Post text comes from a third party, so no mentions are resolved.
        let message = CreateMessage::new()
            .content(&notification.content)
            .embed(embed)
            .allowed_mentions(CreateAllowedMentions::new());

        let message = channel_id
            .send_message(self.http.as_ref(), message)
            .await
            .map_err(|e| ChannelError::Send { reason: e.to_string() })?;

        info!("Sent notification to channel {} as message {}", channel_id, message.id);
        Ok(message.id.to_string())
    }
}
