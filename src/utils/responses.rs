use serenity::builder::{CreateAllowedMentions, CreateInteractionResponse, CreateInteractionResponseMessage};

/// Reply visible only to the invoking user, with mentions disabled.
pub fn ephemeral_response(message: &str) -> CreateInteractionResponse {
    let data = CreateInteractionResponseMessage::new()
        .content(message)
        .ephemeral(true)
        .allowed_mentions(CreateAllowedMentions::new());
    CreateInteractionResponse::Message(data)
}
