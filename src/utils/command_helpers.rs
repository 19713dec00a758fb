use serenity::model::application::{CommandDataOption, CommandDataOptionValue, CommandInteraction};

/// Extracts the invoked subcommand from a Discord command interaction.
///
/// # Arguments
/// * `command` - The Discord command interaction
///
/// # Returns
/// * `Ok((&str, &[CommandDataOption]))` - The subcommand name and its options
/// * `Err(serenity::Error)` - If the command was invoked without a subcommand
///
/// # Example
/// ```rust
/// let (name, options) = get_subcommand(command)?;
/// ```
pub fn get_subcommand(command: &CommandInteraction) -> serenity::Result<(&str, &[CommandDataOption])> {
    command
        .data
        .options
        .iter()
        .find_map(|opt| match &opt.value {
            CommandDataOptionValue::SubCommand(options) => Some((opt.name.as_str(), options.as_slice())),
            _ => None,
        })
        .ok_or_else(|| serenity::Error::Other("Missing subcommand"))
}

/// Extracts an optional boolean option from a subcommand's options.
///
/// Returns `None` when the option was not given or is not a boolean.
pub fn get_bool_sub_option(options: &[CommandDataOption], name: &str) -> Option<bool> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| match opt.value {
            CommandDataOptionValue::Boolean(value) => Some(value),
            _ => None,
        })
}

/// Whether the invoking member holds the Manage Server permission.
///
/// Interactions outside a guild carry no member and are never allowed.
pub fn has_manage_guild(command: &CommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.manage_guild())
}
