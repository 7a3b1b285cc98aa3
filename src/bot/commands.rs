//! The command menu registered with Telegram.
//!
//! Routing does not go through this enum (see `CommandRouter`); it exists to
//! publish the menu via `set_my_commands` and to render `/help`.

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    #[command(description = "start the bot")]
    Start,
    #[command(description = "list available commands")]
    Help,
    #[command(description = "current weather in a city, e.g. /weather Moscow")]
    Weather(String),
    #[command(description = "search Google, e.g. /google rust tokio")]
    Google(String),
    #[command(description = "search Habr articles, e.g. /habr async rust")]
    Habr(String),
}

/// Text for `/help`: the command menu plus the non-command inputs.
pub fn help_text() -> String {
    format!(
        "{}\n\nSend a location to get the weather there, or a voice message to have it transcribed.",
        Command::descriptions()
    )
}
