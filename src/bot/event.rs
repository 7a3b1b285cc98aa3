//! Inbound chat events and outbound replies.

use teloxide::types::Message;

/// One inbound notification from Telegram, reduced to what the router needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TextCommand { name: String, args: Vec<String> },
    PlainText(String),
    Location { latitude: f64, longitude: f64 },
    Voice { attachment_id: String, duration_secs: u32 },
}

impl ChatEvent {
    /// Convert a Telegram message. Returns `None` for kinds the bot ignores
    /// (photos, stickers, service messages, ...).
    pub fn from_message(msg: &Message) -> Option<Self> {
        if let Some(text) = msg.text() {
            return Some(Self::parse_text(text));
        }
        if let Some(location) = msg.location() {
            return Some(ChatEvent::Location {
                latitude: location.latitude,
                longitude: location.longitude,
            });
        }
        if let Some(voice) = msg.voice() {
            return Some(ChatEvent::Voice {
                attachment_id: voice.file.id.0.clone(),
                duration_secs: voice.duration.seconds(),
            });
        }
        None
    }

    /// Split a message text into a command or plain text.
    ///
    /// `/weather@relay_bot  Moscow` becomes `TextCommand { name: "weather", args: ["Moscow"] }`.
    pub fn parse_text(text: &str) -> Self {
        let Some(rest) = text.strip_prefix('/') else {
            return ChatEvent::PlainText(text.to_string());
        };

        if rest.starts_with(char::is_whitespace) {
            return ChatEvent::PlainText(text.to_string());
        }

        let mut tokens = rest.split_whitespace();
        let head = tokens.next().unwrap_or("");
        let name = head.split('@').next().unwrap_or("").to_lowercase();
        if name.is_empty() {
            return ChatEvent::PlainText(text.to_string());
        }

        ChatEvent::TextCommand {
            name,
            args: tokens.map(str::to_string).collect(),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> String {
        match self {
            ChatEvent::TextCommand { name, .. } => format!("/{name}"),
            ChatEvent::PlainText(_) => "text".to_string(),
            ChatEvent::Location { .. } => "location".to_string(),
            ChatEvent::Voice { duration_secs, .. } => format!("voice ({duration_secs}s)"),
        }
    }

    /// Whether handling this event calls out to a provider.
    pub fn needs_lookup(&self) -> bool {
        match self {
            ChatEvent::TextCommand { name, args } => {
                !args.is_empty() && matches!(name.as_str(), "weather" | "google" | "habr")
            }
            ChatEvent::PlainText(_) => false,
            ChatEvent::Location { .. } | ChatEvent::Voice { .. } => true,
        }
    }
}

/// One unit of text sent back to the originating chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
