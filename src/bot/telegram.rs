//! Telegram client using teloxide.

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId};
use tracing::{info, warn};

use super::voice::AttachmentSource;

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send plain text, split into several messages if it is too long.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), String> {
        for chunk in split_message(text, MAX_MESSAGE_LENGTH) {
            self.bot
                .send_message(ChatId(chat_id), chunk)
                .await
                .map_err(|e| {
                    let msg = format!("Failed to send: {e}");
                    warn!("{}", msg);
                    msg
                })?;
        }
        Ok(())
    }

    /// Show "typing..." while a lookup runs. Failures only matter for logs.
    pub async fn send_typing(&self, chat_id: i64) {
        if let Err(e) = self.bot.send_chat_action(ChatId(chat_id), ChatAction::Typing).await {
            warn!("Failed to send chat action: {e}");
        }
    }
}

#[async_trait]
impl AttachmentSource for TelegramClient {
    async fn fetch_attachment(&self, attachment_id: &str) -> Result<Vec<u8>, String> {
        let file = self
            .bot
            .get_file(FileId(attachment_id.to_string()))
            .await
            .map_err(|e| format!("Failed to get file info: {e}"))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| format!("Failed to download file: {e}"))?;

        info!("📥 Downloaded attachment ({} bytes)", data.len());
        Ok(data)
    }
}

/// Split on char boundaries, preferring the last newline inside each window.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();

    while rest.len() > max_chars {
        let window = &rest[..max_chars];
        let cut = window
            .iter()
            .rposition(|&c| c == '\n')
            .filter(|&pos| pos > 0)
            .unwrap_or(max_chars);
        chunks.push(rest[..cut].iter().collect());
        let skip = if rest.get(cut) == Some(&'\n') { cut + 1 } else { cut };
        rest.drain(..skip);
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.into_iter().collect());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_is_one_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_prefers_newlines() {
        let chunks = split_message("aaaa\nbbbb\ncc", 6);
        assert_eq!(chunks, vec!["aaaa".to_string(), "bbbb".to_string(), "cc".to_string()]);
    }

    #[test]
    fn test_split_without_newlines_cuts_hard() {
        let chunks = split_message("абвгдеж", 3);
        assert_eq!(chunks, vec!["абв".to_string(), "где".to_string(), "ж".to_string()]);
    }

    #[test]
    fn test_every_chunk_fits() {
        let text = "x".repeat(MAX_MESSAGE_LENGTH * 2 + 5);
        let chunks = split_message(&text, MAX_MESSAGE_LENGTH);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_MESSAGE_LENGTH));
    }
}
