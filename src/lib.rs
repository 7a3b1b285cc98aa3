//! Telegram bot that answers weather, search and voice requests by relaying
//! them to third-party services.

pub mod bot;
pub mod config;
