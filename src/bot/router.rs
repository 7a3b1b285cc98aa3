//! Maps each chat event to one handler and renders its replies.

use std::sync::Arc;

use tracing::{info, warn};

use super::commands::help_text;
use super::event::{ChatEvent, OutboundMessage};
use super::format;
use super::outcome::{LookupOutcome, ProviderError};
use super::search::{SearchEngine, SearchSource};
use super::voice::SpeechToText;
use super::weather::WeatherSource;

/// Stateless dispatcher from events to replies.
///
/// Every failure becomes exactly one reply; nothing is retried and nothing
/// escapes as an error, so one bad event cannot affect the next.
pub struct CommandRouter {
    weather: Arc<dyn WeatherSource>,
    search: Arc<dyn SearchSource>,
    speech: Arc<dyn SpeechToText>,
    max_voice_duration_secs: u32,
}

impl CommandRouter {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        search: Arc<dyn SearchSource>,
        speech: Arc<dyn SpeechToText>,
        max_voice_duration_secs: u32,
    ) -> Self {
        Self {
            weather,
            search,
            speech,
            max_voice_duration_secs,
        }
    }

    pub async fn dispatch(&self, event: ChatEvent) -> Vec<OutboundMessage> {
        let replies = match event {
            ChatEvent::TextCommand { name, args } => self.handle_command(&name, &args).await,
            ChatEvent::PlainText(body) => vec![OutboundMessage::new(format::format_echo(&body))],
            ChatEvent::Location { latitude, longitude } => {
                vec![self.handle_location(latitude, longitude).await]
            }
            ChatEvent::Voice { attachment_id, duration_secs } => {
                vec![self.handle_voice(&attachment_id, duration_secs).await]
            }
        };

        replies.into_iter().filter(|reply| !reply.is_blank()).collect()
    }

    async fn handle_command(&self, name: &str, args: &[String]) -> Vec<OutboundMessage> {
        match name {
            "start" => vec![OutboundMessage::new(format::GREETING)],
            "help" => vec![OutboundMessage::new(help_text())],
            "weather" => match args.first() {
                Some(city) => vec![self.handle_weather(city).await],
                None => vec![OutboundMessage::new(format::CITY_PROMPT)],
            },
            "google" => self.handle_search_command(SearchEngine::Google, args).await,
            "habr" => self.handle_search_command(SearchEngine::Habr, args).await,
            _ => {
                // Unknown commands are echoed like any other text.
                let mut text = format!("/{name}");
                for arg in args {
                    text.push(' ');
                    text.push_str(arg);
                }
                vec![OutboundMessage::new(format::format_echo(&text))]
            }
        }
    }

    async fn handle_weather(&self, city: &str) -> OutboundMessage {
        let text = match self.weather.by_city(city).await {
            LookupOutcome::Success(report) => format::format_weather(&report),
            LookupOutcome::NotFound(_) => format::format_not_found_by_city(city),
            LookupOutcome::ProviderError(e) => {
                log_provider_error("weather", &e);
                format::WEATHER_UNAVAILABLE.to_string()
            }
        };
        OutboundMessage::new(text)
    }

    async fn handle_location(&self, latitude: f64, longitude: f64) -> OutboundMessage {
        let text = match self.weather.by_coordinates(latitude, longitude).await {
            LookupOutcome::Success(report) => format::format_weather(&report),
            LookupOutcome::NotFound(_) => format::format_not_found_by_coordinates(latitude, longitude),
            LookupOutcome::ProviderError(e) => {
                log_provider_error("weather", &e);
                format::format_not_found_by_coordinates(latitude, longitude)
            }
        };
        OutboundMessage::new(text)
    }

    async fn handle_search_command(&self, engine: SearchEngine, args: &[String]) -> Vec<OutboundMessage> {
        if args.is_empty() {
            return vec![OutboundMessage::new(format::QUERY_PROMPT)];
        }
        self.handle_search(engine, &args.join(" ")).await
    }

    async fn handle_search(&self, engine: SearchEngine, query: &str) -> Vec<OutboundMessage> {
        match self.search.search(engine, query).await {
            LookupOutcome::Success(results) if !results.is_empty() => {
                info!("Relaying {} {} results", results.len(), engine.name());
                std::iter::once(OutboundMessage::new(format::format_query_echo(query)))
                    .chain(
                        results
                            .iter()
                            .map(|result| OutboundMessage::new(format::format_search_result(result))),
                    )
                    .collect()
            }
            LookupOutcome::Success(_) | LookupOutcome::NotFound(_) => {
                vec![OutboundMessage::new(format::format_no_results(query))]
            }
            LookupOutcome::ProviderError(e) => {
                log_provider_error(engine.name(), &e);
                vec![OutboundMessage::new(format::SEARCH_FAILED)]
            }
        }
    }

    async fn handle_voice(&self, attachment_id: &str, duration_secs: u32) -> OutboundMessage {
        if duration_secs > self.max_voice_duration_secs {
            info!("Rejecting {duration_secs}s voice message");
            return OutboundMessage::new(format::format_voice_too_long(self.max_voice_duration_secs));
        }

        let text = match self.speech.transcribe(attachment_id).await {
            LookupOutcome::Success(text) if !text.trim().is_empty() => text,
            LookupOutcome::Success(_) => {
                info!("Speech backend returned an empty transcript");
                format::SPEECH_UNRECOGNIZABLE.to_string()
            }
            LookupOutcome::NotFound(_) => format::SPEECH_UNRECOGNIZABLE.to_string(),
            LookupOutcome::ProviderError(e @ ProviderError::Unrecognizable) => {
                log_provider_error("speech", &e);
                format::SPEECH_UNRECOGNIZABLE.to_string()
            }
            LookupOutcome::ProviderError(e) => {
                log_provider_error("speech", &e);
                format::SPEECH_FAILED.to_string()
            }
        };
        OutboundMessage::new(text)
    }
}

fn log_provider_error(provider: &str, error: &ProviderError) {
    warn!(provider, reason = error.reason(), error = %error, "Provider call failed");
}
