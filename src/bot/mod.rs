//! Bot module - turns chat events into lookups and replies.

pub mod commands;
pub mod event;
pub mod format;
pub mod outcome;
pub mod router;
pub mod search;
pub mod speech;
pub mod telegram;
pub mod transcode;
pub mod voice;
pub mod weather;
#[cfg(feature = "whisper")]
pub mod whisper;


pub use commands::Command;
pub use event::{ChatEvent, OutboundMessage};
pub use outcome::{LookupOutcome, ProviderError};
pub use router::CommandRouter;
pub use search::{SearchEngine, SearchLookup, SearchResult, SearchSource};
pub use speech::{GoogleSpeech, SpeechBackend, SpeechError};
pub use telegram::TelegramClient;
pub use transcode::{Ffmpeg, TranscodeError, Transcoder};
pub use voice::{AttachmentSource, SpeechToText, VoiceTranscriber};
pub use weather::{WeatherLookup, WeatherReport, WeatherSource};
#[cfg(feature = "whisper")]
pub use whisper::Whisper;
