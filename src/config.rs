use reqwest::Url;
use scraper::Selector;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_WEATHER_API_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const DEFAULT_GOOGLE_SPEECH_URL: &str = "http://www.google.com/speech-api/v2/recognize";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file '{}': {source}", .path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    #[error("invalid CSS selector '{selector}' for {engine}: {reason}")]
    InvalidSelector { engine: &'static str, selector: String, reason: String },
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// OpenWeather API key
    #[serde(default)]
    weather_api_key: String,
    weather_api_url: Option<String>,
    /// Language of weather descriptions (OpenWeather `lang` parameter)
    weather_lang: Option<String>,
    #[serde(default)]
    delivery: DeliveryFile,
    /// Directory for logs and temporary voice files. Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default)]
    search: SearchFile,
    #[serde(default)]
    speech: SpeechFile,
}

#[derive(Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
enum DeliveryFile {
    Polling {
        #[serde(default = "default_true")]
        drop_pending_updates: bool,
    },
    Webhook {
        url: String,
        #[serde(default = "default_webhook_port")]
        port: u16,
    },
}

impl Default for DeliveryFile {
    fn default() -> Self {
        DeliveryFile::Polling { drop_pending_updates: true }
    }
}

#[derive(Deserialize, Default)]
struct SearchFile {
    google: Option<SearchProviderFile>,
    habr: Option<SearchProviderFile>,
}

#[derive(Deserialize, Default)]
struct SearchProviderFile {
    url_template: Option<String>,
    result_selector: Option<String>,
    link_selector: Option<String>,
    title_selector: Option<String>,
    description_selector: Option<String>,
}

#[derive(Deserialize, Default)]
struct SpeechFile {
    #[serde(default)]
    backend: SpeechBackendKind,
    language: Option<String>,
    api_url: Option<String>,
    api_key: Option<String>,
    whisper_model_path: Option<String>,
    ffmpeg_path: Option<String>,
    max_voice_duration_secs: Option<u32>,
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_webhook_port() -> u16 {
    8443
}

fn default_true() -> bool {
    true
}

/// How updates reach the bot. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Polling { drop_pending_updates: bool },
    Webhook { url: Url, port: u16 },
}

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub api_url: String,
    pub lang: String,
}

/// Where a search engine lives and how its result page is scraped.
///
/// The selectors track undocumented third-party markup. When a provider changes
/// its layout, searches start returning nothing; update the selectors here or in
/// the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchProviderConfig {
    /// Results page URL; `{query}` is replaced with the percent-encoded query.
    pub url_template: String,
    pub result_selector: String,
    pub link_selector: String,
    pub title_selector: Option<String>,
    pub description_selector: Option<String>,
}

impl SearchProviderConfig {
    pub fn google() -> Self {
        Self {
            url_template: "https://www.google.com/search?q={query}".into(),
            result_selector: "div.g".into(),
            link_selector: "a[href]".into(),
            title_selector: None,
            description_selector: None,
        }
    }

    pub fn habr() -> Self {
        Self {
            url_template: "https://habr.com/ru/search/?q={query}&target_type=posts&order=relevance".into(),
            result_selector: "article.tm-articles-list__item".into(),
            link_selector: "a.tm-title__link".into(),
            title_selector: Some("a.tm-title__link".into()),
            description_selector: Some("div.article-formatted-body".into()),
        }
    }

    fn merged(mut self, file: Option<SearchProviderFile>) -> Self {
        let Some(file) = file else { return self };
        if let Some(v) = file.url_template {
            self.url_template = v;
        }
        if let Some(v) = file.result_selector {
            self.result_selector = v;
        }
        if let Some(v) = file.link_selector {
            self.link_selector = v;
        }
        if file.title_selector.is_some() {
            self.title_selector = file.title_selector;
        }
        if file.description_selector.is_some() {
            self.description_selector = file.description_selector;
        }
        self
    }

    fn validate(&self, engine: &'static str) -> Result<(), ConfigError> {
        if !self.url_template.contains("{query}") {
            return Err(ConfigError::Validation(format!(
                "search url_template for {engine} must contain {{query}}"
            )));
        }
        let selectors = [
            Some(&self.result_selector),
            Some(&self.link_selector),
            self.title_selector.as_ref(),
            self.description_selector.as_ref(),
        ];
        for selector in selectors.into_iter().flatten() {
            Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
                engine,
                selector: selector.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub google: SearchProviderConfig,
    pub habr: SearchProviderConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            google: SearchProviderConfig::google(),
            habr: SearchProviderConfig::habr(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackendKind {
    #[default]
    Google,
    Whisper,
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub backend: SpeechBackendKind,
    /// Recognition language tag, e.g. "ru-RU".
    pub language: String,
    pub api_url: String,
    pub api_key: Option<String>,
    /// Path to a Whisper model file (.bin), used by the `whisper` backend.
    pub whisper_model_path: Option<PathBuf>,
    pub ffmpeg_path: String,
    /// Longer voice messages are rejected without being downloaded.
    pub max_voice_duration_secs: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackendKind::Google,
            language: "ru-RU".into(),
            api_url: DEFAULT_GOOGLE_SPEECH_URL.into(),
            api_key: None,
            whisper_model_path: None,
            ffmpeg_path: "ffmpeg".into(),
            max_voice_duration_secs: 60,
        }
    }
}

pub struct Config {
    pub telegram_bot_token: String,
    pub weather: WeatherConfig,
    pub delivery: Delivery,
    /// Directory for logs and temporary files.
    pub data_dir: PathBuf,
    /// Upper bound for every outbound call (HTTP, ffmpeg, speech backend).
    pub request_timeout: Duration,
    pub search: SearchConfig,
    pub speech: SpeechConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }
        if file.weather_api_key.trim().is_empty() {
            return Err(ConfigError::Validation("weather_api_key is required".into()));
        }
        if file.request_timeout_secs == 0 {
            return Err(ConfigError::Validation("request_timeout_secs must be positive".into()));
        }

        let delivery = match file.delivery {
            DeliveryFile::Polling { drop_pending_updates } => Delivery::Polling { drop_pending_updates },
            DeliveryFile::Webhook { url, port } => {
                let url = Url::parse(&url)
                    .map_err(|e| ConfigError::Validation(format!("webhook url '{url}' is invalid: {e}")))?;
                Delivery::Webhook { url, port }
            }
        };

        let search = SearchConfig {
            google: SearchProviderConfig::google().merged(file.search.google),
            habr: SearchProviderConfig::habr().merged(file.search.habr),
        };
        search.google.validate("google")?;
        search.habr.validate("habr")?;

        let speech = build_speech_config(file.speech)?;

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            weather: WeatherConfig {
                api_key: file.weather_api_key,
                api_url: file.weather_api_url.unwrap_or_else(|| DEFAULT_WEATHER_API_URL.into()),
                lang: file.weather_lang.unwrap_or_else(|| "ru".into()),
            },
            delivery,
            data_dir,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            search,
            speech,
        })
    }

    /// Directory where voice attachments and their transcodes are staged.
    pub fn voice_work_dir(&self) -> PathBuf {
        self.data_dir.join("voice")
    }
}

fn build_speech_config(file: SpeechFile) -> Result<SpeechConfig, ConfigError> {
    let defaults = SpeechConfig::default();
    let speech = SpeechConfig {
        backend: file.backend,
        language: file.language.unwrap_or(defaults.language),
        api_url: file.api_url.unwrap_or(defaults.api_url),
        api_key: file.api_key.filter(|k| !k.is_empty()),
        whisper_model_path: file.whisper_model_path.map(PathBuf::from),
        ffmpeg_path: file.ffmpeg_path.unwrap_or(defaults.ffmpeg_path),
        max_voice_duration_secs: file.max_voice_duration_secs.unwrap_or(defaults.max_voice_duration_secs),
    };

    if speech.backend == SpeechBackendKind::Whisper {
        if !cfg!(feature = "whisper") {
            return Err(ConfigError::Validation(
                "speech backend 'whisper' requires building with the `whisper` feature".into(),
            ));
        }
        if speech.whisper_model_path.is_none() {
            return Err(ConfigError::Validation(
                "speech backend 'whisper' requires whisper_model_path".into(),
            ));
        }
    }
    Ok(speech)
}
