use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::update_listeners::{webhooks, Polling};
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use relaybot::bot::{
    AttachmentSource, ChatEvent, Command, CommandRouter, Ffmpeg, GoogleSpeech, SearchLookup, SpeechBackend,
    TelegramClient, VoiceTranscriber, WeatherLookup,
};
use relaybot::config::{Config, Delivery, SpeechBackendKind, SpeechConfig};

struct BotState {
    router: CommandRouter,
    telegram: Arc<TelegramClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "relaybot.json".to_string());
    let config = Config::load(&config_path)?;

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("relaybot.log"))
        .context("Failed to open log file")?;
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting relaybot...");
    info!("Loaded config from {config_path}");

    let bot = Bot::new(&config.telegram_bot_token);
    let telegram = Arc::new(TelegramClient::new(bot.clone()));
    let router = build_router(&config, telegram.clone())?;
    let state = Arc::new(BotState { router, telegram });

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register command menu: {e}");
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build();
    let listener_errors = LoggingErrorHandler::with_custom_text("An error from the update listener");

    match config.delivery {
        Delivery::Polling { drop_pending_updates } => {
            info!("Receiving updates by long polling");
            let mut polling = Polling::builder(bot);
            if drop_pending_updates {
                polling = polling.drop_pending_updates();
            }
            dispatcher
                .dispatch_with_listener(polling.build(), listener_errors)
                .await;
        }
        Delivery::Webhook { url, port } => {
            info!("Receiving updates by webhook at {url} (port {port})");
            let address = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = webhooks::axum(bot, webhooks::Options::new(address, url))
                .await
                .context("Failed to set up webhook")?;
            dispatcher
                .dispatch_with_listener(listener, listener_errors)
                .await;
        }
    }

    info!("Stopped");
    Ok(())
}

fn build_router(config: &Config, attachments: Arc<dyn AttachmentSource>) -> anyhow::Result<CommandRouter> {
    let timeout = config.request_timeout;
    let weather = WeatherLookup::new(config.weather.clone(), timeout).context("Failed to build weather client")?;
    let search = SearchLookup::new(config.search.clone(), timeout).context("Failed to build search client")?;

    let backend: Arc<dyn SpeechBackend> = match config.speech.backend {
        SpeechBackendKind::Google => Arc::new(
            GoogleSpeech::new(config.speech.api_url.clone(), config.speech.api_key.clone(), timeout)
                .context("Failed to build speech client")?,
        ),
        SpeechBackendKind::Whisper => whisper_backend(&config.speech)?,
    };
    info!("Speech backend: {:?}, language {}", config.speech.backend, config.speech.language);

    let transcriber = VoiceTranscriber::new(
        attachments,
        Arc::new(Ffmpeg::new(config.speech.ffmpeg_path.clone(), timeout)),
        backend,
        config.voice_work_dir(),
        config.speech.language.clone(),
        timeout,
    );

    Ok(CommandRouter::new(
        Arc::new(weather),
        Arc::new(search),
        Arc::new(transcriber),
        config.speech.max_voice_duration_secs,
    ))
}

#[cfg(feature = "whisper")]
fn whisper_backend(speech: &SpeechConfig) -> anyhow::Result<Arc<dyn SpeechBackend>> {
    let model_path = speech
        .whisper_model_path
        .as_deref()
        .context("whisper_model_path is not set")?;
    let whisper = relaybot::bot::Whisper::new(model_path).map_err(anyhow::Error::msg)?;
    Ok(Arc::new(whisper))
}

#[cfg(not(feature = "whisper"))]
fn whisper_backend(_speech: &SpeechConfig) -> anyhow::Result<Arc<dyn SpeechBackend>> {
    anyhow::bail!("speech backend 'whisper' needs the `whisper` feature")
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(event) = ChatEvent::from_message(&msg) else {
        return Ok(());
    };
    let chat_id = msg.chat.id.0;
    info!("📨 {} in chat {}", event.kind(), chat_id);

    if event.needs_lookup() {
        state.telegram.send_typing(chat_id).await;
    }

    // A failed send is already logged; keep going with the remaining replies.
    for reply in state.router.dispatch(event).await {
        state.telegram.send_message(chat_id, &reply.text).await.ok();
    }

    Ok(())
}
