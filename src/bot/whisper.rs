//! Local speech-to-text with whisper-rs.
//!
//! Needs the `whisper` feature and a ggml model file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::speech::{parse_wav, SpeechBackend, SpeechError};

/// Whisper transcription engine.
pub struct Whisper {
    ctx: Arc<WhisperContext>,
}

impl Whisper {
    /// Load a Whisper model from a .bin file.
    pub fn new(model_path: &Path) -> Result<Self, String> {
        info!("Loading Whisper model from {:?}", model_path);

        if !model_path.exists() {
            return Err(format!("Model file not found: {:?}", model_path));
        }

        let ctx = WhisperContext::new_with_params(
            model_path.to_str().ok_or("Invalid model path")?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| format!("Failed to load Whisper model: {e}"))?;

        info!("Whisper model loaded successfully");
        Ok(Self { ctx: Arc::new(ctx) })
    }
}

#[async_trait]
impl SpeechBackend for Whisper {
    async fn recognize(&self, wav: &[u8], language: &str) -> Result<String, SpeechError> {
        let audio = parse_wav(wav)
            .ok_or_else(|| SpeechError::RequestFailed("audio is not a PCM WAV file".into()))?;
        let samples = pcm_to_f32(audio.data);
        debug!("Transcribing {} samples", samples.len());

        // Whisper wants "ru", not "ru-RU"
        let language = language.split('-').next().unwrap_or(language).to_string();
        let ctx = Arc::clone(&self.ctx);

        let text = tokio::task::spawn_blocking(move || run_model(&ctx, &samples, &language))
            .await
            .map_err(|e| SpeechError::RequestFailed(format!("Whisper task failed: {e}")))??;

        if text.is_empty() {
            return Err(SpeechError::Unrecognizable);
        }
        info!("🎙️ Whisper recognized {} chars", text.chars().count());
        Ok(text)
    }
}

fn run_model(ctx: &WhisperContext, samples: &[f32], language: &str) -> Result<String, SpeechError> {
    let mut state = ctx
        .create_state()
        .map_err(|e| SpeechError::RequestFailed(format!("Failed to create Whisper state: {e}")))?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(Some(language));
    params.set_translate(false);
    params.set_no_timestamps(true);
    params.set_single_segment(false);

    state
        .full(params, samples)
        .map_err(|e| SpeechError::RequestFailed(format!("Whisper transcription failed: {e}")))?;

    let mut text = String::new();
    for segment in state.as_iter() {
        if let Ok(s) = segment.to_str() {
            text.push_str(s);
            text.push(' ');
        }
    }
    Ok(text.trim().to_string())
}

/// 16-bit little-endian PCM to f32 samples in [-1, 1).
fn pcm_to_f32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect()
}
