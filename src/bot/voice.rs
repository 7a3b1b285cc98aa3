//! Voice message transcription: download, transcode, recognize.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info};

use super::outcome::{LookupOutcome, ProviderError};
use super::speech::{SpeechBackend, SpeechError};
use super::transcode::Transcoder;

/// Where voice attachments come from. Implemented by the Telegram client.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn fetch_attachment(&self, attachment_id: &str) -> Result<Vec<u8>, String>;
}

/// Turns a voice attachment into text. `VoiceTranscriber` is the real one.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, attachment_id: &str) -> LookupOutcome<String>;
}

pub struct VoiceTranscriber {
    attachments: Arc<dyn AttachmentSource>,
    transcoder: Arc<dyn Transcoder>,
    backend: Arc<dyn SpeechBackend>,
    /// Staging directory for the downloaded and converted audio.
    work_dir: PathBuf,
    language: String,
    timeout: Duration,
}

impl VoiceTranscriber {
    pub fn new(
        attachments: Arc<dyn AttachmentSource>,
        transcoder: Arc<dyn Transcoder>,
        backend: Arc<dyn SpeechBackend>,
        work_dir: PathBuf,
        language: String,
        timeout: Duration,
    ) -> Self {
        Self {
            attachments,
            transcoder,
            backend,
            work_dir,
            language,
            timeout,
        }
    }

    /// A fresh, uniquely named file in the work directory, deleted on drop.
    fn temp_file(&self, suffix: &str) -> Result<NamedTempFile, ProviderError> {
        Builder::new()
            .prefix("voice-")
            .suffix(suffix)
            .tempfile_in(&self.work_dir)
            .map_err(|e| ProviderError::Transcode(format!("failed to create temp file: {e}")))
    }

    async fn run(&self, attachment_id: &str) -> Result<String, ProviderError> {
        let data = tokio::time::timeout(self.timeout, self.attachments.fetch_attachment(attachment_id))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout.as_secs()))?
            .map_err(ProviderError::Attachment)?;
        debug!("Downloaded voice attachment ({} bytes)", data.len());

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| ProviderError::Transcode(format!("failed to create {:?}: {e}", self.work_dir)))?;

        // Both files are removed when they go out of scope, on every return path.
        let input = self.temp_file(".ogg")?;
        let output = self.temp_file(".wav")?;

        tokio::fs::write(input.path(), &data)
            .await
            .map_err(|e| ProviderError::Transcode(format!("failed to stage voice file: {e}")))?;

        self.transcoder
            .to_wav(input.path(), output.path())
            .await
            .map_err(|e| ProviderError::Transcode(e.to_string()))?;

        let wav = tokio::fs::read(output.path())
            .await
            .map_err(|e| ProviderError::Transcode(format!("failed to read converted audio: {e}")))?;

        let text = match tokio::time::timeout(self.timeout, self.backend.recognize(&wav, &self.language)).await {
            Err(_) => return Err(ProviderError::Timeout(self.timeout.as_secs())),
            Ok(Err(SpeechError::Unrecognizable)) => return Err(ProviderError::Unrecognizable),
            Ok(Err(SpeechError::RequestFailed(detail))) => return Err(ProviderError::Recognition(detail)),
            Ok(Ok(text)) => text,
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::Unrecognizable);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl SpeechToText for VoiceTranscriber {
    async fn transcribe(&self, attachment_id: &str) -> LookupOutcome<String> {
        info!("🎙️ Transcribing voice attachment {}", attachment_id);
        match self.run(attachment_id).await {
            Ok(text) => LookupOutcome::Success(text),
            Err(e) => LookupOutcome::ProviderError(e),
        }
    }
}
