//! Audio conversion with ffmpeg.
//!
//! Telegram voice notes are OGG Opus; recognizers want 16 kHz mono 16-bit PCM.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

pub const SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: std::io::Error },
    #[error("ffmpeg failed: {0}")]
    Failed(String),
    #[error("ffmpeg timed out after {0}s")]
    Timeout(u64),
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert the audio file at `input` into a WAV file at `output`,
    /// overwriting whatever is there.
    async fn to_wav(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

pub struct Ffmpeg {
    program: String,
    timeout: Duration,
}

impl Ffmpeg {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn to_wav(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let sample_rate = SAMPLE_RATE.to_string();
        let mut command = Command::new(&self.program);
        command
            .arg("-i")
            .arg(input)
            .args([
                "-ar",
                sample_rate.as_str(), // 16KHz sample rate
                "-ac",
                "1", // Mono
                "-acodec",
                "pcm_s16le",
                "-f",
                "wav",
                "-y", // Overwrite the pre-created output file
            ])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| TranscodeError::Timeout(self.timeout.as_secs()))?;
        let output_status = result.map_err(|e| TranscodeError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            let last_line = stderr.lines().last().unwrap_or("").to_string();
            return Err(TranscodeError::Failed(last_line));
        }

        debug!("Transcoded {:?} to {:?}", input, output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let ffmpeg = Ffmpeg::new("/nonexistent/bin/ffmpeg", Duration::from_secs(5));
        let err = ffmpeg
            .to_wav(Path::new("/tmp/in.ogg"), Path::new("/tmp/out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/bin/ffmpeg"));
    }
}
