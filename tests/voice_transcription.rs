//! Integration tests for voice transcription.
//!
//! The pipeline tests stub out Telegram and ffmpeg and run anywhere. The
//! `integ_test` ones need ffmpeg on PATH:
//!
//! Run with: cargo test --features integ_test --test voice_transcription

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relaybot::bot::format::{SPEECH_FAILED, SPEECH_UNRECOGNIZABLE};
use relaybot::bot::{
    AttachmentSource, ChatEvent, CommandRouter, GoogleSpeech, LookupOutcome, ProviderError, SearchEngine,
    SearchResult, SearchSource, SpeechBackend, SpeechError, SpeechToText, TranscodeError, Transcoder,
    VoiceTranscriber, WeatherReport, WeatherSource,
};
use tempfile::TempDir;

/// 16-bit mono PCM WAV with a LIST chunk between fmt and data, as ffmpeg
/// writes it. Same layout as `wav_bytes` in `src/bot/speech.rs`.
fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(48 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"LIST");
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(b"INFO");
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

struct StubAttachments {
    result: Result<Vec<u8>, String>,
}

#[async_trait]
impl AttachmentSource for StubAttachments {
    async fn fetch_attachment(&self, _attachment_id: &str) -> Result<Vec<u8>, String> {
        self.result.clone()
    }
}

/// Copies the input to the output and remembers which paths it saw.
#[derive(Default)]
struct CopyTranscoder {
    seen: Mutex<Vec<(PathBuf, PathBuf)>>,
    fail: bool,
}

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn to_wav(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        self.seen
            .lock()
            .unwrap()
            .push((input.to_path_buf(), output.to_path_buf()));
        if self.fail {
            return Err(TranscodeError::Failed("Invalid data found when processing input".into()));
        }
        std::fs::copy(input, output).map_err(|e| TranscodeError::Failed(e.to_string()))?;
        Ok(())
    }
}

struct StubBackend {
    result: Result<String, SpeechError>,
}

#[async_trait]
impl SpeechBackend for StubBackend {
    async fn recognize(&self, _wav: &[u8], _language: &str) -> Result<String, SpeechError> {
        match &self.result {
            Ok(text) => Ok(text.clone()),
            Err(SpeechError::Unrecognizable) => Err(SpeechError::Unrecognizable),
            Err(SpeechError::RequestFailed(detail)) => Err(SpeechError::RequestFailed(detail.clone())),
        }
    }
}

/// Never answers; used to exercise the timeout.
struct HangingBackend;

#[async_trait]
impl SpeechBackend for HangingBackend {
    async fn recognize(&self, _wav: &[u8], _language: &str) -> Result<String, SpeechError> {
        std::future::pending::<()>().await;
        Ok(String::new())
    }
}

struct NoWeather;

#[async_trait]
impl WeatherSource for NoWeather {
    async fn by_city(&self, name: &str) -> LookupOutcome<WeatherReport> {
        LookupOutcome::NotFound(name.to_string())
    }

    async fn by_coordinates(&self, _latitude: f64, _longitude: f64) -> LookupOutcome<WeatherReport> {
        LookupOutcome::NotFound(String::new())
    }
}

struct NoSearch;

#[async_trait]
impl SearchSource for NoSearch {
    async fn search(&self, _engine: SearchEngine, query: &str) -> LookupOutcome<Vec<SearchResult>> {
        LookupOutcome::NotFound(query.to_string())
    }
}

struct Fixture {
    work_dir: TempDir,
    transcoder: Arc<CopyTranscoder>,
    transcriber: Arc<VoiceTranscriber>,
}

impl Fixture {
    fn new(
        attachment: Result<Vec<u8>, String>,
        transcoder: CopyTranscoder,
        backend: Arc<dyn SpeechBackend>,
        timeout: Duration,
    ) -> Self {
        let work_dir = TempDir::new().unwrap();
        let transcoder = Arc::new(transcoder);
        let transcriber = Arc::new(VoiceTranscriber::new(
            Arc::new(StubAttachments { result: attachment }),
            transcoder.clone(),
            backend,
            work_dir.path().join("voice"),
            "ru-RU".to_string(),
            timeout,
        ));
        Self { work_dir, transcoder, transcriber }
    }

    fn with_backend(result: Result<String, SpeechError>) -> Self {
        Self::new(
            Ok(wav_bytes(16_000, &[0, 120, -120, 0])),
            CopyTranscoder::default(),
            Arc::new(StubBackend { result }),
            Duration::from_secs(5),
        )
    }

    fn voice_dir(&self) -> PathBuf {
        self.work_dir.path().join("voice")
    }

    /// Files left behind in the staging directory (none if it was never created).
    fn leftovers(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.voice_dir()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => vec![],
        }
    }

    fn router(&self) -> CommandRouter {
        CommandRouter::new(Arc::new(NoWeather), Arc::new(NoSearch), self.transcriber.clone(), 60)
    }

    async fn reply(&self) -> Vec<String> {
        let event = ChatEvent::Voice { attachment_id: "AwACAgIAAxkBAAIB".into(), duration_secs: 3 };
        self.router()
            .dispatch(event)
            .await
            .into_iter()
            .map(|r| r.text)
            .collect()
    }
}

#[tokio::test]
async fn test_transcript_is_sent_back() {
    let fx = Fixture::with_backend(Ok("  привет мир ".to_string()));
    assert_eq!(fx.reply().await, vec!["привет мир".to_string()]);
    assert!(fx.leftovers().is_empty(), "left behind: {:?}", fx.leftovers());
}

#[tokio::test]
async fn test_unrecognizable_speech() {
    let fx = Fixture::with_backend(Err(SpeechError::Unrecognizable));
    assert_eq!(fx.reply().await, vec![SPEECH_UNRECOGNIZABLE.to_string()]);
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_blank_transcript_counts_as_unrecognizable() {
    let fx = Fixture::with_backend(Ok("   ".to_string()));
    assert_eq!(
        fx.transcriber.transcribe("id").await,
        LookupOutcome::ProviderError(ProviderError::Unrecognizable)
    );
}

#[tokio::test]
async fn test_recognition_service_failure() {
    let fx = Fixture::with_backend(Err(SpeechError::RequestFailed("speech API returned 500".into())));
    let replies = fx.reply().await;
    assert_eq!(replies, vec![SPEECH_FAILED.to_string()]);
    assert!(replies[0].contains("recognize"));
    assert!(!replies[0].contains("500"));
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_transcode_failure_cleans_up() {
    let fx = Fixture::new(
        Ok(b"not audio".to_vec()),
        CopyTranscoder { fail: true, ..Default::default() },
        Arc::new(StubBackend { result: Ok("unused".into()) }),
        Duration::from_secs(5),
    );

    let outcome = fx.transcriber.transcribe("id").await;
    assert!(matches!(outcome, LookupOutcome::ProviderError(ProviderError::Transcode(_))));
    assert!(fx.leftovers().is_empty(), "left behind: {:?}", fx.leftovers());
    assert_eq!(fx.reply().await, vec![SPEECH_FAILED.to_string()]);
}

#[tokio::test]
async fn test_download_failure_skips_transcoding() {
    let fx = Fixture::new(
        Err("file is too big".into()),
        CopyTranscoder::default(),
        Arc::new(StubBackend { result: Ok("unused".into()) }),
        Duration::from_secs(5),
    );

    let outcome = fx.transcriber.transcribe("id").await;
    assert_eq!(
        outcome,
        LookupOutcome::ProviderError(ProviderError::Attachment("file is too big".into()))
    );
    assert!(fx.transcoder.seen.lock().unwrap().is_empty());
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_backend_timeout_cleans_up() {
    let fx = Fixture::new(
        Ok(wav_bytes(16_000, &[1, 2, 3])),
        CopyTranscoder::default(),
        Arc::new(HangingBackend),
        Duration::from_millis(200),
    );

    let outcome = fx.transcriber.transcribe("id").await;
    assert!(matches!(outcome, LookupOutcome::ProviderError(ProviderError::Timeout(_))));
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_concurrent_messages_use_distinct_files() {
    let fx = Fixture::with_backend(Ok("ok".to_string()));

    let (a, b) = tokio::join!(fx.transcriber.transcribe("a"), fx.transcriber.transcribe("b"));
    assert!(a.is_success() && b.is_success());

    let seen = fx.transcoder.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0].0, seen[1].0);
    assert_ne!(seen[0].1, seen[1].1);
    for (input, output) in &seen {
        assert!(input.starts_with(fx.voice_dir()));
        assert!(output.starts_with(fx.voice_dir()));
    }
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_google_backend_through_pipeline() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/recognize")
        .match_query(mockito::Matcher::UrlEncoded("lang".into(), "ru-RU".into()))
        .match_header("content-type", "audio/l16; rate=16000;")
        .with_status(200)
        .with_body("{\"result\":[]}\n{\"result\":[{\"alternative\":[{\"transcript\":\"привет\"}],\"final\":true}]}\n")
        .create_async()
        .await;

    let backend = GoogleSpeech::new(format!("{}/recognize", server.url()), None, Duration::from_secs(5)).unwrap();
    let fx = Fixture::new(
        Ok(wav_bytes(16_000, &[0, 500, -500, 0])),
        CopyTranscoder::default(),
        Arc::new(backend),
        Duration::from_secs(5),
    );

    assert_eq!(fx.reply().await, vec!["привет".to_string()]);
    mock.assert_async().await;
    assert!(fx.leftovers().is_empty());
}

#[tokio::test]
async fn test_google_captcha_page_is_a_service_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/recognize")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>captcha</body></html>")
        .create_async()
        .await;

    let backend = GoogleSpeech::new(format!("{}/recognize", server.url()), None, Duration::from_secs(5)).unwrap();
    let fx = Fixture::new(
        Ok(wav_bytes(16_000, &[0, 500, -500, 0])),
        CopyTranscoder::default(),
        Arc::new(backend),
        Duration::from_secs(5),
    );

    assert_eq!(fx.reply().await, vec![SPEECH_FAILED.to_string()]);
    assert!(fx.leftovers().is_empty());
}

#[cfg(feature = "integ_test")]
mod ffmpeg {
    use super::*;
    use relaybot::bot::speech::parse_wav;
    use relaybot::bot::Ffmpeg;

    /// Resamples a 44.1 kHz WAV to the 16 kHz the recognizers expect.
    #[tokio::test]
    async fn test_ffmpeg_resamples_to_16k_mono() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        let samples: Vec<i16> = (0..44_100).map(|i| ((i % 100) * 200 - 10_000) as i16).collect();
        std::fs::write(&input, wav_bytes(44_100, &samples)).unwrap();

        Ffmpeg::new("ffmpeg", Duration::from_secs(30))
            .to_wav(&input, &output)
            .await
            .expect("ffmpeg conversion failed");

        let bytes = std::fs::read(&output).unwrap();
        let audio = parse_wav(&bytes).expect("output is not PCM WAV");
        assert_eq!(audio.sample_rate, 16_000);
        assert!(!audio.data.is_empty());
    }

    #[tokio::test]
    async fn test_ffmpeg_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.ogg");
        std::fs::write(&input, b"definitely not audio").unwrap();

        let result = Ffmpeg::new("ffmpeg", Duration::from_secs(30))
            .to_wav(&input, &dir.path().join("out.wav"))
            .await;
        assert!(matches!(result, Err(TranscodeError::Failed(_))));
    }
}
