//! Speech recognition backends.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum SpeechError {
    /// The audio was processed but contained no recognizable speech.
    #[error("no speech recognized")]
    Unrecognizable,
    /// The backend could not be reached or refused the request.
    #[error("{0}")]
    RequestFailed(String),
}

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Recognize speech in a WAV buffer. `language` is a BCP-47 tag like "ru-RU".
    async fn recognize(&self, wav: &[u8], language: &str) -> Result<String, SpeechError>;
}

/// Google's speech API v2, the endpoint Chromium uses for voice input.
pub struct GoogleSpeech {
    api_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GoogleSpeech {
    pub fn new(api_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { api_url, api_key, client })
    }
}

#[async_trait]
impl SpeechBackend for GoogleSpeech {
    async fn recognize(&self, wav: &[u8], language: &str) -> Result<String, SpeechError> {
        let audio = parse_wav(wav)
            .ok_or_else(|| SpeechError::RequestFailed("audio is not a PCM WAV file".into()))?;
        debug!("Sending {} bytes of PCM at {} Hz", audio.data.len(), audio.sample_rate);

        let mut query = vec![
            ("client", "chromium".to_string()),
            ("lang", language.to_string()),
            ("pFilter", "0".to_string()),
            ("output", "json".to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }

        let response = self
            .client
            .post(&self.api_url)
            .query(&query)
            .header(CONTENT_TYPE, format!("audio/l16; rate={};", audio.sample_rate))
            .body(audio.data.to_vec())
            .send()
            .await
            .map_err(|e| SpeechError::RequestFailed(format!("speech request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::RequestFailed(format!("speech API returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SpeechError::RequestFailed(format!("failed to read speech response: {e}")))?;

        let transcript = parse_transcript(&body)?;
        info!("🎙️ Recognized {} chars of speech", transcript.chars().count());
        Ok(transcript)
    }
}

#[derive(Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    result: Vec<RecognizeResult>,
}

#[derive(Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternative: Vec<Alternative>,
}

#[derive(Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// The API streams one JSON object per line, usually an empty `{"result":[]}`
/// first. Take the top alternative of the first non-empty result.
///
/// A body with no parseable line (captcha or quota page, truncated reply) is a
/// failed request; well-formed lines without a transcript mean no speech.
fn parse_transcript(body: &str) -> Result<String, SpeechError> {
    let responses: Vec<RecognizeResponse> = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    if responses.is_empty() {
        debug!("Unparseable speech response: {:.200}", body);
        return Err(SpeechError::RequestFailed("malformed speech response".into()));
    }

    responses
        .into_iter()
        .flat_map(|response| response.result)
        .filter_map(|result| result.alternative.into_iter().next())
        .map(|alternative| alternative.transcript.trim().to_string())
        .find(|transcript| !transcript.is_empty())
        .ok_or(SpeechError::Unrecognizable)
}

/// PCM payload of a WAV file.
pub struct WavAudio<'a> {
    pub sample_rate: u32,
    pub data: &'a [u8],
}

/// Walk the RIFF chunks of a 16-bit PCM WAV file and return its sample rate and
/// sample data.
pub fn parse_wav(bytes: &[u8]) -> Option<WavAudio<'_>> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut sample_rate = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().ok()?) as usize;
        let body_start = offset + 8;
        // ffmpeg leaves the size of a streamed data chunk unset
        let body_end = body_start.saturating_add(size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " if body.len() >= 16 => {
                let format = u16::from_le_bytes([body[0], body[1]]);
                let bits = u16::from_le_bytes([body[14], body[15]]);
                if format != 1 || bits != 16 {
                    return None;
                }
                sample_rate = Some(u32::from_le_bytes([body[4], body[5], body[6], body[7]]));
            }
            b"data" => {
                return Some(WavAudio {
                    sample_rate: sample_rate?,
                    data: body,
                });
            }
            _ => {}
        }

        // chunks are padded to even sizes
        offset = body_end + (size & 1);
    }
    None
}

/// 16-bit mono PCM WAV with a LIST chunk between fmt and data, as ffmpeg
/// writes it. Keep in step with the copy in `tests/voice_transcription.rs`.
#[cfg(test)]
pub(crate) fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
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
