//! ElevenLabs text-to-speech with character timestamps.
//!
//! `POST {base}/text-to-speech/{voice}/stream/with-timestamps` answers with
//! newline-delimited JSON objects, each carrying a base64 chunk of raw PCM
//! and, usually, the alignment of the characters it covers.

use std::fmt;
use std::io::{BufRead, BufReader};
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use log::{debug, trace};
use serde::Deserialize;
use serde_json::json;

use super::retry::{with_retry, RetryPolicy, RetryableError};
use super::{Alignment, SpeechProvider, SynthesisRequest, WordInfo};
use crate::audio::decode_pcm16;
use crate::config::VoiceConfig;
use crate::error::{Result, VocaliseError};

#[derive(Debug, Deserialize)]
struct StreamChunk {
    audio_base64: Option<String>,
    alignment: Option<Alignment>,
}

/// A failed request, before it is reported as a [`VocaliseError`]
#[derive(Debug)]
struct RequestFailure {
    status: Option<u16>,
    message: String,
    retry_after: Option<Duration>,
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "status {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl RetryableError for RequestFailure {
    fn is_retryable(&self) -> bool {
        match self.status {
            Some(status) => status == 429 || (500..600).contains(&status),
            None => true,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

/// Blocking ElevenLabs client
pub struct ElevenLabsProvider {
    agent: ureq::Agent,
    config: VoiceConfig,
    retry: RetryPolicy,
}

impl ElevenLabsProvider {
    pub fn new(config: &VoiceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            agent,
            config: config.clone(),
            retry: RetryPolicy::from_config(config),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/text-to-speech/{}/stream/with-timestamps",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        )
    }

    fn api_key(&self, word: &str) -> Result<String> {
        std::env::var(&self.config.api_key_env).map_err(|_| VocaliseError::Synthesis {
            word: word.to_string(),
            message: format!(
                "environment variable {} is not set",
                self.config.api_key_env
            ),
        })
    }

    fn request(&self, request: &SynthesisRequest, key: &str) -> std::result::Result<Vec<u8>, RequestFailure> {
        let body = json!({
            "text": request.word,
            "model_id": self.config.model_id,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
            },
            "previous_text": request.previous,
            "next_text": request.next,
        });

        let response = self
            .agent
            .post(&self.endpoint())
            .query("output_format", &format!("pcm_{}", self.config.sample_rate))
            .set("xi-api-key", key)
            .set("Content-Type", "application/json")
            .send_json(body);

        match response {
            Ok(resp) => {
                let mut body = Vec::new();
                std::io::copy(&mut resp.into_reader(), &mut body).map_err(|e| RequestFailure {
                    status: None,
                    message: format!("reading response failed: {}", e),
                    retry_after: None,
                })?;
                Ok(body)
            }
            Err(ureq::Error::Status(status, resp)) => {
                let retry_after = resp
                    .header("retry-after")
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                let message = resp
                    .into_string()
                    .unwrap_or_else(|_| "unreadable error body".to_string());
                Err(RequestFailure {
                    status: Some(status),
                    message,
                    retry_after,
                })
            }
            Err(ureq::Error::Transport(transport)) => Err(RequestFailure {
                status: None,
                message: transport.to_string(),
                retry_after: None,
            }),
        }
    }
}

impl SpeechProvider for ElevenLabsProvider {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<WordInfo> {
        let key = self.api_key(&request.word)?;
        debug!(
            "POST {} for \"{}\" (context: {:?} / {:?})",
            self.endpoint(),
            request.word,
            request.previous,
            request.next
        );
        let body = with_retry(&self.retry, || self.request(request, &key)).map_err(|failure| {
            VocaliseError::Synthesis {
                word: request.word.clone(),
                message: failure.to_string(),
            }
        })?;
        parse_stream(BufReader::new(body.as_slice()), &request.word, self.config.sample_rate)
    }
}

/// Assemble a [`WordInfo`] from the newline-delimited JSON stream.
fn parse_stream(reader: impl BufRead, word: &str, sample_rate: u32) -> Result<WordInfo> {
    let fail = |message: String| VocaliseError::Synthesis {
        word: word.to_string(),
        message,
    };

    let mut pcm = Vec::new();
    let mut alignment = Alignment::default();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: StreamChunk = serde_json::from_str(&line)
            .map_err(|e| fail(format!("malformed response line {}: {}", n + 1, e)))?;
        if let Some(audio) = chunk.audio_base64 {
            let bytes = general_purpose::STANDARD
                .decode(audio.as_bytes())
                .map_err(|e| fail(format!("bad audio on line {}: {}", n + 1, e)))?;
            trace!("chunk {}: {} audio bytes", n + 1, bytes.len());
            pcm.extend_from_slice(&bytes);
        }
        if let Some(part) = chunk.alignment {
            alignment.characters.extend(part.characters);
            alignment
                .character_start_times_seconds
                .extend(part.character_start_times_seconds);
            alignment
                .character_end_times_seconds
                .extend(part.character_end_times_seconds);
        }
    }

    if pcm.is_empty() {
        return Err(fail("response contained no audio".to_string()));
    }
    let audio = decode_pcm16(&pcm, sample_rate).map_err(|e| fail(e.to_string()))?;
    Ok(WordInfo { alignment, audio })
}
