//! # Speech Cache
//!
//! Resolves every word a score sings into a [`WordInfo`]: the spoken
//! word's audio plus the time span of each of its characters.
//!
//! ## Key Concepts
//!
//! - **Provider** ([`SpeechProvider`]): synthesises one word, given the
//!   words sung before and after it as prosody context
//! - **Store** ([`WordStore`]): durable word cache keyed by normalised word
//! - **Lexicon**: the resolved words for one run, shared read-only by
//!   every part while rendering
//!
//! ```text
//! SungPart.words ──► unique requests ──► store.lookup ─hit─► Lexicon
//!                                            │ miss
//!                                            ▼
//!                              provider.synthesize ──► store.persist ──► Lexicon
//! ```
//!
//! Each distinct word is requested once per run: requests are
//! deduplicated before any lookup, so no word is ever in flight twice.

mod elevenlabs;
mod retry;
mod store;

pub use elevenlabs::ElevenLabsProvider;
pub use retry::{with_retry, RetryPolicy, RetryableError};
pub use store::{DiskWordStore, MemoryWordStore};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::audio::Waveform;
use crate::config::VoiceConfig;
use crate::error::{Result, VocaliseError};
use crate::lyrics::SungPart;

/// Every resolved word of a run, keyed by normalised word
pub type Lexicon = HashMap<String, Arc<WordInfo>>;

/// Per-character timing of a word recording, in seconds
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Alignment {
    pub characters: Vec<String>,
    pub character_start_times_seconds: Vec<f64>,
    pub character_end_times_seconds: Vec<f64>,
}

/// A synthesised word: audio plus character alignment
#[derive(Debug, Clone, PartialEq)]
pub struct WordInfo {
    pub alignment: Alignment,
    pub audio: Waveform,
}

impl WordInfo {
    pub fn characters(&self) -> &[String] {
        &self.alignment.characters
    }

    pub fn start_times(&self) -> &[f64] {
        &self.alignment.character_start_times_seconds
    }

    pub fn end_times(&self) -> &[f64] {
        &self.alignment.character_end_times_seconds
    }

    /// The characters joined back into text.
    pub fn text(&self) -> String {
        self.alignment.characters.concat()
    }

    /// Check that the three timing sequences line up and never run backwards.
    pub fn validate(&self, word: &str) -> Result<()> {
        let fail = |message: String| VocaliseError::Synthesis {
            word: word.to_string(),
            message,
        };
        let a = &self.alignment;
        let n = a.characters.len();
        if a.character_start_times_seconds.len() != n || a.character_end_times_seconds.len() != n {
            return Err(fail(format!(
                "timing data has {} characters, {} start times and {} end times",
                n,
                a.character_start_times_seconds.len(),
                a.character_end_times_seconds.len()
            )));
        }
        for i in 0..n {
            let start = a.character_start_times_seconds[i];
            let end = a.character_end_times_seconds[i];
            if !(start.is_finite() && end.is_finite()) || start < 0.0 || end < start {
                return Err(fail(format!(
                    "character {} has invalid span [{}, {}]",
                    i, start, end
                )));
            }
            if let Some(&next) = a.character_start_times_seconds.get(i + 1) {
                if next < end {
                    return Err(fail(format!(
                        "character {} ends at {} after character {} starts at {}",
                        i,
                        end,
                        i + 1,
                        next
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One word to synthesise, with the surrounding lyric as context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub word: String,
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// Turns a word into spoken audio with character timings.
pub trait SpeechProvider: Send + Sync {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<WordInfo>;
}

/// Durable storage for synthesised words.
pub trait WordStore: Send + Sync {
    fn lookup(&self, word: &str) -> Result<Option<WordInfo>>;

    /// Save `info` under `word`. An existing entry is kept.
    fn persist(&self, word: &str, info: &WordInfo) -> Result<()>;
}

/// One request per distinct word, carrying the context of its first
/// occurrence: the part's words before it and after it, space-joined.
pub fn collect_requests(parts: &[SungPart]) -> Vec<SynthesisRequest> {
    let mut seen = std::collections::HashSet::new();
    let mut requests = Vec::new();
    for part in parts {
        for (i, word) in part.words.iter().enumerate() {
            if !seen.insert(word.clone()) {
                continue;
            }
            let previous = (i > 0).then(|| part.words[..i].join(" "));
            let next = (i + 1 < part.words.len()).then(|| part.words[i + 1..].join(" "));
            requests.push(SynthesisRequest {
                word: word.clone(),
                previous,
                next,
            });
        }
    }
    requests
}

/// Lookup-then-synthesise driver over a provider and a store
pub struct SpeechCache<P, S> {
    provider: P,
    store: S,
    request_delay: Duration,
    max_concurrent: usize,
}

impl<P: SpeechProvider, S: WordStore> SpeechCache<P, S> {
    pub fn new(provider: P, store: S, config: &VoiceConfig) -> Self {
        Self {
            provider,
            store,
            request_delay: Duration::from_millis(config.request_delay_ms),
            max_concurrent: config.max_concurrent_requests.max(1),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve every word sung in `parts`.
    ///
    /// # Errors
    /// The first lookup, synthesis, or persist failure aborts resolution.
    pub fn resolve(&self, parts: &[SungPart]) -> Result<Lexicon> {
        let requests = collect_requests(parts);
        info!("Resolving {} unique words", requests.len());

        let resolved: Vec<(String, WordInfo)> = if self.max_concurrent > 1 && requests.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.max_concurrent)
                .build()
                .map_err(|e| VocaliseError::Config(format!("can't start request pool: {}", e)))?;
            pool.install(|| {
                requests
                    .par_iter()
                    .map(|request| self.fetch(request).map(|info| (request.word.clone(), info)))
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            requests
                .iter()
                .map(|request| self.fetch(request).map(|info| (request.word.clone(), info)))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(resolved
            .into_iter()
            .map(|(word, info)| (word, Arc::new(info)))
            .collect())
    }

    fn fetch(&self, request: &SynthesisRequest) -> Result<WordInfo> {
        if let Some(info) = self.store.lookup(&request.word)? {
            info.validate(&request.word)?;
            info!("Cache hit for \"{}\"", request.word);
            return Ok(info);
        }

        info!("Synthesising \"{}\"", request.word);
        let info = self.provider.synthesize(request)?;
        info.validate(&request.word)?;
        self.store.persist(&request.word, &info)?;
        if !self.request_delay.is_zero() {
            std::thread::sleep(self.request_delay);
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Mutex;

    fn word_info(word: &str) -> WordInfo {
        let n = word.chars().count();
        WordInfo {
            alignment: Alignment {
                characters: word.chars().map(String::from).collect(),
                character_start_times_seconds: (0..n).map(|i| i as f64 * 0.1).collect(),
                character_end_times_seconds: (0..n).map(|i| (i + 1) as f64 * 0.1).collect(),
            },
            audio: Waveform::new(vec![0.25; n * 800], 8000),
        }
    }

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<SynthesisRequest>>,
    }

    impl SpeechProvider for Recorder {
        fn synthesize(&self, request: &SynthesisRequest) -> Result<WordInfo> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(word_info(&request.word))
        }
    }

    struct Failing;

    impl SpeechProvider for Failing {
        fn synthesize(&self, request: &SynthesisRequest) -> Result<WordInfo> {
            Err(VocaliseError::Synthesis {
                word: request.word.clone(),
                message: "status 401".to_string(),
            })
        }
    }

    fn sung(name: &str, words: &[&str]) -> SungPart {
        SungPart {
            name: name.to_string(),
            events: Vec::new(),
            words: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    fn quiet_config() -> VoiceConfig {
        VoiceConfig {
            request_delay_ms: 0,
            ..Config::default().voice
        }
    }

    #[test]
    fn test_requests_carry_context() {
        let requests = collect_requests(&[sung("S", &["row", "your", "boat"])]);
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].previous, None);
        assert_eq!(requests[0].next.as_deref(), Some("your boat"));
        assert_eq!(requests[1].previous.as_deref(), Some("row"));
        assert_eq!(requests[1].next.as_deref(), Some("boat"));
        assert_eq!(requests[2].previous.as_deref(), Some("row your"));
        assert_eq!(requests[2].next, None);
    }

    #[test]
    fn test_each_word_synthesised_once() {
        let cache = SpeechCache::new(Recorder::default(), MemoryWordStore::new(), &quiet_config());
        let parts = [sung("S", &["la", "la", "li"]), sung("A", &["li", "lo"])];
        let lexicon = cache.resolve(&parts).unwrap();

        assert_eq!(lexicon.len(), 3);
        let requested: Vec<String> = cache
            .provider()
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.word.clone())
            .collect();
        assert_eq!(requested, vec!["la", "li", "lo"]);
        assert!(cache.store().contains("lo"));
    }

    #[test]
    fn test_store_hit_skips_provider() {
        let store = MemoryWordStore::new();
        store.persist("hi", &word_info("hi")).unwrap();
        let cache = SpeechCache::new(Recorder::default(), store, &quiet_config());
        let lexicon = cache.resolve(&[sung("S", &["hi"])]).unwrap();
        assert_eq!(lexicon["hi"].text(), "hi");
        assert!(cache.provider().requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_resolution() {
        let config = VoiceConfig {
            max_concurrent_requests: 4,
            ..quiet_config()
        };
        let cache = SpeechCache::new(Recorder::default(), MemoryWordStore::new(), &config);
        let words = ["a", "b", "c", "d", "e", "f", "a", "c"];
        let lexicon = cache.resolve(&[sung("S", &words)]).unwrap();
        assert_eq!(lexicon.len(), 6);
        assert_eq!(cache.provider().requests.lock().unwrap().len(), 6);
    }

    #[test]
    fn test_provider_failure_is_fatal() {
        let cache = SpeechCache::new(Failing, MemoryWordStore::new(), &quiet_config());
        let result = cache.resolve(&[sung("S", &["no"])]);
        assert!(matches!(result, Err(VocaliseError::Synthesis { .. })));
        assert!(!cache.store().contains("no"));
    }

    #[test]
    fn test_validate_rejects_misaligned_timings() {
        let mut info = word_info("hi");
        info.alignment.character_end_times_seconds.pop();
        assert!(info.validate("hi").is_err());

        let mut info = word_info("hi");
        info.alignment.character_start_times_seconds[1] = 0.05;
        assert!(info.validate("hi").is_err());

        assert!(word_info("hi").validate("hi").is_ok());
    }
}
