//! Word stores: a directory of WAV + JSON pairs, and an in-memory map.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};

use super::{Alignment, WordInfo, WordStore};
use crate::audio::{read_wav, write_wav_pcm16};
use crate::error::{Result, VocaliseError};

/// `<dir>/<word>.wav` holds the audio, `<dir>/<word>.json` the alignment.
///
/// The WAV is written last and renamed into place, so an entry only
/// becomes visible once both files are complete.
#[derive(Debug, Clone)]
pub struct DiskWordStore {
    dir: PathBuf,
}

impl DiskWordStore {
    /// Open (creating if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn audio_path(&self, word: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", word))
    }

    fn alignment_path(&self, word: &str) -> PathBuf {
        self.dir.join(format!("{}.json", word))
    }
}

impl WordStore for DiskWordStore {
    fn lookup(&self, word: &str) -> Result<Option<WordInfo>> {
        let audio_path = self.audio_path(word);
        if !audio_path.is_file() {
            return Ok(None);
        }
        let alignment_path = self.alignment_path(word);
        if !alignment_path.is_file() {
            warn!(
                "Cache entry for \"{}\" has audio but no alignment; synthesising again",
                word
            );
            return Ok(None);
        }

        let alignment: Alignment = serde_json::from_str(&fs::read_to_string(&alignment_path)?)
            .map_err(|e| VocaliseError::Synthesis {
                word: word.to_string(),
                message: format!("corrupt cache entry {}: {}", alignment_path.display(), e),
            })?;
        let audio = read_wav(&audio_path)?;
        debug!("Loaded \"{}\" from {}", word, self.dir.display());
        Ok(Some(WordInfo { alignment, audio }))
    }

    fn persist(&self, word: &str, info: &WordInfo) -> Result<()> {
        let audio_path = self.audio_path(word);
        if audio_path.exists() {
            debug!("\"{}\" already cached; keeping the existing entry", word);
            return Ok(());
        }

        let json = serde_json::to_string(&info.alignment).map_err(|e| VocaliseError::Synthesis {
            word: word.to_string(),
            message: format!("can't encode alignment: {}", e),
        })?;
        fs::write(self.alignment_path(word), json)?;

        let partial = self.dir.join(format!("{}.wav.partial", word));
        write_wav_pcm16(&partial, &info.audio)?;
        fs::rename(&partial, &audio_path)?;
        Ok(())
    }
}

/// Words kept in memory for the life of the store
#[derive(Debug, Default)]
pub struct MemoryWordStore {
    words: Mutex<HashMap<String, WordInfo>>,
}

impl MemoryWordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words
            .lock()
            .map(|words| words.contains_key(word))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.words.lock().map(|words| words.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> VocaliseError {
    VocaliseError::Synthesis {
        word: String::new(),
        message: "word store lock poisoned".to_string(),
    }
}

impl WordStore for MemoryWordStore {
    fn lookup(&self, word: &str) -> Result<Option<WordInfo>> {
        let words = self.words.lock().map_err(|_| poisoned())?;
        Ok(words.get(word).cloned())
    }

    fn persist(&self, word: &str, info: &WordInfo) -> Result<()> {
        let mut words = self.words.lock().map_err(|_| poisoned())?;
        words.entry(word.to_string()).or_insert_with(|| info.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Waveform;
    use tempfile::TempDir;

    fn info(word: &str, level: f32) -> WordInfo {
        let n = word.chars().count();
        WordInfo {
            alignment: Alignment {
                characters: word.chars().map(String::from).collect(),
                character_start_times_seconds: (0..n).map(|i| i as f64 * 0.05).collect(),
                character_end_times_seconds: (0..n).map(|i| (i + 1) as f64 * 0.05).collect(),
            },
            audio: Waveform::new(vec![level; 400], 8000),
        }
    }

    #[test]
    fn test_disk_store_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let store = DiskWordStore::open(dir.path().join("cache")).unwrap();
        assert!(store.lookup("hello").unwrap().is_none());

        store.persist("hello", &info("hello", 0.5)).unwrap();
        let loaded = store.lookup("hello").unwrap().unwrap();
        assert_eq!(loaded.alignment, info("hello", 0.5).alignment);
        assert_eq!(loaded.audio.sample_rate, 8000);
        assert_eq!(loaded.audio.len(), 400);
        assert!((loaded.audio.samples[0] - 0.5).abs() < 1e-3);

        // A fresh handle on the same directory sees the entry.
        let reopened = DiskWordStore::open(store.dir()).unwrap();
        assert!(reopened.lookup("hello").unwrap().is_some());
    }

    #[test]
    fn test_disk_store_first_writer_wins() {
        let dir = TempDir::new().unwrap();
        let store = DiskWordStore::open(dir.path()).unwrap();
        store.persist("la", &info("la", 0.5)).unwrap();
        store.persist("la", &info("la", -0.25)).unwrap();
        let loaded = store.lookup("la").unwrap().unwrap();
        assert!(loaded.audio.samples[0] > 0.0);
    }

    #[test]
    fn test_disk_store_corrupt_alignment() {
        let dir = TempDir::new().unwrap();
        let store = DiskWordStore::open(dir.path()).unwrap();
        store.persist("oh", &info("oh", 0.5)).unwrap();
        fs::write(dir.path().join("oh.json"), "not json").unwrap();
        assert!(matches!(
            store.lookup("oh"),
            Err(VocaliseError::Synthesis { .. })
        ));
    }

    #[test]
    fn test_memory_store_first_writer_wins() {
        let store = MemoryWordStore::new();
        assert!(store.is_empty());
        store.persist("la", &info("la", 0.5)).unwrap();
        store.persist("la", &info("la", -0.25)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("la").unwrap().unwrap().audio.samples[0], 0.5);
    }
}
