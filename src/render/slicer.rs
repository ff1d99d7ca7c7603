//! Cut one syllable out of a spoken word.

use log::warn;

use crate::audio::{strip_silence, Waveform};
use crate::config::RenderConfig;
use crate::error::{Result, VocaliseError};
use crate::score::WordSpan;
use crate::speech::WordInfo;

/// Extract `[start(char_start), end(char_end))` from the word's audio and
/// trim near-silence from both ends.
///
/// # Errors
/// [`VocaliseError::Alignment`] when the span falls outside the word's
/// timing data.
pub fn slice_syllable(info: &WordInfo, span: &WordSpan, config: &RenderConfig) -> Result<Waveform> {
    let count = info.characters().len();
    if span.char_start > span.char_end || span.char_end >= count {
        return Err(VocaliseError::Alignment {
            word: span.word.clone(),
            message: format!(
                "characters {}..={} requested but timing covers {} characters (\"{}\")",
                span.char_start,
                span.char_end,
                count,
                info.text()
            ),
        });
    }
    let spoken = info.text();
    if spoken != span.word {
        warn!(
            "Provider spelled \"{}\" as \"{}\"; syllable offsets may drift",
            span.word, spoken
        );
    }

    let start = info.start_times()[span.char_start];
    let end = info.end_times()[span.char_end];
    let raw = info.audio.slice_secs(start, end);
    let samples = strip_silence(
        &raw.samples,
        raw.sample_rate,
        config.silence_threshold_db,
        config.silence_chunk_ms,
    );
    Ok(Waveform::new(samples, raw.sample_rate))
}
