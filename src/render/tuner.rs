//! Pull each tied sub-note of a syllable onto its notated pitch.
//!
//! The fitted segment is split at the cumulative duration fractions of its
//! sub-notes. Each piece is measured in `pitch-window-ms` windows:
//!
//! - `slice` tuning shifts the whole piece by the distance between the
//!   median voiced pitch and the target
//! - `window` tuning shifts every voiced window on its own
//!
//! Pieces (or windows) with no voiced pitch are passed through untouched.

use log::{debug, warn};

use crate::audio::{SignalProcessor, Waveform};
use crate::config::{RenderConfig, TuningMode};
use crate::error::Result;
use crate::score::SubNote;

/// Semitones from `current_hz` up to `target_hz`.
pub fn semitone_shift(current_hz: f64, target_hz: f64) -> f64 {
    12.0 * (target_hz / current_hz).log2()
}

pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Split points for `notes` over `len` samples, proportional to duration.
fn boundaries(notes: &[SubNote], len: usize) -> Vec<usize> {
    let total: f64 = notes.iter().map(|n| n.duration_ms).sum();
    let mut cuts = Vec::with_capacity(notes.len() + 1);
    cuts.push(0);
    let mut elapsed = 0.0;
    for note in &notes[..notes.len().saturating_sub(1)] {
        elapsed += note.duration_ms;
        let fraction = if total > 0.0 { elapsed / total } else { 0.0 };
        cuts.push(((fraction * len as f64).round() as usize).min(len));
    }
    cuts.push(len);
    cuts
}

/// Tune `segment` so each sub-note's stretch of audio sits on its pitch.
pub fn tune(
    processor: &dyn SignalProcessor,
    segment: &Waveform,
    notes: &[SubNote],
    config: &RenderConfig,
) -> Result<Waveform> {
    if notes.is_empty() || segment.is_empty() {
        return Ok(segment.clone());
    }
    let cuts = boundaries(notes, segment.len());
    let mut out = Vec::with_capacity(segment.len());
    for (note, bounds) in notes.iter().zip(cuts.windows(2)) {
        let piece = &segment.samples[bounds[0]..bounds[1]];
        let tuned = match config.tuning {
            TuningMode::Slice => tune_slice(processor, piece, segment.sample_rate, note, config)?,
            TuningMode::Window => tune_windows(processor, piece, segment.sample_rate, note, config)?,
        };
        out.extend(tuned);
    }
    Ok(Waveform::new(out, segment.sample_rate))
}

fn window_len(sample_rate: u32, config: &RenderConfig) -> usize {
    ((config.pitch_window_ms * 0.001 * sample_rate as f64).round() as usize).max(1)
}

fn tune_slice(
    processor: &dyn SignalProcessor,
    piece: &[f32],
    sample_rate: u32,
    note: &SubNote,
    config: &RenderConfig,
) -> Result<Vec<f32>> {
    let mut voiced: Vec<f64> = piece
        .chunks(window_len(sample_rate, config))
        .filter_map(|w| processor.detect_pitch(w, sample_rate, config.min_pitch_hz, config.max_pitch_hz))
        .collect();
    let Some(current) = median(&mut voiced) else {
        warn!("No voiced pitch found for {}; leaving it untuned", note.name());
        return Ok(piece.to_vec());
    };

    let shift = semitone_shift(current, note.frequency_hz());
    debug!(
        "{}: heard {:.1} Hz, shifting {:+.2} semitones to {:.1} Hz",
        note.name(),
        current,
        shift,
        note.frequency_hz()
    );
    processor.pitch_shift(piece, sample_rate, shift)
}

fn tune_windows(
    processor: &dyn SignalProcessor,
    piece: &[f32],
    sample_rate: u32,
    note: &SubNote,
    config: &RenderConfig,
) -> Result<Vec<f32>> {
    let target = note.frequency_hz();
    let mut out = Vec::with_capacity(piece.len());
    for window in piece.chunks(window_len(sample_rate, config)) {
        match processor.detect_pitch(window, sample_rate, config.min_pitch_hz, config.max_pitch_hz) {
            Some(current) => {
                out.extend(processor.pitch_shift(window, sample_rate, semitone_shift(current, target))?)
            }
            None => out.extend_from_slice(window),
        }
    }
    Ok(out)
}
