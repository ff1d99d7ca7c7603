//! Stretch a syllable to the length of its note.

use log::{debug, warn};

use crate::audio::{SignalProcessor, Waveform};
use crate::error::Result;

/// Resample `segment` to `sample_rate`, then time-stretch it to last
/// exactly `target_ms`.
///
/// An empty segment (a syllable that was all silence) becomes silence of
/// the target length so the part stays in time.
pub fn fit_duration(
    processor: &dyn SignalProcessor,
    segment: &Waveform,
    target_ms: f64,
    sample_rate: u32,
) -> Result<Waveform> {
    let target_len = (target_ms * 0.001 * sample_rate as f64).round() as usize;
    if segment.is_empty() {
        warn!("Syllable has no audible sound; rendering {:.0} ms of silence", target_ms);
        return Ok(Waveform::new(vec![0.0; target_len], sample_rate));
    }

    let working = segment.resampled(processor, sample_rate)?;
    if target_len == 0 {
        return Ok(Waveform::empty(sample_rate));
    }
    let rate = working.len() as f64 / target_len as f64;
    debug!(
        "Stretching {:.3}s to {:.3}s (rate {:.3})",
        working.duration_secs(),
        target_ms / 1000.0,
        rate
    );
    let mut samples = processor.time_stretch(&working.samples, rate)?;
    samples.resize(target_len, 0.0);
    Ok(Waveform::new(samples, sample_rate))
}
