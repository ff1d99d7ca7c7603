//! # Audio Module
//!
//! Mono waveforms and the signal-processing primitives the renderer needs.
//!
//! ## Sub-modules
//! - `wav` - WAV file and raw PCM reading/writing
//! - `silence` - dBFS measurement and leading/trailing silence trimming
//! - `pitch` - YIN fundamental-frequency estimation
//! - `vocoder` - [`PhaseVocoder`], the stock [`SignalProcessor`]
//!
//! ## Processor Contract
//! Rendering code only talks to the [`SignalProcessor`] trait:
//! - `resample` keeps duration and changes the sample count
//! - `time_stretch(rate)` returns `round(len / rate)` samples at the same pitch
//! - `detect_pitch` returns `None` for unvoiced or silent windows
//! - `pitch_shift` keeps the sample count and moves pitch by semitones

mod pitch;
mod silence;
mod vocoder;
mod wav;

pub use pitch::detect_pitch_yin;
pub use silence::{dbfs, leading_silence, strip_silence, trailing_silence};
pub use vocoder::PhaseVocoder;
pub use wav::{decode_pcm16, read_wav, write_wav_float, write_wav_pcm16};

use crate::error::{Result, VocaliseError};

/// Signal-processing primitives used by the renderer
pub trait SignalProcessor: Send + Sync {
    /// Convert `samples` from one sample rate to another.
    fn resample(&self, samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>>;

    /// Change duration without changing pitch. `rate > 1` shortens.
    fn time_stretch(&self, samples: &[f32], rate: f64) -> Result<Vec<f32>>;

    /// Estimate the fundamental frequency of a short window.
    fn detect_pitch(&self, window: &[f32], sample_rate: u32, min_hz: f64, max_hz: f64)
        -> Option<f64>;

    /// Move pitch by `semitones` without changing duration.
    fn pitch_shift(&self, samples: &[f32], sample_rate: u32, semitones: f64) -> Result<Vec<f32>>;
}

/// Mono audio at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// Digital silence lasting `duration_ms`.
    pub fn silence(duration_ms: f64, sample_rate: u32) -> Self {
        let len = (duration_ms * 0.001 * sample_rate as f64).round().max(0.0) as usize;
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Sample index of a time in seconds, clamped to the waveform.
    pub fn index_at(&self, secs: f64) -> usize {
        let index = (secs.max(0.0) * self.sample_rate as f64) as usize;
        index.min(self.samples.len())
    }

    /// The half-open time range `[start_secs, end_secs)`.
    pub fn slice_secs(&self, start_secs: f64, end_secs: f64) -> Waveform {
        let start = self.index_at(start_secs);
        let end = self.index_at(end_secs).max(start);
        Waveform::new(self.samples[start..end].to_vec(), self.sample_rate)
    }

    /// Append another waveform at the same sample rate.
    pub fn append(&mut self, other: &Waveform) -> Result<()> {
        if other.sample_rate != self.sample_rate {
            return Err(VocaliseError::Audio(format!(
                "can't join {} Hz audio onto {} Hz audio",
                other.sample_rate, self.sample_rate
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Mix `other` onto this waveform from time zero.
    ///
    /// The result has this waveform's length; anything in `other` past
    /// that point is dropped. Sums are clipped to [-1, 1].
    pub fn overlay(&self, other: &Waveform) -> Result<Waveform> {
        if other.sample_rate != self.sample_rate {
            return Err(VocaliseError::Audio(format!(
                "can't overlay {} Hz audio onto {} Hz audio",
                other.sample_rate, self.sample_rate
            )));
        }
        let mut samples = self.samples.clone();
        for (out, add) in samples.iter_mut().zip(&other.samples) {
            *out = (*out + add).clamp(-1.0, 1.0);
        }
        Ok(Waveform::new(samples, self.sample_rate))
    }

    /// Resample with `processor` unless already at `sample_rate`.
    pub fn resampled(&self, processor: &dyn SignalProcessor, sample_rate: u32) -> Result<Waveform> {
        if sample_rate == self.sample_rate {
            return Ok(self.clone());
        }
        let samples = processor.resample(&self.samples, self.sample_rate, sample_rate)?;
        Ok(Waveform::new(samples, sample_rate))
    }
}
