//! Phase-vocoder time stretching, band-limited resampling, and the
//! pitch shift built from the two.

use std::f32::consts::PI;
use std::sync::Arc;

use log::trace;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{pitch, SignalProcessor};
use crate::error::{Result, VocaliseError};

const DEFAULT_FFT_SIZE: usize = 2048;
const DEFAULT_HOP: usize = 512;
const RESAMPLE_CHUNK: usize = 1024;

/// The stock [`SignalProcessor`]
///
/// Stretching is an STFT phase vocoder (Hann window, `fft_size / 4` hop by
/// default), resampling uses a windowed-sinc interpolator, and pitch is
/// estimated with YIN.
#[derive(Debug, Clone)]
pub struct PhaseVocoder {
    fft_size: usize,
    hop: usize,
}

impl Default for PhaseVocoder {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            hop: DEFAULT_HOP,
        }
    }
}

impl PhaseVocoder {
    pub fn new(fft_size: usize, hop: usize) -> Result<Self> {
        if fft_size < 4 || fft_size % 2 != 0 || hop == 0 || hop > fft_size {
            return Err(VocaliseError::Audio(format!(
                "invalid vocoder frame: fft size {}, hop {}",
                fft_size, hop
            )));
        }
        Ok(Self { fft_size, hop })
    }

    fn hann(&self) -> Vec<f32> {
        let n = self.fft_size as f32;
        (0..self.fft_size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n).cos())
            .collect()
    }

    fn stft(&self, padded: &[f32], window: &[f32], fft: &Arc<dyn Fft<f32>>) -> Vec<Vec<Complex<f32>>> {
        let bins = self.fft_size / 2 + 1;
        let frames = 1 + (padded.len() - self.fft_size) / self.hop;
        (0..frames)
            .map(|f| {
                let start = f * self.hop;
                let mut buf: Vec<Complex<f32>> = padded[start..start + self.fft_size]
                    .iter()
                    .zip(window)
                    .map(|(&s, &w)| Complex::new(s * w, 0.0))
                    .collect();
                fft.process(&mut buf);
                buf.truncate(bins);
                buf
            })
            .collect()
    }

    fn istft(
        &self,
        frames: &[Vec<Complex<f32>>],
        window: &[f32],
        ifft: &Arc<dyn Fft<f32>>,
    ) -> Vec<f32> {
        let n = self.fft_size;
        let bins = n / 2 + 1;
        let len = n + self.hop * frames.len().saturating_sub(1);
        let mut out = vec![0.0f32; len];
        let mut norm = vec![0.0f32; len];

        for (f, spectrum) in frames.iter().enumerate() {
            let mut full = vec![Complex::new(0.0f32, 0.0); n];
            full[..bins].copy_from_slice(spectrum);
            for k in bins..n {
                full[k] = spectrum[n - k].conj();
            }
            ifft.process(&mut full);

            let start = f * self.hop;
            for i in 0..n {
                out[start + i] += full[i].re / n as f32 * window[i];
                norm[start + i] += window[i] * window[i];
            }
        }
        for (sample, weight) in out.iter_mut().zip(&norm) {
            if *weight > 1e-6 {
                *sample /= weight;
            }
        }
        out
    }
}

impl SignalProcessor for PhaseVocoder {
    fn resample(&self, samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>> {
        if from_hz == 0 || to_hz == 0 {
            return Err(VocaliseError::Audio("sample rate must be positive".to_string()));
        }
        resample_by(samples, to_hz as f64 / from_hz as f64)
    }

    fn time_stretch(&self, samples: &[f32], rate: f64) -> Result<Vec<f32>> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(VocaliseError::Audio(format!("invalid stretch rate {}", rate)));
        }
        if samples.is_empty() || (rate - 1.0).abs() < 1e-9 {
            return Ok(samples.to_vec());
        }
        let target_len = (samples.len() as f64 / rate).round() as usize;
        trace!("stretching {} samples to {} (rate {:.4})", samples.len(), target_len, rate);

        let n = self.fft_size;
        let pad = n / 2;
        let mut padded = vec![0.0f32; pad];
        padded.extend_from_slice(samples);
        padded.extend(std::iter::repeat(0.0).take(pad));
        if padded.len() < n {
            padded.resize(n, 0.0);
        }

        let window = self.hann();
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);

        let frames = self.stft(&padded, &window, &fft);
        let bins = n / 2 + 1;
        let silent = vec![Complex::new(0.0f32, 0.0); bins];
        let advance: Vec<f32> = (0..bins)
            .map(|k| 2.0 * PI * self.hop as f32 * k as f32 / n as f32)
            .collect();

        let mut phase: Vec<f32> = frames[0].iter().map(|c| c.arg()).collect();
        let mut stretched = Vec::new();
        let mut t = 0.0f64;
        while t < frames.len() as f64 {
            let i = t.floor() as usize;
            let alpha = (t - i as f64) as f32;
            let left = &frames[i];
            let right = frames.get(i + 1).unwrap_or(&silent);

            stretched.push(
                (0..bins)
                    .map(|k| {
                        let mag = (1.0 - alpha) * left[k].norm() + alpha * right[k].norm();
                        Complex::from_polar(mag, phase[k])
                    })
                    .collect::<Vec<_>>(),
            );

            for k in 0..bins {
                let delta = right[k].arg() - left[k].arg() - advance[k];
                let wrapped = delta - 2.0 * PI * (delta / (2.0 * PI)).round();
                phase[k] += advance[k] + wrapped;
            }
            t += rate;
        }

        let mut out: Vec<f32> = self
            .istft(&stretched, &window, &ifft)
            .into_iter()
            .skip(pad)
            .take(target_len)
            .collect();
        out.resize(target_len, 0.0);
        Ok(out)
    }

    fn detect_pitch(&self, window: &[f32], sample_rate: u32, min_hz: f64, max_hz: f64) -> Option<f64> {
        pitch::detect_pitch_yin(window, sample_rate, min_hz, max_hz)
    }

    fn pitch_shift(&self, samples: &[f32], _sample_rate: u32, semitones: f64) -> Result<Vec<f32>> {
        if samples.is_empty() || semitones.abs() < 1e-6 {
            return Ok(samples.to_vec());
        }
        // Stretch by 1/ratio, then squeeze back by resampling; the squeeze
        // moves pitch up by the ratio.
        let rate = 2f64.powf(-semitones / 12.0);
        let stretched = self.time_stretch(samples, rate)?;
        let mut shifted = resample_by(&stretched, rate)?;
        shifted.resize(samples.len(), 0.0);
        Ok(shifted)
    }
}

fn resample_error(err: impl std::fmt::Display) -> VocaliseError {
    VocaliseError::Audio(format!("resampling failed: {}", err))
}

/// Resample so that the output has `round(len * ratio)` samples.
fn resample_by(samples: &[f32], ratio: f64) -> Result<Vec<f32>> {
    if samples.is_empty() || (ratio - 1.0).abs() < 1e-9 {
        return Ok(samples.to_vec());
    }
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1).map_err(resample_error)?;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected + delay);

    let mut pos = 0;
    loop {
        let needed = resampler.input_frames_next();
        if pos + needed > samples.len() {
            break;
        }
        let input = vec![samples[pos..pos + needed].to_vec()];
        let chunk = resampler.process(&input, None).map_err(resample_error)?;
        out.extend_from_slice(&chunk[0]);
        pos += needed;
    }
    if pos < samples.len() {
        let input = vec![samples[pos..].to_vec()];
        let chunk = resampler
            .process_partial(Some(input.as_slice()), None)
            .map_err(resample_error)?;
        out.extend_from_slice(&chunk[0]);
    }
    while out.len() < expected + delay {
        let chunk = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(resample_error)?;
        if chunk[0].is_empty() {
            break;
        }
        out.extend_from_slice(&chunk[0]);
    }

    let mut out: Vec<f32> = out.into_iter().skip(delay).collect();
    out.resize(expected, 0.0);
    Ok(out)
}
