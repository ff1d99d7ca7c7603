//! YIN fundamental-frequency estimation.
//!
//! de Cheveigné & Kawahara, "YIN, a fundamental frequency estimator for
//! speech and music" (2002): difference function, cumulative mean
//! normalisation, absolute threshold, parabolic refinement.

/// Windows quieter than this RMS level are treated as unvoiced (-40 dBFS).
const MIN_VOICED_RMS: f64 = 0.01;

/// Dips in the normalised difference below this count as periodic.
const YIN_THRESHOLD: f64 = 0.15;

/// Estimate the fundamental frequency of `window`, or `None` if the window
/// is silent, aperiodic, or its pitch falls outside `[min_hz, max_hz]`.
pub fn detect_pitch_yin(window: &[f32], sample_rate: u32, min_hz: f64, max_hz: f64) -> Option<f64> {
    let sr = sample_rate as f64;
    let tau_min = ((sr / max_hz).floor() as usize).max(2);
    let tau_max = (sr / min_hz).ceil() as usize;
    if window.len() <= tau_max + tau_min {
        return None;
    }

    let rms = (window.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>()
        / window.len() as f64)
        .sqrt();
    if rms < MIN_VOICED_RMS {
        return None;
    }

    let span = window.len() - tau_max;
    let mut diff = vec![0.0f64; tau_max + 1];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        *d = window[..span]
            .iter()
            .zip(&window[tau..tau + span])
            .map(|(&a, &b)| {
                let delta = a as f64 - b as f64;
                delta * delta
            })
            .sum();
    }

    let mut cmnd = vec![1.0f64; tau_max + 1];
    let mut running = 0.0;
    for tau in 1..=tau_max {
        running += diff[tau];
        cmnd[tau] = if running > 0.0 {
            diff[tau] * tau as f64 / running
        } else {
            1.0
        };
    }

    let mut tau = (tau_min..=tau_max).find(|&t| cmnd[t] < YIN_THRESHOLD)?;
    while tau < tau_max && cmnd[tau + 1] < cmnd[tau] {
        tau += 1;
    }

    let refined = if tau > 1 && tau < tau_max {
        let (a, b, c) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > f64::EPSILON {
            tau as f64 + 0.5 * (a - c) / denom
        } else {
            tau as f64
        }
    } else {
        tau as f64
    };

    let hz = sr / refined;
    (min_hz..=max_hz).contains(&hz).then_some(hz)
}
