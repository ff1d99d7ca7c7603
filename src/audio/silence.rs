//! Silence measurement and trimming.
//!
//! Audio is scanned in fixed-length chunks; a chunk counts as silent when
//! its RMS level, in dBFS, is below the threshold.

/// RMS level of `samples` relative to full scale. Empty or zero input is
/// negative infinity.
pub fn dbfs(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    let mean_square =
        samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / samples.len() as f64;
    if mean_square <= 0.0 {
        return f64::NEG_INFINITY;
    }
    10.0 * mean_square.log10()
}

fn chunk_len(sample_rate: u32, chunk_ms: f64) -> usize {
    ((chunk_ms * 0.001 * sample_rate as f64).round() as usize).max(1)
}

/// Number of silent samples at the start of `samples`.
pub fn leading_silence(samples: &[f32], sample_rate: u32, threshold_db: f64, chunk_ms: f64) -> usize {
    let chunk = chunk_len(sample_rate, chunk_ms);
    let mut trim = 0;
    while trim < samples.len() {
        let end = (trim + chunk).min(samples.len());
        if dbfs(&samples[trim..end]) >= threshold_db {
            break;
        }
        trim += chunk;
    }
    trim.min(samples.len())
}

/// Number of silent samples at the end of `samples`.
pub fn trailing_silence(samples: &[f32], sample_rate: u32, threshold_db: f64, chunk_ms: f64) -> usize {
    let chunk = chunk_len(sample_rate, chunk_ms);
    let mut trim = 0;
    while trim < samples.len() {
        let end = samples.len() - trim;
        let start = end.saturating_sub(chunk);
        if dbfs(&samples[start..end]) >= threshold_db {
            break;
        }
        trim += end - start;
    }
    trim
}

/// Remove leading and trailing silence.
pub fn strip_silence(samples: &[f32], sample_rate: u32, threshold_db: f64, chunk_ms: f64) -> Vec<f32> {
    let start = leading_silence(samples, sample_rate, threshold_db, chunk_ms);
    let rest = &samples[start..];
    let end = rest.len() - trailing_silence(rest, sample_rate, threshold_db, chunk_ms);
    rest[..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbfs() {
        assert_eq!(dbfs(&[]), f64::NEG_INFINITY);
        assert_eq!(dbfs(&[0.0; 10]), f64::NEG_INFINITY);
        assert!(dbfs(&[1.0, -1.0]).abs() < 1e-9);
        assert!((dbfs(&[0.1; 4]) + 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_strip_silence() {
        // 1000 Hz rate, 10 ms chunks = 10 samples
        let mut samples = vec![0.0f32; 30];
        samples.extend(vec![0.5f32; 40]);
        samples.extend(vec![0.0001f32; 20]);
        let stripped = strip_silence(&samples, 1000, -50.0, 10.0);
        assert_eq!(stripped.len(), 40);
        assert!(stripped.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_trim_stops_at_chunk_holding_sound() {
        // The tail is 25 samples, so the last trimmed chunk boundary falls
        // 5 samples into the quiet tail
        let mut samples = vec![0.5f32; 40];
        samples.extend(vec![0.0001f32; 25]);
        assert_eq!(trailing_silence(&samples, 1000, -50.0, 10.0), 20);
        let stripped = strip_silence(&samples, 1000, -50.0, 10.0);
        assert_eq!(stripped.len(), 45);
        assert!(stripped[..40].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_all_silent_strips_to_empty() {
        let samples = vec![0.0f32; 100];
        assert!(strip_silence(&samples, 1000, -50.0, 10.0).is_empty());
        assert_eq!(leading_silence(&samples, 1000, -50.0, 10.0), 100);
    }

    #[test]
    fn test_threshold_is_tunable() {
        let samples = vec![0.01f32; 50]; // -40 dBFS
        assert_eq!(strip_silence(&samples, 1000, -50.0, 10.0).len(), 50);
        assert!(strip_silence(&samples, 1000, -30.0, 10.0).is_empty());
    }
}
