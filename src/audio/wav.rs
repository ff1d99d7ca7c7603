//! WAV and raw PCM conversion.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::Waveform;
use crate::error::{Result, VocaliseError};

/// Read a WAV file, averaging channels down to mono.
pub fn read_wav(path: &Path) -> Result<Waveform> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok(Waveform::new(samples, spec.sample_rate))
}

/// Write 32-bit float mono.
pub fn write_wav_float(path: &Path, wave: &Waveform) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &wave.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write 16-bit integer mono.
pub fn write_wav_pcm16(path: &Path, wave: &Waveform) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in &wave.samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Decode headerless signed 16-bit little-endian mono PCM.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32) -> Result<Waveform> {
    if bytes.len() % 2 != 0 {
        return Err(VocaliseError::Audio(format!(
            "PCM stream has an odd number of bytes ({})",
            bytes.len()
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();
    Ok(Waveform::new(samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_decode_pcm16() {
        let bytes = [0x00, 0x00, 0x00, 0x40, 0x00, 0xC0];
        let wave = decode_pcm16(&bytes, 16000).unwrap();
        assert_eq!(wave.sample_rate, 16000);
        assert_eq!(wave.samples, vec![0.0, 0.5, -0.5]);
    }

    #[test]
    fn test_decode_pcm16_rejects_odd_length() {
        assert!(matches!(decode_pcm16(&[0, 0, 0], 16000), Err(VocaliseError::Audio(_))));
    }

    #[test]
    fn test_float_file_keeps_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        let wave = Waveform::new(vec![0.25, -0.5, 1.0], 22050);
        write_wav_float(&path, &wave).unwrap();
        assert_eq!(read_wav(&path).unwrap(), wave);
    }

    #[test]
    fn test_pcm16_file_is_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        let wave = Waveform::new(vec![0.25, -0.5, 0.0], 44100);
        write_wav_pcm16(&path, &wave).unwrap();
        let read = read_wav(&path).unwrap();
        assert_eq!(read.sample_rate, 44100);
        for (a, b) in read.samples.iter().zip(&wave.samples) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(read_wav(Path::new("/nonexistent/nothing.wav")).is_err());
    }
}
