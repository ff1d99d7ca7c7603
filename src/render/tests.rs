use std::f64::consts::PI;
use std::sync::Arc;

use super::*;
use crate::config::TuningMode;
use crate::score::{SubNote, WordSpan};
use crate::speech::{Alignment, WordInfo};

const SR: u32 = 16000;

fn config() -> RenderConfig {
    RenderConfig {
        sample_rate: SR,
        ..RenderConfig::default()
    }
}

fn tone(hz: f64, secs: f64, sr: u32) -> Vec<f32> {
    (0..(secs * sr as f64).round() as usize)
        .map(|i| (0.5 * (2.0 * PI * hz * i as f64 / sr as f64).sin()) as f32)
        .collect()
}

/// A word spoken as a 220 Hz tone with evenly spaced characters.
fn spoken(word: &str, char_secs: f64) -> WordInfo {
    let n = word.chars().count();
    WordInfo {
        alignment: Alignment {
            characters: word.chars().map(String::from).collect(),
            character_start_times_seconds: (0..n).map(|i| i as f64 * char_secs).collect(),
            character_end_times_seconds: (0..n).map(|i| (i + 1) as f64 * char_secs).collect(),
        },
        audio: Waveform::new(tone(220.0, n as f64 * char_secs, SR), SR),
    }
}

fn span(word: &str, start: usize, end: usize) -> WordSpan {
    WordSpan {
        word: word.to_string(),
        char_start: start,
        char_end: end,
    }
}

fn note(degree: u8, octave: i32, duration_ms: f64) -> SubNote {
    SubNote {
        degree,
        octave,
        duration_ms,
    }
}

fn measured_pitch(samples: &[f32]) -> f64 {
    let mid = samples.len() / 2;
    PhaseVocoder::default()
        .detect_pitch(&samples[mid - 800..mid + 800], SR, 65.41, 2093.0)
        .unwrap()
}

#[test]
fn test_slice_whole_word_by_character_times() {
    let info = WordInfo {
        alignment: Alignment {
            characters: vec!["h".to_string(), "i".to_string()],
            character_start_times_seconds: vec![0.0, 0.2],
            character_end_times_seconds: vec![0.2, 0.4],
        },
        audio: Waveform::new(vec![0.5; SR as usize], SR),
    };
    let slice = slice_syllable(&info, &span("hi", 0, 1), &config()).unwrap();
    assert_eq!(slice.len(), (0.4 * SR as f64) as usize);
}

#[test]
fn test_slice_one_syllable() {
    let info = spoken("hello", 0.1);
    let slice = slice_syllable(&info, &span("hello", 3, 4), &config()).unwrap();
    let expected = 0.2 * SR as f64;
    // Only the zero crossing at the cut can be trimmed.
    assert!((slice.len() as f64 - expected).abs() <= 160.0);
}

#[test]
fn test_slice_out_of_range_is_alignment_error() {
    let info = spoken("hi", 0.2);
    let result = slice_syllable(&info, &span("hi", 1, 2), &config());
    assert!(matches!(result, Err(VocaliseError::Alignment { word, .. }) if word == "hi"));
}

#[test]
fn test_slice_trims_silence() {
    let mut audio = vec![0.0f32; 1600];
    audio.extend(tone(220.0, 0.2, SR));
    audio.extend(vec![0.0f32; 1600]);
    let info = WordInfo {
        alignment: Alignment {
            characters: vec!["o".to_string()],
            character_start_times_seconds: vec![0.0],
            character_end_times_seconds: vec![0.4],
        },
        audio: Waveform::new(audio, SR),
    };
    let slice = slice_syllable(&info, &span("o", 0, 0), &config()).unwrap();
    assert!(slice.len() <= 3200 + 160);
    assert!(slice.len() >= 3200 - 320);
}

#[test]
fn test_fit_one_second_to_two() {
    let segment = Waveform::new(tone(220.0, 1.0, SR), SR);
    let fitted = fit_duration(&PhaseVocoder::default(), &segment, 2000.0, SR).unwrap();
    assert!((fitted.duration_secs() - 2.0).abs() <= 0.1);
    assert!((measured_pitch(&fitted.samples) - 220.0).abs() < 5.0);
}

#[test]
fn test_fit_resamples_to_working_rate() {
    let segment = Waveform::new(tone(220.0, 0.5, 22050), 22050);
    let fitted = fit_duration(&PhaseVocoder::default(), &segment, 500.0, SR).unwrap();
    assert_eq!(fitted.sample_rate, SR);
    assert_eq!(fitted.len(), 8000);
}

#[test]
fn test_fit_empty_segment_is_silence() {
    let fitted = fit_duration(&PhaseVocoder::default(), &Waveform::empty(SR), 250.0, SR).unwrap();
    assert_eq!(fitted.len(), 4000);
    assert!(fitted.samples.iter().all(|&s| s == 0.0));
}

#[test]
fn test_tune_silence_passes_through() {
    let silence = Waveform::silence(600.0, SR);
    let notes = [note(3, 4, 200.0), note(5, 4, 400.0)];
    for tuning in [TuningMode::Slice, TuningMode::Window] {
        let config = RenderConfig {
            tuning,
            ..config()
        };
        let tuned = tune(&PhaseVocoder::default(), &silence, &notes, &config).unwrap();
        assert_eq!(tuned, silence);
    }
}

#[test]
fn test_tune_moves_pitch_to_target() {
    let segment = Waveform::new(tone(220.0, 0.8, SR), SR);
    // A4
    let tuned = tune(&PhaseVocoder::default(), &segment, &[note(0, 4, 800.0)], &config()).unwrap();
    assert_eq!(tuned.len(), segment.len());
    assert!((measured_pitch(&tuned.samples) - 440.0).abs() < 10.0);
}

#[test]
fn test_tune_splits_ties_proportionally() {
    let segment = Waveform::new(tone(220.0, 1.2, SR), SR);
    // A3 for a third, A4 for two thirds
    let notes = [note(0, 3, 400.0), note(0, 4, 800.0)];
    let tuned = tune(&PhaseVocoder::default(), &segment, &notes, &config()).unwrap();
    assert_eq!(tuned.len(), segment.len());

    let first = &tuned.samples[..6400];
    let second = &tuned.samples[6400..];
    assert!((measured_pitch(first) - 220.0).abs() < 5.0);
    assert!((measured_pitch(second) - 440.0).abs() < 10.0);
}

#[test]
fn test_window_tuning_keeps_length() {
    let segment = Waveform::new(tone(196.0, 0.55, SR), SR);
    let config = RenderConfig {
        tuning: TuningMode::Window,
        ..config()
    };
    let tuned = tune(&PhaseVocoder::default(), &segment, &[note(10, 3, 550.0)], &config).unwrap();
    assert_eq!(tuned.len(), segment.len());
}

#[test]
fn test_semitone_shift() {
    assert!((semitone_shift(220.0, 440.0) - 12.0).abs() < 1e-9);
    assert!((semitone_shift(440.0, 220.0) + 12.0).abs() < 1e-9);
    assert!(semitone_shift(261.63, 261.63).abs() < 1e-9);
}

#[test]
fn test_median() {
    assert_eq!(super::tuner::median(&mut []), None);
    assert_eq!(super::tuner::median(&mut [3.0, 1.0, 2.0]), Some(2.0));
    assert_eq!(super::tuner::median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
}

#[test]
fn test_mix_down_uses_longest_base() {
    let short = Waveform::new(vec![0.25; 4], SR);
    let long = Waveform::new(vec![0.5; 10], SR);

    let mixed = mix_down(&[short.clone(), long.clone()], SR).unwrap();
    assert_eq!(mixed.len(), 10);
    assert_eq!(mixed.samples[0], 0.75);
    assert_eq!(mixed.samples[9], 0.5);

    let mixed = mix_down(&[long, short], SR).unwrap();
    assert_eq!(mixed.len(), 10);
    assert_eq!(mixed.samples[3], 0.75);
}

#[test]
fn test_mix_down_of_nothing_is_empty() {
    assert!(mix_down(&[], SR).unwrap().is_empty());
}

#[test]
fn test_assemble_part_appends() {
    let track = assemble_part(
        vec![Waveform::silence(100.0, SR), Waveform::new(vec![0.5; 10], SR)],
        SR,
    )
    .unwrap();
    assert_eq!(track.len(), 1610);
    assert_eq!(track.samples[1600], 0.5);
}

fn sung_go() -> (SungPart, Lexicon) {
    let events = vec![
        Event::Rest { duration_ms: 500.0 },
        Event::Pitch(PitchEvent {
            notes: vec![note(3, 4, 2000.0)],
            lyric: None,
            word: Some(span("go", 0, 1)),
        }),
    ];
    let part = SungPart {
        name: "Solo".to_string(),
        events,
        words: vec!["go".to_string()],
    };
    let mut lexicon = Lexicon::new();
    lexicon.insert("go".to_string(), Arc::new(spoken("go", 0.15)));
    (part, lexicon)
}

#[test]
fn test_render_part_matches_notated_length() {
    let (part, lexicon) = sung_go();
    let renderer = Renderer::with_config(config());
    let track = renderer.render_part(&part, &lexicon).unwrap();
    assert_eq!(track.len(), (2.5 * SR as f64) as usize);
    assert!(track.samples[..8000].iter().all(|&s| s == 0.0));
    assert!(track.samples[8000..].iter().any(|&s| s.abs() > 0.05));
}

#[test]
fn test_render_parallel_matches_sequential() {
    let (part, lexicon) = sung_go();
    let parts = vec![part.clone(), part];
    let sequential = Renderer::with_config(config()).render(&parts, &lexicon).unwrap();
    let parallel = Renderer::with_config(RenderConfig {
        parallel_parts: true,
        ..config()
    })
    .render(&parts, &lexicon)
    .unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn test_render_unresolved_word_is_error() {
    let (part, _) = sung_go();
    let result = Renderer::with_config(config()).render_part(&part, &Lexicon::new());
    assert!(matches!(result, Err(VocaliseError::Synthesis { .. })));
}
