//! # Render Module
//!
//! Turns assembled parts plus their resolved words into sung audio.
//!
//! ## Sub-modules
//! - `slicer` - cut a syllable out of its word by character timing
//! - `fitter` - resample to the working rate and stretch to the note length
//! - `tuner` - shift each tied sub-note onto its notated pitch
//! - `assemble` - concatenate events into parts, overlay parts into a mix
//!
//! ## Per-event Pipeline
//! ```text
//! Rest ───────────────────────────────────────────► silence(duration)
//! Pitch ─► slice_syllable ─► fit_duration ─► tune ─► segment
//!           (WordInfo)       (sum of ties)   (per tie)
//! ```
//!
//! Every event renders to exactly its notated length at the working sample
//! rate, so part tracks stay aligned with the score.
//!
//! ## Entry Point
//! [`Renderer::render`] - render all parts and mix them down

mod assemble;
mod fitter;
mod slicer;
mod tuner;

#[cfg(test)]
mod tests;

pub use assemble::{assemble_part, mix_down};
pub use fitter::fit_duration;
pub use slicer::slice_syllable;
pub use tuner::{semitone_shift, tune};

use log::{debug, info};
use rayon::prelude::*;

use crate::audio::{PhaseVocoder, SignalProcessor, Waveform};
use crate::config::RenderConfig;
use crate::error::{Result, VocaliseError};
use crate::lyrics::SungPart;
use crate::score::{Event, PitchEvent};
use crate::speech::Lexicon;

/// Renders parts with a [`SignalProcessor`]
pub struct Renderer {
    processor: Box<dyn SignalProcessor>,
    config: RenderConfig,
}

impl Renderer {
    pub fn new(processor: Box<dyn SignalProcessor>, config: RenderConfig) -> Self {
        Self { processor, config }
    }

    /// A renderer backed by the stock [`PhaseVocoder`].
    pub fn with_config(config: RenderConfig) -> Self {
        Self::new(Box::new(PhaseVocoder::default()), config)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render every part and overlay them into one track.
    pub fn render(&self, parts: &[SungPart], lexicon: &Lexicon) -> Result<Waveform> {
        let tracks = self.render_parts(parts, lexicon)?;
        mix_down(&tracks, self.config.sample_rate)
    }

    /// One track per part, in the order given.
    pub fn render_parts(&self, parts: &[SungPart], lexicon: &Lexicon) -> Result<Vec<Waveform>> {
        if self.config.parallel_parts {
            parts
                .par_iter()
                .map(|part| self.render_part(part, lexicon))
                .collect()
        } else {
            parts
                .iter()
                .map(|part| self.render_part(part, lexicon))
                .collect()
        }
    }

    pub fn render_part(&self, part: &SungPart, lexicon: &Lexicon) -> Result<Waveform> {
        let segments = part
            .events
            .iter()
            .enumerate()
            .map(|(index, event)| self.render_event(part, index, event, lexicon))
            .collect::<Result<Vec<_>>>()?;
        let track = assemble_part(segments, self.config.sample_rate)?;
        info!(
            "Rendered part '{}' ({} events, {:.2}s)",
            part.name,
            part.events.len(),
            track.duration_secs()
        );
        Ok(track)
    }

    fn render_event(
        &self,
        part: &SungPart,
        index: usize,
        event: &Event,
        lexicon: &Lexicon,
    ) -> Result<Waveform> {
        match event {
            Event::Rest { duration_ms } => {
                debug!("{} #{}: rest {:.0} ms", part.name, index, duration_ms);
                Ok(Waveform::silence(*duration_ms, self.config.sample_rate))
            }
            Event::Pitch(pitch) => self.render_pitch(part, index, pitch, lexicon),
        }
    }

    fn render_pitch(
        &self,
        part: &SungPart,
        index: usize,
        pitch: &PitchEvent,
        lexicon: &Lexicon,
    ) -> Result<Waveform> {
        let span = pitch.word.as_ref().ok_or_else(|| VocaliseError::Lyric {
            part: part.name.clone(),
            index,
            message: "syllable was never assigned to a word".to_string(),
        })?;
        let info = lexicon.get(&span.word).ok_or_else(|| VocaliseError::Synthesis {
            word: span.word.clone(),
            message: "word was not resolved before rendering".to_string(),
        })?;

        let total_ms: f64 = pitch.notes.iter().map(|n| n.duration_ms).sum();
        debug!(
            "{} #{}: \"{}\" of \"{}\" for {:.0} ms",
            part.name,
            index,
            span.syllable_text(),
            span.word,
            total_ms
        );

        let syllable = slice_syllable(info, span, &self.config)?;
        let fitted = fit_duration(
            self.processor.as_ref(),
            &syllable,
            total_ms,
            self.config.sample_rate,
        )?;
        tune(self.processor.as_ref(), &fitted, &pitch.notes, &self.config)
    }
}
