//! Sings the lyrics of a MusicXML score with a text-to-speech voice.
//!
//! Each lyric word is spoken once by a speech provider, each syllable is
//! cut out of its word by character timing, stretched to its note and
//! pitched onto it, and the parts are mixed into one track.

pub mod audio;
pub mod config;
pub mod error;
pub mod lyrics;
pub mod musicxml;
pub mod render;
pub mod score;
pub mod speech;

pub use audio::Waveform;
pub use config::Config;
pub use error::*;
pub use lyrics::{assemble, SungPart};
pub use musicxml::parse_parts;
pub use render::Renderer;
pub use score::*;
pub use speech::{Lexicon, SpeechCache, SpeechProvider, WordInfo, WordStore};

/// Parse the requested parts and assemble their lyrics.
/// Nothing is synthesised, so failures here cost no provider calls.
pub fn prepare(xml: &str, part_names: &[String], config: &Config) -> Result<Vec<SungPart>> {
    let parts = parse_parts(xml, part_names, &config.score)?;
    parts.iter().map(assemble).collect()
}

/// Run the whole pipeline: prepare, resolve words, render, mix.
pub fn sing<P, S>(
    xml: &str,
    part_names: &[String],
    config: &Config,
    cache: &SpeechCache<P, S>,
    renderer: &Renderer,
) -> Result<Waveform>
where
    P: SpeechProvider,
    S: WordStore,
{
    let parts = prepare(xml, part_names, config)?;
    let lexicon = cache.resolve(&parts)?;
    renderer.render(&parts, &lexicon)
}
