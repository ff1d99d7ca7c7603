//! Join event audio into part tracks and mix the parts.

use log::debug;

use crate::audio::Waveform;
use crate::error::Result;

/// Append segments end to end, no crossfade.
pub fn assemble_part<I>(segments: I, sample_rate: u32) -> Result<Waveform>
where
    I: IntoIterator<Item = Waveform>,
{
    let mut track = Waveform::empty(sample_rate);
    for segment in segments {
        track.append(&segment)?;
    }
    Ok(track)
}

/// Overlay every track from time zero.
///
/// Overlay keeps the base's length, so whichever of the running mix and
/// the next track is longer becomes the base.
pub fn mix_down(tracks: &[Waveform], sample_rate: u32) -> Result<Waveform> {
    let mut mix = Waveform::empty(sample_rate);
    for track in tracks {
        mix = if track.len() > mix.len() {
            track.overlay(&mix)?
        } else {
            mix.overlay(track)?
        };
    }
    debug!("Mixed {} tracks into {:.2}s", tracks.len(), mix.duration_secs());
    Ok(mix)
}
