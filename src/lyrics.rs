//! # Lyric Assembly
//!
//! Rebuilds whole words from the syllable fragments written under notes.
//!
//! MusicXML spreads a word such as "hello" over several notes
//! (`hel` begin, `lo` end). To find each syllable's audio inside a spoken
//! word we need the complete word and the character range every syllable
//! covers in it:
//!
//! ```text
//! syllables:  hel(begin)   lo(end)
//! word:       hello        hello
//! chars:      [0, 2]       [3, 4]
//! ```
//!
//! Assembly is a pure transform: the parsed part is left untouched and a
//! new event list with [`WordSpan`]s filled in is returned.
//!
//! Syllables are normalised (lowercase, letters only) before offsets are
//! taken, so ranges index into exactly the text sent to the speech
//! provider.

use log::debug;

use crate::error::{Result, VocaliseError};
use crate::score::{normalize_word, Event, Part, SyllablePosition, WordSpan};

/// A part whose pitch events all know their word
#[derive(Debug, Clone, PartialEq)]
pub struct SungPart {
    pub name: String,
    pub events: Vec<Event>,
    /// Complete words in singing order
    pub words: Vec<String>,
}

struct OpenWord {
    start_index: usize,
    text: String,
    last_end: usize,
}

/// Resolve the word and character range of every syllable in `part`.
///
/// # Errors
/// [`VocaliseError::Lyric`] when a pitched note has no usable syllable, or
/// when begin/middle/end markers don't form complete words.
pub fn assemble(part: &Part) -> Result<SungPart> {
    let fail = |index: usize, message: String| VocaliseError::Lyric {
        part: part.name.clone(),
        index,
        message,
    };

    let mut events = part.events.clone();
    let mut words = Vec::new();
    let mut open: Option<OpenWord> = None;

    for i in 0..events.len() {
        let Event::Pitch(pitch) = &mut events[i] else {
            continue;
        };
        let Some(syllable) = &pitch.lyric else {
            return Err(fail(i, "empty lyric".to_string()));
        };
        let text = normalize_word(&syllable.text);
        if text.is_empty() {
            return Err(fail(
                i,
                format!("empty lyric (\"{}\" has no letters)", syllable.text),
            ));
        }
        let len = text.chars().count();
        let position = syllable.position;

        match position {
            SyllablePosition::Begin | SyllablePosition::Single => {
                if let Some(unfinished) = &open {
                    return Err(fail(
                        i,
                        format!("word \"{}\" was never finished", unfinished.text),
                    ));
                }
                pitch.word = Some(WordSpan {
                    word: text.clone(),
                    char_start: 0,
                    char_end: len - 1,
                });
                if position == SyllablePosition::Single {
                    words.push(text);
                } else {
                    open = Some(OpenWord {
                        start_index: i,
                        text,
                        last_end: len - 1,
                    });
                }
            }
            SyllablePosition::Middle | SyllablePosition::End => {
                let Some(word) = open.as_mut() else {
                    return Err(fail(
                        i,
                        format!("syllable \"{}\" continues a word that was never begun", text),
                    ));
                };
                let char_start = word.last_end + 1;
                let char_end = char_start + len - 1;
                word.text.push_str(&text);
                word.last_end = char_end;
                pitch.word = Some(WordSpan {
                    word: word.text.clone(),
                    char_start,
                    char_end,
                });

                if position == SyllablePosition::End {
                    let start = word.start_index;
                    let complete = word.text.clone();
                    open = None;
                    for event in &mut events[start..=i] {
                        if let Event::Pitch(p) = event {
                            if let Some(span) = p.word.as_mut() {
                                span.word = complete.clone();
                            }
                        }
                    }
                    words.push(complete);
                }
            }
        }
    }

    if let Some(unfinished) = open {
        return Err(fail(
            unfinished.start_index,
            format!("word \"{}\" was never finished", unfinished.text),
        ));
    }

    debug!("Part '{}' words: {:?}", part.name, words);
    Ok(SungPart {
        name: part.name.clone(),
        events,
        words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{PitchEvent, SubNote, Syllable};

    fn sung(text: &str, position: SyllablePosition) -> Event {
        let note = SubNote {
            degree: 3,
            octave: 4,
            duration_ms: 500.0,
        };
        Event::Pitch(PitchEvent::new(
            note,
            Some(Syllable {
                text: text.to_string(),
                position,
            }),
        ))
    }

    fn part(events: Vec<Event>) -> Part {
        Part {
            id: "P1".to_string(),
            name: "Soprano".to_string(),
            events,
        }
    }

    fn spans(sung: &SungPart) -> Vec<(String, usize, usize)> {
        sung.events
            .iter()
            .filter_map(Event::as_pitch)
            .map(|p| {
                let span = p.word.clone().unwrap();
                (span.word, span.char_start, span.char_end)
            })
            .collect()
    }

    #[test]
    fn test_single_syllable_word() {
        let result = assemble(&part(vec![sung("Go!", SyllablePosition::Single)])).unwrap();
        assert_eq!(spans(&result), vec![("go".to_string(), 0, 1)]);
        assert_eq!(result.words, vec!["go".to_string()]);
    }

    #[test]
    fn test_multi_syllable_word_with_rest_inside() {
        use SyllablePosition::*;
        let events = vec![
            sung("Hal", Begin),
            Event::Rest { duration_ms: 250.0 },
            sung("le", Middle),
            sung("lu", Middle),
            sung("jah", End),
            sung("sing", Single),
        ];
        let result = assemble(&part(events)).unwrap();
        assert_eq!(
            spans(&result),
            vec![
                ("hallelujah".to_string(), 0, 2),
                ("hallelujah".to_string(), 3, 4),
                ("hallelujah".to_string(), 5, 6),
                ("hallelujah".to_string(), 7, 9),
                ("sing".to_string(), 0, 3),
            ]
        );
        assert_eq!(result.words, vec!["hallelujah".to_string(), "sing".to_string()]);
    }

    #[test]
    fn test_syllables_reconstruct_word() {
        use SyllablePosition::*;
        let events = vec![sung("won", Begin), sung("der", Middle), sung("ful", End)];
        let result = assemble(&part(events)).unwrap();
        let rebuilt: String = result
            .events
            .iter()
            .filter_map(Event::as_pitch)
            .map(|p| p.word.as_ref().unwrap().syllable_text())
            .collect();
        assert_eq!(rebuilt, "wonderful");
    }

    #[test]
    fn test_input_part_is_untouched() {
        let original = part(vec![sung("la", SyllablePosition::Single)]);
        let before = original.clone();
        assemble(&original).unwrap();
        assert_eq!(original, before);
    }

    #[test]
    fn test_missing_lyric_is_error() {
        let note = SubNote {
            degree: 0,
            octave: 4,
            duration_ms: 100.0,
        };
        let events = vec![Event::Pitch(PitchEvent::new(note, None))];
        let result = assemble(&part(events));
        assert!(matches!(result, Err(VocaliseError::Lyric { index: 0, .. })));
    }

    #[test]
    fn test_punctuation_only_lyric_is_error() {
        let result = assemble(&part(vec![sung("--", SyllablePosition::Single)]));
        assert!(matches!(result, Err(VocaliseError::Lyric { message, .. }) if message.contains("empty lyric")));
    }

    #[test]
    fn test_end_without_begin_is_error() {
        let result = assemble(&part(vec![sung("lo", SyllablePosition::End)]));
        assert!(matches!(result, Err(VocaliseError::Lyric { .. })));
    }

    #[test]
    fn test_unfinished_word_is_error() {
        use SyllablePosition::*;
        let result = assemble(&part(vec![sung("hel", Begin), sung("lo", Middle)]));
        assert!(matches!(result, Err(VocaliseError::Lyric { index: 0, .. })));

        let result = assemble(&part(vec![sung("hel", Begin), sung("hi", Single)]));
        assert!(matches!(result, Err(VocaliseError::Lyric { index: 1, .. })));
    }
}
