//! # Error Types
//!
//! This module defines all error types for the vocalise pipeline.
//!
//! Every error is fatal for the run: the final mix needs audio for every
//! event, so nothing is skipped or partially recovered.
//!
//! ## Error Types
//! - `Format` - Malformed or unsupported score structure
//! - `PartNotFound` - Requested part names missing from the part list
//! - `Lyric` - A sung note without a usable lyric syllable
//! - `Synthesis` - The speech provider failed or returned malformed data
//! - `Alignment` - Syllable offsets outside the word's timing metadata
//! - `Audio` - Signal processing or WAV encoding failures
//! - `Config` - Invalid configuration values
//!
//! ## Usage
//! ```rust
//! use vocalise::{prepare, Config, VocaliseError};
//!
//! match prepare("<score-partwise/>", &["Soprano".to_string()], &Config::default()) {
//!     Ok(parts) => println!("{} parts ready", parts.len()),
//!     Err(VocaliseError::PartNotFound { missing }) => {
//!         eprintln!("no such parts: {}", missing.join(", "));
//!     }
//!     Err(e) => eprintln!("error: {}", e),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VocaliseError {
    /// Score structure error.
    ///
    /// Wrong root element or version, missing or redefined divisions, a tie
    /// continuation with nothing to continue, or unreadable XML.
    ///
    /// # Example
    /// ```
    /// # use vocalise::VocaliseError;
    /// let err = VocaliseError::Format("missing divisions for part P1".to_string());
    /// assert_eq!(err.to_string(), "invalid score: missing divisions for part P1");
    /// ```
    #[error("invalid score: {0}")]
    Format(String),

    /// One or more requested part names are not in the score's part list.
    ///
    /// # Example
    /// ```
    /// # use vocalise::VocaliseError;
    /// let err = VocaliseError::PartNotFound { missing: vec!["Alto".to_string()] };
    /// assert_eq!(
    ///     err.to_string(),
    ///     "couldn't find parts: Alto (names are case-sensitive and must be unabbreviated)"
    /// );
    /// ```
    #[error("couldn't find parts: {} (names are case-sensitive and must be unabbreviated)", .missing.join(", "))]
    PartNotFound { missing: Vec<String> },

    /// A pitched note that cannot be sung.
    #[error("lyric error in part {part} at event {index}: {message}")]
    Lyric {
        part: String,
        index: usize,
        message: String,
    },

    /// The speech provider (or the word cache) could not produce a word.
    #[error("synthesis of \"{word}\" failed: {message}")]
    Synthesis { word: String, message: String },

    /// A syllable's character range does not fit the word's timing data.
    #[error("alignment of \"{word}\" failed: {message}")]
    Alignment { word: String, message: String },

    #[error("audio processing failed: {0}")]
    Audio(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VocaliseError>;

impl From<hound::Error> for VocaliseError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => VocaliseError::Io(io),
            other => VocaliseError::Audio(other.to_string()),
        }
    }
}
