use std::fmt;

/// Errors raised while parsing a SoundFont container.
///
/// Load time is the only point that surfaces recoverable errors; once a synth
/// instance exists, real-time operations degrade gracefully (skip the note,
/// render silence) instead of failing mid-stream.
#[derive(Debug)]
pub enum ParseError {
    /// A chunk id, record size, or cross-reference did not match the SF2 format.
    InvalidHeader { detail: String },
    /// The buffer ended before a declared chunk or record was complete.
    Truncated { offset: usize },
    /// The container parsed but defines no presets, so no lookup is possible.
    NoPresets,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidHeader { detail } => write!(f, "Invalid SoundFont: {detail}"),
            ParseError::Truncated { offset } => {
                write!(f, "Truncated SoundFont data at byte {offset}")
            }
            ParseError::NoPresets => write!(f, "SoundFont contains no presets"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors raised by the handle surface in `registry`.
#[derive(Debug)]
pub enum SynthError {
    /// The handle was never issued or has already been closed.
    InvalidHandle { handle: i32 },
    /// Loading the SoundFont failed; no synth instance was created.
    Load(ParseError),
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::InvalidHandle { handle } => write!(f, "Invalid synth handle {handle}"),
            SynthError::Load(e) => write!(f, "SoundFont load failed: {e}"),
        }
    }
}

impl std::error::Error for SynthError {}

impl From<ParseError> for SynthError {
    fn from(e: ParseError) -> Self {
        SynthError::Load(e)
    }
}
