use thiserror::Error;

/// ParseTimeError is returned for a time string that is neither "M:SS.mmm" nor "SS.mmm".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparsable time string {text:?}")]
pub struct ParseTimeError {
    pub text: String,
}

impl ParseTimeError {
    pub fn new(text: &str) -> Self {
        ParseTimeError {
            text: text.to_owned(),
        }
    }
}

/// Failures of a timeline build request.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// A lap time could not be parsed. The whole build is aborted since every later cumulative
    /// time of that competitor would be wrong.
    #[error("invalid lap time of {competitor_id} on lap {lap_number}")]
    Format {
        competitor_id: String,
        lap_number: u32,
        #[source]
        source: ParseTimeError,
    },

    #[error("lap data unavailable for {race}")]
    MissingData { race: String },

    #[error("invalid timeline configuration: {0}")]
    InvalidConfig(String),
}
