use crate::core::events::RaceEvent;
use crate::core::timeline::CompetitorState;
use crate::playback::PlaybackState;
use serde::Serialize;

/// (Hz) Upper bound for the number of viewer updates sent per wall-clock second.
pub const MAX_VIEWER_UPDATE_FREQUENCY: f64 = 20.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// ViewerState is the message a playback driver sends to a viewer on every update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    pub playback: PlaybackState,
    pub competitor_states: Vec<CompetitorState>,

    // events whose race time was passed since the previous update
    pub new_events: Vec<RaceEvent>,

    // true on the last message of a playback run
    pub finished: bool,
}
