use crate::core::error::TimelineError;
use crate::core::events::RaceEvent;
use crate::interfaces::viewer_interface::RgbColor;
use crate::pre::race_data::{RaceData, RaceMetadata};
use log::warn;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::ops::Range;

pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 500;

fn default_sampling_interval_ms() -> u64 {
    DEFAULT_SAMPLING_INTERVAL_MS
}

/// * `sampling_interval_ms` - (ms) Race time between two frames
/// * `target_frames` - Optional frame budget, the frame sequence is thinned down to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    #[serde(default)]
    pub target_frames: Option<usize>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        TimelineConfig {
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            target_frames: None,
        }
    }
}

impl TimelineConfig {
    pub fn validate(&self) -> Result<(), TimelineError> {
        if self.sampling_interval_ms == 0 {
            return Err(TimelineError::InvalidConfig(
                "sampling interval must be at least 1ms".to_owned(),
            ));
        }
        if self.target_frames == Some(0) {
            return Err(TimelineError::InvalidConfig(
                "target frame count must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Derived state of one competitor at one sampled race time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorState {
    pub competitor_id: String,
    pub position: u32,
    pub progress_pct: f64,
    pub lap_number: u32,
    pub in_pit: bool,
    pub retired: bool,
    pub has_fastest_lap: bool,
    pub gap_to_leader_ms: u64,
    pub last_lap_time_ms: Option<u64>,
}

/// Span is a [start, start + len) window into one of the timeline buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A frame does not own its states or events, it points into the flat buffers of its timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub time_ms: f64,
    pub states: Span,
    pub events: Span,
}

/// FrameView is a frame resolved against its timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameView<'a> {
    pub time_ms: f64,
    #[serde(rename = "competitorStates")]
    pub states: &'a [CompetitorState],
    pub events: &'a [RaceEvent],
}

impl<'a> FrameView<'a> {
    pub fn state_of(&self, competitor_id: &str) -> Option<&'a CompetitorState> {
        self.states
            .iter()
            .find(|state| state.competitor_id == competitor_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorInfo {
    pub competitor_id: String,
    pub code: Option<String>,
    pub name: Option<String>,
    pub team: Option<String>,
    pub color: Option<RgbColor>,
    pub grid: Option<u32>,
}

/// build_roster assembles the roster entries of the given competitors from the race data roster
/// and the results (for the grid position).
pub fn build_roster(data: &RaceData, competitor_ids: &[String]) -> Vec<CompetitorInfo> {
    competitor_ids
        .iter()
        .map(|id| {
            let entry = data.roster.iter().find(|entry| &entry.competitor_id == id);
            let grid = data
                .results
                .iter()
                .find(|result| &result.competitor_id == id)
                .map(|result| result.grid)
                .filter(|&grid| grid > 0);

            let color = entry
                .and_then(|entry| entry.color.as_ref())
                .and_then(|color| match color.parse::<css_color_parser::Color>() {
                    Ok(c) => Some(RgbColor {
                        r: c.r,
                        g: c.g,
                        b: c.b,
                    }),
                    Err(_) => {
                        warn!("Could not parse color {:?} of {}, ignoring it", color, id);
                        None
                    }
                });

            CompetitorInfo {
                competitor_id: id.to_owned(),
                code: entry.and_then(|entry| entry.code.to_owned()),
                name: entry.and_then(|entry| entry.name.to_owned()),
                team: entry.and_then(|entry| entry.team.to_owned()),
                color,
                grid,
            }
        })
        .collect()
}

/// Timeline is the immutable result of a build request: sampled frames plus the full, sorted
/// event log. Competitor states of all frames live in one flat buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub(crate) metadata: RaceMetadata,
    pub(crate) roster: Vec<CompetitorInfo>,
    pub(crate) total_duration_ms: u64,
    pub(crate) sampling_interval_ms: u64,
    pub(crate) frames: Vec<Frame>,
    pub(crate) states: Vec<CompetitorState>,
    pub(crate) events: Vec<RaceEvent>,
}

impl Timeline {
    pub fn metadata(&self) -> &RaceMetadata {
        &self.metadata
    }

    pub fn roster(&self) -> &[CompetitorInfo] {
        &self.roster
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    pub fn sampling_interval_ms(&self) -> u64 {
        self.sampling_interval_ms
    }

    pub fn events(&self) -> &[RaceEvent] {
        &self.events
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, idx: usize) -> Option<FrameView<'_>> {
        self.frames.get(idx).map(|frame| self.view(frame))
    }

    pub fn frames(&self) -> impl Iterator<Item = FrameView<'_>> + '_ {
        self.frames.iter().map(move |frame| self.view(frame))
    }

    fn view(&self, frame: &Frame) -> FrameView<'_> {
        FrameView {
            time_ms: frame.time_ms,
            states: &self.states[frame.states.range()],
            events: &self.events[frame.events.range()],
        }
    }

    /// floor_frame_index returns the index of the last frame with time_ms <= t_ms (0 if t_ms lies
    /// before the first frame or there are no frames).
    pub fn floor_frame_index(&self, t_ms: f64) -> usize {
        self.frames
            .partition_point(|frame| frame.time_ms <= t_ms)
            .saturating_sub(1)
    }
}

impl Serialize for Timeline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let frames: Vec<FrameView<'_>> = self.frames().collect();

        let mut state = serializer.serialize_struct("Timeline", 6)?;
        state.serialize_field("metadata", &self.metadata)?;
        state.serialize_field("competitorRoster", &self.roster)?;
        state.serialize_field("totalDurationMs", &self.total_duration_ms)?;
        state.serialize_field("samplingIntervalMs", &self.sampling_interval_ms)?;
        state.serialize_field("frames", &frames)?;
        state.serialize_field("events", &self.events)?;
        state.end()
    }
}
