use crate::core::events::{events_in_window, PitLapIndex, RaceEvent};
use crate::core::lap_times::CompetitorLapSeries;
use crate::core::timeline::{CompetitorState, Frame, Span, Timeline};
use helpers::general::max;
use log::{debug, info};
use rayon::prelude::*;
use std::collections::HashMap;

/// (%) A pitting competitor counts as in the pit lane beyond this lap progress.
pub const PIT_LANE_PROGRESS_PCT: f64 = 85.0;

/// Everything the frame generator samples from.
///
/// * `series` - Lap series of all competitors (roster order)
/// * `events` - Sorted event log
/// * `pit_laps` - Pitted laps per competitor
/// * `retirement_laps` - Last recorded lap of every competitor that did not finish
/// * `fastest_lap_id` - Holder of the fastest lap, if known
/// * `sampling_interval_ms` - (ms) Race time between two frames, > 0
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub series: &'a [CompetitorLapSeries],
    pub events: &'a [RaceEvent],
    pub pit_laps: &'a PitLapIndex,
    pub retirement_laps: &'a HashMap<String, u32>,
    pub fastest_lap_id: Option<&'a str>,
    pub sampling_interval_ms: u64,
}

/// SampledFrames holds the frames and the flat state buffer they point into.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrames {
    pub total_duration_ms: u64,
    pub frames: Vec<Frame>,
    pub states: Vec<CompetitorState>,
}

/// total_duration_ms returns the latest final cumulative time of all competitors.
pub fn total_duration_ms(series: &[CompetitorLapSeries]) -> u64 {
    let final_times: Vec<u64> = series.iter().map(|s| s.final_cumulative_ms()).collect();
    max(&final_times).unwrap_or(0)
}

/// sample_times returns 0, interval, 2 * interval, ... up to and including the total duration.
/// If the duration is not a multiple of the interval, a last sample is placed exactly at the end.
pub fn sample_times(total_duration_ms: u64, sampling_interval_ms: u64) -> Vec<f64> {
    let interval = sampling_interval_ms.max(1);
    let mut times: Vec<f64> = (0..=total_duration_ms / interval)
        .map(|k| (k * interval) as f64)
        .collect();

    if total_duration_ms % interval != 0 {
        times.push(total_duration_ms as f64);
    }
    times
}

/// leader_cumulative_times maps every lap number to the cumulative time of whoever held position 1
/// at the end of that lap.
fn leader_cumulative_times(series: &[CompetitorLapSeries]) -> HashMap<u32, u64> {
    let mut leader_times = HashMap::new();
    for s in series.iter() {
        for lap in s.laps.iter().filter(|lap| lap.position == 1) {
            leader_times
                .entry(lap.lap_number)
                .or_insert(lap.cumulative_time_ms);
        }
    }
    leader_times
}

/// sample_competitor derives the state of one competitor at race time t_ms.
fn sample_competitor(
    s: &CompetitorLapSeries,
    t_ms: f64,
    inputs: &FrameInputs,
    leader_times: &HashMap<u32, u64>,
) -> CompetitorState {
    let retirement_lap = inputs.retirement_laps.get(&s.competitor_id).copied();
    let has_fastest_lap = inputs.fastest_lap_id == Some(s.competitor_id.as_str());

    if s.laps.is_empty() {
        return CompetitorState {
            competitor_id: s.competitor_id.to_owned(),
            position: inputs.series.len() as u32,
            progress_pct: 0.0,
            lap_number: 0,
            in_pit: false,
            retired: retirement_lap.is_some(),
            has_fastest_lap,
            gap_to_leader_ms: 0,
            last_lap_time_ms: None,
        };
    }

    // past the last recorded lap the competitor stays at the end of it
    let (idx, progress_pct, last_lap_time_ms) = match s.locate(t_ms) {
        Some(idx) => {
            let lap = &s.laps[idx];
            let prev_cumulative_ms = if idx == 0 {
                0
            } else {
                s.laps[idx - 1].cumulative_time_ms
            };
            let progress_pct = (100.0 * (t_ms - prev_cumulative_ms as f64)
                / lap.lap_time_ms as f64)
                .clamp(0.0, 100.0);
            let last_lap_time_ms = if idx == 0 {
                None
            } else {
                Some(s.laps[idx - 1].lap_time_ms)
            };
            (idx, progress_pct, last_lap_time_ms)
        }
        None => {
            let idx = s.laps.len() - 1;
            (idx, 100.0, Some(s.laps[idx].lap_time_ms))
        }
    };
    let lap = &s.laps[idx];

    let pitted_this_lap = inputs
        .pit_laps
        .get(&s.competitor_id)
        .map_or(false, |laps| laps.contains(&lap.lap_number));
    let in_pit =
        pitted_this_lap && progress_pct > PIT_LANE_PROGRESS_PCT && progress_pct < 100.0;

    // compared at the same lap number, not at the same instant
    let gap_to_leader_ms = if lap.position == 1 {
        0
    } else {
        leader_times
            .get(&lap.lap_number)
            .map_or(0, |&leader_ms| lap.cumulative_time_ms.saturating_sub(leader_ms))
    };

    CompetitorState {
        competitor_id: s.competitor_id.to_owned(),
        position: lap.position,
        progress_pct,
        lap_number: lap.lap_number,
        in_pit,
        retired: retirement_lap.map_or(false, |retirement_lap| lap.lap_number >= retirement_lap),
        has_fastest_lap,
        gap_to_leader_ms,
        last_lap_time_ms,
    }
}

/// attach_events assigns every event of the sorted log to the frame whose time is closest to it
/// (half an interval either side). Frame boundaries are the midpoints between neighbouring frame
/// times, the first and last frame catch everything before/after them, so each event lands in
/// exactly one frame.
fn attach_events(times: &[f64], events: &[RaceEvent]) -> Vec<Span> {
    let mut spans = Vec::with_capacity(times.len());
    let mut start = 0;

    for (k, &t) in times.iter().enumerate() {
        let end = match times.get(k + 1) {
            Some(&t_next) => {
                let boundary = 0.5 * (t + t_next);
                start + events[start..].partition_point(|event| event.time_ms < boundary)
            }
            None => events.len(),
        };
        spans.push(Span {
            start,
            len: end - start,
        });
        start = end;
    }

    spans
}

/// generate_frames samples every competitor at each sample time. Competitors are sampled in
/// parallel, each frame lists running competitors by position followed by retired ones.
pub fn generate_frames(inputs: &FrameInputs) -> SampledFrames {
    let total_duration_ms = total_duration_ms(inputs.series);
    let times = sample_times(total_duration_ms, inputs.sampling_interval_ms);
    let leader_times = leader_cumulative_times(inputs.series);

    let tracks: Vec<Vec<CompetitorState>> = inputs
        .series
        .par_iter()
        .map(|s| {
            times
                .iter()
                .map(|&t| sample_competitor(s, t, inputs, &leader_times))
                .collect()
        })
        .collect();

    let event_spans = attach_events(&times, inputs.events);
    let mut track_iters: Vec<_> = tracks.into_iter().map(Vec::into_iter).collect();
    let mut frames = Vec::with_capacity(times.len());
    let mut states = Vec::with_capacity(times.len() * inputs.series.len());

    for (&time_ms, &events) in times.iter().zip(event_spans.iter()) {
        let mut frame_states: Vec<CompetitorState> =
            track_iters.iter_mut().filter_map(Iterator::next).collect();
        frame_states.sort_by_key(|state| {
            let position = if state.retired { 0 } else { state.position };
            (state.retired, position)
        });

        let start = states.len();
        states.extend(frame_states);
        frames.push(Frame {
            time_ms,
            states: Span {
                start,
                len: states.len() - start,
            },
            events,
        });
    }

    debug!(
        "Sampled {} competitors at {} points in time",
        inputs.series.len(),
        frames.len()
    );

    SampledFrames {
        total_duration_ms,
        frames,
        states,
    }
}

/// compress thins the frame sequence to roughly target_frames by keeping every n-th frame. The
/// first and last frame and every frame whose time equals an event time are always kept. Events
/// of dropped frames move to the preceding kept frame. A target at or above the current frame
/// count returns the timeline unchanged.
pub fn compress(timeline: &Timeline, target_frames: usize) -> Timeline {
    let no_frames = timeline.frames.len();
    if target_frames >= no_frames || no_frames <= 2 {
        return timeline.clone();
    }

    let stride = ((no_frames - 1) as f64 / (target_frames.max(2) - 1) as f64).ceil() as usize;
    let stride = stride.max(1);

    let kept: Vec<usize> = (0..no_frames)
        .filter(|&i| {
            let t = timeline.frames[i].time_ms;
            i % stride == 0
                || i == no_frames - 1
                || !events_in_window(&timeline.events, t, t).is_empty()
        })
        .collect();

    let mut frames = Vec::with_capacity(kept.len());
    let mut states = Vec::with_capacity(kept.len() * timeline.roster.len());

    for (j, &i) in kept.iter().enumerate() {
        let frame = &timeline.frames[i];
        let events_end = match kept.get(j + 1) {
            Some(&i_next) => timeline.frames[i_next].events.start,
            None => timeline.events.len(),
        };

        let start = states.len();
        states.extend_from_slice(&timeline.states[frame.states.range()]);
        frames.push(Frame {
            time_ms: frame.time_ms,
            states: Span {
                start,
                len: frame.states.len,
            },
            events: Span {
                start: frame.events.start,
                len: events_end - frame.events.start,
            },
        });
    }

    info!(
        "Compressed timeline from {} to {} frames (target {})",
        no_frames,
        frames.len(),
        target_frames
    );

    Timeline {
        metadata: timeline.metadata.clone(),
        roster: timeline.roster.clone(),
        total_duration_ms: timeline.total_duration_ms,
        sampling_interval_ms: timeline.sampling_interval_ms,
        frames,
        states,
        events: timeline.events.clone(),
    }
}
