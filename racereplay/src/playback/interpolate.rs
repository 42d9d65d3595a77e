//! Sub-frame interpolation of competitor states.
//!
//! Only `progress_pct` is interpolated. Every other field (lap number, position, flags, gap)
//! switches from the floor frame to the next frame once the local fraction passes 0.5, so the
//! position label changes abruptly while the marker glides.

use crate::core::timeline::{CompetitorState, Timeline};
use helpers::general::lerp;
use std::collections::HashMap;

/// local_t returns the position of virtual_clock_ms between two frame times, clamped to [0, 1].
pub fn local_t(floor_ms: f64, next_ms: f64, virtual_clock_ms: f64) -> f64 {
    let span = next_ms - floor_ms;
    if span <= 0.0 {
        return 0.0;
    }
    ((virtual_clock_ms - floor_ms) / span).clamp(0.0, 1.0)
}

/// interpolate_progress interpolates the lap progress. A lap change with decreasing progress
/// passes through the 100 -> 0 wrap instead of running backwards.
pub fn interpolate_progress(floor: &CompetitorState, next: &CompetitorState, t_local: f64) -> f64 {
    if next.lap_number > floor.lap_number && next.progress_pct < floor.progress_pct {
        let progress = lerp(floor.progress_pct, next.progress_pct + 100.0, t_local);
        if progress > 100.0 {
            progress - 100.0
        } else {
            progress
        }
    } else {
        lerp(floor.progress_pct, next.progress_pct, t_local)
    }
}

/// interpolate_states blends two consecutive frames. Competitors missing from the next frame keep
/// their floor state. The result is ordered like a frame: running competitors by position, then
/// retired ones.
pub fn interpolate_states(
    floor: &[CompetitorState],
    next: &[CompetitorState],
    t_local: f64,
) -> Vec<CompetitorState> {
    let next_by_id: HashMap<&str, &CompetitorState> = next
        .iter()
        .map(|state| (state.competitor_id.as_str(), state))
        .collect();

    let mut states: Vec<CompetitorState> = floor
        .iter()
        .map(|floor_state| match next_by_id.get(floor_state.competitor_id.as_str()) {
            Some(&next_state) => {
                let discrete = if t_local > 0.5 { next_state } else { floor_state };
                CompetitorState {
                    progress_pct: interpolate_progress(floor_state, next_state, t_local),
                    ..discrete.clone()
                }
            }
            None => floor_state.clone(),
        })
        .collect();

    // positions switch with t_local, the order has to follow them
    states.sort_by_key(|state| {
        let position = if state.retired { 0 } else { state.position };
        (state.retired, position)
    });
    states
}

/// interpolate returns the competitor states of the timeline at virtual_clock_ms.
pub fn interpolate(timeline: &Timeline, virtual_clock_ms: f64) -> Vec<CompetitorState> {
    let floor_idx = timeline.floor_frame_index(virtual_clock_ms);

    let floor = match timeline.frame(floor_idx) {
        Some(frame) => frame,
        None => return Vec::new(),
    };
    let next = match timeline.frame(floor_idx + 1) {
        Some(frame) => frame,
        None => return floor.states.to_vec(),
    };

    let t_local = local_t(floor.time_ms, next.time_ms, virtual_clock_ms);
    interpolate_states(floor.states, next.states, t_local)
}
