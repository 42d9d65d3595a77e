use crate::core::lap_times::{parse_time, CompetitorLapSeries, PitStopSample};
use crate::pre::race_data::{RawFastestLap, RawResult};
use log::{debug, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Event categories in their tie-break order: events at the same race time are ordered
/// lapComplete, pitStop, overtake, retirement, fastestLap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    LapComplete,
    PitStop,
    Overtake,
    Retirement,
    FastestLap,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::LapComplete,
        EventKind::PitStop,
        EventKind::Overtake,
        EventKind::Retirement,
        EventKind::FastestLap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LapComplete => "lapComplete",
            EventKind::PitStop => "pitStop",
            EventKind::Overtake => "overtake",
            EventKind::Retirement => "retirement",
            EventKind::FastestLap => "fastestLap",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    /// Accepts the camelCase names as well as snake_case/kebab-case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().to_lowercase() == normalized)
            .ok_or_else(|| format!("unknown event type {:?}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    LapComplete { position: u32, lap_time_ms: u64 },
    #[serde(rename_all = "camelCase")]
    PitStop {
        stop_sequence: u32,
        duration_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Overtake {
        overtaken_id: Option<String>,
        from_position: u32,
        to_position: u32,
    },
    #[serde(rename_all = "camelCase")]
    Retirement { status: String },
    #[serde(rename_all = "camelCase")]
    FastestLap {
        lap_time_ms: u64,
        average_speed_kph: Option<f64>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::LapComplete { .. } => EventKind::LapComplete,
            EventPayload::PitStop { .. } => EventKind::PitStop,
            EventPayload::Overtake { .. } => EventKind::Overtake,
            EventPayload::Retirement { .. } => EventKind::Retirement,
            EventPayload::FastestLap { .. } => EventKind::FastestLap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceEvent {
    pub lap_number: u32,
    pub time_ms: f64,
    pub competitor_id: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl RaceEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Competitor id -> lap numbers on which the competitor pitted.
pub type PitLapIndex = HashMap<String, HashSet<u32>>;

// -------------------------------------------------------------------------------------------------
// DETECTION ---------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

/// detect_lap_completions emits one event per (competitor, lap) at the end of the lap.
pub fn detect_lap_completions(series: &[CompetitorLapSeries]) -> Vec<RaceEvent> {
    series
        .iter()
        .flat_map(|s| {
            s.laps.iter().map(move |lap| RaceEvent {
                lap_number: lap.lap_number,
                time_ms: lap.cumulative_time_ms as f64,
                competitor_id: s.competitor_id.to_owned(),
                payload: EventPayload::LapComplete {
                    position: lap.position,
                    lap_time_ms: lap.lap_time_ms,
                },
            })
        })
        .collect()
}

/// detect_pit_stops places each stop 90% into the pitted lap so that it shows up before the lap
/// completes. Stops on laps without lap data are dropped.
pub fn detect_pit_stops(
    series: &[CompetitorLapSeries],
    pit_stops: &[PitStopSample],
) -> Vec<RaceEvent> {
    let series_by_id: HashMap<&str, &CompetitorLapSeries> = series
        .iter()
        .map(|s| (s.competitor_id.as_str(), s))
        .collect();

    pit_stops
        .iter()
        .filter_map(|stop| {
            let lap = series_by_id
                .get(stop.competitor_id.as_str())
                .and_then(|s| s.lap(stop.lap_number));

            let lap = match lap {
                Some(lap) => lap,
                None => {
                    debug!(
                        "Pit stop of {} on lap {} has no lap data, skipping",
                        stop.competitor_id, stop.lap_number
                    );
                    return None;
                }
            };

            Some(RaceEvent {
                lap_number: stop.lap_number,
                time_ms: lap.cumulative_time_ms as f64 - 0.1 * lap.lap_time_ms as f64,
                competitor_id: stop.competitor_id.to_owned(),
                payload: EventPayload::PitStop {
                    stop_sequence: stop.stop_sequence,
                    duration_ms: stop.duration_ms,
                },
            })
        })
        .collect()
}

/// detect_overtakes compares each competitor's position at lap N with lap N-1. An improvement
/// is an overtake of whoever held the new position on lap N-1, placed at the middle of lap N.
/// Lap 1 has no previous state and therefore never produces overtakes.
pub fn detect_overtakes(series: &[CompetitorLapSeries]) -> Vec<RaceEvent> {
    // (lap number, position) -> holder
    let mut holders: HashMap<(u32, u32), &str> = HashMap::new();
    for s in series.iter() {
        for lap in s.laps.iter() {
            holders
                .entry((lap.lap_number, lap.position))
                .or_insert(s.competitor_id.as_str());
        }
    }

    let mut events = Vec::new();

    for s in series.iter() {
        for pair in s.laps.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);

            if cur.position >= prev.position {
                continue;
            }

            let overtaken_id = holders
                .get(&(prev.lap_number, cur.position))
                .filter(|&&holder| holder != s.competitor_id)
                .map(|holder| holder.to_string());

            events.push(RaceEvent {
                lap_number: cur.lap_number,
                time_ms: cur.cumulative_time_ms as f64 - 0.5 * cur.lap_time_ms as f64,
                competitor_id: s.competitor_id.to_owned(),
                payload: EventPayload::Overtake {
                    overtaken_id,
                    from_position: prev.position,
                    to_position: cur.position,
                },
            });
        }
    }

    events
}

/// is_classified_finish returns true for "Finished" and lapped finishes such as "+1 Lap" or
/// "+3 Laps".
pub fn is_classified_finish(status: &str) -> bool {
    let status = status.trim();
    if status == "Finished" {
        return true;
    }

    let lapped = match status.strip_prefix('+') {
        Some(rest) => rest,
        None => return false,
    };
    let mut parts = lapped.split_whitespace();

    match (parts.next(), parts.next(), parts.next()) {
        (Some(no_laps), Some(unit), None) => {
            !no_laps.is_empty()
                && no_laps.bytes().all(|b| b.is_ascii_digit())
                && (unit == "Lap" || unit == "Laps")
        }
        _ => false,
    }
}

/// retirement_laps maps every competitor that did not finish to the last lap it recorded (0 if it
/// never completed a lap).
pub fn retirement_laps(
    series: &[CompetitorLapSeries],
    results: &[RawResult],
) -> HashMap<String, u32> {
    results
        .iter()
        .filter(|result| !is_classified_finish(&result.status))
        .map(|result| {
            let last_lap = series
                .iter()
                .find(|s| s.competitor_id == result.competitor_id)
                .and_then(|s| s.laps.last())
                .map_or(0, |lap| lap.lap_number);
            (result.competitor_id.to_owned(), last_lap)
        })
        .collect()
}

/// detect_retirements emits one event per competitor that did not finish, at the end of its final
/// recorded lap.
pub fn detect_retirements(series: &[CompetitorLapSeries], results: &[RawResult]) -> Vec<RaceEvent> {
    results
        .iter()
        .filter(|result| !is_classified_finish(&result.status))
        .map(|result| {
            let last_lap = series
                .iter()
                .find(|s| s.competitor_id == result.competitor_id)
                .and_then(|s| s.laps.last());

            RaceEvent {
                lap_number: last_lap.map_or(0, |lap| lap.lap_number),
                time_ms: last_lap.map_or(0.0, |lap| lap.cumulative_time_ms as f64),
                competitor_id: result.competitor_id.to_owned(),
                payload: EventPayload::Retirement {
                    status: result.status.trim().to_owned(),
                },
            }
        })
        .collect()
}

/// fastest_lap_holder returns the result entry holding fastest lap rank 1 together with its
/// fastest lap record.
pub fn fastest_lap_holder(results: &[RawResult]) -> Option<(&RawResult, &RawFastestLap)> {
    results.iter().find_map(|result| {
        result
            .fastest_lap
            .as_ref()
            .filter(|fastest_lap| fastest_lap.rank == 1)
            .map(|fastest_lap| (result, fastest_lap))
    })
}

/// detect_fastest_lap emits the fastest lap event at the end of that lap, or nothing if the
/// results carry no rank 1 fastest lap.
pub fn detect_fastest_lap(
    series: &[CompetitorLapSeries],
    results: &[RawResult],
) -> Option<RaceEvent> {
    let (result, fastest_lap) = fastest_lap_holder(results)?;

    let lap = series
        .iter()
        .find(|s| s.competitor_id == result.competitor_id)
        .and_then(|s| s.lap(fastest_lap.lap));

    let lap = match lap {
        Some(lap) => lap,
        None => {
            warn!(
                "Fastest lap of {} on lap {} has no lap data, skipping",
                result.competitor_id, fastest_lap.lap
            );
            return None;
        }
    };

    let lap_time_ms = parse_time(&fastest_lap.time).unwrap_or(lap.lap_time_ms);

    Some(RaceEvent {
        lap_number: fastest_lap.lap,
        time_ms: lap.cumulative_time_ms as f64,
        competitor_id: result.competitor_id.to_owned(),
        payload: EventPayload::FastestLap {
            lap_time_ms,
            average_speed_kph: fastest_lap.average_speed_kph,
        },
    })
}

/// pit_lap_index collects the pitted laps of every competitor.
pub fn pit_lap_index(pit_stops: &[PitStopSample]) -> PitLapIndex {
    let mut index = PitLapIndex::new();
    for stop in pit_stops.iter() {
        index
            .entry(stop.competitor_id.to_owned())
            .or_default()
            .insert(stop.lap_number);
    }
    index
}

/// sort_events sorts by race time; equal times fall back to the category order and otherwise keep
/// their input order.
pub fn sort_events(events: &mut [RaceEvent]) {
    events.sort_by(|a, b| {
        a.time_ms
            .total_cmp(&b.time_ms)
            .then_with(|| a.kind().cmp(&b.kind()))
    });
}

/// build_event_log derives all events and returns them sorted by race time.
pub fn build_event_log(
    series: &[CompetitorLapSeries],
    pit_stops: &[PitStopSample],
    results: &[RawResult],
) -> Vec<RaceEvent> {
    let mut events = detect_lap_completions(series);
    events.extend(detect_pit_stops(series, pit_stops));
    events.extend(detect_overtakes(series));
    events.extend(detect_retirements(series, results));
    events.extend(detect_fastest_lap(series, results));

    sort_events(&mut events);
    events
}

// -------------------------------------------------------------------------------------------------
// FILTERING ---------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

/// EventFilter selects events by race time window (inclusive bounds) and kind. Unset fields match
/// everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub from_ms: Option<f64>,
    pub to_ms: Option<f64>,
    pub kinds: Option<Vec<EventKind>>,
}

impl EventFilter {
    pub fn matches(&self, event: &RaceEvent) -> bool {
        self.from_ms.map_or(true, |from| event.time_ms >= from)
            && self.to_ms.map_or(true, |to| event.time_ms <= to)
            && self
                .kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&event.kind()))
    }
}

pub fn filter_events<'a>(
    events: &'a [RaceEvent],
    filter: &'a EventFilter,
) -> impl Iterator<Item = &'a RaceEvent> + 'a {
    events.iter().filter(move |event| filter.matches(event))
}

/// events_in_window returns the slice of a sorted event log with from_ms <= time_ms <= to_ms.
pub fn events_in_window(events: &[RaceEvent], from_ms: f64, to_ms: f64) -> &[RaceEvent] {
    let start = events.partition_point(|event| event.time_ms < from_ms);
    let end = events.partition_point(|event| event.time_ms <= to_ms);

    if start < end {
        &events[start..end]
    } else {
        &[]
    }
}
