use crate::core::error::{ParseTimeError, TimelineError};
use crate::pre::race_data::{RawLap, RawPitStop};
use helpers::general::mean;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;

/// Bounds of the pace factor.
pub const PACE_FACTOR_MIN: f64 = 0.5;
pub const PACE_FACTOR_MAX: f64 = 1.5;

/// LapSample is one competitor's timing on one lap, with the lap time already in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LapSample {
    pub competitor_id: String,
    pub lap_number: u32,
    pub position: u32,
    pub raw_time_text: String,
    pub time_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PitStopSample {
    pub competitor_id: String,
    pub lap_number: u32,
    pub stop_sequence: u32,
    pub duration_ms: Option<u64>,
}

/// * `lap_number` - Lap number, contiguous starting at 1
/// * `position` - Race position at the end of the lap
/// * `lap_time_ms` - (ms) Lap time, always > 0
/// * `cumulative_time_ms` - (ms) Race time at the end of the lap
/// * `pace_factor` - Race average lap time divided by this lap time, in [0.5, 1.5]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LapEntry {
    pub lap_number: u32,
    pub position: u32,
    pub lap_time_ms: u64,
    pub cumulative_time_ms: u64,
    pub pace_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorLapSeries {
    pub competitor_id: String,
    pub laps: Vec<LapEntry>,
}

impl CompetitorLapSeries {
    /// final_cumulative_ms returns the race time at the end of the last recorded lap (0 without
    /// laps).
    pub fn final_cumulative_ms(&self) -> u64 {
        self.laps.last().map_or(0, |lap| lap.cumulative_time_ms)
    }

    /// lap returns the entry of the given lap number.
    pub fn lap(&self, lap_number: u32) -> Option<&LapEntry> {
        if lap_number == 0 {
            return None;
        }
        self.laps.get(lap_number as usize - 1)
    }

    /// locate returns the index of the first lap whose cumulative time is >= t_ms, or None if
    /// t_ms lies after the last recorded lap.
    pub fn locate(&self, t_ms: f64) -> Option<usize> {
        let idx = self
            .laps
            .partition_point(|lap| (lap.cumulative_time_ms as f64) < t_ms);

        if idx < self.laps.len() {
            Some(idx)
        } else {
            None
        }
    }
}

// -------------------------------------------------------------------------------------------------
// TIME PARSING ------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

fn parse_digits(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// parse_time converts "M:SS.mmm" or "SS.mmm" into milliseconds. One to three fractional digits
/// are accepted ("1:23.4" is 83400 ms), seconds must stay below 60 when minutes are given.
pub fn parse_time(text: &str) -> Result<u64, ParseTimeError> {
    let err = || ParseTimeError::new(text);
    let trimmed = text.trim();

    let (minutes, rest) = match trimmed.split_once(':') {
        Some((m, rest)) => (Some(parse_digits(m).ok_or_else(err)?), rest),
        None => (None, trimmed),
    };

    let (secs, frac) = rest.split_once('.').ok_or_else(err)?;
    if secs.len() > 2 || frac.len() > 3 {
        return Err(err());
    }
    let secs = parse_digits(secs).ok_or_else(err)?;
    let frac_val = parse_digits(frac).ok_or_else(err)?;
    let millis = frac_val * 10u64.pow(3 - frac.len() as u32);

    if minutes.is_some() && secs >= 60 {
        return Err(err());
    }

    minutes
        .unwrap_or(0)
        .checked_mul(60_000)
        .and_then(|ms| ms.checked_add(secs * 1000 + millis))
        .ok_or_else(err)
}

/// samples_from_laps flattens provider lap records into lap samples. The first unparsable time
/// aborts the conversion.
pub fn samples_from_laps(laps: &[RawLap]) -> Result<Vec<LapSample>, TimelineError> {
    let mut samples = Vec::with_capacity(laps.iter().map(|lap| lap.timings.len()).sum());

    for lap in laps.iter() {
        for timing in lap.timings.iter() {
            let time_ms = parse_time(&timing.time).map_err(|source| TimelineError::Format {
                competitor_id: timing.competitor_id.to_owned(),
                lap_number: lap.number,
                source,
            })?;

            samples.push(LapSample {
                competitor_id: timing.competitor_id.to_owned(),
                lap_number: lap.number,
                position: timing.position,
                raw_time_text: timing.time.to_owned(),
                time_ms,
            });
        }
    }

    Ok(samples)
}

/// pit_samples_from_raw converts provider pit stop records. A pit stop duration is payload only,
/// so an unparsable one is logged and left empty instead of failing the build.
pub fn pit_samples_from_raw(pit_stops: &[RawPitStop]) -> Vec<PitStopSample> {
    pit_stops
        .iter()
        .map(|stop| {
            let duration_ms = match parse_time(&stop.duration) {
                Ok(ms) => Some(ms),
                Err(e) => {
                    warn!(
                        "Ignoring pit stop duration of {} on lap {}: {}",
                        stop.competitor_id, stop.lap, e
                    );
                    None
                }
            };

            PitStopSample {
                competitor_id: stop.competitor_id.to_owned(),
                lap_number: stop.lap,
                stop_sequence: stop.stop,
                duration_ms,
            }
        })
        .collect()
}

// -------------------------------------------------------------------------------------------------
// SERIES ------------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------

/// build_series builds the lap series of every competitor in competitor_ids (output keeps that
/// order).
///
/// Laps are walked in lap number order and must be contiguous from lap 1: duplicates are skipped
/// and the series ends before the first gap. A lap time of 0 ms would break the strictly
/// increasing cumulative time, it is replaced by the race average lap time (1 ms if no lap has a
/// positive time at all). Competitors without laps get an empty series.
pub fn build_series(samples: &[LapSample], competitor_ids: &[String]) -> Vec<CompetitorLapSeries> {
    let mut samples_per_competitor: HashMap<&str, Vec<&LapSample>> =
        competitor_ids.iter().map(|id| (id.as_str(), Vec::new())).collect();

    let mut no_unknown = 0;
    for sample in samples.iter() {
        match samples_per_competitor.get_mut(sample.competitor_id.as_str()) {
            Some(list) => list.push(sample),
            None => no_unknown += 1,
        }
    }
    if no_unknown > 0 {
        debug!("Ignored {} lap samples of unknown competitors", no_unknown);
    }

    let valid_times: Vec<f64> = samples_per_competitor
        .values()
        .flatten()
        .filter(|sample| sample.time_ms > 0)
        .map(|sample| sample.time_ms as f64)
        .collect();
    let avg_laptime = mean(&valid_times);
    let substitute_ms = avg_laptime.map_or(1, |avg| (avg.round() as u64).max(1));

    competitor_ids
        .iter()
        .map(|id| {
            let mut competitor_samples = samples_per_competitor
                .remove(id.as_str())
                .unwrap_or_default();
            competitor_samples.sort_by_key(|sample| sample.lap_number);

            CompetitorLapSeries {
                competitor_id: id.to_owned(),
                laps: accumulate_laps(id, &competitor_samples, avg_laptime, substitute_ms),
            }
        })
        .collect()
}

fn accumulate_laps(
    competitor_id: &str,
    samples: &[&LapSample],
    avg_laptime: Option<f64>,
    substitute_ms: u64,
) -> Vec<LapEntry> {
    let mut laps: Vec<LapEntry> = Vec::with_capacity(samples.len());
    let mut cumulative_time_ms = 0;

    for sample in samples.iter() {
        let expected_lap = laps.len() as u32 + 1;

        if sample.lap_number < expected_lap {
            warn!(
                "Skipping duplicate lap {} of {}",
                sample.lap_number, competitor_id
            );
            continue;
        }
        if sample.lap_number > expected_lap {
            warn!(
                "Lap series of {} is not contiguous (lap {} follows lap {}), ignoring the rest",
                competitor_id,
                sample.lap_number,
                expected_lap - 1
            );
            break;
        }

        let lap_time_ms = if sample.time_ms > 0 {
            sample.time_ms
        } else {
            warn!(
                "Lap {} of {} has no duration, using {}ms",
                sample.lap_number, competitor_id, substitute_ms
            );
            substitute_ms
        };
        cumulative_time_ms += lap_time_ms;

        let pace_factor = avg_laptime
            .map_or(1.0, |avg| avg / lap_time_ms as f64)
            .clamp(PACE_FACTOR_MIN, PACE_FACTOR_MAX);

        laps.push(LapEntry {
            lap_number: sample.lap_number,
            position: sample.position,
            lap_time_ms,
            cumulative_time_ms,
            pace_factor,
        });
    }

    laps
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample(id: &str, lap: u32, position: u32, time_ms: u64) -> LapSample {
        LapSample {
            competitor_id: id.to_owned(),
            lap_number: lap,
            position,
            raw_time_text: String::new(),
            time_ms,
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("1:23.456"), Ok(83456));
        assert_eq!(parse_time("23.456"), Ok(23456));
        assert_eq!(parse_time("0:59.999"), Ok(59999));
        assert_eq!(parse_time(" 16:44.214 "), Ok(1_004_214));
        assert_eq!(parse_time("1:23.4"), Ok(83400));
    }

    #[test]
    fn test_parse_time_rejects_other_shapes() {
        for text in ["bad", "", "1:23", "1:2a.456", "1:60.000", "-1:23.456", "1:23.4567", "1:2:3.4"] {
            assert_eq!(parse_time(text), Err(ParseTimeError::new(text)), "{:?}", text);
        }
    }

    #[test]
    fn test_samples_from_laps_aborts_on_bad_time() {
        let laps: Vec<RawLap> = serde_json::from_str(
            r#"[{"number": 1, "timings": [
                    {"competitor_id": "a", "position": 1, "time": "1:20.000"}]},
                {"number": 2, "timings": [
                    {"competitor_id": "a", "position": 1, "time": "oops"}]}]"#,
        )
        .unwrap();

        match samples_from_laps(&laps) {
            Err(TimelineError::Format {
                competitor_id,
                lap_number,
                source,
            }) => {
                assert_eq!(competitor_id, "a");
                assert_eq!(lap_number, 2);
                assert_eq!(source.text, "oops");
            }
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_pit_samples_tolerate_bad_duration() {
        let stops: Vec<RawPitStop> = serde_json::from_str(
            r#"[{"competitor_id": "a", "lap": 3, "stop": 1, "duration": "22.500"},
                {"competitor_id": "b", "lap": 4, "stop": 1, "duration": "n/a"}]"#,
        )
        .unwrap();

        let samples = pit_samples_from_raw(&stops);
        assert_eq!(samples[0].duration_ms, Some(22500));
        assert_eq!(samples[1].duration_ms, None);
        assert_eq!(samples[1].lap_number, 4);
    }

    #[test]
    fn test_cumulative_strictly_increasing() {
        let samples = vec![
            sample("a", 2, 1, 81000),
            sample("a", 1, 1, 90000),
            sample("b", 1, 2, 91000),
            sample("a", 3, 1, 0),
            sample("b", 2, 2, 82000),
        ];
        let series = build_series(&samples, &ids(&["a", "b"]));

        assert_eq!(series[0].laps.len(), 3);
        assert_eq!(series[0].laps[0].cumulative_time_ms, 90000);
        assert_eq!(series[0].laps[1].cumulative_time_ms, 171000);
        for s in series.iter() {
            for pair in s.laps.windows(2) {
                assert!(pair[1].cumulative_time_ms > pair[0].cumulative_time_ms);
            }
            for (i, lap) in s.laps.iter().enumerate() {
                assert_eq!(lap.lap_number, i as u32 + 1);
            }
        }
        // zero-length lap replaced with the average of the positive ones
        assert_eq!(series[0].laps[2].lap_time_ms, 86000);
    }

    #[test]
    fn test_pace_factor_bounded() {
        let samples = vec![
            sample("a", 1, 1, 120000),
            sample("a", 2, 1, 400000),
            sample("a", 3, 1, 20000),
            sample("a", 4, 1, 140000),
        ];
        let series = build_series(&samples, &ids(&["a"]));

        for lap in series[0].laps.iter() {
            assert!(lap.pace_factor >= PACE_FACTOR_MIN && lap.pace_factor <= PACE_FACTOR_MAX);
        }
        assert_abs_diff_eq!(series[0].laps[1].pace_factor, PACE_FACTOR_MIN);
        assert_abs_diff_eq!(series[0].laps[2].pace_factor, PACE_FACTOR_MAX);
        assert_abs_diff_eq!(series[0].laps[0].pace_factor, 170000.0 / 120000.0, epsilon = 1e-12);
        assert_abs_diff_eq!(series[0].laps[3].pace_factor, 170000.0 / 140000.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gaps_and_duplicates() {
        let samples = vec![
            sample("a", 1, 1, 80000),
            sample("a", 1, 1, 70000),
            sample("a", 2, 1, 80000),
            sample("a", 4, 1, 80000),
        ];
        let series = build_series(&samples, &ids(&["a"]));

        assert_eq!(series[0].laps.len(), 2);
        assert_eq!(series[0].final_cumulative_ms(), 160000);
    }

    #[test]
    fn test_sparse_competitors() {
        let samples = vec![sample("a", 1, 1, 80000), sample("ghost", 1, 2, 80000)];
        let series = build_series(&samples, &ids(&["a", "b"]));

        assert_eq!(series.len(), 2);
        assert_eq!(series[1].competitor_id, "b");
        assert!(series[1].laps.is_empty());
        assert_eq!(series[1].final_cumulative_ms(), 0);
        assert_eq!(series[1].locate(0.0), None);
    }

    #[test]
    fn test_deterministic() {
        let samples = vec![
            sample("a", 1, 2, 81234),
            sample("b", 1, 1, 80000),
            sample("b", 2, 1, 79000),
        ];
        let all = ids(&["b", "a"]);
        assert_eq!(build_series(&samples, &all), build_series(&samples, &all));
    }

    #[test]
    fn test_locate() {
        let samples = vec![sample("a", 1, 1, 1000), sample("a", 2, 1, 1000)];
        let series = build_series(&samples, &ids(&["a"]));

        assert_eq!(series[0].locate(0.0), Some(0));
        assert_eq!(series[0].locate(1000.0), Some(0));
        assert_eq!(series[0].locate(1000.5), Some(1));
        assert_eq!(series[0].locate(2000.0), Some(1));
        assert_eq!(series[0].locate(2000.1), None);
        assert_eq!(series[0].lap(2).map(|lap| lap.cumulative_time_ms), Some(2000));
        assert_eq!(series[0].lap(0), None);
    }
}
