use crate::core::error::TimelineError;
use crate::core::events::{build_event_log, fastest_lap_holder, pit_lap_index, retirement_laps};
use crate::core::frames::{compress, generate_frames, FrameInputs};
use crate::core::lap_times::{build_series, pit_samples_from_raw, samples_from_laps};
use crate::core::timeline::{build_roster, Timeline, TimelineConfig};
use crate::pre::race_data::RaceData;
use log::info;
use std::time::Instant;

/// handle_timeline builds the replay timeline of a race: lap series, event log, sampled frames and
/// roster. A race without any positive lap time is reported as missing data.
pub fn handle_timeline(data: &RaceData, config: &TimelineConfig) -> Result<Timeline, TimelineError> {
    config.validate()?;
    let t_start = Instant::now();

    // NORMALIZATION -------------------------------------------------------------------------------
    let samples = samples_from_laps(&data.laps)?;
    if !samples.iter().any(|sample| sample.time_ms > 0) {
        return Err(TimelineError::MissingData {
            race: data.race_label(),
        });
    }

    let competitor_ids = data.competitor_ids();
    let series = build_series(&samples, &competitor_ids);
    let pit_stops = pit_samples_from_raw(&data.pit_stops);

    // EVENTS --------------------------------------------------------------------------------------
    let events = build_event_log(&series, &pit_stops, &data.results);
    let pit_laps = pit_lap_index(&pit_stops);
    let retirement_laps = retirement_laps(&series, &data.results);
    let fastest_lap_id = fastest_lap_holder(&data.results).map(|(result, _)| result.competitor_id.as_str());

    // FRAMES --------------------------------------------------------------------------------------
    let sampled = generate_frames(&FrameInputs {
        series: &series,
        events: &events,
        pit_laps: &pit_laps,
        retirement_laps: &retirement_laps,
        fastest_lap_id,
        sampling_interval_ms: config.sampling_interval_ms,
    });

    let timeline = Timeline {
        metadata: data.metadata.clone(),
        roster: build_roster(data, &competitor_ids),
        total_duration_ms: sampled.total_duration_ms,
        sampling_interval_ms: config.sampling_interval_ms,
        frames: sampled.frames,
        states: sampled.states,
        events,
    };

    info!(
        "Built timeline of {}: {} competitors, {} laps, {} frames, {} events ({:.1}s race time) in {}ms",
        data.race_label(),
        competitor_ids.len(),
        data.laps.len(),
        timeline.frame_count(),
        timeline.events().len(),
        timeline.total_duration_ms() as f64 / 1000.0,
        t_start.elapsed().as_millis()
    );

    Ok(match config.target_frames {
        Some(target_frames) => compress(&timeline, target_frames),
        None => timeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventKind;

    fn race_data(json: &str) -> RaceData {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_missing_lap_data() {
        let data = race_data(r#"{"metadata": {"season": 2021, "round": 3, "raceName": "Test GP"}}"#);
        let err = handle_timeline(&data, &TimelineConfig::default()).unwrap_err();
        assert!(matches!(err, TimelineError::MissingData { .. }));
    }

    #[test]
    fn test_invalid_config() {
        let data = race_data(r#"{}"#);
        let config = TimelineConfig {
            sampling_interval_ms: 0,
            target_frames: None,
        };
        assert!(matches!(
            handle_timeline(&data, &config),
            Err(TimelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bad_lap_time_aborts() {
        let data = race_data(
            r#"{"laps": [{"number": 1, "timings": [
                {"competitor_id": "a", "position": 1, "time": "1:20.000"},
                {"competitor_id": "b", "position": 2, "time": "1:2x.000"}]}]}"#,
        );
        match handle_timeline(&data, &TimelineConfig::default()) {
            Err(TimelineError::Format {
                competitor_id,
                lap_number,
                ..
            }) => {
                assert_eq!(competitor_id, "b");
                assert_eq!(lap_number, 1);
            }
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn test_sparse_race() {
        // b never completes a lap and retires, there are no pit stops and no fastest lap
        let data = race_data(
            r#"{
                "laps": [{"number": 1, "timings": [{"competitor_id": "a", "position": 1, "time": "4.000"}]}],
                "results": [{"competitor_id": "a", "grid": 1, "status": "Finished"},
                            {"competitor_id": "b", "grid": 2, "status": "Collision"}]
            }"#,
        );

        let timeline = handle_timeline(&data, &TimelineConfig::default()).unwrap();
        assert_eq!(timeline.total_duration_ms(), 4000);
        assert_eq!(timeline.frame_count(), 9);
        assert_eq!(timeline.roster().len(), 2);

        let kinds: Vec<EventKind> = timeline.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::Retirement, EventKind::LapComplete]);

        let last = timeline.frame(timeline.frame_count() - 1).unwrap();
        let b = last.state_of("b").unwrap();
        assert!(b.retired);
        assert_eq!(b.lap_number, 0);
        assert_eq!(last.states[1].competitor_id, "b");
    }

    #[test]
    fn test_compression_applied() {
        let data = race_data(
            r#"{"laps": [{"number": 1, "timings": [{"competitor_id": "a", "position": 1, "time": "10.000"}]}]}"#,
        );
        let config = TimelineConfig {
            sampling_interval_ms: 500,
            target_frames: Some(6),
        };

        let timeline = handle_timeline(&data, &config).unwrap();
        let times: Vec<f64> = timeline.frames().map(|frame| frame.time_ms).collect();
        assert_eq!(times, vec![0.0, 2000.0, 4000.0, 6000.0, 8000.0, 10000.0]);
        assert_eq!(timeline.events().len(), 1);
        assert_eq!(timeline.frame(5).unwrap().events.len(), 1);
    }
}
