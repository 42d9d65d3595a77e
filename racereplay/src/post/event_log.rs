use crate::core::events::{EventPayload, RaceEvent};
use crate::core::timeline::{CompetitorInfo, CompetitorState, Timeline};
use anyhow::Context;
use std::fmt::Write;
use std::io::Write as IoWrite;
use std::path::Path;

/// format_race_time formats race milliseconds as H:MM:SS.mmm (hours only if needed).
pub fn format_race_time(time_ms: f64) -> String {
    let total_ms = time_ms.max(0.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = total_ms / 60_000 % 60;
    let seconds = total_ms / 1000 % 60;
    let millis = total_ms % 1000;

    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{}:{:02}.{:03}", minutes, seconds, millis)
    }
}

/// display_name returns the three letter code of a competitor if the roster has one.
fn display_name<'a>(roster: &'a [CompetitorInfo], competitor_id: &'a str) -> &'a str {
    roster
        .iter()
        .find(|info| info.competitor_id == competitor_id)
        .and_then(|info| info.code.as_deref())
        .unwrap_or(competitor_id)
}

/// format_event renders one event as a single console line.
pub fn format_event(event: &RaceEvent, roster: &[CompetitorInfo]) -> String {
    let name = display_name(roster, &event.competitor_id);

    let description = match &event.payload {
        EventPayload::LapComplete {
            position,
            lap_time_ms,
        } => format!(
            "{} completed lap {} in P{} ({})",
            name,
            event.lap_number,
            position,
            format_race_time(*lap_time_ms as f64)
        ),
        EventPayload::PitStop {
            stop_sequence,
            duration_ms,
        } => match duration_ms {
            Some(duration_ms) => format!(
                "{} pit stop #{} ({:.3}s)",
                name,
                stop_sequence,
                *duration_ms as f64 / 1000.0
            ),
            None => format!("{} pit stop #{}", name, stop_sequence),
        },
        EventPayload::Overtake {
            overtaken_id,
            from_position,
            to_position,
        } => match overtaken_id {
            Some(overtaken_id) => format!(
                "{} overtook {} (P{} -> P{})",
                name,
                display_name(roster, overtaken_id),
                from_position,
                to_position
            ),
            None => format!("{} gained P{} -> P{}", name, from_position, to_position),
        },
        EventPayload::Retirement { status } => format!("{} retired ({})", name, status),
        EventPayload::FastestLap {
            lap_time_ms,
            average_speed_kph,
        } => match average_speed_kph {
            Some(kph) => format!(
                "{} set the fastest lap: {} ({:.1} km/h)",
                name,
                format_race_time(*lap_time_ms as f64),
                kph
            ),
            None => format!(
                "{} set the fastest lap: {}",
                name,
                format_race_time(*lap_time_ms as f64)
            ),
        },
    };

    format!(
        "{:>12}  L{:<3} {:<12} {}",
        format_race_time(event.time_ms),
        event.lap_number,
        event.kind(),
        description
    )
}

/// format_event_log renders the events one per line below a header.
pub fn format_event_log<'a>(
    events: impl IntoIterator<Item = &'a RaceEvent>,
    roster: &[CompetitorInfo],
) -> anyhow::Result<String> {
    let mut content = String::new();
    writeln!(&mut content, "RESULT: Event log")?;
    for event in events {
        writeln!(&mut content, "{}", format_event(event, roster))?;
    }
    Ok(content)
}

/// print_event_log prints the event log to the console output.
pub fn print_event_log<'a>(
    events: impl IntoIterator<Item = &'a RaceEvent>,
    roster: &[CompetitorInfo],
) -> anyhow::Result<()> {
    print!("{}", format_event_log(events, roster)?);
    Ok(())
}

/// write_event_log_to_file writes the event log to a text file. Returns the number of events
/// written.
pub fn write_event_log_to_file<'a>(
    events: impl IntoIterator<Item = &'a RaceEvent>,
    roster: &[CompetitorInfo],
    path: &Path,
) -> anyhow::Result<usize> {
    let events: Vec<&RaceEvent> = events.into_iter().collect();
    let content = format_event_log(events.iter().copied(), roster)?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .context(format!("Failed to create event log file {}!", path.display()))?;
    file.write_all(content.as_bytes())?;
    file.flush()?;

    Ok(events.len())
}

/// write_timeline_json serializes the whole timeline into a JSON file.
pub fn write_timeline_json(timeline: &Timeline, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .context(format!("Failed to create timeline file {}!", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer(&mut writer, timeline).context("Failed to serialize timeline!")?;
    writer.flush()?;
    Ok(())
}

/// format_leaderboard renders the running order of a set of competitor states.
pub fn format_leaderboard(
    states: &[CompetitorState],
    roster: &[CompetitorInfo],
) -> anyhow::Result<String> {
    let mut content = String::new();
    for state in states.iter() {
        let name = display_name(roster, &state.competitor_id);
        let status = if state.retired {
            "OUT".to_owned()
        } else if state.in_pit {
            "PIT".to_owned()
        } else if state.position == 1 {
            "Leader".to_owned()
        } else {
            format!("+{:.3}s", state.gap_to_leader_ms as f64 / 1000.0)
        };
        let fastest = if state.has_fastest_lap { " *" } else { "" };

        writeln!(
            &mut content,
            "P{:<3} {:<12} L{:<3} {:5.1}%  {}{}",
            state.position, name, state.lap_number, state.progress_pct, status, fastest
        )?;
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handle_timeline::handle_timeline;
    use crate::core::timeline::TimelineConfig;
    use crate::pre::race_data::RaceData;
    use tempfile::tempdir;

    fn timeline() -> Timeline {
        let data: RaceData = serde_json::from_str(
            r##"{
                "metadata": {"season": 2021, "round": 1, "raceName": "Test GP"},
                "roster": [{"competitor_id": "hamilton", "code": "HAM", "color": "#00d2be"},
                           {"competitor_id": "verstappen", "code": "VER"}],
                "laps": [
                    {"number": 1, "timings": [
                        {"competitor_id": "hamilton", "position": 1, "time": "1:30.000"},
                        {"competitor_id": "verstappen", "position": 2, "time": "1:31.000"}]},
                    {"number": 2, "timings": [
                        {"competitor_id": "verstappen", "position": 1, "time": "1:28.000"},
                        {"competitor_id": "hamilton", "position": 2, "time": "1:30.000"}]}],
                "pit_stops": [{"competitor_id": "hamilton", "lap": 2, "stop": 1, "duration": "22.5"}],
                "results": [
                    {"competitor_id": "verstappen", "grid": 2, "status": "Finished",
                     "fastest_lap": {"rank": 1, "lap": 2, "time": "1:28.000", "average_speed_kph": 210.3}},
                    {"competitor_id": "hamilton", "grid": 1, "status": "Finished"}]
            }"##,
        )
        .unwrap();
        handle_timeline(&data, &TimelineConfig::default()).unwrap()
    }

    #[test]
    fn test_format_race_time() {
        assert_eq!(format_race_time(83456.0), "1:23.456");
        assert_eq!(format_race_time(5000.0), "0:05.000");
        assert_eq!(format_race_time(3_723_004.0), "1:02:03.004");
        assert_eq!(format_race_time(-5.0), "0:00.000");
    }

    #[test]
    fn test_format_events_use_roster_codes() {
        let timeline = timeline();
        let log = format_event_log(timeline.events(), timeline.roster()).unwrap();

        assert!(log.starts_with("RESULT: Event log\n"));
        assert!(log.contains("VER overtook HAM (P2 -> P1)"));
        assert!(log.contains("HAM pit stop #1 (22.500s)"));
        assert!(log.contains("VER set the fastest lap: 1:28.000 (210.3 km/h)"));
        assert_eq!(log.lines().count(), 1 + timeline.events().len());
    }

    #[test]
    fn test_write_event_log_to_file() {
        let timeline = timeline();
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.txt");

        let no_events = write_event_log_to_file(timeline.events(), timeline.roster(), &path).unwrap();
        assert_eq!(no_events, timeline.events().len());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), no_events + 1);
    }

    #[test]
    fn test_write_timeline_json() {
        let timeline = timeline();
        let dir = tempdir().unwrap();
        let path = dir.path().join("timeline.json");
        write_timeline_json(&timeline, &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["totalDurationMs"], 180000);
        assert_eq!(json["metadata"]["raceName"], "Test GP");
        assert_eq!(json["competitorRoster"][0]["code"], "HAM");
        assert_eq!(
            json["competitorRoster"][0]["color"],
            serde_json::json!({"r": 0, "g": 210, "b": 190})
        );
        assert_eq!(
            json["frames"].as_array().unwrap().len(),
            timeline.frame_count()
        );
        assert!(json["frames"][0]["competitorStates"][0]["progressPct"].is_number());
        assert_eq!(json["events"][0]["type"], "lapComplete");
        assert_eq!(json["events"][0]["lapNumber"], 1);
    }

    #[test]
    fn test_format_leaderboard() {
        let timeline = timeline();
        let last = timeline.frame(timeline.frame_count() - 1).unwrap();
        let board = format_leaderboard(last.states, timeline.roster()).unwrap();
        let lines: Vec<&str> = board.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("P1   VER"));
        assert!(lines[0].contains("Leader *"));
        assert!(lines[1].contains("+1.000s"));

        assert_eq!(format_leaderboard(&[], timeline.roster()).unwrap(), "");
    }
}
