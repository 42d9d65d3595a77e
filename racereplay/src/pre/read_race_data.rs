use crate::pre::race_data::{RaceData, RawLap, RawTiming};
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;

/// read_race_data reads the JSON file and decodes the JSON string into the race data struct.
pub fn read_race_data(filepath: &Path) -> anyhow::Result<RaceData> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!(
            "Failed to open race data file {}!",
            filepath.display()
        ))?;
    let data = serde_json::from_reader(&fh).context(format!(
        "Failed to parse race data file {}!",
        filepath.display()
    ))?;
    Ok(data)
}

/// One row of a lap time CSV export (Ergast lap_times.csv layout, extra columns are ignored).
#[derive(Debug, Deserialize, Clone)]
pub struct CsvLapRow {
    #[serde(alias = "driverId")]
    pub competitor_id: String,
    pub lap: u32,
    pub position: u32,
    pub time: String,
}

/// read_lap_csv reads a lap time CSV file and groups its rows into lap records. Rows of the same
/// lap keep their file order.
pub fn read_lap_csv(filepath: &Path) -> anyhow::Result<Vec<RawLap>> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!("Failed to open lap file {}!", filepath.display()))?;

    let mut csv_reader = csv::Reader::from_reader(&fh);
    let mut laps: BTreeMap<u32, Vec<RawTiming>> = BTreeMap::new();

    for result in csv_reader.deserialize() {
        let row: CsvLapRow = result.context(format!(
            "Failed to parse lap file {}!",
            filepath.display()
        ))?;
        laps.entry(row.lap).or_default().push(RawTiming {
            competitor_id: row.competitor_id,
            position: row.position,
            time: row.time,
        });
    }

    Ok(laps
        .into_iter()
        .map(|(number, timings)| RawLap { number, timings })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_lap_csv_groups_by_lap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lap_times.csv");
        let mut fh = std::fs::File::create(&path).unwrap();
        writeln!(fh, "raceId,driverId,lap,position,time,milliseconds").unwrap();
        writeln!(fh, "1,hamilton,2,1,1:31.000,91000").unwrap();
        writeln!(fh, "1,hamilton,1,1,1:35.000,95000").unwrap();
        writeln!(fh, "1,alonso,1,2,1:36.000,96000").unwrap();
        drop(fh);

        let laps = read_lap_csv(&path).unwrap();
        assert_eq!(laps.len(), 2);
        assert_eq!(laps[0].number, 1);
        assert_eq!(laps[0].timings.len(), 2);
        assert_eq!(laps[0].timings[1].competitor_id, "alonso");
        assert_eq!(laps[1].timings[0].time, "1:31.000");
    }

    #[test]
    fn test_read_race_data_reports_missing_file() {
        let dir = tempdir().unwrap();
        let err = read_race_data(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to open race data file"));
    }

    #[test]
    fn test_read_race_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("race.json");
        std::fs::write(
            &path,
            r#"{"metadata": {"season": 2021, "round": 1, "raceName": "Bahrain Grand Prix"},
                "laps": [{"number": 1, "timings": [
                    {"competitor_id": "hamilton", "position": 1, "time": "1:35.000"}]}]}"#,
        )
        .unwrap();

        let data = read_race_data(&path).unwrap();
        assert_eq!(data.metadata.race_name, "Bahrain Grand Prix");
        assert_eq!(data.laps.len(), 1);
        assert!(data.pit_stops.is_empty());
    }
}
