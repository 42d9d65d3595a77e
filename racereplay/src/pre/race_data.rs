use serde::{Deserialize, Serialize};

/// * `season` - Season, e.g. 2021
/// * `round` - Round of the championship
/// * `race_name` - Race name, e.g. Bahrain Grand Prix
/// * `circuit_name` - Circuit name
/// * `date` - Race date as given by the provider (not interpreted)
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RaceMetadata {
    #[serde(default)]
    pub season: u32,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub race_name: String,
    #[serde(default)]
    pub circuit_name: String,
    #[serde(default)]
    pub date: Option<String>,
}

/// * `competitor_id` - Provider id of the competitor, e.g. max_verstappen
/// * `code` - Three letter code, e.g. VER
/// * `name` - Full name
/// * `team` - Team name
/// * `color` - Team color as CSS color string, e.g. #3671C6
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RosterEntry {
    pub competitor_id: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// One timing entry of a lap record.
#[derive(Debug, Deserialize, Clone)]
pub struct RawTiming {
    #[serde(alias = "driverId")]
    pub competitor_id: String,
    pub position: u32,
    pub time: String,
}

/// A lap record as delivered by the provider: all competitors that completed lap `number`.
#[derive(Debug, Deserialize, Clone)]
pub struct RawLap {
    pub number: u32,
    pub timings: Vec<RawTiming>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawPitStop {
    #[serde(alias = "driverId")]
    pub competitor_id: String,
    pub lap: u32,
    pub stop: u32,
    pub duration: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawFastestLap {
    pub rank: u32,
    pub lap: u32,
    pub time: String,
    #[serde(default)]
    pub average_speed_kph: Option<f64>,
}

/// Classification entry of a competitor.
#[derive(Debug, Deserialize, Clone)]
pub struct RawResult {
    #[serde(alias = "driverId")]
    pub competitor_id: String,
    #[serde(default)]
    pub grid: u32,
    pub status: String,
    #[serde(default)]
    pub fastest_lap: Option<RawFastestLap>,
}

/// RaceData bundles everything the provider delivers for one race.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RaceData {
    #[serde(default)]
    pub metadata: RaceMetadata,
    #[serde(default)]
    pub roster: Vec<RosterEntry>,
    #[serde(default)]
    pub laps: Vec<RawLap>,
    #[serde(default)]
    pub pit_stops: Vec<RawPitStop>,
    #[serde(default)]
    pub results: Vec<RawResult>,
}

impl RaceData {
    /// competitor_ids returns the ids of all competitors in a fixed order: roster first, then
    /// results, then anybody who only shows up in the lap records.
    pub fn competitor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();

        let roster_ids = self.roster.iter().map(|entry| &entry.competitor_id);
        let result_ids = self.results.iter().map(|result| &result.competitor_id);
        let lap_ids = self
            .laps
            .iter()
            .flat_map(|lap| lap.timings.iter().map(|timing| &timing.competitor_id));

        for id in roster_ids.chain(result_ids).chain(lap_ids) {
            if !ids.contains(id) {
                ids.push(id.to_owned());
            }
        }

        ids
    }

    /// race_label returns a short human readable label for log output and error messages.
    pub fn race_label(&self) -> String {
        if self.metadata.race_name.is_empty() {
            format!("season {} round {}", self.metadata.season, self.metadata.round)
        } else {
            format!("{} {}", self.metadata.race_name, self.metadata.season)
        }
    }
}
