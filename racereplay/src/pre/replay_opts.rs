use crate::core::events::EventKind;
use crate::core::timeline::TimelineConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1.0",
    author = "Alexander Heilmeier <alexander.heilmeier@tum.de>",
    name = "RS-REPLAY",
    about = "Replays recorded race lap data as a seekable timeline"
)]
pub struct ReplayOpts {
    // FLAGS ---------------------------------------------------------------------------------------
    /// Activate debug logging
    #[clap(short, long)]
    pub debug: bool,

    /// Replay the race in real-time on the console after building the timeline
    #[clap(long)]
    pub play: bool,

    // OPTIONS -------------------------------------------------------------------------------------
    /// Set path to the race data file (JSON with metadata, laps, pit stops and results)
    #[clap(short = 'p', long)]
    pub datafile: PathBuf,

    /// Set path to a lap time CSV file, replaces the laps of the race data file
    #[clap(long)]
    pub laps_csv: Option<PathBuf>,

    /// Set sampling interval in milliseconds of race time
    #[clap(short, long, default_value = "500")]
    pub interval: u64,

    /// Thin the frame sequence down to roughly this many frames
    #[clap(long)]
    pub target_frames: Option<usize>,

    /// Set playback speed multiplier (only relevant with --play), clamped to [0.1, 10.0]
    #[clap(short, long, default_value = "1.0")]
    pub speed: f64,

    /// Write the (filtered) event log to this file
    #[clap(long)]
    pub events_out: Option<PathBuf>,

    /// Write the full timeline as JSON to this file
    #[clap(long)]
    pub timeline_out: Option<PathBuf>,

    /// Only show events of this kind (lapComplete, pitStop, overtake, retirement, fastestLap)
    #[clap(long)]
    pub event_type: Option<EventKind>,

    /// Only show events at or after this race time (ms)
    #[clap(long)]
    pub from_ms: Option<f64>,

    /// Only show events at or before this race time (ms)
    #[clap(long)]
    pub to_ms: Option<f64>,
}

impl ReplayOpts {
    pub fn timeline_config(&self) -> TimelineConfig {
        TimelineConfig {
            sampling_interval_ms: self.interval,
            target_frames: self.target_frames,
        }
    }
}
