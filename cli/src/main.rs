use clap::Parser;
use log::{info, warn};
use racereplay::core::events::{filter_events, EventFilter, RaceEvent};
use racereplay::core::handle_timeline::handle_timeline;
use racereplay::playback::handle_playback::handle_playback;
use racereplay::playback::PlaybackConfig;
use racereplay::post::event_log::{
    format_event, format_leaderboard, format_race_time, print_event_log,
    write_event_log_to_file, write_timeline_json,
};
use racereplay::pre::read_race_data::{read_lap_csv, read_race_data};
use racereplay::pre::replay_opts::ReplayOpts;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    // PRE-PROCESSING ------------------------------------------------------------------------------
    // get replay options from the command line arguments
    let replay_opts: ReplayOpts = ReplayOpts::parse();

    let default_filter = if replay_opts.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // get race data
    info!("Reading race data from {:?}", replay_opts.datafile);
    let mut race_data = read_race_data(&replay_opts.datafile)?;

    if let Some(laps_csv) = &replay_opts.laps_csv {
        info!("Reading lap times from {:?}", laps_csv);
        race_data.laps = read_lap_csv(laps_csv)?;
    }

    // EXECUTION -----------------------------------------------------------------------------------
    let t_start = Instant::now();
    let timeline = handle_timeline(&race_data, &replay_opts.timeline_config())?;
    info!("Execution time: {}ms", t_start.elapsed().as_millis());

    // POST-PROCESSING -----------------------------------------------------------------------------
    let event_filter = EventFilter {
        from_ms: replay_opts.from_ms,
        to_ms: replay_opts.to_ms,
        kinds: replay_opts.event_type.map(|kind| vec![kind]),
    };
    let events: Vec<&RaceEvent> = filter_events(timeline.events(), &event_filter).collect();
    print_event_log(events.iter().copied(), timeline.roster())?;

    if let Some(events_out) = &replay_opts.events_out {
        let no_events = write_event_log_to_file(events.iter().copied(), timeline.roster(), events_out)?;
        info!("Wrote {} events to {:?}", no_events, events_out);
    }

    if let Some(timeline_out) = &replay_opts.timeline_out {
        write_timeline_json(&timeline, timeline_out)?;
        info!("Wrote timeline to {:?}", timeline_out);
    }

    // REAL-TIME REPLAY ----------------------------------------------------------------------------
    if replay_opts.play {
        let timeline = Arc::new(timeline);
        let (tx, rx) = flume::unbounded();

        // run playback in a separate thread, the console output stays in the main thread
        let timeline_thread = Arc::clone(&timeline);
        let speed = replay_opts.speed;
        let playback_thread = thread::spawn(move || {
            handle_playback(timeline_thread, PlaybackConfig::default(), speed, &tx)
        });

        for viewer_state in rx.iter() {
            for event in viewer_state.new_events.iter() {
                println!("{}", format_event(event, timeline.roster()));
            }

            if viewer_state.finished {
                println!(
                    "RESULT: Final classification at {}",
                    format_race_time(viewer_state.playback.virtual_clock_ms)
                );
                print!(
                    "{}",
                    format_leaderboard(&viewer_state.competitor_states, timeline.roster())?
                );
            }
        }

        match playback_thread.join() {
            Ok(result) => result?,
            Err(_) => warn!("Playback thread panicked!"),
        }
    }

    Ok(())
}
