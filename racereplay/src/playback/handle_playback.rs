use crate::core::events::{events_in_window, RaceEvent};
use crate::core::timeline::Timeline;
use crate::interfaces::viewer_interface::{ViewerState, MAX_VIEWER_UPDATE_FREQUENCY};
use crate::playback::{PlaybackConfig, PlaybackEngine};
use anyhow::Context;
use flume::Sender;
use log::{info, warn};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// (Hz) Rate at which the playback loop advances the virtual clock.
pub const PLAYBACK_REFRESH_RATE: f64 = 60.0;

/// new_events returns the events with prev_clock_ms < time_ms <= clock_ms (including time 0 on the
/// first update, when there is no previous clock).
fn new_events(events: &[RaceEvent], prev_clock_ms: Option<f64>, clock_ms: f64) -> Vec<RaceEvent> {
    match prev_clock_ms {
        Some(prev) => events_in_window(events, prev, clock_ms)
            .iter()
            .filter(|event| event.time_ms > prev)
            .cloned()
            .collect(),
        None => events_in_window(events, f64::NEG_INFINITY, clock_ms).to_vec(),
    }
}

/// handle_playback plays the timeline from the start in real time and sends the interpolated
/// state to the viewer at MAX_VIEWER_UPDATE_FREQUENCY. The last message carries finished = true.
pub fn handle_playback(
    timeline: Arc<Timeline>,
    config: PlaybackConfig,
    speed: f64,
    tx: &Sender<ViewerState>,
) -> anyhow::Result<()> {
    let mut engine = PlaybackEngine::with_timeline(timeline, config);
    engine.set_speed(speed);
    engine.play();
    info!(
        "Replaying {:.1}s of race time at {}x",
        engine.total_duration_ms() / 1000.0,
        engine.speed()
    );

    let t_step = Duration::from_secs_f64(1.0 / PLAYBACK_REFRESH_RATE);
    let t_send = Duration::from_secs_f64(1.0 / MAX_VIEWER_UPDATE_FREQUENCY);
    let mut t_last_send: Option<Instant> = None;
    let mut prev_clock_ms: Option<f64> = None;

    loop {
        let t_start = Instant::now();
        let running = engine.tick(t_start);

        if !running || t_last_send.map_or(true, |t| t_start.duration_since(t) >= t_send) {
            let clock_ms = engine.virtual_clock_ms();
            let timeline_events = engine.timeline().map_or(&[][..], |t| t.events());

            let viewer_state = ViewerState {
                playback: engine.state(),
                competitor_states: engine.interpolated(),
                new_events: new_events(timeline_events, prev_clock_ms, clock_ms),
                finished: !running,
            };

            // send current viewer state
            tx.send(viewer_state)
                .context("Failed to send viewer state!")?;
            prev_clock_ms = Some(clock_ms);
            t_last_send = Some(t_start);
        }

        if !running {
            break;
        }

        // sleep until the refresh step is finished in real-time as well
        match t_step.checked_sub(t_start.elapsed()) {
            Some(t_sleep) => sleep(t_sleep),
            None => warn!("Could not keep up with real-time!"),
        }
    }

    info!("Replay finished");
    Ok(())
}
