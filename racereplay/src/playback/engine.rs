use crate::core::events::{events_in_window, RaceEvent};
use crate::core::timeline::{CompetitorState, Timeline};
use crate::playback::interpolate::interpolate;
use crate::playback::{PlaybackConfig, PlaybackState, PlaybackStatus};
use flume::{Receiver, Sender, TrySendError};
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of state snapshots buffered per subscriber. Snapshots sent to a full buffer are dropped.
pub const SUBSCRIBER_CAPACITY: usize = 64;

/// Playback engine driving a virtual race clock over a timeline.
///
/// The engine is stepped from a refresh-driven loop: every `tick` measures the wall-clock time
/// since the previous tick and advances the virtual clock by it, scaled with the speed multiplier
/// and the pace constant. `tick` returns whether the caller should schedule the next tick, which
/// is only the case while playing. Without a loaded timeline every operation is a no-op.
pub struct PlaybackEngine {
    timeline: Option<Arc<Timeline>>,
    config: PlaybackConfig,
    status: PlaybackStatus,
    state: PlaybackState,
    last_tick: Option<Instant>,
    subscribers: Vec<Sender<PlaybackState>>,
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        PlaybackEngine::new(PlaybackConfig::default())
    }
}

impl PlaybackEngine {
    /// Create an engine without timeline. Unusable configuration values are replaced, see
    /// `PlaybackConfig::sanitized`.
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            timeline: None,
            config: config.sanitized(),
            status: PlaybackStatus::Stopped,
            state: PlaybackState::default(),
            last_tick: None,
            subscribers: Vec::new(),
        }
    }

    pub fn with_timeline(timeline: Arc<Timeline>, config: PlaybackConfig) -> Self {
        let mut engine = PlaybackEngine::new(config);
        engine.load(timeline);
        engine
    }

    /// Load a timeline, resetting the whole session.
    pub fn load(&mut self, timeline: Arc<Timeline>) {
        debug!(
            "Loading timeline with {} frames ({}ms)",
            timeline.frame_count(),
            timeline.total_duration_ms()
        );
        self.timeline = Some(timeline);
        self.status = PlaybackStatus::Stopped;
        self.state = PlaybackState::default();
        self.last_tick = None;
        self.notify();
    }

    pub fn timeline(&self) -> Option<&Arc<Timeline>> {
        self.timeline.as_ref()
    }

    /// Get current playback status
    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    /// Get a snapshot of the playback state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn virtual_clock_ms(&self) -> f64 {
        self.state.virtual_clock_ms
    }

    pub fn speed(&self) -> f64 {
        self.state.speed_multiplier
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.timeline
            .as_ref()
            .map_or(0.0, |timeline| timeline.total_duration_ms() as f64)
    }

    /// Subscribe to state changes. Every change is sent as a snapshot, dropping the receiver
    /// unsubscribes. A subscriber that falls SUBSCRIBER_CAPACITY snapshots behind misses the newer
    /// ones until it drains its receiver.
    pub fn subscribe(&mut self) -> Receiver<PlaybackState> {
        let (tx, rx) = flume::bounded(SUBSCRIBER_CAPACITY);
        // the current state is delivered first so late subscribers start consistent
        let _ = tx.send(self.state);
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self) {
        let state = self.state;
        self.subscribers
            .retain(|tx| !matches!(tx.try_send(state), Err(TrySendError::Disconnected(_))));
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        if self.status != status {
            debug!("Playback {:?} -> {:?}", self.status, status);
        }
        self.status = status;
        self.state.is_playing = status == PlaybackStatus::Playing;
        if status != PlaybackStatus::Playing {
            self.last_tick = None;
        }
    }

    /// set_clock moves the virtual clock (clamped to the timeline) and updates the frame index.
    fn set_clock(&mut self, virtual_clock_ms: f64) {
        let timeline = match &self.timeline {
            Some(timeline) => timeline,
            None => return,
        };
        let total = timeline.total_duration_ms() as f64;
        let clock = if virtual_clock_ms.is_nan() {
            0.0
        } else {
            virtual_clock_ms.clamp(0.0, total)
        };

        self.state.virtual_clock_ms = clock;
        self.state.current_frame_index = timeline.floor_frame_index(clock);
    }

    /// Start/resume playback. Playing from the end of the timeline starts over.
    pub fn play(&mut self) {
        if self.timeline.is_none() || self.status == PlaybackStatus::Playing {
            return;
        }

        if self.state.virtual_clock_ms >= self.total_duration_ms() {
            self.set_clock(0.0);
        }

        info!(
            "Playback started at {:.1}s race time ({}x)",
            self.state.virtual_clock_ms / 1000.0,
            self.state.speed_multiplier
        );
        self.set_status(PlaybackStatus::Playing);
        self.last_tick = None;
        self.notify();
    }

    /// Pause playback
    pub fn pause(&mut self) {
        if self.timeline.is_none() || self.status != PlaybackStatus::Playing {
            return;
        }

        self.set_status(PlaybackStatus::Paused);
        self.notify();
    }

    /// Stop playback and rewind, the speed is kept
    pub fn restart(&mut self) {
        if self.timeline.is_none() {
            return;
        }

        self.set_status(PlaybackStatus::Stopped);
        self.set_clock(0.0);
        self.notify();
    }

    /// Set playback speed. Non-finite or non-positive values are ignored, others are clamped to
    /// the configured range.
    pub fn set_speed(&mut self, speed: f64) {
        if self.timeline.is_none() {
            return;
        }
        if !speed.is_finite() || speed <= 0.0 {
            debug!("Ignoring playback speed {}", speed);
            return;
        }

        self.state.speed_multiplier = speed.clamp(self.config.min_speed, self.config.max_speed);
        self.notify();
    }

    /// Seek to a race time (ms), clamped to the timeline. The playing flag is not touched, a
    /// stopped engine that is moved away from the start counts as paused.
    pub fn seek(&mut self, virtual_clock_ms: f64) {
        if self.timeline.is_none() {
            return;
        }

        self.set_clock(virtual_clock_ms);
        if self.status == PlaybackStatus::Stopped && self.state.virtual_clock_ms > 0.0 {
            self.set_status(PlaybackStatus::Paused);
        }
        self.notify();
    }

    /// Seek to a percentage (0-100) of the race duration.
    pub fn seek_percent(&mut self, pct: f64) {
        let pct = if pct.is_nan() { 0.0 } else { pct.clamp(0.0, 100.0) };
        self.seek(self.total_duration_ms() * pct / 100.0);
    }

    /// Step forward by one frame (pauses)
    pub fn step_forward(&mut self) {
        let target = match &self.timeline {
            Some(timeline) => timeline
                .frame(self.state.current_frame_index + 1)
                .map(|frame| frame.time_ms),
            None => return,
        };

        if let Some(time_ms) = target {
            self.set_clock(time_ms);
        }
        self.set_status(PlaybackStatus::Paused);
        self.notify();
    }

    /// Step backward to the previous frame (pauses). Between two frames this is the floor frame.
    pub fn step_back(&mut self) {
        let target = match &self.timeline {
            Some(timeline) => {
                let idx = self.state.current_frame_index;
                let floor_ms = timeline.frame(idx).map_or(0.0, |frame| frame.time_ms);
                if self.state.virtual_clock_ms > floor_ms {
                    floor_ms
                } else {
                    timeline
                        .frame(idx.saturating_sub(1))
                        .map_or(0.0, |frame| frame.time_ms)
                }
            }
            None => return,
        };

        self.set_clock(target);
        self.set_status(PlaybackStatus::Paused);
        self.notify();
    }

    /// Advance the virtual clock by a wall-clock duration. Returns true if playback continues.
    pub fn update(&mut self, wall_delta: Duration) -> bool {
        if !self.state.is_playing {
            return false;
        }

        let race_delta_ms = wall_delta.as_secs_f64()
            * 1000.0
            * self.state.speed_multiplier
            * self.config.pace_constant;
        let total = self.total_duration_ms();
        self.set_clock(self.state.virtual_clock_ms + race_delta_ms);

        let running = self.state.virtual_clock_ms < total;
        if !running {
            info!("Playback reached the end at {:.1}s race time", total / 1000.0);
            self.set_status(PlaybackStatus::Paused);
        }
        self.notify();
        running
    }

    /// Step function for the refresh loop. Returns true if the next tick should be scheduled.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.state.is_playing {
            return false;
        }

        let wall_delta = self
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_tick = Some(now);
        self.update(wall_delta)
    }

    /// Competitor states interpolated at the current virtual clock.
    pub fn interpolated(&self) -> Vec<CompetitorState> {
        self.timeline.as_ref().map_or_else(Vec::new, |timeline| {
            interpolate(timeline, self.state.virtual_clock_ms)
        })
    }

    /// Events within [clock - before_ms, clock + after_ms].
    pub fn events_in_window(&self, before_ms: f64, after_ms: f64) -> &[RaceEvent] {
        match &self.timeline {
            Some(timeline) => {
                let clock = self.state.virtual_clock_ms;
                events_in_window(timeline.events(), clock - before_ms, clock + after_ms)
            }
            None => &[],
        }
    }
}
