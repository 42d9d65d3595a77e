pub mod engine;
pub mod handle_playback;
pub mod interpolate;

pub use engine::PlaybackEngine;

use log::warn;
use serde::{Deserialize, Serialize};

/// (race seconds per wall-clock second) Virtual clock rate at speed 1.0.
pub const DEFAULT_PACE_CONSTANT: f64 = 20.0;

/// Playback status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

/// Observable playback state of one viewing session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    pub virtual_clock_ms: f64,
    pub speed_multiplier: f64,
    pub current_frame_index: usize,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState {
            is_playing: false,
            virtual_clock_ms: 0.0,
            speed_multiplier: 1.0,
            current_frame_index: 0,
        }
    }
}

fn default_pace_constant() -> f64 {
    DEFAULT_PACE_CONSTANT
}

fn default_min_speed() -> f64 {
    0.1
}

fn default_max_speed() -> f64 {
    10.0
}

/// Playback configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_pace_constant")]
    pub pace_constant: f64,
    #[serde(default = "default_min_speed")]
    pub min_speed: f64,
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            pace_constant: default_pace_constant(),
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
        }
    }
}

impl PlaybackConfig {
    /// sanitized returns a usable copy of the configuration: the pace constant falls back to the
    /// default unless it is finite and positive, non-finite or non-positive speed bounds fall back
    /// to their defaults and the bounds are put in order.
    pub fn sanitized(&self) -> PlaybackConfig {
        let pace_constant = if self.pace_constant.is_finite() && self.pace_constant > 0.0 {
            self.pace_constant
        } else {
            warn!(
                "Invalid pace constant {}, using {}",
                self.pace_constant, DEFAULT_PACE_CONSTANT
            );
            DEFAULT_PACE_CONSTANT
        };

        let bound = |speed: f64, default: f64| {
            if speed.is_finite() && speed > 0.0 {
                speed
            } else {
                warn!("Invalid playback speed bound {}, using {}", speed, default);
                default
            }
        };
        let min_speed = bound(self.min_speed, default_min_speed());
        let max_speed = bound(self.max_speed, default_max_speed());

        PlaybackConfig {
            pace_constant,
            min_speed: min_speed.min(max_speed),
            max_speed: min_speed.max(max_speed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_keeps_valid_config() {
        let config = PlaybackConfig {
            pace_constant: 5.0,
            min_speed: 0.5,
            max_speed: 4.0,
        };
        assert_eq!(config.sanitized(), config);
    }

    #[test]
    fn test_sanitized_orders_speed_bounds() {
        let config = PlaybackConfig {
            pace_constant: 20.0,
            min_speed: 5.0,
            max_speed: 1.0,
        }
        .sanitized();
        assert_eq!(config.min_speed, 1.0);
        assert_eq!(config.max_speed, 5.0);

        let config = PlaybackConfig {
            pace_constant: 20.0,
            min_speed: f64::NAN,
            max_speed: -3.0,
        }
        .sanitized();
        assert_eq!(config.min_speed, 0.1);
        assert_eq!(config.max_speed, 10.0);
    }

    #[test]
    fn test_sanitized_pace_constant() {
        for pace_constant in [-20.0, 0.0, f64::NAN, f64::INFINITY] {
            let config = PlaybackConfig {
                pace_constant,
                ..PlaybackConfig::default()
            }
            .sanitized();
            assert_eq!(config.pace_constant, DEFAULT_PACE_CONSTANT);
        }
    }
}
