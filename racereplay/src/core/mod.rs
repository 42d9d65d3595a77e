pub mod error;
pub mod events;
pub mod frames;
pub mod handle_timeline;
pub mod lap_times;
pub mod timeline;
