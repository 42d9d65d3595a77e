pub mod core;
pub mod interfaces;
pub mod playback;
pub mod post;
pub mod pre;
