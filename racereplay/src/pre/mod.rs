pub mod race_data;
pub mod read_race_data;
pub mod replay_opts;
