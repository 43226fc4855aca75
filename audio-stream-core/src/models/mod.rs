pub mod audio_format;
pub mod config;
pub mod error;
pub mod notice;
pub mod port;
pub mod state;
pub mod status;
