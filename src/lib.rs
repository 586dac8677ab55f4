pub mod analysis;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod converter;
pub mod pipeline;
pub mod purge;
pub mod session;
pub mod transcription;
