pub mod config;
pub mod errors;
pub mod host;
pub mod jobs;
pub mod public_values;
pub mod server;
