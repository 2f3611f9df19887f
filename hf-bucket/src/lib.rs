pub mod api;
pub mod cli;
pub mod load_config;
pub mod remote;

pub use cli::{run, Cli, Commands};
