pub mod cli;
pub mod config;
pub mod notifier;

pub use crate::cli::{App, Cli, Command};
pub use crate::config::AppConfig;
