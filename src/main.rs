mod app;
mod cli;
mod clock;
mod color;
mod config;
mod db;
mod error;
mod event;
mod flags;
mod logging;
mod ordering;
mod report;
mod timer;
mod tui;
mod types;
mod ui;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

fn main() -> Result<()> {
    let cli_opts = cli::Cli::parse();
    let config_path = cli_opts
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let config = config::Config::load(&config_path)?;

    let log_root = config::data_dir().unwrap_or_else(|| PathBuf::from("."));
    logging::enable_logging(&log_root, config.log_level.as_deref(), cli_opts.verbose)?;
    debug!(config = %config_path.display(), "configuration loaded");

    let conn = db::init(&config.database_path())?;
    let flags = flags::JsonFlagStore::open(&config.flags_path())?;
    let mut timer = timer::Timer::new(flags, clock::SystemClock);
    timer.recover(&conn)?;

    let command = cli_opts.command.unwrap_or(cli::Command::Watch);
    cli::run(command, &conn, &mut timer, &config)
}
