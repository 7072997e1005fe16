use std::env;
use std::path::PathBuf;
use clap::{Parser};
use crate::gui::application::run_application;
use crate::error::AppRunError;

pub mod device;
pub mod gui;
pub mod error;
pub mod config;

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Remote control for the ESPFAN bluetooth fan controller", long_about = None)]
pub struct Args {
    /// Read the settings from this file instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log bluetooth traffic and session transitions
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    run_application(args.config)?;
    Ok(())
}
