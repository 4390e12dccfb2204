//! Provides the main entry point to the program.
use std::process::ExitCode;
use tradeflow::cli::run_cli;
use tradeflow::log::is_logger_initialised;

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if is_logger_initialised() {
                log::error!("{err:?}");
            } else {
                eprintln!("Error: {err:?}");
            }
            ExitCode::FAILURE
        }
    }
}
