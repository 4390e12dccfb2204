//! The command line interface, used to inspect solver strategies and settings.
use crate::log;
use crate::registry::{capabilities, describe, validate_config};
use crate::settings::SolverSettings;
use ::log::warn;
use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// The command line interface for the allocation engine.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// List solver strategies and check a solver configuration.
    Capabilities {
        /// Path to a settings file (defaults are used if not given).
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Write the contents of a default settings file to the console.
    Settings,
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Capabilities { settings } => handle_capabilities_command(settings.as_deref()),
            Self::Settings => {
                print!("{}", SolverSettings::default_file_contents());
                Ok(())
            }
        }
    }
}

/// Parse CLI arguments and run the requested command
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Handle the `capabilities` command.
///
/// Prints every known strategy, then the validation report and metadata for the given settings.
/// Fails if the configuration could not be used for a solve.
pub fn handle_capabilities_command(settings_path: Option<&Path>) -> Result<()> {
    let settings = match settings_path {
        Some(path) => {
            SolverSettings::load_from_path(path).context("Failed to load settings.")?
        }
        None => SolverSettings::default(),
    };

    // No log files for diagnostic commands
    if !log::is_logger_initialised() {
        log::init(Some(&settings.log_level), None).context("Failed to initialise logging.")?;
    }

    println!("Strategies:");
    for capability in capabilities() {
        println!("  {capability}");
    }
    println!();

    let report = validate_config(&settings);
    for warning in &report.warnings {
        warn!("{warning}");
    }
    print!("{report}");
    if !report.is_valid() {
        bail!("Strategy {} cannot be used", settings.strategy);
    }

    println!();
    print!("{}", describe(&settings));

    Ok(())
}
