//! The command line interface for the hazard engine.
use crate::calculation::{run_job, validate_job};
use crate::input::load_model;
use crate::log;
use crate::output::{create_output_directory, get_output_dir};
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod example;
use example::ExampleSubcommands;
pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the hazard engine.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the run command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// The maximum number of tasks to run at once
    #[arg(long)]
    pub pool_size: Option<usize>,
    /// The number of blocks to aim for when splitting the sources
    #[arg(long)]
    pub concurrent_tasks: Option<usize>,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a hazard calculation.
    Run {
        /// Path to the job directory.
        job_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Check a job and report its size without running it.
    Validate {
        /// The path to the job directory.
        job_dir: PathBuf,
    },
    /// Manage example jobs.
    Example {
        /// The available subcommands for managing example jobs.
        #[command(subcommand)]
        subcommand: ExampleSubcommands,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { job_dir, opts } => handle_run_command(&job_dir, &opts, None),
            Self::Validate { job_dir } => handle_validate_command(&job_dir, None),
            Self::Example { subcommand } => subcommand.execute(),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start the hazard engine
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ psha --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Handle the `run` command.
pub fn handle_run_command(
    job_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let mut settings = load_settings(settings)?;

    // These settings can be overridden by command-line arguments
    if opts.overwrite {
        settings.overwrite = true;
    }
    if let Some(pool_size) = opts.pool_size {
        settings.pool_size = Some(pool_size);
    }
    if let Some(concurrent_tasks) = opts.concurrent_tasks {
        settings.concurrent_tasks = concurrent_tasks;
    }

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(job_path)?;
        &pathbuf
    };

    let overwrite =
        create_output_directory(output_path, settings.overwrite).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    // Initialise program logger
    log::init(Some(&settings.log_level), Some(output_path))
        .context("Failed to initialise logging.")?;

    // Load the job to run
    let model = load_model(job_path).context("Failed to load job.")?;
    info!("Loaded job from {}", job_path.display());
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    run_job(&model, output_path, &settings.calculation_settings())?;
    info!("Calculation complete!");

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(job_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // Initialise program logger (we won't save log files when running the validate command)
    log::init(Some(&settings.log_level), None).context("Failed to initialise logging.")?;

    // Load the job and work out how big it is
    let model = load_model(job_path).context("Failed to validate job.")?;
    let job_info = validate_job(&model, &settings.calculation_settings())
        .context("Failed to validate job.")?;
    info!("Job validation successful!");

    print!(
        "{}",
        toml::to_string(&job_info).context("Failed to serialise job info.")?
    );

    Ok(())
}
