//! Command-line interface module for tidywatch.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing (`clap`)
//! - One-shot organization of a folder
//! - Watching a folder until Ctrl-C
//! - Listing and editing categories in the configuration file

use crate::config::{ConfigError, LOCAL_CONFIG_NAME, Settings, default_config_path};
use crate::error::OrganizeError;
use crate::file_organizer::{OrganizeEvent, Organizer};
use crate::notifier::{Broadcast, ChannelNotifier, LogNotifier};
use crate::output::{OutputFormatter, Summary};
use crate::watcher::{Monitor, WatchSession};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Watch a folder and sort incoming files into category subfolders.
#[derive(Debug, Parser)]
#[command(name = "tidywatch", version, about)]
pub struct Cli {
    /// Configuration file to use instead of the discovered one
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Show debug logging and skipped files
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print one JSON object per event instead of colored text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sort the files currently in DIR and exit
    Organize { dir: PathBuf },

    /// Sort DIR, then keep sorting new files until Ctrl-C
    Watch {
        dir: PathBuf,

        /// Do not sort the files already present before watching
        #[arg(long)]
        no_sweep: bool,
    },

    /// Show or edit the category table
    Categories {
        #[command(subcommand)]
        action: CategoriesCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum CategoriesCommand {
    /// Show the effective category mapping
    List,

    /// Add a category, or extend an existing one
    Add {
        name: String,
        #[arg(required = true, value_name = "EXT")]
        extensions: Vec<String>,
    },

    /// Remove a category
    Remove { name: String },
}

/// How events are printed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub json: bool,
    pub verbose: bool,
}

impl From<&Cli> for RenderOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            json: cli.json,
            verbose: cli.verbose,
        }
    }
}

/// Turns a settings load failure into the warning shown at startup.
///
/// `None` when the failure is expected: `categories` may target a config file
/// that does not exist yet.
pub fn config_fallback_warning(command: &Command, error: ConfigError) -> Option<OrganizeError> {
    let creating = matches!(command, Command::Categories { .. })
        && matches!(error, ConfigError::ConfigNotFound(_));
    (!creating).then(|| OrganizeError::ConfigLoadFailed(error))
}

/// Runs the parsed command against already loaded settings.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use tidywatch::cli::{Cli, run_cli};
/// use tidywatch::config::Settings;
///
/// let cli = Cli::parse_from(["tidywatch", "organize", "/path/to/Downloads"]);
/// let settings = Settings::default();
/// if let Err(e) = run_cli(&cli, &settings) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: &Cli, settings: &Settings) -> Result<(), String> {
    let options = RenderOptions::from(cli);
    match &cli.command {
        Command::Organize { dir } => {
            organize_directory(dir, settings, cli.config.as_deref(), options).map(|_| ())
        }
        Command::Watch { dir, no_sweep } => {
            watch_directory(dir, settings, cli.config.as_deref(), *no_sweep, options)
        }
        Command::Categories { action } => match action {
            CategoriesCommand::List => list_categories(settings),
            CategoriesCommand::Add { name, extensions } => {
                add_category(cli.config.as_deref(), name, extensions)
            }
            CategoriesCommand::Remove { name } => remove_category(cli.config.as_deref(), name),
        },
    }
}

/// Builds the organizer for `dir` from the settings.
///
/// The log file, its rotation and the configuration file are never moved.
pub fn build_organizer(
    dir: &Path,
    settings: &Settings,
    config_path: Option<&Path>,
) -> Result<Organizer, String> {
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()));
    }

    let categories = settings
        .category_map()
        .map_err(|e| format!("Error loading categories: {}", e))?;
    let filters = settings
        .compile_filters()
        .map_err(|e| format!("Error compiling filters: {}", e))?;

    let cwd = std::env::current_dir().unwrap_or_default();
    let log_file = cwd.join(&settings.logging.file);
    let mut rotated_log = log_file.clone().into_os_string();
    rotated_log.push(".1");
    let mut ignored = vec![log_file, PathBuf::from(rotated_log)];
    if let Some(config) = Settings::discover(config_path) {
        ignored.push(cwd.join(config));
    }
    ignored.push(dir.join(LOCAL_CONFIG_NAME));

    Ok(Organizer::new(dir, Arc::new(categories))
        .with_filters(Arc::new(filters))
        .with_ignored(ignored))
}

/// Organizes the files currently in `dir` and prints a summary.
pub fn organize_directory(
    dir: &Path,
    settings: &Settings,
    config_path: Option<&Path>,
    options: RenderOptions,
) -> Result<Summary, String> {
    let organizer = build_organizer(dir, settings, config_path)?;
    if !options.json {
        OutputFormatter::info(&format!("Organizing contents of: {}", dir.display()));
    }

    let events = organizer.organize_existing();
    for event in &events {
        OutputFormatter::event(event, organizer.root(), options.json, options.verbose);
    }

    let summary: Summary = events.iter().collect();
    info!(
        root = %organizer.root().display(),
        moved = summary.total_moved(),
        failed = summary.failed,
        "Sweep finished"
    );
    if !options.json {
        if events.is_empty() {
            OutputFormatter::plain("No files found to organize.");
        } else {
            OutputFormatter::summary_table(&summary);
        }
    }
    Ok(summary)
}

/// Watches `dir` until Ctrl-C, printing every event as it happens.
pub fn watch_directory(
    dir: &Path,
    settings: &Settings,
    config_path: Option<&Path>,
    no_sweep: bool,
    options: RenderOptions,
) -> Result<(), String> {
    let (channel, events) = ChannelNotifier::channel();
    let organizer = build_organizer(dir, settings, config_path)?.with_notifier(Arc::new(
        Broadcast::new().with(LogNotifier).with(channel),
    ));
    let root = organizer.root().to_path_buf();

    // Start watching before the sweep so nothing arriving in between is missed.
    let session = WatchSession::start(&root, settings.watch.debounce())
        .map_err(|e| format!("Error starting watcher: {}", e))?;
    let stop = session.stop_handle();
    ctrlc::set_handler(move || stop.stop())
        .map_err(|e| format!("Error installing Ctrl-C handler: {}", e))?;

    if !no_sweep {
        organizer.organize_existing();
    }

    let monitor = Monitor::spawn(organizer, session)
        .map_err(|e| format!("Error starting monitor: {}", e))?;

    let spinner = (!options.json).then(|| OutputFormatter::watch_spinner(&root));
    let mut summary = Summary::default();
    // Ends once the monitor thread exits and drops the organizer.
    for event in events {
        summary.record(&event);
        render_live(&event, &root, spinner.as_ref(), options);
    }
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let processed = monitor.join();
    info!(root = %root.display(), processed, "Watch session ended");
    if !options.json {
        OutputFormatter::summary_table(&summary);
    }
    Ok(())
}

fn render_live(
    event: &OrganizeEvent,
    root: &Path,
    spinner: Option<&ProgressBar>,
    options: RenderOptions,
) {
    match spinner {
        Some(spinner) => {
            if let Some(line) = OutputFormatter::format_event(event, root, options.verbose) {
                spinner.println(line);
            }
        }
        None => OutputFormatter::event(event, root, options.json, options.verbose),
    }
}

/// Prints the effective category mapping.
pub fn list_categories(settings: &Settings) -> Result<(), String> {
    let map = settings
        .category_map()
        .map_err(|e| format!("Error loading categories: {}", e))?;
    OutputFormatter::category_table(&map);
    Ok(())
}

/// Adds `extensions` to category `name` in the configuration file.
pub fn add_category(
    config_path: Option<&Path>,
    name: &str,
    extensions: &[String],
) -> Result<(), String> {
    let (path, mut settings) = editable_settings(config_path)?;
    let added = settings.add_category(name, extensions);
    settings
        .validate()
        .map_err(|e| format!("Error updating categories: {}", e))?;
    settings
        .save(&path)
        .map_err(|e| format!("Error saving {}: {}", path.display(), e))?;

    if added == 0 {
        OutputFormatter::warning(&format!("'{}' already has all of these extensions", name));
    } else {
        OutputFormatter::success(&format!(
            "Added {} extension(s) to '{}' in {}",
            added,
            name,
            path.display()
        ));
    }
    Ok(())
}

/// Removes category `name` from the configuration file.
pub fn remove_category(config_path: Option<&Path>, name: &str) -> Result<(), String> {
    let (path, mut settings) = editable_settings(config_path)?;
    if !settings.remove_category(name) {
        return Err(format!("Category '{}' does not exist", name));
    }
    settings
        .save(&path)
        .map_err(|e| format!("Error saving {}: {}", path.display(), e))?;
    OutputFormatter::success(&format!("Removed '{}' from {}", name, path.display()));
    Ok(())
}

/// Loads the settings file that category edits are written back to.
///
/// Unlike startup, a broken file is an error here: saving over it would lose
/// whatever the user had in it.
fn editable_settings(config_path: Option<&Path>) -> Result<(PathBuf, Settings), String> {
    let path = Settings::discover(config_path)
        .or_else(default_config_path)
        .ok_or_else(|| "No configuration path available; pass --config".to_string())?;

    let settings = if path.exists() {
        Settings::load_from_file(&path).map_err(|e| format!("Error loading configuration: {}", e))?
    } else {
        warn!(path = %path.display(), "Configuration file does not exist yet, creating it");
        Settings::default()
    };
    Ok((path, settings))
}
