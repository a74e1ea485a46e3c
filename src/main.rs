use clap::Parser;
use std::process::ExitCode;
use tidywatch::cli::{Cli, config_fallback_warning, run_cli};
use tidywatch::config::Settings;
use tidywatch::logging::init_tracing;
use tidywatch::output::OutputFormatter;
use tracing::{error, warn};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (settings, config_error) = Settings::load_or_default(cli.config.as_deref());
    let _log_guard = init_tracing(&settings.logging, cli.verbose).unwrap_or_else(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        None
    });

    if let Some(warning) = config_error.and_then(|e| config_fallback_warning(&cli.command, e)) {
        warn!(kind = warning.kind(), error = %warning, "Falling back to default settings");
        if !cli.json {
            OutputFormatter::warning(&format!("{}; using default settings", warning));
        }
    }

    match run_cli(&cli, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}
