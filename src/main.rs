//! Network Autopsy - Main CLI Application
//!
//! Runs one diagnostic pass against the built-in (or a supplied) catalog and
//! prints the report.

use clap::Parser;
use network_autopsy::{
    cli::Cli,
    config::{display_config_summary, load_config, validate_config},
    error::{AppError, Result},
    logging::{Logger, ProbeLogger},
    models::Catalog,
    output::OutputFormatterFactory,
    platform::{HostNetworkState, NetworkStateProvider, SnapshotFile},
    NetworkDiagnostics, NetworkProber, PKG_NAME, VERSION,
};
use std::{process, sync::Arc};

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    let cli = Cli::parse();
    let use_color = cli.use_colors();

    match run_application(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}", e.format_for_console(use_color));
            print_error_suggestions(&e);
            process::exit(e.exit_code());
        }
    }
}

/// Main application logic; returns the process exit code
fn run_application(cli: Cli) -> Result<i32> {
    if cli.debug {
        eprintln!("{} v{}", PKG_NAME, VERSION);
        eprintln!("Debug mode enabled");
        eprintln!();
    }

    let config = load_config(cli.clone())?;
    let catalog = Catalog::load(config.catalog_path.as_deref())?;

    if cli.print_catalog {
        println!("{}", catalog.to_json_pretty()?);
        return Ok(0);
    }

    let formatter = OutputFormatterFactory::create(config.output_json, config.enable_color && cli.use_colors());

    for warning in validate_config(&config, &catalog)? {
        eprintln!("{}", warning.format(config.enable_color));
    }
    if config.debug {
        eprintln!("Configuration loaded successfully:");
        eprintln!("{}", display_config_summary(&config));
        eprintln!();
    }

    let probe_logger = ProbeLogger::new(Logger::with_config("PROBE", &config));
    let prober = NetworkProber::new()?.with_logger(probe_logger.clone());
    let provider: Box<dyn NetworkStateProvider> = match config.snapshot_path.as_deref() {
        Some(path) => Box::new(SnapshotFile::new(path)),
        None => Box::new(HostNetworkState::new()),
    };
    let diagnostics =
        NetworkDiagnostics::new(config, catalog, Arc::new(prober))?.with_probe_logger(probe_logger);

    let report = diagnostics.run_blocking(provider.as_ref());
    println!("{}", formatter.format_report(&report)?);

    Ok(report.exit_code)
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) | AppError::Validation(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check your .env file format");
            eprintln!("  - Timeouts are milliseconds and must be greater than 0");
            eprintln!("  - Run with --print-catalog to see the catalog in effect");
        }
        AppError::Parse(_) | AppError::Io(_) => {
            eprintln!();
            eprintln!("Catalog help:");
            eprintln!("  - The catalog must be a JSON object; omitted sections keep built-in values");
            eprintln!("  - Sinkhole ranges use CIDR notation, e.g. 10.0.0.0/8");
        }
        _ => {}
    }
}
