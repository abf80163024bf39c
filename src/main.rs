//! Emmeti Mirai heat pump CLI
//!
//! A command-line interface (CLI) application for polling and configuring an
//! Emmeti Mirai heat pump controller over Modbus RTU.
//!
//! This tool allows users to:
//! - List the points of the register catalog.
//! - Read all points once, or a single point.
//! - Write setpoints and the compressor limit.
//! - Run in a continuous daemon mode that polls the heat pump with adaptive
//!   back-off and accepts write commands on standard input.
//!
//! The CLI leverages the `mirai_lib` crate for the catalog, the poll engine and
//! the command handler.

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Confirm;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use mirai_lib::{
    cache::{PointCache, PointView},
    catalog::{Catalog, PointDefinition},
    command::CommandHandler,
    poll::{PollEngine, PollInterval},
    tokio_sync_client::RtuClient,
    tokio_sync_safe_client::SafeClient,
    transport::Transport,
    PointKey,
};
use std::{fs::File, panic, sync::Arc};

mod commandline;
mod daemon;

type Client = SafeClient<RtuClient>;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

fn load_catalog(args: &commandline::CliArgs) -> Result<Arc<Catalog>> {
    let catalog = match &args.catalog {
        Some(path) => {
            info!("Loading register catalog from {path:?}");
            let file = File::open(path)
                .with_context(|| format!("Cannot open catalog file {path:?}"))?;
            Catalog::from_yaml_reader(file)
                .with_context(|| format!("Invalid catalog file {path:?}"))?
        }
        None => Catalog::emmeti_mirai().context("Built-in catalog is inconsistent")?,
    };
    Ok(Arc::new(catalog))
}

fn create_client(args: &commandline::CliArgs) -> Client {
    info!(
        "Using RTU device {} (Address: {}, Baud: {})",
        args.device, args.address, args.baud_rate
    );
    let mut rtu = RtuClient::new(&args.device, &args.baud_rate, args.address);
    rtu.set_timeout(args.timeout);
    rtu.set_delay(args.delay);
    SafeClient::new(rtu)
}

fn resolve<'a>(catalog: &'a Catalog, point: &PointKey) -> mirai_lib::Result<&'a PointDefinition> {
    match point {
        PointKey::Name(name) => catalog.by_name(name),
        PointKey::Address(address) => catalog.by_address(*address),
    }
}

fn format_value(definition: &PointDefinition, view: &PointView) -> String {
    let unit = definition.unit.as_deref().unwrap_or("");
    match (view.display_value, view.on) {
        (Some(value), Some(on)) => format!("{value} {unit} ({})", if on { "on" } else { "off" }),
        (Some(value), None) => format!("{value} {unit}"),
        (None, _) => String::from("-"),
    }
}

/// Prints one line per point: label, value, access and age of the last read.
pub(crate) fn print_points(catalog: &Catalog, views: &[PointView], lang: &str) {
    for (definition, view) in catalog.iter().zip(views) {
        let updated = view
            .last_updated
            .map(|at| humantime::format_rfc3339_seconds(at).to_string())
            .unwrap_or_else(|| String::from("never"));
        println!(
            "{:<20} {:<28} {:>14} {} updated: {}",
            definition.name,
            definition.display_name(lang),
            format_value(definition, view),
            if view.writable { "rw" } else { "ro" },
            updated
        );
    }
}

fn print_catalog(catalog: &Catalog, lang: &str) {
    for point in catalog {
        let bounds = point
            .bounds
            .map(|b| format!("{}..={} step {}", b.min, b.max, b.step))
            .unwrap_or_default();
        println!(
            "{:<20} {:>5} {:<16} {} {:<6} /{:<3} {:<28} {}",
            point.name,
            point.address,
            point.kind.to_string(),
            if point.writable { "rw" } else { "ro" },
            if point.signed { "signed" } else { "" },
            point.scale,
            point.display_name(lang),
            bounds
        );
    }
}

fn confirm_write(definition: &PointDefinition, value: f64) -> Result<bool> {
    println!(
        "About to write {value} to {} (register {}) on the heat pump.",
        definition.name, definition.address
    );
    if let Some(bounds) = definition.bounds {
        println!(
            "Values outside {}..={} are clamped to the nearest limit.",
            bounds.min, bounds.max
        );
    }
    Confirm::new()
        .with_prompt("Do you want to continue?")
        .default(false)
        .show_default(true)
        .interact()
        .context("Failed to get user confirmation.")
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    // 1. Initialize logging as early as possible
    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "Heat pump CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    // 2. The catalog is trusted data: any inconsistency stops here
    let catalog = load_catalog(&args)?;

    // 3. Execute the command
    match &args.command {
        commandline::CliCommands::List => {
            print_catalog(&catalog, &args.lang);
        }
        commandline::CliCommands::Read => {
            info!("Executing: Read all points");
            let mut engine = PollEngine::new(
                catalog.clone(),
                create_client(&args),
                PollInterval::default(),
            );
            let report = engine.run_cycle();
            print_points(&catalog, &engine.cache().views(&catalog), &args.lang);
            if report.errors > 0 {
                warn!(
                    "{} of {} point(s) could not be read",
                    report.errors,
                    catalog.len()
                );
            }
        }
        commandline::CliCommands::ReadPoint { point } => {
            let definition = resolve(&catalog, point)?;
            info!("Executing: Read point {}", definition.name);
            let raw = create_client(&args)
                .read_register(definition.address)
                .with_context(|| format!("Cannot read {}", definition.name))?;
            let value = definition.decode(raw);
            println!(
                "{} ({}): {value} {} (raw {raw})",
                definition.name,
                definition.display_name(&args.lang),
                definition.unit.as_deref().unwrap_or("")
            );
        }
        commandline::CliCommands::Write { point, value, yes } => {
            let definition = resolve(&catalog, point)?;
            if !definition.writable {
                // Fails before the confirmation prompt
                return Err(mirai_lib::Error::NotWritable(definition.name.clone()).into());
            }
            if !yes && !confirm_write(definition, *value)? {
                info!("Write aborted by user.");
                return Ok(());
            }
            let client = create_client(&args);
            let cache = PointCache::new(&catalog);
            let mut handler = CommandHandler::new(catalog.clone(), client, cache);
            let applied = handler
                .submit_write(&definition.name, *value)
                .with_context(|| format!("Failed to write {value} to {}", definition.name))?;
            println!(
                "{} set to {applied} {} successfully.",
                definition.name,
                definition.unit.as_deref().unwrap_or("")
            );
        }
        commandline::CliCommands::Daemon {
            poll_interval,
            debug,
        } => {
            info!("Starting daemon mode: interval={poll_interval}, debug={debug}");
            let client = create_client(&args);
            let engine = PollEngine::new(catalog.clone(), client.clone(), *poll_interval)
                .with_debug(*debug);
            let handler = CommandHandler::new(catalog.clone(), client, engine.cache());
            daemon::run(engine, handler, &args.lang)?;
        }
    }

    Ok(())
}
