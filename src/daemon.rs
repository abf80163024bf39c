//! Continuous polling with write commands read from standard input.

use anyhow::{Context, Result};
use log::*;
use mirai_lib::{command::CommandHandler, poll::PollEngine, transport::Transport};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLEEP_STEP: Duration = Duration::from_secs(1);

/// Splits a "<POINT> <VALUE>" command line.
fn parse_command(line: &str) -> Option<std::result::Result<(&str, f64), String>> {
    let mut parts = line.split_whitespace();
    let point = parts.next()?;
    let result = match (parts.next(), parts.next()) {
        (Some(value), None) => value
            .parse::<f64>()
            .map(|value| (point, value))
            .map_err(|e| format!("Invalid value '{value}': {e}")),
        _ => Err(String::from("Expected: <POINT> <VALUE>")),
    };
    Some(result)
}

fn spawn_command_reader<T>(mut handler: CommandHandler<T>) -> Result<()>
where
    T: Transport + Send + 'static,
{
    std::thread::Builder::new()
        .name(String::from("commands"))
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(error) => {
                        error!("Cannot read command: {error}");
                        break;
                    }
                };
                match parse_command(&line) {
                    None => continue,
                    Some(Err(message)) => println!("{message}"),
                    Some(Ok((point, value))) => match handler.submit_write(point, value) {
                        Ok(applied) => println!("{point} set to {applied}"),
                        Err(error) => println!("Cannot write {point}: {error}"),
                    },
                }
            }
            debug!("Command input closed");
        })
        .context("Cannot start command reader")?;
    Ok(())
}

/// Whole seconds elapsed since `mark`; the mark advances by that amount so
/// sub-second remainders carry over to the next tick.
fn take_elapsed_secs(mark: &mut Instant, now: Instant) -> u32 {
    let secs = now.saturating_duration_since(*mark).as_secs();
    *mark += Duration::from_secs(secs);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// Sleeps `duration` in small steps; returns `false` if stopped meanwhile.
fn sleep_while_running(running: &AtomicBool, duration: Duration) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(SLEEP_STEP);
        std::thread::sleep(step);
        remaining -= step;
    }
    running.load(Ordering::SeqCst)
}

pub fn run<T>(mut engine: PollEngine<T>, handler: CommandHandler<T>, lang: &str) -> Result<()>
where
    T: Transport + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        trace!("Received Ctrl-C")
    })
    .context("Error setting Ctrl-C handler")?;

    spawn_command_reader(handler)?;

    let catalog = engine.catalog().clone();
    // Cycle time counts towards the next interval.
    let mut mark = Instant::now();
    let report = engine.run_cycle();
    debug!("Initial cycle: {report:?}");
    crate::print_points(&catalog, &engine.cache().views(&catalog), lang);

    loop {
        let tick = engine.next_tick().saturating_sub(mark.elapsed());
        if !sleep_while_running(&running, tick) {
            break;
        }
        let elapsed = take_elapsed_secs(&mut mark, Instant::now());
        if let Some(report) = engine.tick(elapsed) {
            debug!("Cycle finished: {report:?}");
            crate::print_points(&catalog, &engine.cache().views(&catalog), lang);
        }
    }
    info!("Stopping...");
    Ok(())
}
