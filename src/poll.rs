//! The poll cycle engine.
//!
//! The engine is driven by timer ticks. It stays idle until the accumulated
//! tick time reaches the current poll interval, then reads every catalog
//! point once, in catalog order, and goes back to idle.
//!
//! A cycle with at least one failed read lengthens the interval by one second;
//! a clean cycle resets it to the configured base in one step. Failed reads
//! are logged and leave the cached value untouched: the engine never stops on
//! its own.

use crate::cache::{PointCache, ValueOrigin};
use crate::catalog::Catalog;
use crate::transport::Transport;
use log::*;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Longest timer tick the host scheduler is asked for.
pub const MAX_TICK_SECONDS: u32 = 30;

/// Selectable poll intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollInterval {
    S10,
    S20,
    #[default]
    S30,
    S60,
    S120,
    S240,
}

impl PollInterval {
    pub const ALL: [PollInterval; 6] = [
        PollInterval::S10,
        PollInterval::S20,
        PollInterval::S30,
        PollInterval::S60,
        PollInterval::S120,
        PollInterval::S240,
    ];

    pub const fn as_secs(&self) -> u32 {
        match self {
            PollInterval::S10 => 10,
            PollInterval::S20 => 20,
            PollInterval::S30 => 30,
            PollInterval::S60 => 60,
            PollInterval::S120 => 120,
            PollInterval::S240 => 240,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported poll interval {0}s (supported: 10, 20, 30, 60, 120, 240)")]
pub struct InvalidPollInterval(pub u32);

impl TryFrom<u32> for PollInterval {
    type Error = InvalidPollInterval;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|interval| interval.as_secs() == value)
            .ok_or(InvalidPollInterval(value))
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs())
    }
}

/// Interval bookkeeping of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    base_interval: u32,
    current_interval: u32,
    accumulated: u32,
}

impl PollState {
    pub fn new(interval: PollInterval) -> Self {
        Self {
            base_interval: interval.as_secs(),
            current_interval: interval.as_secs(),
            accumulated: 0,
        }
    }

    pub fn base_interval(&self) -> u32 {
        self.base_interval
    }

    pub fn current_interval(&self) -> u32 {
        self.current_interval
    }

    pub fn accumulated(&self) -> u32 {
        self.accumulated
    }

    /// Adds elapsed tick time; returns `true` once a poll is due.
    pub fn advance(&mut self, elapsed_secs: u32) -> bool {
        self.accumulated = self.accumulated.saturating_add(elapsed_secs);
        self.is_due()
    }

    pub fn is_due(&self) -> bool {
        self.accumulated >= self.current_interval
    }

    /// Seconds until the next tick: the remaining interval, capped at
    /// [`MAX_TICK_SECONDS`].
    pub fn next_tick(&self) -> u32 {
        self.current_interval
            .saturating_sub(self.accumulated)
            .clamp(1, MAX_TICK_SECONDS)
    }

    /// Applies the back-off rule after a cycle and goes back to idle.
    pub fn finish_cycle(&mut self, errors: usize) {
        self.accumulated = 0;
        if errors > 0 {
            self.current_interval = self.current_interval.saturating_add(1);
        } else if self.current_interval != self.base_interval {
            self.current_interval = self.base_interval;
        }
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Points read successfully.
    pub read: usize,
    /// Points whose read failed.
    pub errors: usize,
    /// Poll interval in effect after the cycle, in seconds.
    pub interval: u32,
}

/// Reads the catalog through a transport and keeps the cache current.
pub struct PollEngine<T> {
    catalog: Arc<Catalog>,
    transport: T,
    cache: PointCache,
    state: PollState,
    debug: bool,
}

impl<T: Transport> PollEngine<T> {
    pub fn new(catalog: Arc<Catalog>, transport: T, interval: PollInterval) -> Self {
        let cache = PointCache::new(&catalog);
        Self {
            catalog,
            transport,
            cache,
            state: PollState::new(interval),
            debug: false,
        }
    }

    /// Logs every decoded register at `info` level instead of `trace`.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// A handle on the cache, for the command handler and presentation.
    pub fn cache(&self) -> PointCache {
        self.cache.clone()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// How long the host should wait before calling [`PollEngine::tick`].
    pub fn next_tick(&self) -> Duration {
        Duration::from_secs(self.state.next_tick() as u64)
    }

    /// Accounts for `elapsed_secs` of timer time and polls if the interval
    /// has elapsed.
    pub fn tick(&mut self, elapsed_secs: u32) -> Option<CycleReport> {
        if self.state.advance(elapsed_secs) {
            Some(self.run_cycle())
        } else {
            None
        }
    }

    /// Reads every catalog point once.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut read = 0;
        let mut errors = 0;
        for definition in self.catalog.iter() {
            match self.transport.read_register(definition.address) {
                Ok(raw) => {
                    read += 1;
                    let previous = self.cache.record_read(definition, raw, SystemTime::now());
                    let value = definition.decode(raw);
                    if self.debug {
                        info!(
                            "{}, address={}, raw={raw}, value={value}",
                            definition.name, definition.address
                        );
                    } else {
                        trace!(
                            "{}, address={}, raw={raw}, value={value}",
                            definition.name, definition.address
                        );
                    }
                    let written = matches!(
                        previous.origin(),
                        Some(ValueOrigin::WriteConfirmed | ValueOrigin::WriteRequested)
                    );
                    if let Some(old) = previous.raw_value().filter(|_| written) {
                        if old != raw {
                            info!(
                                "{}: device reports raw {raw}, cache held written raw {old}",
                                definition.name
                            );
                        }
                    }
                }
                Err(error) => {
                    errors += 1;
                    warn!(
                        "Cannot read {} (register {}): {error}",
                        definition.name, definition.address
                    );
                }
            }
        }

        let previous_interval = self.state.current_interval();
        self.state.finish_cycle(errors);
        if self.state.current_interval() != previous_interval {
            debug!(
                "Poll interval changed from {previous_interval}s to {}s after {errors} error(s)",
                self.state.current_interval()
            );
        }
        CycleReport {
            read,
            errors,
            interval: self.state.current_interval(),
        }
    }
}
