//! Last-known values of the catalog points.
//!
//! The poll engine owns the cache and stores every successful read. The
//! command handler holds a clone of the same handle: it may read entries, and
//! only stores values through a write echo.

use crate::catalog::{Catalog, PointDefinition, PointKind};
use crate::protocol as proto;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Where the current value of a point comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    /// Read back from the device by a poll cycle.
    Read,
    /// Written and acknowledged by the device, not read back yet.
    WriteConfirmed,
    /// Requested by a write whose outcome was not taken into account.
    WriteRequested,
}

/// A raw register and the values decoded from it.
///
/// Only built through [`Reading::decode`], so the display value and on/off
/// state always match the raw value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    raw: u16,
    value: f64,
    on: Option<bool>,
}

impl Reading {
    pub fn decode(definition: &PointDefinition, raw: u16) -> Self {
        let on = match definition.kind {
            PointKind::OnOffDimmer => Some(proto::dimmer_is_on(raw)),
            PointKind::ContinuousValue => None,
        };
        Self {
            raw,
            value: definition.decode(raw),
            on,
        }
    }

    pub fn raw(&self) -> u16 {
        self.raw
    }

    /// Display value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// On/off state, only for dimmers.
    pub fn on(&self) -> Option<bool> {
        self.on
    }
}

/// Cache entry of one point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointValue {
    reading: Option<Reading>,
    origin: Option<ValueOrigin>,
    last_updated: Option<SystemTime>,
}

impl PointValue {
    pub fn reading(&self) -> Option<&Reading> {
        self.reading.as_ref()
    }

    pub fn raw_value(&self) -> Option<u16> {
        self.reading.map(|reading| reading.raw)
    }

    pub fn display_value(&self) -> Option<f64> {
        self.reading.map(|reading| reading.value)
    }

    pub fn is_on(&self) -> Option<bool> {
        self.reading.and_then(|reading| reading.on)
    }

    pub fn origin(&self) -> Option<ValueOrigin> {
        self.origin
    }

    /// Time of the last successful read. Writes never change it.
    pub fn last_updated(&self) -> Option<SystemTime> {
        self.last_updated
    }
}

/// What the core hands to a presentation layer for each point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointView {
    pub name: String,
    pub display_value: Option<f64>,
    pub on: Option<bool>,
    pub writable: bool,
    pub kind: PointKind,
    pub last_updated: Option<SystemTime>,
}

/// Shared handle on the point values, keyed by point name.
#[derive(Debug, Clone)]
pub struct PointCache {
    values: Arc<Mutex<HashMap<String, PointValue>>>,
}

impl PointCache {
    /// Creates an empty entry for every point of `catalog`.
    pub fn new(catalog: &Catalog) -> Self {
        let values = catalog
            .iter()
            .map(|point| (point.name.clone(), PointValue::default()))
            .collect();
        Self {
            values: Arc::new(Mutex::new(values)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PointValue>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<PointValue> {
        self.lock().get(name).cloned()
    }

    /// Presentation records for every point, in catalog order.
    pub fn views(&self, catalog: &Catalog) -> Vec<PointView> {
        let values = self.lock();
        catalog
            .iter()
            .map(|point| {
                let value = values.get(&point.name).cloned().unwrap_or_default();
                PointView {
                    name: point.name.clone(),
                    display_value: value.display_value(),
                    on: value.is_on(),
                    writable: point.writable,
                    kind: point.kind,
                    last_updated: value.last_updated(),
                }
            })
            .collect()
    }

    /// Stores a successful read and returns the entry it replaced.
    pub(crate) fn record_read(
        &self,
        definition: &PointDefinition,
        raw: u16,
        at: SystemTime,
    ) -> PointValue {
        let mut values = self.lock();
        let entry = values.entry(definition.name.clone()).or_default();
        let previous = entry.clone();
        entry.reading = Some(Reading::decode(definition, raw));
        entry.origin = Some(ValueOrigin::Read);
        entry.last_updated = Some(at);
        previous
    }

    /// Stores a written value, keeping the last read timestamp.
    pub(crate) fn record_write(
        &self,
        definition: &PointDefinition,
        raw: u16,
        origin: ValueOrigin,
    ) -> Reading {
        let reading = Reading::decode(definition, raw);
        let mut values = self.lock();
        let entry = values.entry(definition.name.clone()).or_default();
        entry.reading = Some(reading);
        entry.origin = Some(origin);
        reading
    }
}
