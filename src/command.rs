//! Write requests from the user to writable points.
//!
//! A request names a point and a value in display units. It is validated
//! against the catalog, clamped to the point's bounds, encoded and written
//! with a single-register write. The cache only changes when the device
//! acknowledges the write, with one exception: dimmer points are stored on
//! request, before the outcome of the write is known. The next poll cycle
//! replaces that value with what the device actually reports.

use crate::cache::{PointCache, ValueOrigin};
use crate::catalog::{Catalog, PointDefinition, PointKind};
use crate::transport::Transport;
use crate::{Error, Result};
use log::*;
use std::sync::Arc;

/// Validates and issues writes to catalog points.
pub struct CommandHandler<T> {
    catalog: Arc<Catalog>,
    transport: T,
    cache: PointCache,
}

impl<T: Transport> CommandHandler<T> {
    pub fn new(catalog: Arc<Catalog>, transport: T, cache: PointCache) -> Self {
        Self {
            catalog,
            transport,
            cache,
        }
    }

    /// Writes `requested` (display units) to the point named `name`.
    ///
    /// Returns the display value now held in the cache, after clamping and
    /// rounding to the register resolution.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] if no point has that name.
    /// * [`Error::NotWritable`] for read-only points; nothing is sent.
    /// * [`Error::InvalidValue`] if the value cannot be encoded; nothing is sent.
    /// * [`Error::Transport`] if the write transaction fails.
    pub fn submit_write(&mut self, name: &str, requested: f64) -> Result<f64> {
        let catalog = Arc::clone(&self.catalog);
        let definition = catalog.by_name(name)?;
        self.write(definition, requested)
    }

    /// Like [`CommandHandler::submit_write`], resolving the point by register
    /// address.
    pub fn submit_write_to_address(&mut self, address: u16, requested: f64) -> Result<f64> {
        let catalog = Arc::clone(&self.catalog);
        let definition = catalog.by_address(address)?;
        self.write(definition, requested)
    }

    fn write(&mut self, definition: &PointDefinition, requested: f64) -> Result<f64> {
        if !definition.writable {
            return Err(Error::NotWritable(definition.name.clone()));
        }

        let value = match &definition.bounds {
            Some(bounds) if !requested.is_nan() => {
                let clamped = bounds.clamp(requested);
                if clamped != requested {
                    debug!(
                        "{}: requested {requested} clamped to {clamped}",
                        definition.name
                    );
                }
                clamped
            }
            _ => requested,
        };
        let raw = definition
            .encode(value)
            .map_err(|source| Error::InvalidValue {
                name: definition.name.clone(),
                source,
            })?;

        if definition.kind == PointKind::OnOffDimmer {
            self.cache
                .record_write(definition, raw, ValueOrigin::WriteRequested);
        }

        info!(
            "Writing {} (register {}): value={value}, raw={raw}",
            definition.name, definition.address
        );
        if let Err(error) = self.transport.write_register(definition.address, raw) {
            warn!("Cannot write {}: {error}", definition.name);
            return Err(error.into());
        }

        let reading = self
            .cache
            .record_write(definition, raw, ValueOrigin::WriteConfirmed);
        Ok(reading.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::{PollEngine, PollInterval};
    use crate::tokio_sync_safe_client::SafeClient;
    use crate::transport::mock::MockTransport;
    use crate::PointKey;
    use assert_matches::assert_matches;

    fn handler(
        catalog: Catalog,
        mock: MockTransport,
    ) -> (CommandHandler<SafeClient<MockTransport>>, SafeClient<MockTransport>) {
        let catalog = Arc::new(catalog);
        let transport = SafeClient::new(mock);
        let cache = PointCache::new(&catalog);
        (
            CommandHandler::new(catalog, transport.clone(), cache),
            transport,
        )
    }

    fn mirai() -> Catalog {
        Catalog::emmeti_mirai().unwrap()
    }

    #[test]
    fn unknown_point() {
        let (mut handler, transport) = handler(mirai(), MockTransport::default());
        assert_matches!(
            handler.submit_write("NOPE", 1.0),
            Err(Error::NotFound(PointKey::Name(name))) if name == "NOPE"
        );
        assert_matches!(
            handler.submit_write_to_address(1234, 1.0),
            Err(Error::NotFound(PointKey::Address(1234)))
        );
        assert!(transport.clone_shared().lock().calls.is_empty());
    }

    #[test]
    fn read_only_point_issues_no_transaction() {
        let (mut handler, transport) = handler(mirai(), MockTransport::default());
        assert_matches!(
            handler.submit_write("TEMP_EXTERNAL", 20.0),
            Err(Error::NotWritable(name)) if name == "TEMP_EXTERNAL"
        );
        assert_matches!(
            handler.submit_write_to_address(8996, 50.0),
            Err(Error::NotWritable(..))
        );
        assert_eq!(transport.clone_shared().lock().calls.len(), 0);
    }

    #[test]
    fn value_above_bounds_is_clamped() {
        let catalog = Catalog::new(vec![PointDefinition::continuous("SP", 16398)
            .writable()
            .scale(1)
            .bounds(10.0, 60.0, 1.0)])
        .unwrap();
        let (mut handler, transport) = handler(catalog, MockTransport::default());
        assert_eq!(handler.submit_write("SP", 75.0).unwrap(), 60.0);
        assert_eq!(handler.submit_write("SP", 2.0).unwrap(), 10.0);
        assert_eq!(
            transport.clone_shared().lock().writes(),
            vec![(16398, 60), (16398, 10)]
        );
    }

    #[test]
    fn setpoint_is_encoded_with_scale() {
        let (mut handler, transport) = handler(mirai(), MockTransport::default());
        assert_eq!(handler.submit_write("SP_SUMMER_MIN", 7.5).unwrap(), 7.5);
        assert_eq!(
            transport.clone_shared().lock().writes(),
            vec![(16427, 75)]
        );
        let cached = handler.cache.get("SP_SUMMER_MIN").unwrap();
        assert_eq!(cached.display_value(), Some(7.5));
        assert_eq!(cached.origin(), Some(ValueOrigin::WriteConfirmed));
        assert_eq!(cached.last_updated(), None);
    }

    #[test]
    fn write_by_address() {
        let (mut handler, transport) = handler(mirai(), MockTransport::default());
        assert_eq!(handler.submit_write_to_address(16421, 42.5).unwrap(), 42.5);
        assert_eq!(
            transport.clone_shared().lock().writes(),
            vec![(16421, 425)]
        );
        let cached = handler.cache.get("SP_WINTER_MAX").unwrap();
        assert_eq!(cached.raw_value(), Some(425));
        assert_eq!(cached.display_value(), Some(42.5));
        assert_eq!(cached.origin(), Some(ValueOrigin::WriteConfirmed));
    }

    #[test]
    fn non_finite_value_is_rejected() {
        let (mut handler, transport) = handler(mirai(), MockTransport::default());
        assert_matches!(
            handler.submit_write("SP_HOTWATER", f64::NAN),
            Err(Error::InvalidValue { .. })
        );
        assert!(transport.clone_shared().lock().calls.is_empty());
    }

    #[test]
    fn compressor_max_end_to_end() {
        let catalog = Catalog::new(vec![PointDefinition::dimmer("COMPRESSOR_MAX", 16387)
            .writable()
            .bounds(0.0, 100.0, 1.0)])
        .unwrap();
        let (mut handler, transport) = handler(catalog, MockTransport::default());

        assert_eq!(handler.submit_write("COMPRESSOR_MAX", 150.0).unwrap(), 100.0);
        assert_eq!(
            transport.clone_shared().lock().writes(),
            vec![(16387, 1000)]
        );
        let cached = handler.cache.get("COMPRESSOR_MAX").unwrap();
        assert_eq!(cached.display_value(), Some(100.0));
        assert_eq!(cached.is_on(), Some(true));
    }

    #[test]
    fn failed_setpoint_write_leaves_cache_untouched() {
        let mut mock = MockTransport::default();
        mock.fail(16398);
        let (mut handler, _) = handler(mirai(), mock);

        assert_matches!(
            handler.submit_write("SP_HOTWATER", 45.0),
            Err(Error::Transport(..))
        );
        assert_eq!(
            handler.cache.get("SP_HOTWATER").unwrap(),
            Default::default()
        );
    }

    #[test]
    fn failed_dimmer_write_updates_cache_on_request() {
        let mut mock = MockTransport::default();
        mock.fail(16387);
        let (mut handler, _) = handler(mirai(), mock);

        assert_matches!(
            handler.submit_write("COMPRESSOR_MAX", 0.0),
            Err(Error::Transport(..))
        );
        let cached = handler.cache.get("COMPRESSOR_MAX").unwrap();
        assert_eq!(cached.display_value(), Some(0.0));
        assert_eq!(cached.is_on(), Some(false));
        assert_eq!(cached.origin(), Some(ValueOrigin::WriteRequested));
    }

    #[test]
    fn next_poll_reconciles_requested_dimmer_value() {
        let catalog = Arc::new(mirai());
        let mut mock = MockTransport::with_registers(&[(16387, 800)]);
        mock.fail(16387);
        let transport = SafeClient::new(mock);
        let mut engine = PollEngine::new(catalog.clone(), transport.clone(), PollInterval::S30);
        let mut handler = CommandHandler::new(catalog, transport.clone(), engine.cache());

        assert!(handler.submit_write("COMPRESSOR_MAX", 20.0).is_err());
        assert_eq!(
            engine.cache().get("COMPRESSOR_MAX").unwrap().display_value(),
            Some(20.0)
        );

        transport.clone_shared().lock().recover(16387);
        engine.run_cycle();
        let cached = engine.cache().get("COMPRESSOR_MAX").unwrap();
        assert_eq!(cached.display_value(), Some(80.0));
        assert_eq!(cached.origin(), Some(ValueOrigin::Read));
    }
}
