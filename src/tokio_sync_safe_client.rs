//! Shared, thread-safe access to a single [`Transport`].
//!
//! The serial bus physically carries one transaction at a time. `SafeClient`
//! wraps the transport in an `Arc<FairMutex<_>>` and holds the lock for
//! exactly one register transaction. The lock is handed over to a waiting
//! thread when a transaction ends, so a write issued while a poll cycle runs
//! waits for the current register only, not for the whole cycle.
//!
//! ## Example
//!
//! ```no_run
//! use mirai_lib::{
//!     protocol::{Address, BaudRate},
//!     tokio_sync_client::RtuClient,
//!     tokio_sync_safe_client::SafeClient,
//!     transport::Transport,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rtu = RtuClient::new("/dev/ttyUSB0", &BaudRate::B9600, Address::default());
//!     let mut poller = SafeClient::new(rtu);
//!     let mut writer = poller.clone();
//!
//!     let level = poller.read_register(16387)?;
//!     writer.write_register(16387, level)?;
//!     Ok(())
//! }
//! ```

use crate::{tokio_common::Result, transport::Transport};
use parking_lot::{FairMutex, FairMutexGuard};
use std::sync::Arc;

/// Cloneable handle serializing transactions on a shared transport.
#[derive(Debug)]
pub struct SafeClient<T> {
    transport: Arc<FairMutex<T>>,
}

impl<T> Clone for SafeClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
        }
    }
}

impl<T: Transport> SafeClient<T> {
    /// Creates a new `SafeClient` owning `transport`.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(FairMutex::new(transport)),
        }
    }

    /// Creates a new `SafeClient` from an already shared transport.
    pub fn from_shared(transport: Arc<FairMutex<T>>) -> Self {
        Self { transport }
    }

    /// Clones the shared transport.
    pub fn clone_shared(&self) -> Arc<FairMutex<T>> {
        self.transport.clone()
    }

    /// Acquires the line. Dropping the guard passes it to the next waiter.
    fn lock(&self) -> FairMutexGuard<'_, T> {
        self.transport.lock()
    }
}

impl<T: Transport> Transport for SafeClient<T> {
    fn read_register(&mut self, address: u16) -> Result<u16> {
        self.lock().read_register(address)
    }

    fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        self.lock().write_register(address, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{Call, MockTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Holds the line for a while on every transaction.
    struct SlowTransport {
        inner: MockTransport,
        reads: Arc<AtomicUsize>,
    }

    impl Transport for SlowTransport {
        fn read_register(&mut self, address: u16) -> Result<u16> {
            std::thread::sleep(Duration::from_millis(20));
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_register(address)
        }

        fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
            std::thread::sleep(Duration::from_millis(20));
            self.inner.write_register(address, value)
        }
    }

    #[test]
    fn clones_share_one_transport() {
        let mut poller = SafeClient::new(MockTransport::with_registers(&[(8973, 215)]));
        let mut writer = poller.clone();

        assert_eq!(poller.read_register(8973).unwrap(), 215);
        writer.write_register(16387, 500).unwrap();
        assert_eq!(poller.read_register(16387).unwrap(), 500);

        let shared = poller.clone_shared();
        let transport = shared.lock();
        assert_eq!(
            transport.calls,
            vec![Call::Read(8973), Call::Write(16387, 500), Call::Read(16387)]
        );
    }

    #[test]
    fn transactions_from_threads_are_serialized() {
        let client = SafeClient::new(MockTransport::with_registers(&[(8973, 1)]));
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let mut client = client.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        client.read_register(8973).unwrap();
                        client.write_register(16398, n).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let shared = SafeClient::from_shared(client.clone_shared()).clone_shared();
        assert_eq!(shared.lock().calls.len(), 200);
    }

    #[test]
    fn write_waits_for_one_read_only() {
        let reads = Arc::new(AtomicUsize::new(0));
        let registers: Vec<(u16, u16)> = (0..10).map(|n| (8960 + n, n)).collect();
        let client = SafeClient::new(SlowTransport {
            inner: MockTransport::with_registers(&registers),
            reads: reads.clone(),
        });

        let mut poller = client.clone();
        let cycle = std::thread::spawn(move || {
            for (address, _) in registers {
                poller.read_register(address).unwrap();
            }
        });

        while reads.load(Ordering::SeqCst) < 2 {
            std::thread::sleep(Duration::from_millis(1));
        }
        let reads_before_request = reads.load(Ordering::SeqCst);
        let mut writer = client.clone();
        writer.write_register(16387, 500).unwrap();
        cycle.join().unwrap();

        let shared = client.clone_shared();
        let transport = shared.lock();
        let calls = &transport.inner.calls;
        assert_eq!(calls.len(), 11);
        let write_position = calls
            .iter()
            .position(|call| *call == Call::Write(16387, 500))
            .unwrap();
        assert!(
            write_position <= reads_before_request + 1,
            "write issued after {reads_before_request} reads landed at {write_position}"
        );
    }
}
