use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::android::{DeviceHandle, DeviceRecord};
use crate::wire::Capabilities;

pub mod ports;

pub use ports::{EmulatorPortFinder, PortCounter};

// -----------------------------------------------------------------------------
// ----- DeviceStoreError ------------------------------------------------------

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeviceStoreError {
    #[error("the device store does not contain any device")]
    EmptyStore,

    #[error("no device with target platform '{0}' is registered")]
    UnknownPlatform(String),

    #[error(
        "no device available: matching devices are in use or no device \
         satisfies the requested capabilities"
    )]
    NoneAvailable,
}

// -----------------------------------------------------------------------------
// ----- AllocatedDevice -------------------------------------------------------

/// A device leased to exactly one session. Returned by `DeviceStore::allocate`
/// and handed back with `DeviceStore::release`.
#[derive(Clone)]
pub struct AllocatedDevice {
    pub record: DeviceRecord,
    pub handle: Arc<dyn DeviceHandle>,
}

impl std::fmt::Debug for AllocatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatedDevice")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- DeviceStore -----------------------------------------------------------

struct PoolEntry {
    record: DeviceRecord,
    handle: Arc<dyn DeviceHandle>,
    in_use: bool,
}

/// The pool of known devices and emulators, grouped by target platform.
///
/// `allocate` is the single synchronization point for device state: candidate
/// filtering, the in-use check and the in-use flag update all happen under one
/// lock, and no I/O ever runs while it is held. Tie-break among equally
/// matching devices is pool order (first registered wins), a deliberate,
/// documented policy.
pub struct DeviceStore {
    inner: Mutex<HashMap<String, Vec<PoolEntry>>>,
    emulator_ports: EmulatorPortFinder,
}

#[derive(Clone, Debug)]
pub struct DeviceSnapshot {
    pub record: DeviceRecord,
    pub in_use: bool,
}

// -----------------------------------------------------------------------------
// ----- DeviceStore: Static ---------------------------------------------------

impl DeviceStore {
    pub fn new(emulator_port_min: u16, emulator_port_max: u16) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            emulator_ports: EmulatorPortFinder::new(emulator_port_min, emulator_port_max),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- DeviceStore: Public ---------------------------------------------------

impl DeviceStore {
    pub fn register(&self, record: DeviceRecord, handle: Arc<dyn DeviceHandle>) {
        info!("adding device {} (platform {})", record.id, record.platform);
        let mut inner = self.inner.lock();
        let group = inner.entry(record.platform.clone()).or_default();
        if group.iter().any(|entry| entry.record.id == record.id) {
            warn!("device {} is already registered, ignoring", record.id);
            return;
        }
        group.push(PoolEntry {
            record,
            handle,
            in_use: false,
        });
    }

    /// Lease the first free device matching the requested capabilities.
    pub fn allocate(&self, caps: &Capabilities) -> Result<AllocatedDevice, DeviceStoreError> {
        let mut inner = self.inner.lock();
        if inner.is_empty() {
            return Err(DeviceStoreError::EmptyStore);
        }

        // Deterministic candidate order: the requested platform group, or all
        // groups in sorted platform order when the request names none.
        let platforms: Vec<String> = match caps.platform_version() {
            Some(platform) => {
                if !inner.contains_key(platform) {
                    return Err(DeviceStoreError::UnknownPlatform(platform.to_owned()));
                }
                vec![platform.to_owned()]
            }
            None => {
                let mut all: Vec<String> = inner.keys().cloned().collect();
                all.sort();
                all
            }
        };

        for platform in platforms {
            let group = inner.get_mut(&platform).expect("platform group exists");
            for entry in group.iter_mut() {
                if !entry.in_use && device_satisfies(&entry.record, caps) {
                    entry.in_use = true;
                    info!("leasing device {} to a new session", entry.record.id);
                    return Ok(AllocatedDevice {
                        record: entry.record.clone(),
                        handle: entry.handle.clone(),
                    });
                }
            }
        }

        Err(DeviceStoreError::NoneAvailable)
    }

    /// Return a leased device to the pool.
    pub fn release(&self, device_id: &str) {
        let mut inner = self.inner.lock();
        for group in inner.values_mut() {
            for entry in group.iter_mut() {
                if entry.record.id == device_id {
                    if entry.in_use {
                        info!("releasing device {device_id}");
                        entry.in_use = false;
                    } else {
                        warn!("release of device {device_id} which was not in use");
                    }
                    return;
                }
            }
        }
        warn!("release of unknown device {device_id}");
    }

    /// Next free emulator console port, or `None` when the window is
    /// exhausted.
    pub fn next_console_port(&self) -> Option<u16> {
        self.emulator_ports.next()
    }

    pub fn release_console_port(&self, port: u16) {
        self.emulator_ports.release(port);
    }

    /// All devices with their lease state, sorted by platform then pool order.
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let inner = self.inner.lock();
        let mut platforms: Vec<&String> = inner.keys().collect();
        platforms.sort();

        let mut devices = Vec::new();
        for platform in platforms {
            for entry in &inner[platform] {
                devices.push(DeviceSnapshot {
                    record: entry.record.clone(),
                    in_use: entry.in_use,
                });
            }
        }
        devices
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: capability matching -----------------------------------------

fn device_satisfies(record: &DeviceRecord, caps: &Capabilities) -> bool {
    if !record.screen_size_matches(caps.screen_size()) {
        return false;
    }
    if let Some(wants_emulator) = caps.emulator() {
        if record.emulator != wants_emulator {
            return false;
        }
    }
    if let Some(serial) = caps.serial() {
        if record.id != serial {
            return false;
        }
    }
    true
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
