use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU16, Ordering};

use parking_lot::Mutex;

// -----------------------------------------------------------------------------
// ----- PortCounter -----------------------------------------------------------

/// Monotonic counter for instrumentation-server forward ports. `next` is
/// linearizable: no two concurrent session bring-ups ever see the same port.
#[derive(Debug)]
pub struct PortCounter {
    next: AtomicU16,
}

impl PortCounter {
    pub fn new(base: u16) -> Self {
        Self {
            next: AtomicU16::new(base),
        }
    }

    pub fn next(&self) -> u16 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

// -----------------------------------------------------------------------------
// ----- EmulatorPortFinder ----------------------------------------------------

/// Allocates emulator console ports from a fixed window. The emulator tool
/// only accepts even console ports, so odd ports in the window are never
/// handed out. Lowest free port first.
#[derive(Debug)]
pub struct EmulatorPortFinder {
    inner: Mutex<PortsInner>,
    min: u16,
    max: u16,
}

#[derive(Debug)]
struct PortsInner {
    available: BTreeSet<u16>,
    in_use: BTreeSet<u16>,
}

impl EmulatorPortFinder {
    pub fn new(min: u16, max: u16) -> Self {
        let available = (min..=max).filter(|port| port % 2 == 0).collect();
        Self {
            inner: Mutex::new(PortsInner {
                available,
                in_use: BTreeSet::new(),
            }),
            min,
            max,
        }
    }

    pub fn next(&self) -> Option<u16> {
        let mut inner = self.inner.lock();
        let port = inner.available.pop_first()?;
        inner.in_use.insert(port);
        Some(port)
    }

    pub fn release(&self, port: u16) {
        let mut inner = self.inner.lock();
        inner.in_use.remove(&port);
        if port >= self.min && port <= self.max && port % 2 == 0 {
            inner.available.insert(port);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
