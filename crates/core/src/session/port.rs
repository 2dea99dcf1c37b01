use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

/// Lowest port handed out by the process-wide allocator (inclusive).
pub const MIN_PORT: u32 = 1024;
/// Upper bound of the process-wide allocator (exclusive).
pub const MAX_PORT: u32 = 65536;

static GLOBAL: OnceLock<Arc<PortAllocator>> = OnceLock::new();

/// Hands out even-numbered local RTP ports from `[low, high)`.
///
/// Per RFC 3550 §11, RTP uses an even port and RTCP the following odd one,
/// so the cursor advances by 2 and wraps back to `low` at `high`. The
/// allocator never checks whether a port is free; callers detect bind
/// failure and ask again, giving up after [`cycle_len`](Self::cycle_len)
/// attempts.
#[derive(Debug)]
pub struct PortAllocator {
    low: u32,
    high: u32,
    next: Mutex<u32>,
}

impl PortAllocator {
    /// Create an allocator over `[low, high)`. An odd `low` is rounded up.
    /// `high` is clamped to 65536 and to at least one usable port.
    pub fn new(low: u16, high: u32) -> Self {
        let low = ((u32::from(low) + 1) & !1).min(MAX_PORT - 2);
        let high = high.clamp(low + 1, MAX_PORT);
        Self {
            low,
            high,
            next: Mutex::new(low),
        }
    }

    /// The allocator shared by every session in the process.
    pub fn global() -> Arc<PortAllocator> {
        GLOBAL
            .get_or_init(|| Arc::new(PortAllocator::new(MIN_PORT as u16, MAX_PORT)))
            .clone()
    }

    /// Next port in the cycle.
    pub fn allocate(&self) -> u16 {
        let mut next = self.next.lock();
        let port = *next;
        *next += 2;
        if *next >= self.high {
            *next = self.low;
        }
        tracing::trace!(port, "allocated RTP port");
        port as u16
    }

    /// Number of distinct ports before the cycle repeats.
    pub fn cycle_len(&self) -> usize {
        ((self.high - self.low).div_ceil(2)) as usize
    }

    pub fn range(&self) -> (u32, u32) {
        (self.low, self.high)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(MIN_PORT as u16, MAX_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn full_cycle_returns_every_even_port_once() {
        let ports = PortAllocator::new(5000, 5010);
        assert_eq!(ports.cycle_len(), 5);

        let first: Vec<u16> = (0..ports.cycle_len()).map(|_| ports.allocate()).collect();
        assert_eq!(first, vec![5000, 5002, 5004, 5006, 5008]);

        // Wraps to the low bound.
        assert_eq!(ports.allocate(), 5000);
    }

    #[test]
    fn odd_bounds() {
        let ports = PortAllocator::new(5001, 5007);
        assert_eq!(ports.range(), (5002, 5007));
        assert_eq!(ports.cycle_len(), 3);
        let seen: HashSet<u16> = (0..3).map(|_| ports.allocate()).collect();
        assert_eq!(seen, HashSet::from([5002, 5004, 5006]));
        assert_eq!(ports.allocate(), 5002);
    }

    #[test]
    fn top_of_port_space() {
        let ports = PortAllocator::new(65530, MAX_PORT);
        let got: Vec<u16> = (0..4).map(|_| ports.allocate()).collect();
        assert_eq!(got, vec![65530, 65532, 65534, 65530]);
    }

    #[test]
    fn concurrent_allocation_hands_out_distinct_ports() {
        let ports = Arc::new(PortAllocator::new(20000, 20400));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ports = ports.clone();
                std::thread::spawn(move || (0..50).map(|_| ports.allocate()).collect::<Vec<_>>())
            })
            .collect();
        let mut all = HashSet::new();
        for h in handles {
            for port in h.join().unwrap() {
                assert!(all.insert(port), "port {port} handed out twice");
            }
        }
        assert_eq!(all.len(), 200);
    }

    #[test]
    fn global_is_shared() {
        assert!(Arc::ptr_eq(&PortAllocator::global(), &PortAllocator::global()));
    }
}
