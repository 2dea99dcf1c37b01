use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::media::Packet;

/// FIFO of received packets shared between a receiver thread and the
/// consumer of a track.
///
/// Pushing never blocks. It fails when the queue is closed, when memory for
/// another entry cannot be reserved, or when a bounded queue is full; the
/// receiver treats each as fatal. Popping waits on the condition variable
/// up to a timeout.
#[derive(Debug, Default)]
pub struct PacketQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: Option<usize>,
}

#[derive(Debug, Default)]
struct QueueState {
    packets: VecDeque<Packet>,
    closed: bool,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue holding at most `capacity` unread packets.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Append a packet and wake one waiter. Hands the packet back on failure.
    pub fn push(&self, packet: Packet) -> Result<(), Packet> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(packet);
        }
        if let Some(capacity) = self.capacity
            && state.packets.len() >= capacity
        {
            tracing::warn!(capacity, "packet queue full");
            return Err(packet);
        }
        if state.packets.try_reserve(1).is_err() {
            tracing::warn!(queued = state.packets.len(), "packet queue out of memory");
            return Err(packet);
        }
        state.packets.push_back(packet);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Oldest packet, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` when the timeout elapses with the queue still empty,
    /// or immediately once the queue is closed and drained.
    pub fn pop(&self, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(packet) = state.packets.pop_front() {
                return Some(packet);
            }
            if state.closed {
                return None;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return state.packets.pop_front();
            }
        }
    }

    /// Stop accepting packets and wake every waiter. Queued packets stay
    /// readable.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn packet(byte: u8) -> Packet {
        Packet::new(vec![byte], "127.0.0.1:9".parse().unwrap())
    }

    #[test]
    fn fifo_order() {
        let queue = PacketQueue::new();
        for b in 1..=3 {
            queue.push(packet(b)).unwrap();
        }
        assert_eq!(queue.len(), 3);
        let got: Vec<u8> = (0..3)
            .map(|_| queue.pop(Duration::ZERO).unwrap().payload[0])
            .collect();
        assert_eq!(got, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_pop_waits_for_timeout() {
        let queue = PacketQueue::new();
        let timeout = Duration::from_millis(150);
        let start = Instant::now();
        assert!(queue.pop(timeout).is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= timeout, "returned after {elapsed:?}");
        assert!(elapsed < timeout + Duration::from_millis(500));
    }

    #[test]
    fn packet_pushed_during_wait_is_observed() {
        let queue = Arc::new(PacketQueue::new());
        let producer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer.push(packet(7)).unwrap();
        });

        let start = Instant::now();
        let got = queue.pop(Duration::from_secs(5)).unwrap();
        assert_eq!(got.payload, vec![7]);
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn close_wakes_waiter_and_rejects_pushes() {
        let queue = Arc::new(PacketQueue::new());
        let closer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            closer.close();
        });

        let start = Instant::now();
        assert!(queue.pop(Duration::from_secs(5)).is_none());
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();

        assert!(queue.is_closed());
        assert!(queue.push(packet(1)).is_err());
    }

    #[test]
    fn bounded_queue_rejects_overflow() {
        let queue = PacketQueue::bounded(2);
        queue.push(packet(1)).unwrap();
        queue.push(packet(2)).unwrap();
        assert_eq!(queue.push(packet(3)).unwrap_err().payload, vec![3]);

        queue.pop(Duration::ZERO).unwrap();
        queue.push(packet(4)).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn closed_queue_still_drains() {
        let queue = PacketQueue::new();
        queue.push(packet(4)).unwrap();
        queue.close();
        assert_eq!(queue.pop(Duration::ZERO).unwrap().payload, vec![4]);
        assert!(queue.pop(Duration::from_secs(5)).is_none());
    }
}
