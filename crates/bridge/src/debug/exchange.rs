//! Pending Protocol Exchange
//!
//! A single-slot gate between the thread sending a protocol request and the
//! thread the engine answers on. The sender arms the gate, dispatches, and
//! blocks in [`PendingProtocolExchange::wait`] until a matching response is
//! released. Only one request may be outstanding at a time.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::error::{DebugError, DebugResult};

#[derive(Default)]
struct Slot {
    armed: bool,
    /// Call id the armed request carries, if it could be read
    expected: Option<i64>,
    response: Option<String>,
    abandoned: bool,
}

impl Slot {
    fn disarm(&mut self) {
        self.armed = false;
        self.expected = None;
        self.response = None;
        self.abandoned = false;
    }
}

#[derive(Default)]
pub struct PendingProtocolExchange {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl PendingProtocolExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a response to the request carrying `call_id`. Must be called
    /// before dispatching, since a synchronous dispatch answers immediately.
    pub fn arm(&self, call_id: Option<i64>) {
        let mut slot = self.slot.lock();
        slot.disarm();
        slot.armed = true;
        slot.expected = call_id;
    }

    /// Hand over a response. Returns `false` if nobody is waiting for it.
    pub fn release(&self, call_id: Option<i64>, message: String) -> bool {
        let mut slot = self.slot.lock();
        let matches = match (slot.expected, call_id) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        };
        if !slot.armed || !matches || slot.response.is_some() {
            tracing::trace!(target: "bridge.debug", ?call_id, "dropping unmatched protocol response");
            return false;
        }
        slot.response = Some(message);
        self.ready.notify_all();
        true
    }

    /// Wake the waiting sender without a response.
    pub fn abandon(&self) {
        let mut slot = self.slot.lock();
        if slot.armed {
            slot.abandoned = true;
            self.ready.notify_all();
        }
    }

    /// Block until the armed request is answered, abandoned or `timeout`
    /// elapses. The gate is disarmed on return.
    pub fn wait(&self, timeout: Option<Duration>) -> DebugResult<String> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut slot = self.slot.lock();

        loop {
            if let Some(response) = slot.response.take() {
                slot.disarm();
                return Ok(response);
            }
            if slot.abandoned || !slot.armed {
                slot.disarm();
                return Err(DebugError::Terminated);
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut slot, deadline).timed_out() && slot.response.is_none() {
                        slot.disarm();
                        return Err(DebugError::Timeout);
                    }
                }
                None => self.ready.wait(&mut slot),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_synchronous_release() {
        let exchange = PendingProtocolExchange::new();
        exchange.arm(Some(1));
        assert!(exchange.release(Some(1), "one".into()));
        assert_eq!(exchange.wait(None).unwrap(), "one");
    }

    #[test]
    fn test_release_without_waiter_is_dropped() {
        let exchange = PendingProtocolExchange::new();
        assert!(!exchange.release(Some(1), "stale".into()));

        exchange.arm(Some(2));
        assert!(exchange.release(Some(2), "fresh".into()));
        assert_eq!(exchange.wait(None).unwrap(), "fresh");
    }

    #[test]
    fn test_mismatched_call_id_is_dropped() {
        let exchange = PendingProtocolExchange::new();
        exchange.arm(Some(5));
        assert!(!exchange.release(Some(4), "late".into()));
        assert!(exchange.release(Some(5), "mine".into()));
        assert_eq!(exchange.wait(None).unwrap(), "mine");
    }

    #[test]
    fn test_unidentified_release_matches_any() {
        let exchange = PendingProtocolExchange::new();
        exchange.arm(None);
        assert!(exchange.release(None, "{\"error\":{\"code\":-32700}}".into()));
        assert!(exchange.wait(None).unwrap().contains("-32700"));
    }

    #[test]
    fn test_cross_thread_release() {
        let exchange = Arc::new(PendingProtocolExchange::new());
        exchange.arm(Some(9));

        let responder = {
            let exchange = Arc::clone(&exchange);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                exchange.release(Some(9), "nine".into())
            })
        };

        assert_eq!(exchange.wait(Some(Duration::from_secs(5))).unwrap(), "nine");
        assert!(responder.join().unwrap());
    }

    #[test]
    fn test_timeout_disarms() {
        let exchange = PendingProtocolExchange::new();
        exchange.arm(Some(1));
        assert!(matches!(
            exchange.wait(Some(Duration::from_millis(10))),
            Err(DebugError::Timeout)
        ));
        assert!(!exchange.release(Some(1), "too late".into()));
    }

    #[test]
    fn test_abandon_wakes_waiter() {
        let exchange = Arc::new(PendingProtocolExchange::new());
        exchange.arm(Some(1));

        let canceller = {
            let exchange = Arc::clone(&exchange);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                exchange.abandon();
            })
        };

        assert!(matches!(exchange.wait(None), Err(DebugError::Terminated)));
        canceller.join().unwrap();
    }
}
