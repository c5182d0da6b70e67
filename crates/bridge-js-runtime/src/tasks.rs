//! Foreground task runner
//!
//! Work that must run on the thread currently executing script (protocol
//! dispatch, wake-ups) is posted here from any thread. The engine drains the
//! queue from its interrupt handler; a paused engine pumps it while blocked.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

/// A unit of work for the engine thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Multi-producer queue of [`Task`]s owned by one script context.
#[derive(Clone)]
pub struct ForegroundTaskRunner {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl Default for ForegroundTaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundTaskRunner {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self { sender, receiver }
    }

    pub fn post_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Both ends live in `self`, so the channel never disconnects
        let _ = self.sender.send(Box::new(task));
    }

    /// Run every task queued right now without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            count += 1;
        }
        count
    }

    /// Block until one task arrives (or `timeout` elapses) and run it.
    pub fn pump(&self, timeout: Option<Duration>) -> bool {
        let task = match timeout {
            Some(timeout) => match self.receiver.recv_timeout(timeout) {
                Ok(task) => task,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return false,
            },
            None => match self.receiver.recv() {
                Ok(task) => task,
                Err(_) => return false,
            },
        };
        task();
        true
    }

    /// Drop queued tasks without running them. Returns how many were dropped.
    pub fn discard_pending(&self) -> usize {
        let mut count = 0;
        while self.receiver.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_run_pending_in_order() {
        let runner = ForegroundTaskRunner::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            runner.post_task(move || log.lock().push(i));
        }

        assert_eq!(runner.pending(), 3);
        assert_eq!(runner.run_pending(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert_eq!(runner.run_pending(), 0);
    }

    #[test]
    fn test_pump_times_out_when_idle() {
        let runner = ForegroundTaskRunner::new();
        assert!(!runner.pump(Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_pump_wakes_on_cross_thread_post() {
        let runner = ForegroundTaskRunner::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let poster = {
            let runner = runner.clone();
            let hits = Arc::clone(&hits);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                runner.post_task(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                });
            })
        };

        assert!(runner.pump(None));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        poster.join().unwrap();
    }

    #[test]
    fn test_discard_pending() {
        let runner = ForegroundTaskRunner::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            runner.post_task(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(runner.discard_pending(), 2);
        assert_eq!(runner.run_pending(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
