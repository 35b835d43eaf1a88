//! Single-shot completion handle.
//!
//! One side fulfills (or fails) the handle exactly once, the other side
//! waits for it exactly once. The state is tagged so a second fulfillment
//! or a second wait is reported instead of silently overwriting or
//! handing out the same value twice:
//!
//! ```text
//! Pending ──fulfill──► Fulfilled ──wait──► Consumed
//!    │                                        ▲
//!    └────fail────► Failed ─────wait──────────┘
//! ```
//!
//! A fulfillment that races ahead of the wait is never lost: the waiter
//! only blocks while the state is still `Pending`.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{PipelineError, Result};

enum State<T> {
    Pending,
    Fulfilled(T),
    Failed(PipelineError),
    Consumed,
}

impl<T> State<T> {
    fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }
}

struct Inner<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

/// Cloning shares the same underlying completion; the primitives are
/// released when the last clone drops.
pub struct CompletionHandle<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for CompletionHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CompletionHandle<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending),
                cond: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State<T>>> {
        self.inner
            .state
            .lock()
            .map_err(|_| PipelineError::Poisoned("completion"))
    }

    fn complete(&self, next: State<T>) -> Result<()> {
        let mut state = self.lock()?;
        if !state.is_pending() {
            return Err(PipelineError::AlreadyCompleted);
        }
        *state = next;
        self.inner.cond.notify_all();
        Ok(())
    }

    pub fn fulfill(&self, value: T) -> Result<()> {
        self.complete(State::Fulfilled(value))
    }

    /// Completes the handle with a terminal error instead of a value.
    pub fn fail(&self, err: PipelineError) -> Result<()> {
        self.complete(State::Failed(err))
    }

    pub fn is_completed(&self) -> bool {
        self.lock().map(|s| !s.is_pending()).unwrap_or(true)
    }

    /// Blocks until the handle is completed, then takes the result.
    pub fn wait(&self) -> Result<T> {
        let mut state = self.lock()?;
        while state.is_pending() {
            state = self
                .inner
                .cond
                .wait(state)
                .map_err(|_| PipelineError::Poisoned("completion"))?;
        }
        take(&mut state)
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning
    /// `Ok(None)` while the handle is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        while state.is_pending() {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (next, _) = self
                .inner
                .cond
                .wait_timeout(state, deadline - now)
                .map_err(|_| PipelineError::Poisoned("completion"))?;
            state = next;
        }
        take(&mut state).map(Some)
    }

    /// Non-blocking poll.
    pub fn try_wait(&self) -> Result<Option<T>> {
        let mut state = self.lock()?;
        if state.is_pending() {
            return Ok(None);
        }
        take(&mut state).map(Some)
    }
}

impl<T: Send + 'static> CompletionHandle<T> {
    /// Waits on the tokio blocking pool so async callers don't stall a
    /// runtime worker.
    pub async fn wait_async(self) -> Result<T> {
        tokio::task::spawn_blocking(move || self.wait())
            .await
            .map_err(|e| PipelineError::Spawn {
                name: "completion waiter".to_string(),
                reason: e.to_string(),
            })?
    }
}

fn take<T>(state: &mut State<T>) -> Result<T> {
    match std::mem::replace(state, State::Consumed) {
        State::Fulfilled(value) => Ok(value),
        State::Failed(err) => Err(err),
        State::Consumed => Err(PipelineError::AlreadyConsumed),
        State::Pending => unreachable!("take() called on a pending handle"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_fulfill_before_wait_does_not_block() {
        let handle = CompletionHandle::new();
        handle.fulfill(7u32).unwrap();
        assert_eq!(handle.wait_timeout(Duration::from_millis(0)).unwrap(), Some(7));
    }

    #[test]
    fn test_fulfill_from_other_thread_before_wait() {
        let handle = CompletionHandle::new();
        let producer = handle.clone();
        std::thread::spawn(move || producer.fulfill(vec![1u8, 2, 3]).unwrap())
            .join()
            .unwrap();
        assert_eq!(handle.wait().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_wait_blocks_until_fulfilled() {
        let handle = CompletionHandle::<u64>::new();
        let waiter = handle.clone();
        let (started_tx, started_rx) = mpsc::channel();
        let join = std::thread::spawn(move || {
            started_tx.send(()).unwrap();
            waiter.wait()
        });

        started_rx.recv().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!join.is_finished(), "wait returned before fulfill");

        handle.fulfill(42).unwrap();
        assert_eq!(join.join().unwrap().unwrap(), 42);
    }

    #[test]
    fn test_many_races_deliver_the_value() {
        for i in 0..200u32 {
            let handle = CompletionHandle::new();
            let producer = handle.clone();
            let t = std::thread::spawn(move || producer.fulfill(i).unwrap());
            assert_eq!(handle.wait().unwrap(), i);
            t.join().unwrap();
        }
    }

    #[test]
    fn test_second_fulfill_is_rejected() {
        let handle = CompletionHandle::new();
        handle.fulfill(1).unwrap();
        assert_eq!(handle.fulfill(2), Err(PipelineError::AlreadyCompleted));
        assert_eq!(handle.fail(PipelineError::EndOfStream), Err(PipelineError::AlreadyCompleted));
        assert_eq!(handle.wait().unwrap(), 1);
    }

    #[test]
    fn test_second_wait_is_rejected() {
        let handle = CompletionHandle::new();
        handle.fulfill("frame").unwrap();
        assert_eq!(handle.wait().unwrap(), "frame");
        assert_eq!(handle.wait(), Err(PipelineError::AlreadyConsumed));
        assert_eq!(handle.try_wait(), Err(PipelineError::AlreadyConsumed));
        // Consumed is still "completed", so the producer side cannot reuse it.
        assert_eq!(handle.fulfill("again"), Err(PipelineError::AlreadyCompleted));
    }

    #[test]
    fn test_failed_handle_reports_error_once() {
        let handle = CompletionHandle::<u8>::new();
        handle.fail(PipelineError::EndOfStream).unwrap();
        assert_eq!(handle.wait(), Err(PipelineError::EndOfStream));
        assert_eq!(handle.wait(), Err(PipelineError::AlreadyConsumed));
    }

    #[test]
    fn test_try_wait_and_timeout_while_pending() {
        let handle = CompletionHandle::<u8>::new();
        assert_eq!(handle.try_wait().unwrap(), None);
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)).unwrap(), None);
        assert!(!handle.is_completed());
        handle.fulfill(3).unwrap();
        assert!(handle.is_completed());
        assert_eq!(handle.try_wait().unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_wait_async() {
        let handle = CompletionHandle::new();
        let producer = handle.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.fulfill(String::from("done")).unwrap();
        });
        assert_eq!(handle.wait_async().await.unwrap(), "done");
    }
}
