//! Worker slots: a single-item mailbox per worker thread.
//!
//! The dispatcher installs one assignment at a time. It waits while the
//! previous assignment has not yet been picked up, so a slot never holds
//! more than one pending frame. Installing an assignment always wakes the
//! worker.
//!
//! ```text
//!  Idle ──assign──► Assigned ──take──► Running ──fulfill/fail──► Idle
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use bytes::Bytes;

use crate::dispatcher::fail_handle;
use crate::error::{PipelineError, Result};
use crate::media::{FrameBuffer, FrameScaler};
use crate::pipeline::FrameHandle;
use crate::transform::FrameTransformer;

pub(crate) struct Assignment<F> {
    pub frame: F,
    pub handle: FrameHandle,
    pub sequence: u64,
}

struct SlotState<F> {
    pending: Option<Assignment<F>>,
    closed: bool,
}

pub(crate) struct WorkerSlot<F> {
    index: usize,
    state: Mutex<SlotState<F>>,
    cond: Condvar,
    completed: AtomicU64,
}

impl<F> WorkerSlot<F> {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: Mutex::new(SlotState {
                pending: None,
                closed: false,
            }),
            cond: Condvar::new(),
            completed: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn lock(&self) -> Result<MutexGuard<'_, SlotState<F>>> {
        self.state
            .lock()
            .map_err(|_| PipelineError::Poisoned("worker slot"))
    }

    /// Hands an assignment to the worker. On failure the assignment is
    /// returned so the caller can fail its handle.
    pub fn assign(
        &self,
        assignment: Assignment<F>,
    ) -> std::result::Result<(), (PipelineError, Assignment<F>)> {
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(e) => return Err((e, assignment)),
        };
        while state.pending.is_some() && !state.closed {
            state = match self.cond.wait(state) {
                Ok(state) => state,
                Err(_) => return Err((PipelineError::Poisoned("worker slot"), assignment)),
            };
        }
        if state.closed {
            return Err((PipelineError::Shutdown, assignment));
        }
        state.pending = Some(assignment);
        self.cond.notify_all();
        Ok(())
    }

    /// Blocks until there is an assignment. `Ok(None)` once the slot is
    /// closed and nothing is left to do.
    pub fn take(&self) -> Result<Option<Assignment<F>>> {
        let mut state = self.lock()?;
        loop {
            if let Some(assignment) = state.pending.take() {
                // the dispatcher may be waiting for the slot to free up
                self.cond.notify_all();
                return Ok(Some(assignment));
            }
            if state.closed {
                return Ok(None);
            }
            state = self
                .cond
                .wait(state)
                .map_err(|_| PipelineError::Poisoned("worker slot"))?;
        }
    }

    #[cfg(test)]
    fn has_pending(&self) -> bool {
        self.lock().map(|s| s.pending.is_some()).unwrap_or(false)
    }
}

/// Type-erased view of a slot, used by the pipeline for shutdown and stats.
pub(crate) trait SlotControl: Send + Sync {
    fn close(&self);
    fn completed(&self) -> u64;
}

impl<F: Send> SlotControl for WorkerSlot<F> {
    fn close(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.closed = true;
        self.cond.notify_all();
    }

    fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

pub(crate) struct Worker<F, S> {
    slot: Arc<WorkerSlot<F>>,
    scaler: S,
    transformer: FrameTransformer,
}

impl<F, S> Worker<F, S>
where
    S: FrameScaler<F>,
{
    pub fn new(slot: Arc<WorkerSlot<F>>, scaler: S, transformer: FrameTransformer) -> Self {
        Self {
            slot,
            scaler,
            transformer,
        }
    }

    pub fn run(mut self) {
        let index = self.slot.index();
        log::debug!("worker {}: started", index);
        loop {
            match self.slot.take() {
                Ok(Some(assignment)) => self.process(assignment),
                Ok(None) => break,
                Err(e) => {
                    log::error!("worker {}: {}", index, e);
                    break;
                }
            }
        }
        log::debug!("worker {}: stopped", index);
    }

    fn process(&mut self, assignment: Assignment<F>) {
        let Assignment {
            frame,
            handle,
            sequence,
        } = assignment;
        let index = self.slot.index();

        let result = catch_unwind(AssertUnwindSafe(|| self.render(&frame, sequence)))
            .unwrap_or_else(|_| {
                Err(PipelineError::Transform(format!(
                    "worker {} panicked on frame {}",
                    index, sequence
                )))
            });
        // the decoded frame is no longer needed once scaled
        drop(frame);

        match result {
            Ok(buffer) => {
                if let Err(e) = handle.fulfill(buffer) {
                    log::warn!("worker {}: frame {} not delivered: {}", index, sequence, e);
                } else {
                    self.slot.completed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                log::warn!("worker {}: frame {} failed: {}", index, sequence, e);
                fail_handle(&handle, e, "worker: failed frame");
            }
        }
    }

    fn render(&mut self, frame: &F, sequence: u64) -> Result<FrameBuffer> {
        let planes = self.scaler.scale(frame).map_err(PipelineError::scale)?;
        let data = self.transformer.transform(planes)?;
        Ok(FrameBuffer {
            data: Bytes::from(data),
            width: self.transformer.width(),
            height: self.transformer.height(),
            sequence,
            worker: self.slot.index(),
        })
    }
}
