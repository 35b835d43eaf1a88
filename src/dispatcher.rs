//! The dispatcher thread: pulls frame requests from the queue, decodes the
//! next frame and hands it to a worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::media::FrameDecoder;
use crate::pipeline::FrameHandle;
use crate::ring_queue::RingQueue;
use crate::worker::{Assignment, WorkerSlot};

/// Upper bound on a single doorbell wait, so a missed ring costs latency
/// instead of a hang.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// State shared between the pipeline handle and the dispatcher.
pub(crate) struct Shared {
    pub queue: RingQueue<FrameHandle>,
    pub doorbell: Doorbell,
    pub cancel: CancellationToken,
    fault: OnceLock<PipelineError>,
}

impl Shared {
    pub fn new(queue: RingQueue<FrameHandle>) -> Self {
        Self {
            queue,
            doorbell: Doorbell::default(),
            cancel: CancellationToken::new(),
            fault: OnceLock::new(),
        }
    }

    pub fn fault(&self) -> Option<PipelineError> {
        self.fault.get().cloned()
    }

    /// Records `err` as the pipeline fault unless one is already set, and
    /// fails every queued request with the recorded fault. The fault is
    /// published while the queue lock is held, so no request can slip in
    /// between.
    pub fn fault_and_drain(&self, err: PipelineError) -> usize {
        let (reason, pending) = {
            let mut queue = self.queue.lock();
            let _ = self.fault.set(err.clone());
            let reason = self.fault.get().cloned().unwrap_or(err);
            (reason, queue.drain())
        };
        let count = pending.len();
        for handle in pending {
            fail_handle(&handle, reason.clone(), "queued request");
        }
        count
    }
}

/// Fails `handle`; a handle that was already completed is only logged.
pub(crate) fn fail_handle(handle: &FrameHandle, err: PipelineError, what: &str) {
    if let Err(e) = handle.fail(err) {
        log::debug!("{} not failed: {}", what, e);
    }
}

/// Wakes the dispatcher when a request is queued. The counter lets a
/// waiter detect rings that happened before it went to sleep.
#[derive(Default)]
pub(crate) struct Doorbell {
    rings: Mutex<u64>,
    cond: Condvar,
}

impl Doorbell {
    pub fn ticket(&self) -> u64 {
        match self.rings.lock() {
            Ok(rings) => *rings,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn ring(&self) {
        let mut rings = match self.rings.lock() {
            Ok(rings) => rings,
            Err(poisoned) => poisoned.into_inner(),
        };
        *rings = rings.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Sleeps until the bell rings after `ticket` was taken, or until
    /// `cancel` fires.
    pub fn wait_past(&self, ticket: u64, cancel: &CancellationToken) {
        let mut rings = match self.rings.lock() {
            Ok(rings) => rings,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *rings == ticket && !cancel.is_cancelled() {
            rings = match self.cond.wait_timeout(rings, IDLE_POLL) {
                Ok((rings, _)) => rings,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

/// Round-robin worker selection, starting at worker 0.
#[derive(Debug, Clone)]
pub(crate) struct RoundRobin {
    next: usize,
    len: usize,
}

impl RoundRobin {
    pub fn new(len: usize) -> Self {
        Self { next: 0, len }
    }

    pub fn select(&mut self) -> usize {
        let chosen = self.next;
        self.next = (self.next + 1) % self.len;
        chosen
    }
}

pub(crate) struct Dispatcher<D: FrameDecoder> {
    decoder: D,
    shared: Arc<Shared>,
    slots: Vec<Arc<WorkerSlot<D::Frame>>>,
    selector: RoundRobin,
    sequence: u64,
}

impl<D: FrameDecoder> Dispatcher<D> {
    pub fn new(decoder: D, shared: Arc<Shared>, slots: Vec<Arc<WorkerSlot<D::Frame>>>) -> Self {
        let selector = RoundRobin::new(slots.len());
        Self {
            decoder,
            shared,
            slots,
            selector,
            sequence: 0,
        }
    }

    pub fn run(mut self) {
        log::info!("dispatcher: started with {} workers", self.slots.len());
        let (fault, current) = self.dispatch();
        match &fault {
            PipelineError::EndOfStream => {
                log::info!("dispatcher: end of stream after {} frames", self.sequence)
            }
            PipelineError::Shutdown => log::info!("dispatcher: shutdown"),
            e => log::error!("dispatcher: stopped after {} frames: {}", self.sequence, e),
        }
        let failed = self.shared.fault_and_drain(fault.clone());
        if failed > 0 {
            log::debug!("dispatcher: failed {} queued requests", failed);
        }
        // fail the request in hand only once the fault is visible, so a
        // caller reacting to it cannot queue another request
        if let Some(handle) = current {
            let reason = self.shared.fault().unwrap_or(fault);
            fail_handle(&handle, reason, "dispatcher: request in hand");
        }
    }

    /// Runs until the pipeline faults. Returns the fault and the request
    /// that was being served when it happened.
    fn dispatch(&mut self) -> (PipelineError, Option<FrameHandle>) {
        loop {
            if self.shared.cancel.is_cancelled() {
                return (PipelineError::Shutdown, None);
            }

            let ticket = self.shared.doorbell.ticket();
            let next = self.shared.queue.lock().try_read();
            let handle = match next {
                Ok(handle) => handle,
                Err(_) => {
                    self.shared.doorbell.wait_past(ticket, &self.shared.cancel);
                    continue;
                }
            };

            let decoded = catch_unwind(AssertUnwindSafe(|| self.decoder.next_frame()));
            let frame = match decoded {
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => return (PipelineError::EndOfStream, Some(handle)),
                Ok(Err(e)) => return (PipelineError::decode(e), Some(handle)),
                Err(_) => {
                    let err =
                        PipelineError::Decode(format!("decoder panicked on frame {}", self.sequence));
                    return (err, Some(handle));
                }
            };

            let worker = self.selector.select();
            let sequence = self.sequence;
            log::debug!("dispatcher: frame {} -> worker {}", sequence, worker);

            let assignment = Assignment {
                frame,
                handle,
                sequence,
            };
            if let Err((err, rejected)) = self.slots[worker].assign(assignment) {
                return (err, Some(rejected.handle));
            }
            self.sequence += 1;
        }
    }
}
