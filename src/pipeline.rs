//! The pipeline object: owns the request queue, the dispatcher thread and
//! the worker threads.
//!
//! ```text
//!  submit ─► RingQueue ─► dispatcher ─► decoder
//!                              │
//!                 round robin  ▼
//!              ┌──────────┬──────────┬─────┐
//!              │ worker 0 │ worker 1 │ ... │  scale ─► transform ─► fulfill
//!              └──────────┴──────────┴─────┘
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::color_table::ColorTable;
use crate::completion::CompletionHandle;
use crate::config::PipelineConfig;
use crate::copy_plan::CopyPlan;
use crate::dispatcher::{Dispatcher, Shared};
use crate::error::{PipelineError, Result};
use crate::media::{FrameBuffer, FrameDecoder, FrameScaler, VideoMetadata};
use crate::ring_queue::RingQueue;
use crate::transform::FrameTransformer;
use crate::worker::{SlotControl, Worker, WorkerSlot};

pub type FrameHandle = CompletionHandle<FrameBuffer>;

struct WorkerThread {
    slot: Arc<dyn SlotControl>,
    thread: Option<JoinHandle<()>>,
}

pub struct Pipeline {
    shared: Arc<Shared>,
    metadata: VideoMetadata,
    plan: Arc<CopyPlan>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<WorkerThread>,
    stopped: bool,
}

impl Pipeline {
    /// Starts the dispatcher and `config.worker_count` workers.
    ///
    /// `bind_scaler` is called once per worker with the frame size, on the
    /// calling thread, before any thread is spawned.
    pub fn start<D, S, B>(
        decoder: D,
        mut bind_scaler: B,
        table: Arc<ColorTable>,
        config: PipelineConfig,
    ) -> Result<Self>
    where
        D: FrameDecoder,
        S: FrameScaler<D::Frame>,
        B: FnMut(usize, usize) -> anyhow::Result<S>,
    {
        config.validate()?;
        let metadata = decoder.metadata();
        let (width, height) = (metadata.width, metadata.height);

        let plan = Arc::new(config.layout.copy_plan(width, height)?);
        let transformer = FrameTransformer::new(table, plan.clone(), width, height)?;
        let scalers = (0..config.worker_count)
            .map(|_| bind_scaler(width, height).map_err(PipelineError::scale))
            .collect::<Result<Vec<S>>>()?;

        let shared = Arc::new(Shared::new(RingQueue::new(config.queue_capacity)?));
        let slots: Vec<Arc<WorkerSlot<D::Frame>>> = (0..config.worker_count)
            .map(|i| Arc::new(WorkerSlot::new(i)))
            .collect();

        // any early return below drops `pipeline`, which stops what was
        // already spawned
        let mut pipeline = Pipeline {
            shared,
            metadata,
            plan,
            dispatcher: None,
            workers: Vec::with_capacity(config.worker_count),
            stopped: false,
        };

        for (slot, scaler) in slots.iter().zip(scalers) {
            let worker = Worker::new(slot.clone(), scaler, transformer.clone());
            let name = format!("{}-worker-{}", config.thread_name, slot.index());
            let thread = spawn(name, move || worker.run())?;
            pipeline.workers.push(WorkerThread {
                slot: slot.clone(),
                thread: Some(thread),
            });
        }

        let dispatcher = Dispatcher::new(decoder, pipeline.shared.clone(), slots);
        let name = format!("{}-dispatcher", config.thread_name);
        pipeline.dispatcher = Some(spawn(name, move || dispatcher.run())?);

        log::info!(
            "pipeline: started {}x{} @ {:.2} fps, {} workers, queue {}",
            width,
            height,
            metadata.fps,
            config.worker_count,
            config.queue_capacity
        );
        Ok(pipeline)
    }

    /// Queues a request for the next frame in decode order.
    ///
    /// Fails with `QueueFull` when `queue_capacity` requests are already
    /// waiting for the dispatcher, and with the pipeline fault once the
    /// pipeline has faulted or shut down.
    pub fn submit_frame_request(&self) -> Result<FrameHandle> {
        let handle = FrameHandle::new();
        {
            let mut queue = self.shared.queue.lock();
            if let Some(fault) = self.shared.fault() {
                return Err(fault);
            }
            if queue.try_write(handle.clone()).is_err() {
                return Err(PipelineError::QueueFull {
                    capacity: self.shared.queue.capacity(),
                });
            }
        }
        self.shared.doorbell.ring();
        Ok(handle)
    }

    pub fn await_frame(&self, handle: FrameHandle) -> Result<FrameBuffer> {
        handle.wait()
    }

    /// Submits a request and blocks until its frame is ready.
    pub fn next_frame(&self) -> Result<FrameBuffer> {
        let handle = self.submit_frame_request()?;
        self.await_frame(handle)
    }

    pub async fn next_frame_async(&self) -> Result<FrameBuffer> {
        let handle = self.submit_frame_request()?;
        handle.wait_async().await
    }

    pub fn video_metadata(&self) -> VideoMetadata {
        self.metadata
    }

    pub fn copy_plan(&self) -> &CopyPlan {
        &self.plan
    }

    /// The first terminal error the pipeline hit, if any.
    pub fn fault(&self) -> Option<PipelineError> {
        self.shared.fault()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Frames delivered so far, summed over all workers.
    pub fn completed_frames(&self) -> u64 {
        self.workers.iter().map(|w| w.slot.completed()).sum()
    }

    /// Stops all threads. Requests still queued fail with `Shutdown`
    /// (or the earlier fault); frames already handed to a worker are
    /// finished first. Calling it again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        log::info!("pipeline: shutting down");

        self.shared.cancel.cancel();
        self.shared.doorbell.ring();
        self.shared.fault_and_drain(PipelineError::Shutdown);
        for worker in &self.workers {
            worker.slot.close();
        }

        let mut panicked = Vec::new();
        if let Some(thread) = self.dispatcher.take() {
            if thread.join().is_err() {
                panicked.push("dispatcher".to_string());
            }
        }
        for (i, worker) in self.workers.iter_mut().enumerate() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    panicked.push(format!("worker {}", i));
                }
            }
        }

        if panicked.is_empty() {
            log::info!("pipeline: stopped");
            Ok(())
        } else {
            let names = panicked.join(", ");
            log::error!("pipeline: {} panicked", names);
            Err(PipelineError::ThreadPanicked(names))
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("pipeline: shutdown on drop failed: {}", e);
        }
    }
}

fn spawn<F>(name: String, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|e| PipelineError::Spawn {
            name,
            reason: e.to_string(),
        })
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
