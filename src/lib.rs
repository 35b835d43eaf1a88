//! Concurrent frame pipeline that decodes video and turns every frame into
//! a buffer of palette indices, laid out as map tiles.
//!
//! A [`Pipeline`] owns one dispatcher thread and a fixed set of worker
//! threads. Callers queue frame requests and get back a [`FrameHandle`]
//! that completes with a [`FrameBuffer`] once a worker has scaled the
//! frame to planar YUV 4:4:4, looked every pixel up in the shared
//! [`ColorTable`] and scattered the result through the [`CopyPlan`].
//!
//! Decoding and scaling are pluggable through [`FrameDecoder`] and
//! [`FrameScaler`]; the `ffmpeg` feature provides both on top of FFmpeg
//! and adds `Pipeline::open`.

pub mod color_table;
pub mod completion;
pub mod config;
pub mod copy_plan;
mod dispatcher;
pub mod error;
#[cfg(feature = "ffmpeg")]
mod ffmpeg;
pub mod media;
pub mod palette;
pub mod pipeline;
pub mod ring_queue;
pub mod spin;
pub mod transform;
mod worker;

pub use color_table::ColorTable;
pub use completion::CompletionHandle;
pub use config::{OutputLayout, PipelineConfig};
pub use copy_plan::{CopyPlan, CopyRange, Tile};
pub use error::{PipelineError, Result};
pub use media::{FrameBuffer, FrameDecoder, FrameScaler, VideoMetadata, YuvPlanes};
pub use palette::{Palette, Rgb};
pub use pipeline::{FrameHandle, Pipeline};
pub use ring_queue::RingQueue;
pub use transform::FrameTransformer;
