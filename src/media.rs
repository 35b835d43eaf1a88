//! Capabilities the pipeline consumes from the media stack, plus the
//! frame types it hands back.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: usize,
    pub height: usize,
    pub fps: f32,
}

impl VideoMetadata {
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Three planar 4:4:4 planes, each exactly `width * height` bytes.
#[derive(Debug, Clone, Copy)]
pub struct YuvPlanes<'a> {
    pub y: &'a [u8],
    pub cb: &'a [u8],
    pub cr: &'a [u8],
}

/// Produces decoded frames one at a time.
///
/// Not required to be `Sync`: the decoder lives on the dispatcher thread
/// and is never touched by anything else.
pub trait FrameDecoder: Send + 'static {
    type Frame: Send + 'static;

    fn metadata(&self) -> VideoMetadata;

    /// Returns `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> anyhow::Result<Option<Self::Frame>>;
}

/// Converts a decoded frame into planar YUV 4:4:4 at the bound size.
/// One scaler is bound per worker and only ever used by that worker.
pub trait FrameScaler<F>: Send + 'static {
    fn scale(&mut self, frame: &F) -> anyhow::Result<YuvPlanes<'_>>;
}

/// One finished frame: a palette index per pixel, already laid out by
/// the copy plan. Indices are signed bytes stored as `u8`.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub data: Bytes,
    pub width: usize,
    pub height: usize,
    /// Position of the frame in decode order, starting at 0.
    pub sequence: u64,
    /// Worker slot that produced the frame.
    pub worker: usize,
}

impl FrameBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn index_at(&self, offset: usize) -> Option<i8> {
        self.data.get(offset).map(|b| *b as i8)
    }

    pub fn to_signed(&self) -> Vec<i8> {
        self.data.iter().map(|b| *b as i8).collect()
    }
}
