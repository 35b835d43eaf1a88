//! FFmpeg-backed decoder and scaler.

use std::path::Path;
use std::sync::Arc;

use ffmpeg_source::{Scaler, VideoDecoder, VideoFrame};

use crate::color_table::ColorTable;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::media::{FrameDecoder, FrameScaler, VideoMetadata, YuvPlanes};
use crate::pipeline::Pipeline;

impl FrameDecoder for VideoDecoder {
    type Frame = VideoFrame;

    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            width: self.width() as usize,
            height: self.height() as usize,
            fps: self.fps(),
        }
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        VideoDecoder::next_frame(self)
    }
}

impl FrameScaler<VideoFrame> for Scaler {
    fn scale(&mut self, frame: &VideoFrame) -> anyhow::Result<YuvPlanes<'_>> {
        let planes = self.run(frame)?;
        Ok(YuvPlanes {
            y: planes.y,
            cb: planes.cb,
            cr: planes.cr,
        })
    }
}

impl Pipeline {
    /// Opens a media file and starts a pipeline on its best video stream.
    /// Frames keep the stream's native size.
    pub fn open(
        path: impl AsRef<Path>,
        table: Arc<ColorTable>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let decoder = VideoDecoder::open(path).map_err(PipelineError::decode)?;
        log::info!("pipeline: opened {}\n{}", path.display(), decoder.info());

        let format = decoder.format();
        let (src_width, src_height) = (decoder.width(), decoder.height());
        Pipeline::start(
            decoder,
            move |width, height| {
                Scaler::new(format, src_width, src_height, width as u32, height as u32)
            },
            table,
            config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample() -> Option<PathBuf> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scripts").join("test.mp4");
        if path.exists() {
            Some(path)
        } else {
            eprintln!("skip: {} not found", path.display());
            None
        }
    }

    #[test]
    fn test_open_and_render_frames() {
        let _ = env_logger::builder().is_test(true).try_init();
        let Some(path) = sample() else {
            return;
        };
        let table = Arc::new(ColorTable::uniform(4).unwrap());
        let config = PipelineConfig::builder().worker_count(2).linear().build();
        let pipeline = Pipeline::open(&path, table, config).unwrap();

        let metadata = pipeline.video_metadata();
        for i in 0..3 {
            let frame = pipeline.next_frame().unwrap();
            assert_eq!(frame.sequence, i);
            assert_eq!(frame.len(), metadata.area());
            assert!(frame.data.iter().all(|b| *b == 4));
        }
    }

    #[test]
    fn test_open_missing_file() {
        let table = Arc::new(ColorTable::uniform(0).unwrap());
        let err = Pipeline::open("/nonexistent/clip.mp4", table, PipelineConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Decode(_)));
    }
}
