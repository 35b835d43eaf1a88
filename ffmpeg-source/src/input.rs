use std::path::Path;

use ffmpeg_next::codec::packet::Packet;
use ffmpeg_next::{Rational, codec::Parameters, format::stream::Stream};

/// The selected video stream, copied out of the format context so it can
/// outlive the borrow.
#[derive(Clone)]
pub struct VideoStream {
    index: usize,
    parameters: Parameters,
    time_base: Rational,
    width: u32,
    height: u32,
    fps: f32,
    codec_name: String,
}

// `parameters` is a detached copy, not tied to the input context
unsafe impl Send for VideoStream {}

impl VideoStream {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Coded size as declared by the container.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Average frame rate; 0 when the container does not declare one.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }
}

impl From<Stream<'_>> for VideoStream {
    fn from(stream: Stream<'_>) -> Self {
        let parameters = stream.parameters().clone();
        // not exposed by ffmpeg-next
        let (width, height) = unsafe {
            let ptr = parameters.as_ptr() as *const ffmpeg_next::ffi::AVCodecParameters;
            ((*ptr).width.max(0) as u32, (*ptr).height.max(0) as u32)
        };
        let rate = stream.avg_frame_rate();
        let fps = if rate.denominator() == 0 {
            0.0
        } else {
            rate.numerator() as f32 / rate.denominator() as f32
        };
        Self {
            index: stream.index(),
            codec_name: format!("{:?}", parameters.id()).to_lowercase(),
            time_base: stream.time_base(),
            parameters,
            width,
            height,
            fps,
        }
    }
}

pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    video: VideoStream,
}

unsafe impl Send for AvInput {}

impl AvInput {
    /// Opens a media file and selects its best video stream.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        crate::init()?;
        let path = path.as_ref();
        let input = ffmpeg_next::format::input(&path)
            .map_err(|e| anyhow::anyhow!("open {}: {}", path.display(), e))?;
        let video = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .map(VideoStream::from)
            .ok_or_else(|| anyhow::anyhow!("{}: no video stream", path.display()))?;

        log::debug!(
            "input {}: video stream {} ({}, {}x{} @ {:.2} fps)",
            path.display(),
            video.index(),
            video.codec_name(),
            video.width(),
            video.height(),
            video.fps()
        );
        Ok(Self {
            inner: input,
            video,
        })
    }

    pub fn video_stream(&self) -> &VideoStream {
        &self.video
    }

    pub fn format_name(&self) -> String {
        self.inner.format().name().to_string()
    }

    /// Container duration in seconds, when known.
    pub fn duration_sec(&self) -> Option<f64> {
        // AV_TIME_BASE = 1_000_000
        let d = self.inner.duration();
        if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d <= 0 {
            None
        } else {
            Some(d as f64 / 1_000_000.0)
        }
    }

    /// Next packet of the selected video stream; `None` at end of file.
    pub fn read_video_packet(&mut self) -> Option<Packet> {
        let video_index = self.video.index();
        loop {
            match self.inner.packets().next() {
                Some((stream, packet)) if stream.index() == video_index => return Some(packet),
                Some(_) => continue,
                None => return None,
            }
        }
    }
}
