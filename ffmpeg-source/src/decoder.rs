use std::path::Path;

use ffmpeg_next::format::Pixel;

use crate::{
    frame::VideoFrame,
    input::{AvInput, VideoStream},
    metadata::VideoInfo,
};

/// Consecutive packets the codec may reject before decoding gives up.
const MAX_SEND_FAILURES: u32 = 32;

/// Pulls decoded frames out of a file, one at a time, on the calling
/// thread.
pub struct VideoDecoder {
    input: AvInput,
    inner: ffmpeg_next::codec::decoder::Video,
    eof_sent: bool,
    decoded: u64,
    send_failures: u32,
}

unsafe impl Send for VideoDecoder {}

impl VideoDecoder {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let input = AvInput::open(path)?;
        let inner = Self::open_codec(input.video_stream())?;
        Ok(Self {
            input,
            inner,
            eof_sent: false,
            decoded: 0,
            send_failures: 0,
        })
    }

    fn open_codec(stream: &VideoStream) -> anyhow::Result<ffmpeg_next::codec::decoder::Video> {
        let mut decoder_ctx = ffmpeg_next::codec::Context::new();
        unsafe {
            (*decoder_ctx.as_mut_ptr()).time_base = stream.time_base().into();
        }
        decoder_ctx.set_parameters(stream.parameters().clone())?;
        let video_decoder = decoder_ctx.decoder().video()?;

        if video_decoder.format() == Pixel::None
            || video_decoder.width() == 0
            || video_decoder.height() == 0
        {
            return Err(anyhow::anyhow!("missing codec parameters"));
        }
        Ok(video_decoder)
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    /// Native pixel format of decoded frames; scalers are bound from it.
    pub fn format(&self) -> Pixel {
        self.inner.format()
    }

    pub fn fps(&self) -> f32 {
        self.input.video_stream().fps()
    }

    pub fn info(&self) -> VideoInfo {
        VideoInfo::from_input(&self.input)
    }

    pub fn decoded_frames(&self) -> u64 {
        self.decoded
    }

    /// Next frame in decode order; `Ok(None)` once the decoder is drained.
    pub fn next_frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        loop {
            if let Some(frame) = self.receive_frame()? {
                self.decoded += 1;
                return Ok(Some(frame));
            }
            if self.eof_sent {
                log::debug!("decoder: drained after {} frames", self.decoded);
                return Ok(None);
            }
            match self.input.read_video_packet() {
                Some(packet) => self.send_packet(&packet)?,
                None => {
                    self.inner.send_eof()?;
                    self.eof_sent = true;
                }
            }
        }
    }

    /// A damaged packet is skipped; a run of them ends decoding.
    fn send_packet(&mut self, packet: &ffmpeg_next::codec::packet::Packet) -> anyhow::Result<()> {
        match self.inner.send_packet(packet) {
            Ok(()) => {
                self.send_failures = 0;
                Ok(())
            }
            Err(e) => {
                self.send_failures += 1;
                log::warn!(
                    "decoder: send packet error ({} in a row): {}",
                    self.send_failures,
                    e
                );
                if exceeded(self.send_failures) {
                    anyhow::bail!("{} packets in a row rejected, last: {}", self.send_failures, e);
                }
                Ok(())
            }
        }
    }

    /// `Ok(None)` when the decoder needs more input or is fully drained.
    fn receive_frame(&mut self) -> anyhow::Result<Option<VideoFrame>> {
        let mut frame = ffmpeg_next::frame::Video::empty();
        match self.inner.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(VideoFrame::from(frame))),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn exceeded(failures: u32) -> bool {
    failures >= MAX_SEND_FAILURES
}
