use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context, Flags};

use crate::frame::VideoFrame;

/// Borrowed planar YUV 4:4:4 planes, each `width * height` bytes with no
/// row padding.
#[derive(Debug, Clone, Copy)]
pub struct PackedPlanes<'a> {
    pub y: &'a [u8],
    pub cb: &'a [u8],
    pub cr: &'a [u8],
}

/// Converts frames of one source format and size into planar YUV 4:4:4.
/// Bound once, then reused for every frame.
pub struct Scaler {
    context: Context,
    output: ffmpeg_next::frame::Video,
    planes: [Vec<u8>; 3],
    width: usize,
    height: usize,
}

impl Scaler {
    pub fn new(
        src_format: Pixel,
        src_width: u32,
        src_height: u32,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Self> {
        let context = Context::get(
            src_format,
            src_width,
            src_height,
            Pixel::YUV444P,
            width,
            height,
            Flags::BILINEAR,
        )
        .map_err(|e| {
            anyhow::anyhow!(
                "scaler {:?} {}x{} -> yuv444p {}x{}: {}",
                src_format,
                src_width,
                src_height,
                width,
                height,
                e
            )
        })?;

        let area = width as usize * height as usize;
        Ok(Self {
            context,
            output: ffmpeg_next::frame::Video::empty(),
            planes: [vec![0; area], vec![0; area], vec![0; area]],
            width: width as usize,
            height: height as usize,
        })
    }

    pub fn run(&mut self, frame: &VideoFrame) -> anyhow::Result<PackedPlanes<'_>> {
        self.context.run(frame.as_video(), &mut self.output)?;

        // sws output rows may be padded past `width`
        for (i, plane) in self.planes.iter_mut().enumerate() {
            let stride = self.output.stride(i);
            let data = self.output.data(i);
            for (row, dst) in plane.chunks_exact_mut(self.width).enumerate() {
                let start = row * stride;
                dst.copy_from_slice(&data[start..start + self.width]);
            }
        }

        let [y, cb, cr] = &self.planes;
        Ok(PackedPlanes { y, cb, cr })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

unsafe impl Send for Scaler {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::VideoDecoder;
    use crate::test_util::sample;

    #[test]
    fn test_scales_to_packed_planes() -> anyhow::Result<()> {
        let Some(path) = sample() else {
            return Ok(());
        };
        let mut decoder = VideoDecoder::open(&path)?;
        let (w, h) = (decoder.width(), decoder.height());
        let mut scaler = Scaler::new(decoder.format(), w, h, w, h)?;

        let frame = decoder
            .next_frame()?
            .ok_or_else(|| anyhow::anyhow!("empty sample"))?;
        let planes = scaler.run(&frame)?;
        let area = w as usize * h as usize;
        assert_eq!(planes.y.len(), area);
        assert_eq!(planes.cb.len(), area);
        assert_eq!(planes.cr.len(), area);
        Ok(())
    }

    #[test]
    fn test_rejects_unusable_format() {
        let _ = crate::init();
        assert!(Scaler::new(Pixel::None, 16, 16, 16, 16).is_err());
    }
}
