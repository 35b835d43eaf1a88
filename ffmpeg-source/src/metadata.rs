//! Video stream metadata (similar to ffprobe).

use std::fmt;
use std::path::Path;

use crate::input::AvInput;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Format name, e.g. "mov,mp4,m4a,3gp,3g2,mj2"
    pub format_name: String,
    /// Duration in seconds; None if unknown (e.g. raw h264).
    pub duration_sec: Option<f64>,
    pub stream_index: usize,
    /// Codec name, e.g. "h264"
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    /// Average frame rate; 0 if unknown.
    pub fps: f32,
    /// Time base, e.g. "1/90000"
    pub time_base: String,
}

impl VideoInfo {
    pub(crate) fn from_input(input: &AvInput) -> Self {
        let stream = input.video_stream();
        let time_base = stream.time_base();
        Self {
            format_name: input.format_name(),
            duration_sec: input.duration_sec(),
            stream_index: stream.index(),
            codec_name: stream.codec_name().to_string(),
            width: stream.width(),
            height: stream.height(),
            fps: stream.fps(),
            time_base: format!("{}/{}", time_base.numerator(), time_base.denominator()),
        }
    }
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[FORMAT]")?;
        writeln!(f, "format_name={}", self.format_name)?;
        match self.duration_sec {
            Some(d) => writeln!(f, "duration_sec={:.3}", d)?,
            None => writeln!(f, "duration_sec=N/A")?,
        }
        writeln!(f, "[/FORMAT]")?;
        writeln!(f, "[STREAM]")?;
        writeln!(f, "index={}", self.stream_index)?;
        writeln!(f, "codec_name={}", self.codec_name)?;
        writeln!(f, "width={}", self.width)?;
        writeln!(f, "height={}", self.height)?;
        writeln!(f, "fps={:.3}", self.fps)?;
        writeln!(f, "time_base={}", self.time_base)?;
        writeln!(f, "[/STREAM]")
    }
}

/// Opens a file and describes its best video stream.
pub fn probe(path: impl AsRef<Path>) -> anyhow::Result<VideoInfo> {
    let input = AvInput::open(path)?;
    Ok(VideoInfo::from_input(&input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sample;

    #[test]
    fn test_probe_sample() -> anyhow::Result<()> {
        let Some(path) = sample() else {
            return Ok(());
        };
        let info = probe(&path)?;
        assert!(info.width > 0 && info.height > 0);
        assert!(info.fps > 0.0);
        let text = info.to_string();
        assert!(text.contains("[STREAM]"));
        assert!(text.contains(&format!("width={}", info.width)));
        Ok(())
    }

    #[test]
    fn test_probe_missing_file() {
        assert!(probe("/nonexistent/clip.mp4").is_err());
    }
}
