/// Registers FFmpeg components. Safe to call more than once.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod decoder;
pub mod frame;
pub mod input;
pub mod metadata;
pub mod scaler;

pub use decoder::VideoDecoder;
pub use frame::VideoFrame;
pub use input::{AvInput, VideoStream};
pub use metadata::{VideoInfo, probe};
pub use scaler::{PackedPlanes, Scaler};

#[cfg(test)]
pub(crate) mod test_util {
    use std::path::{Path, PathBuf};

    /// scripts/test.mp4 under the workspace root, wherever the tests run from.
    pub fn test_mp4_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .join("scripts")
            .join("test.mp4")
    }

    pub fn sample() -> Option<PathBuf> {
        let _ = env_logger::builder().is_test(true).try_init();
        let path = test_mp4_path();
        if path.exists() {
            Some(path)
        } else {
            eprintln!("skip: {} not found", path.display());
            None
        }
    }
}
