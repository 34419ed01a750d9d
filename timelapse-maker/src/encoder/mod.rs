//! External video encoding.

mod ffmpeg;
pub mod frames;

pub use ffmpeg::{FfmpegConfig, FfmpegEncoder};

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// The external encoding engine.
///
/// Implementations concatenate the manifest's listed frames into `output`,
/// overwriting any existing file, and optionally stream live telemetry to
/// `progress_url`. The concrete invocation stays behind this seam so the
/// assembly job and the progress decoder are testable with a fake engine.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(
        &self,
        manifest: &Path,
        output: &Path,
        progress_url: Option<&str>,
    ) -> Result<()>;
}
