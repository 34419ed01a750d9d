//! ffmpeg invocation for the concat encode.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::Encoder;
use crate::{Error, Result};

/// Encoding parameters for the produced timelapse.
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// Path to the ffmpeg binary.
    pub binary_path: String,
    /// Input frame rate for the concat demuxer.
    pub frame_rate: String,
    /// x265 constant rate factor (higher compresses more).
    pub crf: u32,
    /// Output resolution.
    pub resolution: String,
    /// Output video codec.
    pub video_codec: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            frame_rate: "5/1".to_string(),
            crf: 28,
            resolution: "1280x720".to_string(),
            video_codec: "libx265".to_string(),
        }
    }
}

/// Drives one external ffmpeg process per encode.
pub struct FfmpegEncoder {
    config: FfmpegConfig,
    version: Option<String>,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::with_config(FfmpegConfig::default())
    }

    pub fn with_config(config: FfmpegConfig) -> Self {
        let version = Self::detect_version(&config.binary_path);
        Self { config, version }
    }

    /// First line of `ffmpeg -version`, probed once at construction.
    fn detect_version(path: &str) -> Option<String> {
        std::process::Command::new(path)
            .arg("-version")
            .output()
            .ok()
            .and_then(|output| {
                String::from_utf8(output.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.to_string()))
            })
    }

    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn build_args(
        &self,
        manifest: &Path,
        output: &Path,
        progress_url: Option<&str>,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-r".into(),
            self.config.frame_rate.clone().into(),
        ];
        if let Some(url) = progress_url {
            args.push("-progress".into());
            args.push(url.into());
        }
        args.push("-i".into());
        args.push(manifest.into());
        args.extend([
            "-vcodec".into(),
            self.config.video_codec.clone().into(),
            "-crf".into(),
            self.config.crf.to_string().into(),
            "-s".into(),
            self.config.resolution.clone().into(),
        ]);
        args.push(output.into());
        args
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(
        &self,
        manifest: &Path,
        output: &Path,
        progress_url: Option<&str>,
    ) -> Result<()> {
        let args = self.build_args(manifest, output, progress_url);
        debug!(
            manifest = %manifest.display(),
            output = %output.display(),
            "spawning ffmpeg"
        );

        let child = Command::new(&self.config.binary_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Encode(format!("failed to spawn {}: {e}", self.config.binary_path))
            })?;

        let result = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Encode(format!("failed to wait for ffmpeg: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Encode(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                stderr_tail(&stderr)
            )));
        }

        info!(output = %output.display(), "encode finished");
        Ok(())
    }
}

/// Last few stderr lines, enough to identify the failure without dumping
/// the whole transcript into the log.
fn stderr_tail(stderr: &str) -> String {
    let mut lines: Vec<&str> = stderr.lines().rev().take(5).collect();
    lines.reverse();
    lines.join(" | ")
}
