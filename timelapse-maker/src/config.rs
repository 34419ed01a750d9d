//! Environment-derived configuration.

use std::path::PathBuf;

use crate::{Error, Result};

const IMAGE_URL: &str = "IMAGE_URL";
const DATABASE_URL: &str = "DATABASE_URL";
const BASE_DIRECTORY: &str = "BASE_DIRECTORY";
const FFMPEG_PATH: &str = "FFMPEG_PATH";

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the webcam image to capture.
    pub image_url: String,
    /// Postgres connection string for the artifact catalog.
    pub database_url: String,
    /// Directory holding the `images/` and `videos/` trees.
    pub base_directory: PathBuf,
    /// Path to the ffmpeg binary.
    pub ffmpeg_path: String,
}

impl Config {
    /// Resolve configuration from the process environment.
    ///
    /// A missing required variable aborts startup: there is no useful
    /// degraded mode without the image source, the catalog, or the
    /// storage root.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            image_url: require(IMAGE_URL)?,
            database_url: require(DATABASE_URL)?,
            base_directory: PathBuf::from(require(BASE_DIRECTORY)?),
            ffmpeg_path: std::env::var(FFMPEG_PATH).unwrap_or_else(|_| "ffmpeg".to_string()),
        })
    }

    /// Root of the acquired-image partitions.
    pub fn images_root(&self) -> PathBuf {
        self.base_directory.join("images")
    }

    /// Root of the assembled video artifacts.
    pub fn videos_root(&self) -> PathBuf {
        self.base_directory.join("videos")
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::config(format!("{name} must be set")))
}
