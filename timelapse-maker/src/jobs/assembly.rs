//! Scheduled assembly of a partition's images into a video artifact.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ffprogress::{Progress, ProgressSink};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Result;
use crate::catalog::{ArtifactCatalog, ArtifactRecord};
use crate::encoder::{Encoder, frames};
use crate::scheduler::Job;
use crate::utils::clock::Clock;
use crate::utils::fs;
use crate::window::TimelapseWindow;

/// Observer invoked for every progress snapshot during an encode.
pub type ProgressObserver = Arc<dyn Fn(Progress) + Send + Sync>;

/// Name of the artifact file produced in each assembly target directory.
const ARTIFACT_FILE_NAME: &str = "timelapse.mp4";

/// Assembles the current partition of a window into a video, records the
/// artifact, and reclaims the source images.
pub struct AssemblyJob {
    window: TimelapseWindow,
    images_root: PathBuf,
    videos_root: PathBuf,
    encoder: Arc<dyn Encoder>,
    catalog: Arc<dyn ArtifactCatalog>,
    observer: Option<ProgressObserver>,
    clock: Arc<dyn Clock>,
}

impl AssemblyJob {
    pub fn new(
        window: TimelapseWindow,
        images_root: PathBuf,
        videos_root: PathBuf,
        encoder: Arc<dyn Encoder>,
        catalog: Arc<dyn ArtifactCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            window,
            images_root,
            videos_root,
            encoder,
            catalog,
            observer: None,
            clock,
        }
    }

    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run one assembly: manifest, encode with live progress, catalog
    /// insert, source cleanup.
    ///
    /// Every failure aborts the run where it happened. A failed encode
    /// leaves any partial output in place for an operator to inspect, and
    /// the source partition is only deleted after the catalog insert
    /// succeeded. Cleanup failure is logged, not propagated, and does not
    /// retract the catalog entry.
    pub async fn execute(&self) -> Result<PathBuf> {
        // Progress is best-effort: without a sink the encode still runs.
        let sink = match ProgressSink::bind().await {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(
                    window = self.window.name(),
                    error = %e,
                    "progress sink unavailable, encoding without telemetry"
                );
                None
            }
        };

        let now = self.clock.now().naive_local();
        let label = self.window.sub_directory(now);
        let partition = self.images_root.join(self.window.storage_dir()).join(&label);

        let manifest = frames::build_manifest(&partition).await?;
        info!(
            window = self.window.name(),
            frames = manifest.frame_count(),
            manifest = %manifest.path().display(),
            "frame order prepared"
        );

        let target_dir = self.videos_root.join(self.window.storage_dir()).join(&label);
        fs::ensure_dir_all(&target_dir).await?;
        let video_path = target_dir.join(ARTIFACT_FILE_NAME);

        let token = CancellationToken::new();
        let progress_url = sink.as_ref().map(|s| s.progress_url());
        if let Some(sink) = sink {
            info!(url = %sink.progress_url(), "listening for encode progress");
            let observer = self.observer.clone();
            let sink_token = token.clone();
            tokio::spawn(sink.serve(sink_token, move |snapshot| {
                if let Some(observer) = &observer {
                    observer(snapshot);
                }
            }));
        }

        info!(window = self.window.name(), output = %video_path.display(), "starting encode");
        let encoded = self
            .encoder
            .encode(manifest.path(), &video_path, progress_url.as_deref())
            .await;
        // The encoder has exited; release a sink it never connected to.
        token.cancel();
        encoded?;

        let absolute_path = tokio::fs::canonicalize(&video_path).await?;
        let record = ArtifactRecord {
            display_name: label,
            window: self.window.name().to_string(),
            absolute_path,
            uploaded: false,
        };
        let id = self.catalog.insert_artifact(&record).await?;
        info!(
            window = self.window.name(),
            id,
            path = %record.absolute_path.display(),
            "artifact recorded"
        );

        match tokio::fs::remove_dir_all(&partition).await {
            Ok(()) => info!(dir = %partition.display(), "source images removed"),
            Err(e) => {
                warn!(dir = %partition.display(), error = %e, "failed to remove source images");
            }
        }
        Ok(video_path)
    }
}

#[async_trait]
impl Job for AssemblyJob {
    fn name(&self) -> String {
        format!("{} assembly", self.window.name())
    }

    async fn run(&self) {
        info!(job = %self.name(), "starting assembly run");
        if let Err(e) = self.execute().await {
            error!(window = self.window.name(), error = %e, "assembly run aborted");
        }
    }
}
