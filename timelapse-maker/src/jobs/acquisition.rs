//! Scheduled acquisition of a single source image per trigger.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::Result;
use crate::fetcher::ImageFetcher;
use crate::scheduler::Job;
use crate::utils::clock::Clock;
use crate::utils::{filename, fs};
use crate::window::TimelapseWindow;

/// Fetches the source image and stores it in the window's current
/// partition.
pub struct AcquisitionJob {
    window: TimelapseWindow,
    images_root: PathBuf,
    fetcher: Arc<ImageFetcher>,
    clock: Arc<dyn Clock>,
}

impl AcquisitionJob {
    pub fn new(
        window: TimelapseWindow,
        images_root: PathBuf,
        fetcher: Arc<ImageFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            window,
            images_root,
            fetcher,
            clock,
        }
    }

    /// Fetch and store one image.
    ///
    /// The bytes land in a `.part` file first and are renamed into place,
    /// so a concurrent reader sees either no file or a fully formed one.
    /// A re-run within the same second overwrites the previous image. On
    /// fetch failure nothing is written.
    pub async fn execute(&self) -> Result<PathBuf> {
        let bytes = self.fetcher.fetch().await?;

        let now = self.clock.now().naive_local();
        let path = self
            .images_root
            .join(self.window.storage_dir())
            .join(self.window.sub_directory(now))
            .join(filename::image_file_name(now));
        fs::ensure_parent_dir(&path).await?;

        let staging = path.with_extension("jpg.part");
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &path).await?;

        info!(bytes = bytes.len(), path = %path.display(), "image saved");
        Ok(path)
    }
}

#[async_trait]
impl Job for AcquisitionJob {
    fn name(&self) -> String {
        format!("{} acquisition", self.window.name())
    }

    async fn run(&self) {
        info!(job = %self.name(), "starting acquisition run");
        if let Err(e) = self.execute().await {
            error!(window = self.window.name(), error = %e, "acquisition run failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use chrono::{DateTime, Local, TimeZone};
    use std::path::Path;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serving(body: &[u8]) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&server)
            .await;
        server
    }

    fn job_at(server: &MockServer, root: &Path, at: DateTime<Local>) -> AcquisitionJob {
        let clock = Arc::new(ManualClock::new(at));
        let fetcher = Arc::new(ImageFetcher::new(server.uri(), clock.clone()));
        AcquisitionJob::new(TimelapseWindow::Day, root.to_path_buf(), fetcher, clock)
    }

    #[tokio::test]
    async fn stores_the_image_under_the_window_partition() {
        let server = serving(b"jpeg-bytes").await;
        let dir = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2025, 3, 7, 10, 15, 42).unwrap();

        let path = job_at(&server, dir.path(), at).execute().await.expect("acquisition");

        assert_eq!(
            path,
            dir.path().join("days_of_year/07-03-2025/07-03-2025 10_15_42.jpg")
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn same_second_rerun_overwrites_the_previous_image() {
        let server = serving(b"jpeg-bytes").await;
        let dir = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2025, 3, 7, 10, 15, 42).unwrap();
        let job = job_at(&server, dir.path(), at);

        let first = job.execute().await.expect("first run");
        let second = job.execute().await.expect("second run");
        assert_eq!(first, second);

        let partition = dir.path().join("days_of_year/07-03-2025");
        let entries: Vec<_> = std::fs::read_dir(&partition)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec!["07-03-2025 10_15_42.jpg"]);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_no_file_behind() {
        // No mock mounted: every request is answered with 404.
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2025, 3, 7, 10, 15, 42).unwrap();

        let result = job_at(&server, dir.path(), at).execute().await;

        assert!(matches!(result, Err(crate::Error::RemoteStatus { status: 404 })));
        assert!(!dir.path().join("days_of_year").exists());
    }
}
