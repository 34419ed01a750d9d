use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timelapse_maker::catalog::{ArtifactCatalog, PgArtifactCatalog};
use timelapse_maker::config::Config;
use timelapse_maker::encoder::{FfmpegConfig, FfmpegEncoder};
use timelapse_maker::fetcher::ImageFetcher;
use timelapse_maker::jobs::assembly::ProgressObserver;
use timelapse_maker::jobs::{AcquisitionJob, AssemblyJob};
use timelapse_maker::scheduler::Scheduler;
use timelapse_maker::utils::clock::{Clock, SystemClock};
use timelapse_maker::utils::format;
use timelapse_maker::window::TimelapseWindow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timelapse_maker=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("resolving configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database_url)
        .await
        .context("connecting to the artifact catalog")?;
    info!("connected to the artifact catalog");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = Arc::new(ImageFetcher::new(config.image_url.clone(), clock.clone()));
    let catalog: Arc<dyn ArtifactCatalog> = Arc::new(PgArtifactCatalog::new(pool.clone()));

    let encoder = Arc::new(FfmpegEncoder::with_config(FfmpegConfig {
        binary_path: config.ffmpeg_path.clone(),
        ..FfmpegConfig::default()
    }));
    match encoder.version() {
        Some(version) => info!(%version, "encoder available"),
        None => warn!(binary = %config.ffmpeg_path, "ffmpeg not found, assembly runs will fail"),
    }

    let images_root = config.images_root();
    let videos_root = config.videos_root();

    let observer: ProgressObserver = Arc::new(|p: ffprogress::Progress| {
        info!(
            frame = p.frame,
            fps = %p.fps,
            size = %format::si_bytes(p.total_size),
            elapsed = ?Duration::from_micros(p.out_time_us),
            status = ?p.status,
            "encode progress"
        );
    });

    let mut scheduler = Scheduler::new();
    for window in TimelapseWindow::ALL {
        scheduler.add_job(
            window.acquisition_schedule(),
            Arc::new(AcquisitionJob::new(
                window,
                images_root.clone(),
                fetcher.clone(),
                clock.clone(),
            )),
        )?;
        scheduler.add_job(
            window.assembly_schedule(),
            Arc::new(
                AssemblyJob::new(
                    window,
                    images_root.clone(),
                    videos_root.clone(),
                    encoder.clone(),
                    catalog.clone(),
                    clock.clone(),
                )
                .with_observer(observer.clone()),
            ),
        )?;
    }
    let handles = scheduler.start();
    info!(jobs = handles.len(), "scheduler started");

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown signal received, exiting");

    pool.close().await;
    info!("catalog pool closed");
    Ok(())
}
