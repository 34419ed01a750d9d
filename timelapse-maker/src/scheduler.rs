//! Cron-driven job dispatch.
//!
//! Cron field semantics come from the `cron` crate; this module only
//! computes each job's next due time and sleeps until it. Every job gets
//! its own task, so jobs for different windows run concurrently and no
//! job may assume mutual exclusion with any other.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{Error, Result};

/// A unit of work the scheduler can trigger.
///
/// `run` must not fail: job-level errors are handled and logged at the
/// job boundary, and the next scheduled trigger is the only retry.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> String;
    async fn run(&self);
}

struct Entry {
    schedule: Schedule,
    job: Arc<dyn Job>,
}

/// Dispatches registered jobs at their cron cadences.
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job under a cron expression.
    ///
    /// An unparseable expression is a configuration error; startup should
    /// abort before any scheduling begins.
    pub fn add_job(&mut self, expression: &str, job: Arc<dyn Job>) -> Result<()> {
        let schedule = Schedule::from_str(expression).map_err(|e| {
            Error::config(format!(
                "invalid cron expression '{expression}' for {}: {e}",
                job.name()
            ))
        })?;
        debug!(job = %job.name(), %expression, "job registered");
        self.entries.push(Entry { schedule, job });
        Ok(())
    }

    /// Spawn one dispatch loop per registered job.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        self.entries
            .into_iter()
            .map(|entry| tokio::spawn(dispatch(entry.schedule, entry.job)))
            .collect()
    }
}

async fn dispatch(schedule: Schedule, job: Arc<dyn Job>) {
    loop {
        let Some(next) = schedule.upcoming(Local).next() else {
            info!(job = %job.name(), "schedule has no further trigger times");
            return;
        };
        let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;
        debug!(job = %job.name(), "trigger due");
        job.run().await;
    }
}
