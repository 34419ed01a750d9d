//! Timelapse cadence windows and their partition labeling.

use chrono::{Datelike, NaiveDateTime};

/// A capture cadence with its own storage partition and schedules.
///
/// The set is closed: partition naming dispatches on the variant, and the
/// label functions are pure, so the same instant always maps to the same
/// sub-directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimelapseWindow {
    Day,
    Week,
    Month,
    Quarter,
}

impl TimelapseWindow {
    /// All deployed windows, finest granularity first.
    pub const ALL: [TimelapseWindow; 4] = [Self::Day, Self::Week, Self::Month, Self::Quarter];

    pub fn name(self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Week => "WEEK",
            Self::Month => "MONTH",
            Self::Quarter => "QUARTER",
        }
    }

    /// Directory under the images/videos roots holding this window's
    /// partitions.
    pub fn storage_dir(self) -> &'static str {
        match self {
            Self::Day => "days_of_year",
            Self::Week => "weeks_of_year",
            Self::Month => "months_of_year",
            Self::Quarter => "quarters_of_year",
        }
    }

    /// Partition label for the given local timestamp.
    ///
    /// Week labels follow ISO week numbering, so the label flips on ISO
    /// week boundaries rather than calendar-week ones.
    pub fn sub_directory(self, t: NaiveDateTime) -> String {
        match self {
            Self::Day => t.format("%d-%m-%Y").to_string(),
            Self::Week => {
                let week = t.iso_week();
                format!("{}-W{}", week.year(), week.week())
            }
            Self::Month => t.format("%Y-%m").to_string(),
            Self::Quarter => format!("{}-Q{}", t.year(), (t.month() + 2) / 3),
        }
    }

    /// Cron cadence for image acquisition (seconds field first).
    pub fn acquisition_schedule(self) -> &'static str {
        match self {
            Self::Day => "0 */2 8-20 * * *",
            Self::Week => "0 */15 8-20 * * *",
            Self::Month => "0 0 8-20 * * *",
            Self::Quarter => "0 0 8,12,16,20 * * *",
        }
    }

    /// Cron cadence for video assembly.
    ///
    /// Month and quarter runs trigger on day 28, the latest day present
    /// in every month; the label still resolves to the month being closed
    /// out.
    pub fn assembly_schedule(self) -> &'static str {
        match self {
            Self::Day => "0 20 22 * * *",
            Self::Week => "0 15 22 * * Sun",
            Self::Month => "0 10 22 28 * *",
            Self::Quarter => "0 5 22 28 3,6,9,12 *",
        }
    }
}
