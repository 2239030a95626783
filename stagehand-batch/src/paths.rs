use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

pub const BATCH_DIR: &str = "batch";
pub const LOG_EXTENSION: &str = "txt";

pub fn stagehand_root(home: &Path) -> PathBuf {
    home.join(".stagehand")
}

/// Default parent of every job directory: `~/.stagehand/batch`.
pub fn batch_root(home: &Path) -> PathBuf {
    stagehand_root(home).join(BATCH_DIR)
}

pub fn job_dir(log_dir: &Path, job: &str) -> PathBuf {
    log_dir.join(job)
}

pub fn sequence_log_path(log_dir: &Path, job: &str, sequence: &str) -> PathBuf {
    job_dir(log_dir, job).join(format!("{sequence}.{LOG_EXTENSION}"))
}

/// Timestamped job name, e.g. `20240102-030405-123456`.
pub fn job_name<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d-%H%M%S-%6f").to_string()
}
