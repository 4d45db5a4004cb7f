//! 过期日志清理.

use super::LoggingConfig;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::fs;
use std::path::Path;

/// 删除早于 `today - retention_days` 的日志文件, 返回删除的文件数
pub fn prune_old_logs(config: &LoggingConfig, today: NaiveDate) -> Result<usize> {
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(0);
    }
    let cutoff = today - ChronoDuration::days(config.retention_days.max(0));

    let mut removed = 0;
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(date) = parse_log_name(&file_name, &config.file_prefix) else {
            continue;
        };
        if date < cutoff && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

fn parse_log_name(file_name: &str, prefix: &str) -> Option<NaiveDate> {
    let date_part = file_name
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(".log")?;
    if date_part.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
