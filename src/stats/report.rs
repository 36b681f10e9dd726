//! Hourly reporting and text export

use super::{SqliteRecorder, SwitchRecorder, TIME_FORMAT};
use crate::error::RecorderError;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, Timelike};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

/// Records listed in an exported report
const EXPORT_RECENT: u32 = 20;

/// Aggregate counts at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub session: u64,
    pub today: u64,
    pub total: u64,
    pub current_hour: u64,
}

impl Summary {
    /// Collect counts from the recorder
    pub fn collect(recorder: &SqliteRecorder) -> Result<Self, RecorderError> {
        Ok(Self {
            session: recorder.session_count(),
            today: recorder.today_count()?,
            total: recorder.total_count()?,
            current_hour: recorder.current_hour_count()?,
        })
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "session {}, this hour {}, today {}, total {}",
            self.session, self.current_hour, self.today, self.total
        )
    }
}

/// Start of the hour bucket containing `at`
pub fn hour_start(at: NaiveDateTime) -> NaiveDateTime {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Time left until the next top of the hour
pub fn duration_until_next_hour(now: NaiveDateTime) -> Duration {
    let next = hour_start(now) + ChronoDuration::hours(1);
    (next - now).to_std().unwrap_or(Duration::from_secs(3600))
}

/// Snapshot the hour that just ended and log a summary
///
/// Called at the top of each hour; `now` is the current local time.
pub fn report_hour(recorder: &SqliteRecorder, now: NaiveDateTime) -> Result<u64, RecorderError> {
    let previous = hour_start(now) - ChronoDuration::hours(1);
    let count = recorder.write_hourly_snapshot(previous)?;
    let summary = Summary::collect(recorder)?;

    tracing::info!(
        "Switches {}: {} (session {}, today {}, total {})",
        previous.format("%Y-%m-%d %H:00"),
        count,
        summary.session,
        summary.today,
        summary.total
    );

    Ok(count)
}

/// Render a plain-text statistics report
pub fn render_report(
    recorder: &SqliteRecorder,
    generated_at: NaiveDateTime,
) -> Result<String, RecorderError> {
    let summary = Summary::collect(recorder)?;
    let records = recorder.recent_records(EXPORT_RECENT)?;
    let today = recorder.hourly_counts(generated_at.date())?;

    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "Scene switch report");
    let _ = writeln!(out, "Generated: {}", generated_at.format(TIME_FORMAT));
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out);
    let _ = writeln!(out, "Totals:");
    let _ = writeln!(out, "  This session: {}", summary.session);
    let _ = writeln!(out, "  Today:        {}", summary.today);
    let _ = writeln!(out, "  All time:     {}", summary.total);
    let _ = writeln!(out);

    if !today.is_empty() {
        let _ = writeln!(out, "Today by hour:");
        for (hour, count) in &today {
            let _ = writeln!(out, "  {:02}:00  {}", hour, count);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Last {} switches:", records.len());
    let _ = writeln!(out, "{}", "-".repeat(50));
    for record in &records {
        let _ = writeln!(out, "Time:    {}", record.switch_time.format(TIME_FORMAT));
        if record.scene_name.is_empty() {
            let _ = writeln!(out, "Scene:   {}", record.command);
        } else {
            let _ = writeln!(out, "Scene:   {} ({})", record.command, record.scene_name);
        }
        let _ = writeln!(out, "Content: {}", record.user_content);
        let _ = writeln!(out, "{}", "-".repeat(30));
    }

    Ok(out)
}

impl SqliteRecorder {
    /// Write a statistics report to a text file
    pub fn export_report(&self, path: &Path) -> Result<(), RecorderError> {
        let report = render_report(self, Local::now().naive_local())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, report)?;
        tracing::info!("Statistics exported to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIME_FORMAT).unwrap()
    }

    #[test]
    fn test_duration_until_next_hour() {
        assert_eq!(
            duration_until_next_hour(at("2025-08-29 22:53:00")),
            Duration::from_secs(7 * 60)
        );
        assert_eq!(
            duration_until_next_hour(at("2025-08-29 22:00:00")),
            Duration::from_secs(3600)
        );
        assert_eq!(
            duration_until_next_hour(at("2025-08-29 23:59:59")),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_hour_start() {
        assert_eq!(hour_start(at("2025-08-29 22:53:09")), at("2025-08-29 22:00:00"));
    }

    #[test]
    fn test_report_hour_snapshots_previous_hour() {
        let temp = TempDir::new().unwrap();
        let recorder = SqliteRecorder::open(&temp.path().join("r.db")).unwrap();

        recorder.record_switch_at(at("2025-08-29 22:10:00"), "看1", "1", "One").unwrap();
        recorder.record_switch_at(at("2025-08-29 22:50:00"), "看2", "2", "Two").unwrap();
        recorder.record_switch_at(at("2025-08-29 23:00:01"), "看3", "3", "Three").unwrap();

        let count = report_hour(&recorder, at("2025-08-29 23:00:02")).unwrap();
        assert_eq!(count, 2);
        assert_eq!(recorder.hourly_snapshot(at("2025-08-29 22:00:00")).unwrap(), Some(2));
    }

    #[test]
    fn test_render_report() {
        let temp = TempDir::new().unwrap();
        let recorder = SqliteRecorder::open(&temp.path().join("r.db")).unwrap();
        recorder.record_switch_at(at("2025-08-29 22:10:00"), "看8", "8", "Cam8").unwrap();

        let report = render_report(&recorder, at("2025-08-29 22:30:00")).unwrap();
        assert!(report.contains("Generated: 2025-08-29 22:30:00"));
        assert!(report.contains("All time:     1"));
        assert!(report.contains("22:00  1"));
        assert!(report.contains("Scene:   8 (Cam8)"));
        assert!(report.contains("Content: 看8"));
    }

    #[test]
    fn test_export_report_writes_file() {
        let temp = TempDir::new().unwrap();
        let recorder = SqliteRecorder::open(&temp.path().join("r.db")).unwrap();
        recorder.record_switch("看8", "8", "Cam8").unwrap();

        let path = temp.path().join("out").join("report.txt");
        recorder.export_report(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("This session: 1"));
    }
}
