//! Switch records and statistics
//!
//! Every completed switch is handed to a [`SwitchRecorder`]. Recording is
//! advisory: the coordinator logs recorder failures and carries on.
//!
//! - [`SqliteRecorder`] keeps an append-only SQLite log with hourly snapshots
//! - [`NullRecorder`] only counts the current session (statistics disabled)

pub mod report;
pub mod sqlite;

pub use sqlite::SqliteRecorder;

use crate::config::StatsConfig;
use crate::error::RecorderError;
use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Format used for `switch_time` and report timestamps
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One persisted switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRecord {
    /// Local time of the switch
    pub switch_time: NaiveDateTime,
    /// Spoken content that triggered the switch
    pub user_content: String,
    /// Command the content resolved to
    pub command: String,
    pub scene_name: String,
}

/// Trait for switch record sinks
pub trait SwitchRecorder: Send + Sync {
    /// Append a completed switch
    fn record_switch(
        &self,
        content: &str,
        command: &str,
        scene_name: &str,
    ) -> Result<(), RecorderError>;

    /// Switches recorded since this recorder was created
    fn session_count(&self) -> u64;

    /// Switches recorded today (local time)
    fn today_count(&self) -> Result<u64, RecorderError>;

    /// Switches recorded ever
    fn total_count(&self) -> Result<u64, RecorderError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Recorder used when statistics are disabled
#[derive(Debug, Default)]
pub struct NullRecorder {
    session: AtomicU64,
}

impl NullRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SwitchRecorder for NullRecorder {
    fn record_switch(&self, _: &str, _: &str, _: &str) -> Result<(), RecorderError> {
        self.session.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn session_count(&self) -> u64 {
        self.session.load(Ordering::Relaxed)
    }

    fn today_count(&self) -> Result<u64, RecorderError> {
        Ok(self.session_count())
    }

    fn total_count(&self) -> Result<u64, RecorderError> {
        Ok(self.session_count())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Open the recorder selected by the config
///
/// A database that cannot be opened degrades to [`NullRecorder`] with a
/// warning rather than stopping the daemon. The SQLite handle is returned
/// separately so the hourly reporter can use it.
pub fn create_recorder(config: &StatsConfig) -> (Arc<dyn SwitchRecorder>, Option<Arc<SqliteRecorder>>) {
    if !config.enabled {
        tracing::info!("Switch statistics disabled");
        return (Arc::new(NullRecorder::new()), None);
    }

    let path = config.resolve_database();
    match SqliteRecorder::open(&path) {
        Ok(recorder) => {
            tracing::info!("Switch records: {:?}", path);
            let recorder = Arc::new(recorder);
            (recorder.clone(), Some(recorder))
        }
        Err(e) => {
            tracing::warn!("Failed to open switch database {:?}: {}", path, e);
            (Arc::new(NullRecorder::new()), None)
        }
    }
}
