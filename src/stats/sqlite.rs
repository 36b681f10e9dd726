//! SQLite switch record storage
//!
//! Two tables:
//! - `switch_records`: one row per completed switch, `switch_time` stored as
//!   local `YYYY-MM-DD HH:MM:SS` text so day and hour buckets are prefixes
//! - `hourly_statistics`: one row per hour bucket, written by the reporter

use super::{SwitchRecord, SwitchRecorder, TIME_FORMAT};
use crate::error::RecorderError;
use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed switch recorder
pub struct SqliteRecorder {
    conn: Mutex<Connection>,
    session: AtomicU64,
}

impl SqliteRecorder {
    /// Open or create the record database
    pub fn open(path: &Path) -> Result<Self, RecorderError> {
        // Ensure database directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let recorder = Self {
            conn: Mutex::new(conn),
            session: AtomicU64::new(0),
        };
        recorder.init_schema()?;

        Ok(recorder)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), RecorderError> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS switch_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                switch_time TEXT NOT NULL,
                user_content TEXT NOT NULL,
                scene_number TEXT NOT NULL,
                scene_name TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS hourly_statistics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hour_time TEXT NOT NULL UNIQUE,
                switch_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_switch_records_time ON switch_records(switch_time);
            "#,
        )?;
        Ok(())
    }

    /// Append a switch with an explicit timestamp
    pub fn record_switch_at(
        &self,
        at: NaiveDateTime,
        content: &str,
        command: &str,
        scene_name: &str,
    ) -> Result<(), RecorderError> {
        self.conn().execute(
            r#"
            INSERT INTO switch_records (switch_time, user_content, scene_number, scene_name)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![at.format(TIME_FORMAT).to_string(), content, command, scene_name],
        )?;
        self.session.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Count records whose timestamp starts with `prefix`
    fn count_prefix(&self, prefix: &str) -> Result<u64, RecorderError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM switch_records WHERE substr(switch_time, 1, ?1) = ?2",
            params![prefix.chars().count() as i64, prefix],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Switches on a given day
    pub fn day_count(&self, day: NaiveDate) -> Result<u64, RecorderError> {
        self.count_prefix(&day.format("%Y-%m-%d").to_string())
    }

    /// Switches in the hour bucket containing `at`
    pub fn hour_count(&self, at: NaiveDateTime) -> Result<u64, RecorderError> {
        self.count_prefix(&at.format("%Y-%m-%d %H").to_string())
    }

    /// Switches in the current local hour
    pub fn current_hour_count(&self) -> Result<u64, RecorderError> {
        self.hour_count(Local::now().naive_local())
    }

    /// Per-hour counts for a day, only hours with at least one switch
    pub fn hourly_counts(&self, day: NaiveDate) -> Result<Vec<(u32, u64)>, RecorderError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT CAST(substr(switch_time, 12, 2) AS INTEGER) AS hour, COUNT(*)
            FROM switch_records
            WHERE substr(switch_time, 1, 10) = ?1
            GROUP BY hour
            ORDER BY hour
            "#,
        )?;
        let counts = stmt
            .query_map(params![day.format("%Y-%m-%d").to_string()], |row| {
                Ok((row.get::<_, i64>(0)? as u32, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Most recent switches, newest first
    pub fn recent_records(&self, limit: u32) -> Result<Vec<SwitchRecord>, RecorderError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT switch_time, user_content, scene_number, scene_name
            FROM switch_records
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;
        let records = stmt
            .query_map(params![limit], |row| {
                let time: String = row.get(0)?;
                Ok(SwitchRecord {
                    switch_time: NaiveDateTime::parse_from_str(&time, TIME_FORMAT)
                        .unwrap_or_default(),
                    user_content: row.get(1)?,
                    command: row.get(2)?,
                    scene_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Store the count for the hour bucket containing `hour`
    ///
    /// Re-running for the same hour overwrites the earlier snapshot.
    pub fn write_hourly_snapshot(&self, hour: NaiveDateTime) -> Result<u64, RecorderError> {
        let count = self.hour_count(hour)?;
        self.conn().execute(
            r#"
            INSERT INTO hourly_statistics (hour_time, switch_count)
            VALUES (?1, ?2)
            ON CONFLICT(hour_time) DO UPDATE SET switch_count = excluded.switch_count
            "#,
            params![hour.format("%Y-%m-%d %H:00").to_string(), count as i64],
        )?;
        Ok(count)
    }

    /// Previously written snapshot for an hour bucket
    pub fn hourly_snapshot(&self, hour: NaiveDateTime) -> Result<Option<u64>, RecorderError> {
        let count = self
            .conn()
            .query_row(
                "SELECT switch_count FROM hourly_statistics WHERE hour_time = ?1",
                params![hour.format("%Y-%m-%d %H:00").to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(count.map(|c| c as u64))
    }
}

impl SwitchRecorder for SqliteRecorder {
    fn record_switch(
        &self,
        content: &str,
        command: &str,
        scene_name: &str,
    ) -> Result<(), RecorderError> {
        self.record_switch_at(Local::now().naive_local(), content, command, scene_name)
    }

    fn session_count(&self) -> u64 {
        self.session.load(Ordering::Relaxed)
    }

    fn today_count(&self) -> Result<u64, RecorderError> {
        self.day_count(Local::now().date_naive())
    }

    fn total_count(&self) -> Result<u64, RecorderError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM switch_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
