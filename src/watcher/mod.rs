//! Chat log source watching
//!
//! [`SourceWatcher`] follows the newest chat log in the configured directory
//! and turns it into a stream of [`SourceEvent`]s:
//!
//! - new complete lines become `LineAppended`, in file order
//! - a deleted source is re-resolved (`SourceReplaced`, or `NoSource` while
//!   nothing matches)
//! - every `rescan_interval`, and whenever a matching file is created, a newer
//!   file replaces the active one
//!
//! The watcher runs on its own thread using `notify` plus a size poll, since
//! some writers (and network shares) do not produce change notifications.

pub mod discover;
pub mod tail;

pub use discover::find_latest_source;
pub use tail::LineTail;

use crate::config::MonitorConfig;
use crate::error::SourceError;
use chrono::{DateTime, Local};
use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// One physical line read from the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub content: String,
    /// File the line was read from
    pub source: PathBuf,
    pub discovered_at: DateTime<Local>,
}

/// Events emitted by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    LineAppended(LogLine),
    /// The active source changed; lines now come from `new`
    SourceReplaced { old: PathBuf, new: PathBuf },
    /// The source is gone and no replacement exists yet
    NoSource { dir: PathBuf },
}

/// Follows the newest chat log file
pub struct SourceWatcher {
    config: MonitorConfig,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SourceWatcher {
    /// Create a watcher; performs no I/O
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Find the file the watcher would follow
    pub fn resolve(&self) -> Result<PathBuf, SourceError> {
        find_latest_source(
            &self.config.log_directory,
            &self.config.file_pattern,
            &self.config.extension,
        )
    }

    /// Resolve the source and start following it
    ///
    /// Fails with [`SourceError::NoSource`] when there is nothing to watch.
    /// Returns the file being followed.
    pub fn start(&mut self, tx: mpsc::Sender<SourceEvent>) -> Result<PathBuf, SourceError> {
        if self.thread.is_some() {
            return Err(SourceError::Watch("watcher already running".to_string()));
        }

        let source = self.resolve()?;
        let tail = LineTail::open_at_end(&source)?;

        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(&self.config.log_directory, RecursiveMode::NonRecursive)?;

        tracing::info!("Following {:?}", source);

        self.stop.store(false, Ordering::SeqCst);
        let follower = Follower {
            config: self.config.clone(),
            stop: self.stop.clone(),
            tx,
            tail: Some(tail),
            last_source: source.clone(),
            last_rescan: Instant::now(),
        };

        let thread = std::thread::Builder::new()
            .name("source-watcher".to_string())
            .spawn(move || {
                // Keep the watcher alive for as long as the loop runs
                let _watcher = watcher;
                follower.run(notify_rx);
            })?;
        self.thread = Some(thread);

        Ok(source)
    }

    /// Stop the watcher thread and wait for it to exit
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Source watcher thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the watcher thread
struct Follower {
    config: MonitorConfig,
    stop: Arc<AtomicBool>,
    tx: mpsc::Sender<SourceEvent>,
    /// None while no source exists
    tail: Option<LineTail>,
    last_source: PathBuf,
    last_rescan: Instant,
}

impl Follower {
    fn run(mut self, notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>) {
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(10));
        let rescan = Duration::from_secs(self.config.rescan_interval);

        while !self.stop.load(Ordering::SeqCst) {
            let mut rescan_now = false;

            match notify_rx.recv_timeout(poll) {
                Ok(Ok(event)) => {
                    // A new chat session usually means a new file
                    if matches!(event.kind, EventKind::Create(_))
                        && event.paths.iter().any(|p| self.is_source(p))
                    {
                        rescan_now = true;
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!("Watch error: {:?}", e);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }

            if self.tail.is_none() || !self.last_source.exists() {
                if !self.recover() {
                    break;
                }
                continue;
            }

            if !self.drain() {
                break;
            }

            if rescan_now || (!rescan.is_zero() && self.last_rescan.elapsed() >= rescan) {
                self.last_rescan = Instant::now();
                if !self.rescan() {
                    break;
                }
            }
        }

        tracing::debug!("Source watcher stopped");
    }

    fn is_source(&self, path: &Path) -> bool {
        discover::matches_source(path, &self.config.file_pattern, &self.config.extension)
    }

    /// Send an event; false when the receiver is gone
    fn send(&self, event: SourceEvent) -> bool {
        self.tx.blocking_send(event).is_ok()
    }

    /// Emit every complete line appended since the last read
    fn drain(&mut self) -> bool {
        let Some(tail) = self.tail.as_mut() else {
            return true;
        };

        let lines = match tail.read_new_lines() {
            Ok(lines) => lines,
            Err(e) => {
                tracing::debug!("Cannot read {:?}: {}", tail.path(), e);
                return true;
            }
        };

        let source = tail.path().to_path_buf();
        for content in lines {
            let line = LogLine {
                content,
                source: source.clone(),
                discovered_at: Local::now(),
            };
            if !self.send(SourceEvent::LineAppended(line)) {
                return false;
            }
        }
        true
    }

    /// The source disappeared: look for a replacement
    fn recover(&mut self) -> bool {
        let had_source = self.tail.take().is_some();

        match find_latest_source(
            &self.config.log_directory,
            &self.config.file_pattern,
            &self.config.extension,
        ) {
            Ok(new) => {
                tracing::info!("Source {:?} replaced by {:?}", self.last_source, new);
                let old = std::mem::replace(&mut self.last_source, new.clone());
                self.tail = Some(LineTail::from_start(&new));
                self.send(SourceEvent::SourceReplaced { old, new }) && self.drain()
            }
            Err(e) => {
                if had_source {
                    tracing::warn!("Source {:?} is gone: {}", self.last_source, e);
                    return self.send(SourceEvent::NoSource {
                        dir: self.config.log_directory.clone(),
                    });
                }
                true
            }
        }
    }

    /// Switch to a newer file if one appeared
    fn rescan(&mut self) -> bool {
        let newest = match find_latest_source(
            &self.config.log_directory,
            &self.config.file_pattern,
            &self.config.extension,
        ) {
            Ok(newest) => newest,
            Err(e) => {
                tracing::debug!("Rescan found nothing: {}", e);
                return true;
            }
        };

        if newest == self.last_source {
            return true;
        }

        // Finish the old file before moving on
        if !self.drain() {
            return false;
        }

        tracing::info!("Newer source {:?} replaces {:?}", newest, self.last_source);
        let old = std::mem::replace(&mut self.last_source, newest.clone());
        self.tail = Some(LineTail::from_start(&newest));
        self.send(SourceEvent::SourceReplaced { old, new: newest }) && self.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn monitor_config(dir: &Path) -> MonitorConfig {
        MonitorConfig {
            log_directory: dir.to_path_buf(),
            poll_interval_ms: 20,
            rescan_interval: 0,
            ..MonitorConfig::default()
        }
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    async fn next_event(rx: &mut mpsc::Receiver<SourceEvent>) -> SourceEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for source event")
            .expect("watcher channel closed")
    }

    #[test]
    fn test_new_does_no_io() {
        let watcher = SourceWatcher::new(monitor_config(Path::new("/definitely/not/here")));
        assert!(!watcher.is_running());
        assert!(matches!(
            watcher.resolve(),
            Err(SourceError::DirectoryMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_start_without_source_fails() {
        let temp = TempDir::new().unwrap();
        let mut watcher = SourceWatcher::new(monitor_config(temp.path()));
        let (tx, _rx) = mpsc::channel(16);
        let err = watcher.start(tx).unwrap_err();
        assert!(matches!(err, SourceError::NoSource { .. }));
    }

    #[tokio::test]
    async fn test_emits_appended_lines_in_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("1_用户发言记录.txt");
        std::fs::write(&path, "history\n").unwrap();

        let mut watcher = SourceWatcher::new(monitor_config(temp.path()));
        let (tx, mut rx) = mpsc::channel(16);
        assert_eq!(watcher.start(tx).unwrap(), path);

        append(&path, "[用户发言]a： 看8\n[用户发言]b： hi\n");

        match next_event(&mut rx).await {
            SourceEvent::LineAppended(line) => {
                assert_eq!(line.content, "[用户发言]a： 看8");
                assert_eq!(line.source, path);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match next_event(&mut rx).await {
            SourceEvent::LineAppended(line) => assert_eq!(line.content, "[用户发言]b： hi"),
            other => panic!("unexpected event {:?}", other),
        }

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_removed_source_is_replaced() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("1_用户发言记录.txt");
        let second = temp.path().join("2_用户发言记录.txt");
        std::fs::write(&first, "").unwrap();

        let mut watcher = SourceWatcher::new(monitor_config(temp.path()));
        let (tx, mut rx) = mpsc::channel(16);
        watcher.start(tx).unwrap();

        std::fs::write(&second, "看9\n").unwrap();
        std::fs::remove_file(&first).unwrap();

        // The replacement is read from its start
        let mut saw_replace = false;
        loop {
            match next_event(&mut rx).await {
                SourceEvent::SourceReplaced { old, new } => {
                    assert_eq!(old, first);
                    assert_eq!(new, second);
                    saw_replace = true;
                }
                SourceEvent::LineAppended(line) => {
                    assert!(saw_replace);
                    assert_eq!(line.content, "看9");
                    break;
                }
                SourceEvent::NoSource { .. } => {}
            }
        }
    }

    /// Expect `old` to be replaced by `new`, then `new`'s first line
    async fn expect_replacement(
        rx: &mut mpsc::Receiver<SourceEvent>,
        old: &Path,
        new: &Path,
        first_line: &str,
    ) {
        assert_eq!(
            next_event(rx).await,
            SourceEvent::SourceReplaced {
                old: old.to_path_buf(),
                new: new.to_path_buf()
            }
        );
        match next_event(rx).await {
            SourceEvent::LineAppended(line) => {
                assert_eq!(line.content, first_line);
                assert_eq!(line.source, new);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_created_newer_source_replaces_active() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("1_用户发言记录.txt");
        let second = temp.path().join("2_用户发言记录.txt");
        std::fs::write(&first, "").unwrap();

        // No periodic rescan: only the create notification can switch
        let mut watcher = SourceWatcher::new(monitor_config(temp.path()));
        let (tx, mut rx) = mpsc::channel(16);
        watcher.start(tx).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(&second, "看7\n").unwrap();

        expect_replacement(&mut rx, &first, &second, "看7").await;
        assert!(first.exists());

        append(&second, "看9\n");
        match next_event(&mut rx).await {
            SourceEvent::LineAppended(line) => assert_eq!(line.content, "看9"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_periodic_rescan_picks_up_newer_source() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        let first = temp.path().join("1_用户发言记录.txt");
        let second = temp.path().join("2_用户发言记录.txt");
        std::fs::write(&first, "").unwrap();

        let mut watcher = SourceWatcher::new(MonitorConfig {
            rescan_interval: 1,
            ..monitor_config(temp.path())
        });
        let (tx, mut rx) = mpsc::channel(16);
        watcher.start(tx).unwrap();

        // Written elsewhere and moved in, so no create event names it
        std::thread::sleep(Duration::from_millis(20));
        let staged = staging.join("2_用户发言记录.txt");
        std::fs::write(&staged, "看8\n").unwrap();
        std::fs::rename(&staged, &second).unwrap();

        expect_replacement(&mut rx, &first, &second, "看8").await;
    }

    #[tokio::test]
    async fn test_removed_source_without_replacement() {
        let temp = TempDir::new().unwrap();
        let only = temp.path().join("用户发言记录.txt");
        std::fs::write(&only, "").unwrap();

        let mut watcher = SourceWatcher::new(monitor_config(temp.path()));
        let (tx, mut rx) = mpsc::channel(16);
        watcher.start(tx).unwrap();

        std::fs::remove_file(&only).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            SourceEvent::NoSource {
                dir: temp.path().to_path_buf()
            }
        );
    }
}
