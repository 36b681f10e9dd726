//! Daemon module - main event loop orchestration
//!
//! Coordinates the chat log watcher, trigger parsing, the switch
//! coordinator, and the hourly statistics report.

use crate::config::{self, Config};
use crate::error::{Result, ScenecueError, SourceError};
use crate::obs::{ObsClient, SceneTransport};
use crate::state::SwitchPhase;
use crate::stats::{self, report, SqliteRecorder};
use crate::switcher::SwitchCoordinator;
use crate::text::{TextPipeline, Trigger};
use crate::watcher::{SourceEvent, SourceWatcher};
use pidlock::Pidlock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

/// Delay between discovery attempts while waiting for a chat log
const SOURCE_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Write state to file for external integrations (e.g., status bars)
fn write_state_file(path: &Path, state: &str) {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    if let Err(e) = std::fs::write(path, state) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", state);
    }
}

/// Remove a runtime file on shutdown
fn cleanup_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

/// Write PID file so `kill -HUP` can reload the config
fn write_pid_file() -> Option<PathBuf> {
    let pid_path = Config::runtime_dir().join("pid");

    // Ensure parent directory exists
    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

/// Take the single-instance lock
fn acquire_instance_lock() -> Result<Pidlock> {
    let lock_path = Config::runtime_dir().join("daemon.lock");
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let lock_path_str = lock_path.to_string_lossy().to_string();
    let mut lock = Pidlock::new(&lock_path_str);
    match lock.acquire() {
        Ok(_) => {
            tracing::debug!("Acquired instance lock {:?}", lock_path);
            Ok(lock)
        }
        Err(_) => Err(ScenecueError::Config(
            "Another scenecue daemon is already running".to_string(),
        )),
    }
}

/// Main daemon that orchestrates all components
pub struct Daemon {
    config: Config,
    config_path: Option<PathBuf>,
    wait_for_source: bool,
    state_file_path: Option<PathBuf>,
    pid_file_path: Option<PathBuf>,
}

impl Daemon {
    /// Create a new daemon with the given configuration
    ///
    /// `config_path` is re-read on SIGHUP and receives the refreshed scene
    /// table when `refresh_on_start` is set.
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        let state_file_path = config.resolve_state_file();
        Self {
            config,
            config_path,
            wait_for_source: false,
            state_file_path,
            pid_file_path: None,
        }
    }

    /// Keep retrying discovery while no chat log exists
    pub fn wait_for_source(mut self, wait: bool) -> Self {
        self.wait_for_source = wait;
        self
    }

    /// Update the state file if configured
    fn update_state(&self, phase: SwitchPhase) {
        if let Some(ref path) = self.state_file_path {
            write_state_file(path, phase.as_str());
        }
    }

    /// Rebuild the scene table from OBS and persist it
    async fn refresh_scenes(&mut self, transport: &dyn SceneTransport) {
        match transport.list_scenes().await {
            Ok(names) if names.is_empty() => {
                tracing::warn!("OBS reported no scenes, keeping the configured table");
            }
            Ok(names) => {
                self.config.apply_scene_list(&names);
                tracing::info!("Scene table refreshed from OBS ({} scenes)", names.len());
                if let Some(ref path) = self.config_path {
                    if let Err(e) = config::save_config(&self.config, path) {
                        tracing::warn!("Failed to save refreshed scene table: {}", e);
                    }
                }
            }
            Err(e) => tracing::warn!("Cannot refresh scenes from OBS: {}", e),
        }
    }

    /// Start the watcher, waiting for a chat log if allowed
    async fn start_watcher(
        &self,
        watcher: &mut SourceWatcher,
        tx: &mpsc::Sender<SourceEvent>,
    ) -> Result<Option<PathBuf>> {
        let mut announced = false;
        loop {
            match watcher.start(tx.clone()) {
                Ok(path) => return Ok(Some(path)),
                Err(e @ SourceError::NoSource { .. }) | Err(e @ SourceError::DirectoryMissing(_))
                    if self.wait_for_source =>
                {
                    if !announced {
                        tracing::warn!("{}; waiting for it to appear", e);
                        announced = true;
                    }
                }
                Err(e) => return Err(e.into()),
            }

            tokio::select! {
                _ = tokio::time::sleep(SOURCE_RETRY_INTERVAL) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT while waiting for a chat log");
                    return Ok(None);
                }
            }
        }
    }

    /// Re-read the config file and apply scene table and timing
    fn reload(&mut self, coordinator: &SwitchCoordinator) {
        match config::load_config(self.config_path.as_deref()) {
            Ok(new_config) => {
                coordinator.replace_scenes(new_config.scenes.entries());
                coordinator.update_settings(new_config.scenes.switch_settings());
                if new_config.monitor.log_directory != self.config.monitor.log_directory {
                    tracing::warn!("Chat log directory changes take effect after a restart");
                }
                tracing::info!(
                    "Configuration reloaded ({} scenes, delay {}s, hold {}s)",
                    coordinator.scenes().len(),
                    new_config.scenes.switch_delay,
                    new_config.scenes.switch_duration
                );
                self.config = new_config;
            }
            Err(e) => tracing::error!("Config reload failed, keeping the old one: {}", e),
        }
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting scenecue daemon");

        let mut instance_lock = acquire_instance_lock()?;

        // Write PID file for external control via signals
        self.pid_file_path = write_pid_file();

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;

        // Ensure required directories exist
        Config::ensure_directories().map_err(|e| {
            ScenecueError::Config(format!("Failed to create directories: {}", e))
        })?;

        if let Some(ref path) = self.state_file_path {
            tracing::info!("State file: {:?}", path);
        }

        // OBS connection (reconnects on demand if OBS is not up yet)
        let transport: Arc<dyn SceneTransport> = match ObsClient::connect(&self.config.obs).await
        {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::warn!("{}", e);
                tracing::warn!("Will retry when the first switch is requested");
                Arc::new(ObsClient::new(self.config.obs.clone()))
            }
        };

        if self.config.scenes.refresh_on_start {
            self.refresh_scenes(transport.as_ref()).await;
        }

        let (recorder, sqlite) = stats::create_recorder(&self.config.stats);
        let coordinator = SwitchCoordinator::new(
            transport.clone(),
            recorder,
            self.config.scenes.entries(),
            self.config.scenes.switch_settings(),
        );

        if coordinator.scenes().is_empty() {
            tracing::warn!("No scenes configured. Run `scenecue scenes --refresh` to import them from OBS");
        }
        if self.config.scenes.default_scene.is_empty() {
            tracing::warn!("No default scene configured; scenes will not revert");
        }
        if let Err(e) = coordinator.sync_active_scene().await {
            tracing::debug!("Cannot read the current scene: {}", e);
        }

        tracing::info!(
            "Marker {:?}, delay {}s, hold {}s, default scene {:?}",
            self.config.monitor.marker,
            self.config.scenes.switch_delay,
            self.config.scenes.switch_duration,
            self.config.scenes.default_scene
        );

        // Triggers are handled off the ingestion path so a slow OBS call
        // never delays reading the chat log
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<Trigger>(64);
        let worker = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                while let Some(trigger) = trigger_rx.recv().await {
                    coordinator.handle_trigger(&trigger).await;
                }
            })
        };

        let (source_tx, mut source_rx) = mpsc::channel::<SourceEvent>(256);
        let mut watcher = SourceWatcher::new(self.config.monitor.clone());
        let result = match self.start_watcher(&mut watcher, &source_tx).await {
            Ok(Some(_)) => {
                self.event_loop(
                    &coordinator,
                    sqlite,
                    &trigger_tx,
                    &mut source_rx,
                    &mut sigterm,
                    &mut sighup,
                )
                .await
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        // Cleanup; the receiver goes first so a blocked send cannot stall the join
        drop(source_rx);
        watcher.stop();
        coordinator.shutdown();
        drop(trigger_tx);
        worker.abort();

        // Remove state file on shutdown
        if let Some(ref path) = self.state_file_path {
            cleanup_file(path);
        }

        // Remove PID file on shutdown
        if let Some(ref path) = self.pid_file_path {
            cleanup_file(path);
        }

        if let Err(e) = instance_lock.release() {
            tracing::debug!("Failed to release instance lock: {:?}", e);
        }

        tracing::info!("Daemon stopped");

        result
    }

    async fn event_loop(
        &mut self,
        coordinator: &SwitchCoordinator,
        sqlite: Option<Arc<SqliteRecorder>>,
        trigger_tx: &mpsc::Sender<Trigger>,
        source_rx: &mut mpsc::Receiver<SourceEvent>,
        sigterm: &mut tokio::signal::unix::Signal,
        sighup: &mut tokio::signal::unix::Signal,
    ) -> Result<()> {
        let mut pipeline = TextPipeline::new(&self.config.monitor);
        let mut phase_rx = coordinator.subscribe();

        let reporter = sqlite.filter(|_| self.config.stats.hourly_report);
        let next_report = report::duration_until_next_hour(chrono::Local::now().naive_local());
        let report_sleep = tokio::time::sleep(next_report);
        tokio::pin!(report_sleep);

        // Write initial state
        self.update_state(coordinator.phase());

        loop {
            tokio::select! {
                event = source_rx.recv() => {
                    let Some(event) = event else {
                        return Err(SourceError::Watch("watcher stopped unexpectedly".to_string()).into());
                    };

                    match event {
                        SourceEvent::LineAppended(line) => {
                            let (content, trigger) = pipeline.process(&line.content);
                            tracing::debug!("Chat: {}", content);
                            if let Some(trigger) = trigger {
                                tracing::info!("Trigger {} from {:?}", trigger.command, trigger.content);
                                if trigger_tx.send(trigger).await.is_err() {
                                    tracing::error!("Trigger worker stopped");
                                    return Ok(());
                                }
                            }
                        }
                        SourceEvent::SourceReplaced { old, new } => {
                            tracing::info!("Now following {:?} (was {:?})", new, old);
                        }
                        SourceEvent::NoSource { dir } => {
                            if self.wait_for_source {
                                tracing::warn!("No chat log in {:?}; waiting for a new one", dir);
                            } else {
                                return Err(SourceError::NoSource {
                                    dir,
                                    pattern: self.config.monitor.file_pattern.clone(),
                                }
                                .into());
                            }
                        }
                    }
                }

                Ok(()) = phase_rx.changed() => {
                    let phase = *phase_rx.borrow_and_update();
                    tracing::debug!("Phase: {}", phase);
                    self.update_state(phase);
                }

                _ = &mut report_sleep, if reporter.is_some() => {
                    let now = chrono::Local::now().naive_local();
                    if let Some(ref recorder) = reporter {
                        if let Err(e) = report::report_hour(recorder, now) {
                            tracing::warn!("Hourly report failed: {}", e);
                        }
                    }
                    let next = report::duration_until_next_hour(now).max(Duration::from_secs(1));
                    report_sleep.as_mut().reset(tokio::time::Instant::now() + next);
                }

                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration...");
                    self.reload(coordinator);
                    pipeline = TextPipeline::new(&self.config.monitor);
                }

                // Handle graceful shutdown (SIGINT from Ctrl+C)
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    return Ok(());
                }

                // Handle graceful shutdown (SIGTERM from systemctl stop)
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    return Ok(());
                }
            }
        }
    }
}
