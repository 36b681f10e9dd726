//! Scenecue - chat-triggered OBS scene switching
//!
//! Run with `scenecue` or `scenecue daemon` to start the daemon.
//! Use `scenecue scenes --refresh` to import the scene list from OBS.
//! Use `scenecue parse <TEXT>` to check how a chat line is interpreted.

use clap::Parser;
use scenecue::cli::{Cli, Commands};
use scenecue::config::{self, Config, ConfigFormat};
use scenecue::daemon::Daemon;
use scenecue::obs::{ObsClient, SceneTransport};
use scenecue::state::SwitchPhase;
use scenecue::stats::{report::Summary, NullRecorder, SqliteRecorder, TIME_FORMAT};
use scenecue::switcher::{SceneTable, SwitchCoordinator, SwitchOutcome};
use scenecue::text::TextPipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("scenecue={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.clone().or_else(Config::default_path);

    // Init must work even when the existing config is broken
    if let Some(Commands::Init { force }) = cli.command {
        return run_init(config_path.as_deref(), force);
    }

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Run the appropriate command
    match cli.command.unwrap_or(Commands::Daemon {
        log_dir: None,
        wait: false,
    }) {
        Commands::Daemon { log_dir, wait } => {
            // Apply CLI overrides
            if let Some(dir) = log_dir {
                config.monitor.log_directory = dir;
            }
            let mut daemon = Daemon::new(config, config_path).wait_for_source(wait);
            daemon.run().await?;
        }

        Commands::Scenes { refresh } => {
            run_scenes(&mut config, config_path.as_deref(), refresh).await?;
        }

        Commands::Switch {
            command,
            content,
            no_revert,
        } => {
            run_switch(&config, &command, content.as_deref(), no_revert).await?;
        }

        Commands::Parse { text } => {
            run_parse(&config, &text);
        }

        Commands::Stats { recent, export } => {
            run_stats(&config, recent, export.as_deref())?;
        }

        Commands::Status { follow, format } => {
            run_status(&config, follow, &format).await?;
        }

        Commands::Config => {
            show_config(&config, config_path.as_deref())?;
        }

        Commands::Init { force } => {
            run_init(config_path.as_deref(), force)?;
        }
    }

    Ok(())
}

/// Write a default config file
fn run_init(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = path.ok_or_else(|| anyhow::anyhow!("Cannot determine a config path; pass --config"))?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {:?}. Use --force to overwrite it.",
            path
        );
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let contents = match ConfigFormat::from_path(path) {
        ConfigFormat::Toml => config::DEFAULT_CONFIG.to_string(),
        ConfigFormat::Json => ConfigFormat::Json.render(&Config::default())?,
    };
    std::fs::write(path, contents)?;

    println!("Wrote default config to {:?}", path);
    println!();
    println!("Next steps:");
    println!("  1. Set obs.password and monitor.log_directory");
    println!("  2. Run: scenecue scenes --refresh");
    println!("  3. Run: scenecue");
    Ok(())
}

/// List OBS scenes next to the configured mapping
async fn run_scenes(config: &mut Config, path: Option<&Path>, refresh: bool) -> anyhow::Result<()> {
    let client = ObsClient::connect(&config.obs).await?;
    match client.version().await {
        Ok(v) => println!(
            "OBS {} (obs-websocket {})",
            v.obs_version, v.obs_web_socket_version
        ),
        Err(e) => tracing::debug!("Could not query OBS version: {}", e),
    }
    let names = client.list_scenes().await?;
    let current = client.current_scene().await.ok();

    println!("OBS scenes ({}):", names.len());
    for name in &names {
        let marker = if current.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("  {} {}", marker, name);
    }

    if refresh {
        if names.is_empty() {
            anyhow::bail!("OBS reported no scenes; the scene table was not changed");
        }
        let path = path.ok_or_else(|| anyhow::anyhow!("Cannot determine a config path; pass --config"))?;
        config.apply_scene_list(&names);
        config::save_config(config, path)?;
        println!();
        println!("Saved {} scenes to {:?}", names.len(), path);
    }

    println!();
    println!("Configured commands:");
    let entries = config.scenes.entries();
    if entries.is_empty() {
        println!("  (none, run `scenecue scenes --refresh`)");
    }
    for entry in &entries {
        let missing = if names.contains(&entry.display_name) { "" } else { "  [not in OBS]" };
        let disabled = if entry.enabled { "" } else { "  [disabled]" };
        println!("  {:>4} -> {}{}{}", entry.command, entry.display_name, disabled, missing);
    }
    println!();
    println!("Default scene: {:?}", config.scenes.default_scene);

    client.disconnect().await;
    Ok(())
}

/// Switch once without the delay, optionally waiting for the revert
async fn run_switch(
    config: &Config,
    command: &str,
    content: Option<&str>,
    no_revert: bool,
) -> anyhow::Result<()> {
    let client = Arc::new(ObsClient::connect(&config.obs).await?);
    let mut settings = config.scenes.switch_settings();
    settings.delay = Duration::ZERO;

    let coordinator = SwitchCoordinator::new(
        client.clone(),
        Arc::new(NullRecorder::new()),
        config.scenes.entries(),
        settings.clone(),
    );
    if let Err(e) = coordinator.sync_active_scene().await {
        tracing::debug!("Cannot read the current scene: {}", e);
    }

    let content = content.unwrap_or(command);
    match coordinator.request_switch(command, content).await {
        SwitchOutcome::Switched { scene } => {
            println!("Switched to {}", scene);
        }
        SwitchOutcome::Accepted { scene, .. } => {
            println!("Switch to {} scheduled", scene);
        }
        SwitchOutcome::Rejected(reason) => {
            anyhow::bail!("Switch rejected: {}", reason);
        }
    }

    if no_revert || settings.default_scene.is_empty() {
        coordinator.shutdown();
        client.disconnect().await;
        return Ok(());
    }

    println!(
        "Holding for {}s, then returning to {}",
        settings.hold.as_secs(),
        settings.default_scene
    );
    tokio::select! {
        _ = coordinator.wait_idle() => {
            println!("Returned to {}", settings.default_scene);
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted; staying on the current scene");
        }
    }

    coordinator.shutdown();
    client.disconnect().await;
    Ok(())
}

/// Show how a line is interpreted
fn run_parse(config: &Config, text: &str) {
    let pipeline = TextPipeline::new(&config.monitor);
    let (content, trigger) = pipeline.process(text);

    println!("Content: {}", content);
    let Some(trigger) = trigger else {
        println!("Trigger: none");
        return;
    };
    println!("Trigger: {}", trigger.command);

    let table = SceneTable::new(config.scenes.entries());
    match table.resolve(&trigger.command) {
        Some(entry) => println!("Scene:   {}", entry.display_name),
        None => println!("Scene:   none (no enabled scene for command {})", trigger.command),
    }
}

/// Print switch statistics
fn run_stats(config: &Config, recent: u32, export: Option<&Path>) -> anyhow::Result<()> {
    if !config.stats.enabled {
        println!("Switch statistics are disabled (stats.enabled = false)");
    }

    let path = config.stats.resolve_database();
    if !path.exists() {
        println!("No switch records yet ({:?} does not exist)", path);
        return Ok(());
    }
    let recorder = SqliteRecorder::open(&path)?;

    if let Some(export) = export {
        recorder.export_report(export)?;
        println!("Report written to {:?}", export);
        return Ok(());
    }

    let summary = Summary::collect(&recorder)?;
    println!("Database: {:?}", path);
    println!("  This hour: {}", summary.current_hour);
    println!("  Today:     {}", summary.today);
    println!("  All time:  {}", summary.total);

    let records = recorder.recent_records(recent)?;
    if !records.is_empty() {
        println!();
        println!("Recent switches:");
        for record in &records {
            println!(
                "  {}  {:>4} {:<20} {}",
                record.switch_time.format(TIME_FORMAT),
                record.command,
                record.scene_name,
                record.user_content
            );
        }
    }

    Ok(())
}

/// Run the status command - show current daemon state
async fn run_status(config: &Config, follow: bool, format: &str) -> anyhow::Result<()> {
    let Some(state_path) = config.resolve_state_file() else {
        eprintln!("Error: state_file is not configured.");
        eprintln!();
        eprintln!("To enable status monitoring, add to your config file:");
        eprintln!();
        eprintln!("  \"state_file\": \"auto\"");
        eprintln!();
        eprintln!("This enables external integrations like status bars to monitor scenecue.");
        std::process::exit(1);
    };

    let print_state = |state: &str| {
        if format == "json" {
            println!("{}", format_state_json(state));
        } else {
            println!("{}", state);
        }
    };

    // Print initial state
    let state = read_state(&state_path);
    print_state(&state);
    if !follow {
        return Ok(());
    }

    // Follow mode: watch for changes using inotify
    use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
    use std::sync::mpsc::channel;

    // Set up file watcher
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        NotifyConfig::default().with_poll_interval(Duration::from_millis(100)),
    )?;

    // Watch the state file's parent directory (file may not exist yet)
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)?;
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
    }

    let mut last_state = state;

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(_event)) => {
                // File changed, read new state
                let new_state = read_state(&state_path);
                if new_state != last_state {
                    print_state(&new_state);
                    last_state = new_state;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {:?}", e);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                // Check if file was deleted (daemon stopped)
                if !state_path.exists() && last_state != "stopped" {
                    print_state("stopped");
                    last_state = "stopped".to_string();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                break;
            }
        }
    }

    Ok(())
}

/// Read the phase written by the daemon, "stopped" if there is none
fn read_state(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "stopped".to_string())
}

/// Format state as JSON for status bar consumption
fn format_state_json(state: &str) -> String {
    let (text, class, tooltip) = match SwitchPhase::from_state_str(state) {
        Some(SwitchPhase::Idle) => ("●", "idle", "Scenecue ready - waiting for chat triggers"),
        Some(SwitchPhase::DelayScheduled) => ("◔", "pending", "Switch pending"),
        Some(SwitchPhase::Committing) => ("◑", "switching", "Switching scene..."),
        Some(SwitchPhase::Cooling) => ("◉", "holding", "Holding scene - triggers ignored"),
        None if state == "stopped" => ("", "stopped", "Scenecue not running"),
        None => ("?", "unknown", "Unknown state"),
    };

    serde_json::json!({ "text": text, "class": class, "tooltip": tooltip }).to_string()
}

/// Show current configuration
fn show_config(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[obs]");
    println!("  url = {:?}", config.obs.url());
    println!(
        "  password = {}",
        if config.obs.password.is_empty() { "(none)" } else { "(set)" }
    );
    println!("  connect_timeout = {}", config.obs.connect_timeout);
    println!("  request_timeout = {}", config.obs.request_timeout);

    println!("\n[scenes]");
    println!("  default_scene = {:?}", config.scenes.default_scene);
    println!("  switch_delay = {}", config.scenes.switch_delay);
    println!("  switch_duration = {}", config.scenes.switch_duration);
    println!("  same_scene_policy = {:?}", config.scenes.same_scene_policy);
    println!("  refresh_on_start = {}", config.scenes.refresh_on_start);
    for entry in config.scenes.entries() {
        println!(
            "  {} = {:?}{}",
            entry.command,
            entry.display_name,
            if entry.enabled { "" } else { " (disabled)" }
        );
    }

    println!("\n[monitor]");
    println!("  log_directory = {:?}", config.monitor.log_directory);
    println!("  file_pattern = {:?}", config.monitor.file_pattern);
    println!("  extension = {:?}", config.monitor.extension);
    println!("  marker = {:?}", config.monitor.marker);
    println!("  speech_tag = {:?}", config.monitor.speech_tag);
    println!("  rescan_interval = {}", config.monitor.rescan_interval);
    println!("  poll_interval_ms = {}", config.monitor.poll_interval_ms);

    println!("\n[stats]");
    println!("  enabled = {}", config.stats.enabled);
    println!("  database = {:?}", config.stats.resolve_database());
    println!("  hourly_report = {}", config.stats.hourly_report);

    if let Some(ref state_file) = config.state_file {
        println!("\n[integration]");
        println!("  state_file = {:?}", state_file);
        if let Some(resolved) = config.resolve_state_file() {
            println!("  (resolves to: {:?})", resolved);
        }
    }

    println!("\n---");
    println!(
        "Config file: {:?}",
        path.map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("(not found)"))
    );

    Ok(())
}
