//! Configuration loading and types for scenecue
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/scenecue/config.json, or any `.toml` file)
//! 3. Environment variables (SCENECUE_*)
//! 4. CLI arguments (highest priority)
//!
//! Scene entries are normalized while loading: the older schema that maps a
//! command straight to a scene name, and the field spellings `name`/`number`
//! and `displayName`/`ordinalNumber`, all end up as one [`SceneEntryConfig`].

use crate::error::ScenecueError;
use crate::switcher::{SceneEntry, SwitchSettings};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration written by `scenecue init` for TOML config files
pub const DEFAULT_CONFIG: &str = r#"# Scenecue Configuration
#
# All settings can be overridden via environment variables or CLI flags.

# State file for external integrations (status bars, stream decks)
# Use "auto" for the default location ($XDG_RUNTIME_DIR/scenecue/state),
# a custom path, or "disabled" to turn off. The daemon writes the switch
# phase ("idle", "pending", "switching", "holding") whenever it changes.
state_file = "auto"

[obs]
# OBS WebSocket server (Tools -> WebSocket Server Settings, OBS 28+)
host = "localhost"
port = 4455
# Leave empty when authentication is disabled
password = ""
# Seconds to wait for the connection handshake
connect_timeout = 5
# Seconds to wait for each request
request_timeout = 10

[scenes]
# Scene shown when no switch is active; the daemon returns here after each hold
default_scene = ""

# Seconds a switched-to scene stays on screen before returning to default.
# No new switch is accepted during this time.
switch_duration = 120

# Seconds between a trigger and the actual switch. A newer trigger during
# this window replaces the older one. 0 switches immediately.
switch_delay = 5

# What to do when a trigger targets the scene that is already showing:
# "switch" (switch anyway and restart the hold) or "ignore"
same_scene_policy = "switch"

# Rebuild the scene table from OBS at startup (numbered 1..n)
refresh_on_start = false

# Command -> scene mapping. Run `scenecue scenes --refresh` to fill it from OBS.
# [scenes.scenes.1]
# name = "Camera 1"
# number = 1
# enabled = true

[monitor]
# Directory where the chat client writes its logs
log_directory = "logs"

# Log files must contain this text and end with this extension
file_pattern = "用户发言记录"
extension = "txt"

# A message is a trigger when it contains this glyph and a number
marker = "看"

# Tag the chat client writes in front of viewer messages (without brackets)
speech_tag = "用户发言"

# Seconds between checks for a newer log file
rescan_interval = 600

# Milliseconds between file size polls (backs up filesystem notifications)
poll_interval_ms = 500

[stats]
# Record every completed switch in a SQLite database
enabled = true

# Database path, or "auto" for ~/.local/share/scenecue/switch_records.db
database = "auto"

# Log a summary at the top of every hour
hourly_report = true
"#;

/// Behavior when a trigger resolves to the scene that is already showing
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SameScenePolicy {
    /// Issue the switch anyway and restart the hold/revert cycle (default)
    #[default]
    Switch,
    /// Treat the request as a no-op and reject it
    Ignore,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// OBS WebSocket connection
    #[serde(alias = "obs_connection")]
    pub obs: ObsConfig,

    /// Scene table and switch timing
    #[serde(alias = "scene_settings")]
    pub scenes: SceneSettings,

    /// Chat log discovery and parsing
    pub monitor: MonitorConfig,

    /// Switch record database
    pub stats: StatsConfig,

    /// Optional path to state file for external integrations
    /// When set, the daemon writes the switch phase ("idle", "pending",
    /// "switching", "holding") to this file whenever it changes.
    /// Use "auto" for the default location or "disabled" to turn it off.
    pub state_file: Option<String>,
}

/// OBS WebSocket connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObsConfig {
    pub host: String,
    pub port: u16,
    /// Empty when the WebSocket server has authentication disabled
    pub password: String,
    /// Handshake timeout in seconds
    pub connect_timeout: u64,
    /// Per-request timeout in seconds
    pub request_timeout: u64,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4455,
            password: String::new(),
            connect_timeout: 5,
            request_timeout: 10,
        }
    }
}

impl ObsConfig {
    /// WebSocket URL of the OBS server
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// One configured scene
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SceneEntryConfig {
    /// Scene name as shown in OBS
    #[serde(alias = "name", alias = "displayName")]
    pub display_name: String,

    /// Scene number used for numeric fallback matching
    #[serde(default, alias = "number", alias = "ordinalNumber")]
    pub ordinal: Option<i64>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Scene table and switch timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Command string -> scene
    #[serde(deserialize_with = "deserialize_scene_table")]
    pub scenes: BTreeMap<String, SceneEntryConfig>,

    /// Scene to return to after each hold
    pub default_scene: String,

    /// Hold duration in seconds
    pub switch_duration: u64,

    /// Debounce delay in seconds (0 = switch immediately)
    pub switch_delay: u64,

    pub same_scene_policy: SameScenePolicy,

    /// Rebuild the scene table from OBS at daemon startup
    pub refresh_on_start: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            scenes: BTreeMap::new(),
            default_scene: String::new(),
            switch_duration: 120,
            switch_delay: 5,
            same_scene_policy: SameScenePolicy::default(),
            refresh_on_start: false,
        }
    }
}

impl SceneSettings {
    /// Normalized scene entries for the switch coordinator
    pub fn entries(&self) -> Vec<SceneEntry> {
        self.scenes
            .iter()
            .map(|(command, entry)| SceneEntry {
                command: command.clone(),
                display_name: entry.display_name.clone(),
                // Entries without a number fall back to an integer command
                ordinal: entry.ordinal.or_else(|| command.parse().ok()),
                enabled: entry.enabled,
            })
            .collect()
    }

    /// Timing and policy for the switch coordinator
    pub fn switch_settings(&self) -> SwitchSettings {
        SwitchSettings {
            delay: Duration::from_secs(self.switch_delay),
            hold: Duration::from_secs(self.switch_duration),
            default_scene: self.default_scene.clone(),
            same_scene_policy: self.same_scene_policy,
        }
    }
}

/// Scene table as written on disk: either a full entry or just a scene name
#[derive(Deserialize)]
#[serde(untagged)]
enum SceneEntryRepr {
    Name(String),
    Full(SceneEntryConfig),
}

fn deserialize_scene_table<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, SceneEntryConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, SceneEntryRepr>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(command, repr)| {
            let entry = match repr {
                SceneEntryRepr::Name(display_name) => SceneEntryConfig {
                    display_name,
                    ordinal: command.parse().ok(),
                    enabled: true,
                    description: None,
                },
                SceneEntryRepr::Full(entry) => entry,
            };
            (command, entry)
        })
        .collect())
}

/// Chat log discovery and parsing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Directory where the chat client writes its logs
    pub log_directory: PathBuf,

    /// Literal text the log file name must contain
    pub file_pattern: String,

    /// Log file extension, without the dot
    pub extension: String,

    /// Marker glyph that makes a message a trigger
    pub marker: char,

    /// Speech tag written before viewer messages, without brackets
    pub speech_tag: String,

    /// Seconds between checks for a newer log file
    pub rescan_interval: u64,

    /// Milliseconds between file size polls
    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
            file_pattern: "用户发言记录".to_string(),
            extension: "txt".to_string(),
            marker: crate::text::DEFAULT_MARKER,
            speech_tag: crate::text::DEFAULT_SPEECH_TAG.to_string(),
            rescan_interval: 600,
            poll_interval_ms: 500,
        }
    }
}

/// Switch record database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    pub enabled: bool,

    /// Database path, or "auto" for the data directory
    pub database: String,

    /// Log a summary at the top of every hour
    pub hourly_report: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: "auto".to_string(),
            hourly_report: true,
        }
    }
}

impl StatsConfig {
    /// Resolve the database path from config
    pub fn resolve_database(&self) -> PathBuf {
        match self.database.as_str() {
            "" | "auto" => Config::data_dir().join("switch_records.db"),
            path => PathBuf::from(path),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            obs: ObsConfig::default(),
            scenes: SceneSettings::default(),
            monitor: MonitorConfig::default(),
            stats: StatsConfig::default(),
            state_file: Some("auto".to_string()),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "scenecue")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Get the runtime directory for ephemeral files (state, lock)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to the temp dir
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir())
            .join("scenecue")
    }

    /// Resolve the state file path from config
    /// Returns None if state_file is not configured or explicitly disabled
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().and_then(|path| {
            match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            }
        })
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "scenecue")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the data directory path (for the switch database)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "scenecue")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the config and data directories exist
    pub fn ensure_directories() -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(&config_dir)?;
            tracing::debug!("Ensured config directory exists: {:?}", config_dir);
        }

        let data_dir = Self::data_dir();
        std::fs::create_dir_all(&data_dir)?;
        tracing::debug!("Ensured data directory exists: {:?}", data_dir);

        Ok(())
    }

    /// Replace the scene table with the scenes listed by OBS
    ///
    /// Scenes are numbered 1..n in listing order. If the default scene is not
    /// among them, the first listed scene becomes the default. Returns true
    /// when the default scene changed.
    pub fn apply_scene_list(&mut self, names: &[String]) -> bool {
        self.scenes.scenes = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let number = i as i64 + 1;
                (
                    number.to_string(),
                    SceneEntryConfig {
                        display_name: name.clone(),
                        ordinal: Some(number),
                        enabled: true,
                        description: Some(format!("Scene {}: {}", number, name)),
                    },
                )
            })
            .collect();

        match names.first() {
            Some(first) if !names.contains(&self.scenes.default_scene) => {
                tracing::info!("Default scene updated to {:?}", first);
                self.scenes.default_scene = first.clone();
                true
            }
            _ => false,
        }
    }
}

/// On-disk configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension (JSON unless `.toml`)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }

    /// Parse configuration text in this format
    pub fn parse(self, contents: &str) -> Result<Config, ScenecueError> {
        match self {
            ConfigFormat::Json => serde_json::from_str(contents)
                .map_err(|e| ScenecueError::Config(format!("Invalid config: {}", e))),
            ConfigFormat::Toml => toml::from_str(contents)
                .map_err(|e| ScenecueError::Config(format!("Invalid config: {}", e))),
        }
    }

    /// Serialize configuration in this format
    pub fn render(self, config: &Config) -> Result<String, ScenecueError> {
        match self {
            ConfigFormat::Json => serde_json::to_string_pretty(config)
                .map_err(|e| ScenecueError::Config(format!("Failed to serialize config: {}", e))),
            ConfigFormat::Toml => toml::to_string_pretty(config)
                .map_err(|e| ScenecueError::Config(format!("Failed to serialize config: {}", e))),
        }
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, ScenecueError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ScenecueError::Config(format!("Failed to read config: {}", e)))?;
            // Editors on Windows like to prepend a BOM
            let contents = contents.trim_start_matches('\u{feff}');
            config = ConfigFormat::from_path(path).parse(contents)?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Override settings from SCENECUE_* environment variables
fn apply_env_overrides(config: &mut Config) -> Result<(), ScenecueError> {
    if let Ok(host) = std::env::var("SCENECUE_OBS_HOST") {
        config.obs.host = host;
    }
    if let Ok(port) = std::env::var("SCENECUE_OBS_PORT") {
        config.obs.port = port.parse().map_err(|_| {
            ScenecueError::Config(format!("SCENECUE_OBS_PORT is not a port number: {}", port))
        })?;
    }
    if let Ok(password) = std::env::var("SCENECUE_OBS_PASSWORD") {
        config.obs.password = password;
    }
    if let Ok(dir) = std::env::var("SCENECUE_LOG_DIR") {
        config.monitor.log_directory = PathBuf::from(dir);
    }
    Ok(())
}

/// Save configuration to file, in the format implied by its extension
pub fn save_config(config: &Config, path: &Path) -> Result<(), ScenecueError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ScenecueError::Config(format!("Failed to create config dir: {}", e)))?;
        }
    }

    let contents = ConfigFormat::from_path(path).render(config)?;

    std::fs::write(path, contents)
        .map_err(|e| ScenecueError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.obs.host, "localhost");
        assert_eq!(config.obs.port, 4455);
        assert_eq!(config.scenes.switch_duration, 120);
        assert_eq!(config.scenes.switch_delay, 5);
        assert_eq!(config.scenes.same_scene_policy, SameScenePolicy::Switch);
        assert_eq!(config.monitor.marker, '看');
        assert_eq!(config.monitor.rescan_interval, 600);
        assert!(config.stats.enabled);
    }

    #[test]
    fn test_default_config_text_parses() {
        let config = ConfigFormat::Toml.parse(DEFAULT_CONFIG).unwrap();
        let defaults = Config::default();
        assert_eq!(config.obs.port, defaults.obs.port);
        assert_eq!(config.scenes.switch_duration, defaults.scenes.switch_duration);
        assert_eq!(config.scenes.switch_delay, defaults.scenes.switch_delay);
        assert_eq!(config.monitor.file_pattern, defaults.monitor.file_pattern);
        assert_eq!(config.monitor.marker, defaults.monitor.marker);
        assert_eq!(config.state_file.as_deref(), Some("auto"));
        assert!(config.scenes.scenes.is_empty());
    }

    #[test]
    fn test_parse_legacy_json_schema() {
        let json = r#"{
            "obs_connection": {
                "host": "192.168.1.20",
                "port": 4455,
                "password": "secret",
                "connect_timeout": 3
            },
            "scene_settings": {
                "scenes": {
                    "1": {"name": "Cam A", "number": 1, "enabled": true, "description": "场景1: Cam A"},
                    "2": {"name": "Cam B", "number": 2, "enabled": false}
                },
                "default_scene": "Cam A",
                "switch_duration": 90
            }
        }"#;

        let config = ConfigFormat::Json.parse(json).unwrap();
        assert_eq!(config.obs.host, "192.168.1.20");
        assert_eq!(config.obs.password, "secret");
        assert_eq!(config.obs.connect_timeout, 3);
        assert_eq!(config.obs.request_timeout, 10); // default
        assert_eq!(config.scenes.default_scene, "Cam A");
        assert_eq!(config.scenes.switch_duration, 90);
        assert_eq!(config.scenes.switch_delay, 5); // default

        let cam_b = &config.scenes.scenes["2"];
        assert_eq!(cam_b.display_name, "Cam B");
        assert_eq!(cam_b.ordinal, Some(2));
        assert!(!cam_b.enabled);
    }

    #[test]
    fn test_parse_camel_case_entries() {
        let json = r#"{
            "scenes": {
                "scenes": {
                    "8": {"displayName": "Cam8", "ordinalNumber": 8}
                },
                "default_scene": "Default",
                "switch_delay": 0
            }
        }"#;

        let config = ConfigFormat::Json.parse(json).unwrap();
        let entry = &config.scenes.scenes["8"];
        assert_eq!(entry.display_name, "Cam8");
        assert_eq!(entry.ordinal, Some(8));
        assert!(entry.enabled); // defaults to enabled
        assert_eq!(config.scenes.switch_delay, 0);
    }

    #[test]
    fn test_parse_name_only_entries() {
        let json = r#"{"scenes": {"scenes": {"3": "Wide", "7.5": "Slow"}}}"#;

        let config = ConfigFormat::Json.parse(json).unwrap();
        assert_eq!(config.scenes.scenes["3"].display_name, "Wide");
        assert_eq!(config.scenes.scenes["3"].ordinal, Some(3));
        assert_eq!(config.scenes.scenes["7.5"].ordinal, None);
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_str = r##"
            state_file = "disabled"

            [obs]
            host = "obs.local"
            port = 4444

            [scenes]
            default_scene = "Main"
            switch_delay = 2
            same_scene_policy = "ignore"

            [scenes.scenes.1]
            name = "Close-up"
            number = 1

            [monitor]
            log_directory = "/var/log/chat"
            marker = "#"
        "##;

        let config = ConfigFormat::Toml.parse(toml_str).unwrap();
        assert_eq!(config.obs.host, "obs.local");
        assert_eq!(config.obs.port, 4444);
        assert_eq!(config.scenes.same_scene_policy, SameScenePolicy::Ignore);
        assert_eq!(config.scenes.scenes["1"].display_name, "Close-up");
        assert_eq!(config.monitor.log_directory, PathBuf::from("/var/log/chat"));
        assert_eq!(config.monitor.marker, '#');
        assert!(config.resolve_state_file().is_none());
    }

    #[test]
    fn test_entries_normalize_ordinals() {
        let json = r#"{"scenes": {"scenes": {
            "5": {"name": "Five"},
            "x": {"name": "Letter"},
            "9": {"name": "Nine", "number": 2}
        }}}"#;

        let config = ConfigFormat::Json.parse(json).unwrap();
        let entries = config.scenes.entries();
        let by_command = |c: &str| entries.iter().find(|e| e.command == c).unwrap().clone();

        assert_eq!(by_command("5").ordinal, Some(5));
        assert_eq!(by_command("x").ordinal, None);
        assert_eq!(by_command("9").ordinal, Some(2));
    }

    #[test]
    fn test_switch_settings() {
        let mut config = Config::default();
        config.scenes.default_scene = "Default".to_string();
        config.scenes.switch_delay = 0;

        let settings = config.scenes.switch_settings();
        assert_eq!(settings.delay, Duration::ZERO);
        assert_eq!(settings.hold, Duration::from_secs(120));
        assert_eq!(settings.default_scene, "Default");
    }

    #[test]
    fn test_apply_scene_list() {
        let mut config = Config::default();
        config.scenes.default_scene = "Gone".to_string();

        let names = vec!["Main".to_string(), "Close".to_string()];
        assert!(config.apply_scene_list(&names));
        assert_eq!(config.scenes.default_scene, "Main");
        assert_eq!(config.scenes.scenes.len(), 2);
        assert_eq!(config.scenes.scenes["2"].display_name, "Close");
        assert_eq!(config.scenes.scenes["2"].ordinal, Some(2));

        // Default scene kept when still present
        config.scenes.default_scene = "Close".to_string();
        assert!(!config.apply_scene_list(&names));
        assert_eq!(config.scenes.default_scene, "Close");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();

        for file in ["config.json", "config.toml"] {
            let path = temp.path().join(file);
            let mut config = Config::default();
            config.scenes.default_scene = "Main".to_string();
            config.apply_scene_list(&["Main".to_string(), "看台".to_string()]);

            save_config(&config, &path).unwrap();
            let contents = std::fs::read_to_string(&path).unwrap();
            let loaded = ConfigFormat::from_path(&path).parse(&contents).unwrap();

            assert_eq!(loaded.scenes.scenes, config.scenes.scenes);
            assert_eq!(loaded.scenes.default_scene, "Main");
        }
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/obs_config.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("config.TOML")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Json);
    }

    #[test]
    fn test_resolve_database() {
        let stats = StatsConfig {
            database: "/tmp/records.db".to_string(),
            ..StatsConfig::default()
        };
        assert_eq!(stats.resolve_database(), PathBuf::from("/tmp/records.db"));
        assert!(StatsConfig::default()
            .resolve_database()
            .ends_with("switch_records.db"));
    }
}
