// Command-line interface definitions for scenecue
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scenecue")]
#[command(author, version, about = "Chat-triggered OBS scene switching")]
#[command(long_about = "
Scenecue watches the chat log written by a live-chat client and switches OBS
scenes when a viewer asks for one. A message containing the marker glyph and a
number (\"看8\") selects the scene mapped to that number. The switch happens
after a short delay, holds for a configured time, then returns to the default
scene. No new switch is accepted while a scene is on hold.

SETUP:
  1. In OBS, enable Tools -> WebSocket Server Settings (OBS 28 or later)
  2. Run: scenecue init (writes a default config file)
  3. Set the OBS password and chat log directory in the config file
  4. Run: scenecue scenes --refresh (numbers your OBS scenes 1..n)
  5. Run: scenecue (to start the daemon)

USAGE:
  Viewers type the marker glyph plus a scene number in chat.
  Use `scenecue parse <TEXT>` to check how a chat line is interpreted.
")]
pub struct Cli {
    /// Path to config file (.json or .toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon {
        /// Override the chat log directory
        #[arg(long, value_name = "DIR")]
        log_dir: Option<std::path::PathBuf>,

        /// Keep waiting for a chat log to appear instead of exiting
        #[arg(long)]
        wait: bool,
    },

    /// List OBS scenes and the configured scene mapping
    Scenes {
        /// Rebuild the scene mapping from OBS and save it to the config file
        #[arg(long)]
        refresh: bool,
    },

    /// Switch to the scene for a command, then return to the default scene
    Switch {
        /// Scene command, e.g. "8"
        command: String,

        /// Content to record with the switch
        #[arg(long, value_name = "TEXT")]
        content: Option<String>,

        /// Exit right after switching instead of waiting for the revert
        #[arg(long)]
        no_revert: bool,
    },

    /// Show how a chat log line is interpreted
    Parse {
        /// Raw chat log line or message text
        text: String,
    },

    /// Show switch statistics
    Stats {
        /// Number of recent switches to list
        #[arg(long, value_name = "N", default_value = "5")]
        recent: u32,

        /// Write a full report to a text file
        #[arg(long, value_name = "FILE")]
        export: Option<std::path::PathBuf>,
    },

    /// Show daemon status (for status bars and stream deck scripts)
    Status {
        /// Continuously output status changes
        #[arg(long)]
        follow: bool,

        /// Output format: "text" (default) or "json"
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show current configuration
    Config,

    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}
