//! Scenecue: chat-triggered OBS scene switching
//!
//! This library provides the core functionality for:
//! - Following the chat log a live-chat client writes, across log rotation
//! - Extracting viewer messages and detecting switch triggers ("看8")
//! - Coordinating switches with a debounce delay, a hold period and revert
//! - Talking to OBS over the obs-websocket v5 protocol
//! - Recording completed switches in SQLite with hourly summaries
//!
//! # Architecture
//!
//! ```text
//!                            ┌─────────────────────────────────────┐
//!                            │              Daemon                 │
//!                            └─────────────────────────────────────┘
//!                                            │
//!                   ┌────────────────────────┼────────────────────────┐
//!                   │                        │                        │
//!                   ▼                        ▼                        ▼
//!          ┌──────────────┐         ┌──────────────┐         ┌──────────────┐
//!          │   Watcher    │         │    Stats     │         │  State file  │
//!          │   (notify)   │         │  (rusqlite)  │         │   (phase)    │
//!          └──────────────┘         └──────────────┘         └──────────────┘
//!                   │                        ▲
//!                   │ appended lines         │ completed switches
//!                   ▼                        │
//!          ┌──────────────┐                  │
//!          │     Text     │                  │
//!          │  extract +   │                  │
//!          │   trigger    │                  │
//!          └──────────────┘                  │
//!                   │                        │
//!                   ▼ command                │
//!          ┌─────────────────────────────────────────────────────────────────┐
//!          │                        Switch Coordinator                       │
//!          │  [Trigger] ──▶ Delay ──▶ Switch ──▶ Hold ──▶ Revert to default  │
//!          └─────────────────────────────────────────────────────────────────┘
//!                                            │
//!                                            ▼
//!                                   ┌──────────────┐
//!                                   │     OBS      │
//!                                   │ (websocket)  │
//!                                   └──────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod obs;
pub mod state;
pub mod stats;
pub mod switcher;
pub mod text;
pub mod watcher;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Result, ScenecueError};
pub use switcher::{SwitchCoordinator, SwitchOutcome};
