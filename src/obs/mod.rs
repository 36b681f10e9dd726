//! OBS scene transport
//!
//! The switch coordinator only sees [`SceneTransport`]. [`ObsClient`] implements
//! it over the obs-websocket v5 protocol (OBS 28 and later):
//! 1. Connect to `ws://host:port`
//! 2. Answer the server's Hello with an Identify (authenticated if required)
//! 3. Send requests and match responses by request id

pub mod client;
pub mod protocol;

pub use client::ObsClient;

use crate::error::TransportError;

/// Trait for scene switching backends
#[async_trait::async_trait]
pub trait SceneTransport: Send + Sync {
    /// Scene names in the order the backend lists them
    async fn list_scenes(&self) -> Result<Vec<String>, TransportError>;

    /// Name of the scene currently on program output
    async fn current_scene(&self) -> Result<String, TransportError>;

    /// Put a scene on program output
    async fn set_scene(&self, name: &str) -> Result<(), TransportError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
