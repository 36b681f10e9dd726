//! Scene switch coordination
//!
//! [`SwitchCoordinator`] decides whether, when, and to what scene a trigger
//! switches:
//!
//! ```text
//! request_switch ──▶ cooldown? ──yes──▶ Rejected(Cooldown)
//!                       │ no
//!                       ▼
//!                 resolve command ──none──▶ Rejected(NoScene)
//!                       │
//!                       ▼
//!            cancel older pending delay
//!                       │
//!          delay > 0 ───┴─── delay == 0
//!              │                 │
//!        arm delay timer         │
//!        Accepted                │
//!              └────▶ commit ◀───┘
//!                       │ cooldown recheck, in-flight flag
//!                       ▼
//!               transport.set_scene
//!                       │ ok
//!                       ▼
//!       cooldown = now + hold, arm revert timer, record
//!                       │ hold elapses
//!                       ▼
//!          set default scene, clear cooldown
//! ```
//!
//! All bookkeeping lives in one mutex that is never held across a transport
//! or recorder call. Timers run on their own tasks, so a stalled transport
//! call never blocks line ingestion.

pub mod scenes;
pub mod timer;

pub use crate::config::SameScenePolicy;
pub use scenes::{SceneEntry, SceneTable};
pub use timer::TimerHandle;

use crate::error::TransportError;
use crate::obs::SceneTransport;
use crate::state::{PendingSwitch, SwitchPhase, SwitchState};
use crate::stats::SwitchRecorder;
use crate::text::Trigger;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Timing and policy for the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchSettings {
    /// Debounce delay between acceptance and the switch
    pub delay: Duration,
    /// How long a switched-to scene stays before the revert
    pub hold: Duration,
    /// Scene to return to after the hold; empty skips the revert call
    pub default_scene: String,
    pub same_scene_policy: SameScenePolicy,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            hold: Duration::from_secs(120),
            default_scene: String::new(),
            same_scene_policy: SameScenePolicy::default(),
        }
    }
}

/// Why a trigger did not switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A previous switch is still on hold
    Cooldown { remaining: Duration },
    /// No enabled scene for the command
    NoScene { command: String },
    /// The target is already showing and the policy is `ignore`
    AlreadyActive { scene: String },
    /// Another scene change is talking to OBS
    InFlight,
    /// OBS refused or did not answer
    TransportFailed(String),
    /// A newer trigger replaced this one during its delay
    Superseded,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Cooldown { remaining } => {
                write!(f, "cooling down, {:.0}s remaining", remaining.as_secs_f32().ceil())
            }
            Rejection::NoScene { command } => write!(f, "no scene for command {}", command),
            Rejection::AlreadyActive { scene } => write!(f, "{} is already showing", scene),
            Rejection::InFlight => write!(f, "another scene change is in progress"),
            Rejection::TransportFailed(e) => write!(f, "OBS error: {}", e),
            Rejection::Superseded => write!(f, "replaced by a newer trigger"),
        }
    }
}

/// Result of a switch request or commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Scheduled; the switch happens after `delay` unless superseded
    Accepted { scene: String, delay: Duration },
    /// The scene is on program output
    Switched { scene: String },
    Rejected(Rejection),
}

impl SwitchOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, SwitchOutcome::Rejected(_))
    }

    /// The rejection reason, if any
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            SwitchOutcome::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

/// State behind the coordinator mutex
#[derive(Default)]
struct Slots {
    state: SwitchState,
    delay_timer: Option<TimerHandle>,
    revert_timer: Option<TimerHandle>,
    /// The revert timer fired while a commit was talking to OBS
    revert_due: bool,
}

struct Shared {
    transport: Arc<dyn SceneTransport>,
    recorder: Arc<dyn SwitchRecorder>,
    scenes: SceneTable,
    settings: RwLock<SwitchSettings>,
    slots: Mutex<Slots>,
    phase_tx: watch::Sender<SwitchPhase>,
}

/// Debounce, cooldown, and revert engine
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct SwitchCoordinator {
    shared: Arc<Shared>,
}

impl SwitchCoordinator {
    /// Create a coordinator; performs no I/O
    pub fn new(
        transport: Arc<dyn SceneTransport>,
        recorder: Arc<dyn SwitchRecorder>,
        scenes: Vec<SceneEntry>,
        settings: SwitchSettings,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SwitchPhase::Idle);
        Self {
            shared: Arc::new(Shared {
                transport,
                recorder,
                scenes: SceneTable::new(scenes),
                settings: RwLock::new(settings),
                slots: Mutex::new(Slots::default()),
                phase_tx,
            }),
        }
    }

    /// Learn which scene OBS is showing, for the same-scene policy
    pub async fn sync_active_scene(&self) -> Result<String, TransportError> {
        let scene = self.shared.transport.current_scene().await?;
        tracing::debug!("OBS is showing {:?}", scene);
        self.shared.lock().state.active_scene = Some(scene.clone());
        Ok(scene)
    }

    /// Request a switch for a detected trigger
    pub async fn handle_trigger(&self, trigger: &Trigger) -> SwitchOutcome {
        self.request_switch(&trigger.command, &trigger.content).await
    }

    /// Request a switch to the scene for `command`
    ///
    /// Never blocks on the delay: with a non-zero delay this returns
    /// [`SwitchOutcome::Accepted`] as soon as the timer is armed. With zero
    /// delay the commit runs before returning.
    pub async fn request_switch(&self, command: &str, content: &str) -> SwitchOutcome {
        let shared = &self.shared;
        let settings = shared.settings();

        let pending = {
            let mut slots = shared.lock();

            if let Some(remaining) = slots.state.remaining_cooldown(Instant::now()) {
                return reject(command, content, Rejection::Cooldown { remaining });
            }

            let entry = match shared.scenes.resolve(command) {
                Some(entry) => entry,
                None => {
                    return reject(
                        command,
                        content,
                        Rejection::NoScene {
                            command: command.to_string(),
                        },
                    )
                }
            };

            if settings.same_scene_policy == SameScenePolicy::Ignore
                && slots.state.active_scene.as_deref() == Some(entry.display_name.as_str())
            {
                return reject(
                    command,
                    content,
                    Rejection::AlreadyActive {
                        scene: entry.display_name,
                    },
                );
            }

            // The newest trigger wins during the delay window
            if let Some(timer) = slots.delay_timer.take() {
                timer.cancel();
            }
            if let Some(old) = slots.state.pending.take() {
                tracing::info!(
                    "Pending switch to {} ({}) {}",
                    old.scene,
                    old.command,
                    Rejection::Superseded
                );
            }

            let pending = PendingSwitch {
                id: slots.state.next_id(),
                command: command.to_string(),
                scene: entry.display_name,
                content: content.to_string(),
            };

            if !settings.delay.is_zero() {
                let id = pending.id;
                let scene = pending.scene.clone();
                let fire = Arc::clone(shared);
                slots.state.pending = Some(pending);
                slots.delay_timer = Some(TimerHandle::schedule(id, settings.delay, move || {
                    async move {
                        fire.fire_delay(id).await;
                    }
                }));
                shared.publish(&slots);

                tracing::info!(
                    "Switch to {} in {}s (command {}, content {:?})",
                    scene,
                    settings.delay.as_secs_f32(),
                    command,
                    content
                );
                return SwitchOutcome::Accepted {
                    scene,
                    delay: settings.delay,
                };
            }

            pending
        };

        shared.commit(pending).await
    }

    /// Check if a completed switch is still on hold
    pub fn is_in_cooldown(&self) -> bool {
        self.shared.lock().state.in_cooldown(Instant::now())
    }

    /// Time left on hold, zero when not cooling down
    pub fn remaining_cooldown(&self) -> Duration {
        self.shared
            .lock()
            .state
            .remaining_cooldown(Instant::now())
            .unwrap_or_default()
    }

    /// Current observable phase
    pub fn phase(&self) -> SwitchPhase {
        self.shared.lock().state.phase(Instant::now())
    }

    /// Subscribe to phase changes
    pub fn subscribe(&self) -> watch::Receiver<SwitchPhase> {
        self.shared.phase_tx.subscribe()
    }

    /// Scene most recently set through the transport
    pub fn active_scene(&self) -> Option<String> {
        self.shared.lock().state.active_scene.clone()
    }

    /// Command waiting for its delay, if any
    pub fn pending_command(&self) -> Option<String> {
        self.shared
            .lock()
            .state
            .pending
            .as_ref()
            .map(|p| p.command.clone())
    }

    /// The shared scene table
    pub fn scenes(&self) -> &SceneTable {
        &self.shared.scenes
    }

    /// Replace the whole scene table
    pub fn replace_scenes(&self, entries: Vec<SceneEntry>) {
        self.shared.scenes.replace(entries);
    }

    pub fn settings(&self) -> SwitchSettings {
        self.shared.settings()
    }

    /// Apply new timing; running timers keep their original deadlines
    pub fn update_settings(&self, settings: SwitchSettings) {
        match self.shared.settings.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    /// Wait until the coordinator is idle again
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|phase| *phase == SwitchPhase::Idle).await;
    }

    /// Cancel all timers and drop any pending trigger
    pub fn shutdown(&self) {
        let mut slots = self.shared.lock();
        if let Some(timer) = slots.delay_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = slots.revert_timer.take() {
            timer.cancel();
        }
        slots.revert_due = false;
        if let Some(pending) = slots.state.pending.take() {
            tracing::debug!("Dropping pending switch to {} on shutdown", pending.scene);
        }
        self.shared.publish(&slots);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn settings(&self) -> SwitchSettings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Publish the phase derived from `slots`
    fn publish(&self, slots: &Slots) {
        let phase = slots.state.phase(Instant::now());
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }

    /// Delay timer fired
    async fn fire_delay(self: Arc<Self>, id: u64) {
        let pending = {
            let mut slots = self.lock();
            if slots.delay_timer.as_ref().map(|t| t.id()) == Some(id) {
                slots.delay_timer = None;
            }
            slots.state.take_pending(id)
        };

        match pending {
            Some(pending) => {
                self.commit(pending).await;
            }
            None => tracing::debug!("Delay timer {} fired after being superseded", id),
        }
    }

    /// Issue the scene change for an admitted trigger
    async fn commit(self: &Arc<Self>, pending: PendingSwitch) -> SwitchOutcome {
        {
            let mut slots = self.lock();
            if let Some(remaining) = slots.state.remaining_cooldown(Instant::now()) {
                // Another switch completed while this one waited
                self.publish(&slots);
                return reject(
                    &pending.command,
                    &pending.content,
                    Rejection::Cooldown { remaining },
                );
            }
            if slots.state.committing {
                self.publish(&slots);
                return reject(&pending.command, &pending.content, Rejection::InFlight);
            }
            slots.state.committing = true;
            self.publish(&slots);
        }

        tracing::debug!("Switching to {} via {}", pending.scene, self.transport.name());
        if let Err(e) = self.transport.set_scene(&pending.scene).await {
            let revert_due = {
                let mut slots = self.lock();
                let revert_due = std::mem::take(&mut slots.revert_due);
                // An owed revert keeps the in-flight flag and runs next
                slots.state.committing = revert_due;
                self.publish(&slots);
                revert_due
            };

            tracing::error!(
                "Failed to switch to {} (command {}, content {:?}): {}",
                pending.scene,
                pending.command,
                pending.content,
                e
            );
            if revert_due {
                self.return_to_default().await;
            }
            return SwitchOutcome::Rejected(Rejection::TransportFailed(e.to_string()));
        }

        let hold = self.settings().hold;
        {
            let mut slots = self.lock();
            slots.state.committing = false;
            slots.revert_due = false;
            slots.state.cooldown_until = Some(Instant::now() + hold);
            slots.state.active_scene = Some(pending.scene.clone());

            if let Some(timer) = slots.revert_timer.take() {
                timer.cancel();
            }
            let id = slots.state.next_id();
            let fire = Arc::clone(self);
            slots.revert_timer = Some(TimerHandle::schedule(id, hold, move || async move {
                fire.revert(id).await;
            }));
            self.publish(&slots);
        }

        tracing::info!(
            "Switched to {} (command {}, content {:?}), returning to default in {}s",
            pending.scene,
            pending.command,
            pending.content,
            hold.as_secs()
        );

        if let Err(e) =
            self.recorder
                .record_switch(&pending.content, &pending.command, &pending.scene)
        {
            tracing::warn!("Failed to record switch to {}: {}", pending.scene, e);
        }

        SwitchOutcome::Switched {
            scene: pending.scene,
        }
    }

    /// Hold elapsed: return to the default scene
    async fn revert(self: Arc<Self>, id: u64) {
        {
            let mut slots = self.lock();
            if slots.revert_timer.as_ref().map(|t| t.id()) != Some(id) {
                tracing::debug!("Revert timer {} is stale", id);
                return;
            }
            slots.revert_timer = None;
            if slots.state.committing {
                // Settled by the in-flight switch: success starts a new hold,
                // failure reverts
                tracing::debug!("Revert deferred, a switch is in progress");
                slots.revert_due = true;
                return;
            }
            slots.state.committing = true;
            self.publish(&slots);
        }

        self.return_to_default().await;
    }

    /// Show the default scene and end the hold; the caller holds the
    /// in-flight flag
    async fn return_to_default(&self) {
        let default_scene = self.settings().default_scene;
        let reverted = if default_scene.is_empty() {
            tracing::warn!("No default scene configured, staying on the current scene");
            false
        } else {
            match self.transport.set_scene(&default_scene).await {
                Ok(()) => {
                    tracing::info!("Returned to default scene {}", default_scene);
                    true
                }
                Err(e) => {
                    tracing::error!("Failed to return to default scene {}: {}", default_scene, e);
                    false
                }
            }
        };

        let mut slots = self.lock();
        slots.state.committing = false;
        slots.state.cooldown_until = None;
        if reverted {
            slots.state.active_scene = Some(default_scene);
        }
        self.publish(&slots);
    }
}

/// Log a rejection and wrap it
fn reject(command: &str, content: &str, rejection: Rejection) -> SwitchOutcome {
    tracing::info!(
        "Trigger {} ({:?}) rejected: {}",
        command,
        content,
        rejection
    );
    SwitchOutcome::Rejected(rejection)
}
