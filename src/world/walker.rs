//! Walk-to and follow
//!
//! Walks the agent to a single global position using the server side
//! autopilot, polling the distance to give up when progress stalls.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use glam::{DVec3, Vec3};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::WalkSettings;
use crate::utils::math::RegionHandle;
use super::{AlertMessageEvent, MovementActuator, PositionUpdateEvent, Ticker, WalkEvent};

const EVENT_CAPACITY: usize = 32;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct FollowTarget {
    name: String,
    avatar_id: Uuid,
}

#[derive(Debug)]
struct WalkerState {
    target: DVec3,
    walking: bool,
    last_distance: i64,
    last_distance_changed: Instant,
    ticker: Option<Ticker>,
    /// Publish a "finished walking" line when the walk ends
    report_on_end: bool,
    following: Option<FollowTarget>,
    disposed: bool,
}

struct WalkerShared {
    state: Mutex<WalkerState>,
    actuator: Arc<dyn MovementActuator>,
    events: broadcast::Sender<WalkEvent>,
    settings: WalkSettings,
}

impl WalkerShared {
    fn walk_to(self: &Arc<Self>, target: DVec3) {
        let mut state = self.shared_state();
        state.target = target;

        if let Some(follow) = state.following.take() {
            debug!("🚶 Walking overrides following {}", follow.name);
        }

        if state.ticker.is_none() {
            let weak = Arc::downgrade(self);
            state.ticker = Some(Ticker::spawn(self.settings.poll_interval(), move || {
                match weak.upgrade() {
                    Some(shared) => shared.poll(),
                    None => ControlFlow::Break(()),
                }
            }));
        }

        state.last_distance_changed = Instant::now();
        self.actuator.auto_pilot_cancel();
        state.walking = true;
        debug!("🚶 Walking to {}", target);
        self.actuator.auto_pilot(target);
        let _ = self.events.send(WalkEvent::WalkStateChanged { walking: true });
    }

    fn shared_state(&self) -> parking_lot::MutexGuard<'_, WalkerState> {
        self.state.lock()
    }

    fn poll(&self) -> ControlFlow<()> {
        let mut state = self.shared_state();
        if state.disposed || !state.walking {
            return ControlFlow::Break(());
        }

        let distance = self.actuator.global_position().distance(state.target);
        if distance < self.settings.arrival_distance {
            debug!("🚶 Arrived {:.1}m from walk target", distance);
            self.end_walking_locked(&mut state);
            return ControlFlow::Break(());
        }

        let truncated = distance as i64;
        if truncated != state.last_distance {
            state.last_distance = truncated;
            state.last_distance_changed = Instant::now();
        } else if state.last_distance_changed.elapsed() > self.settings.stall_timeout() {
            // Distance has not changed for too long, give up
            debug!("🚶 No progress toward walk target for {:?}, giving up", self.settings.stall_timeout());
            self.end_walking_locked(&mut state);
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn end_walking_locked(&self, state: &mut WalkerState) {
        if !state.walking {
            return;
        }

        state.walking = false;
        info!("🚶 Finished walking");
        state.ticker = None;
        self.actuator.auto_pilot_cancel();

        if state.report_on_end {
            state.report_on_end = false;
            let target = std::mem::replace(&mut state.target, DVec3::ZERO);
            if target != DVec3::ZERO {
                // The final distance is measured after the avatar settles,
                // so it can be non-zero even after an arrival
                let actuator = self.actuator.clone();
                let events = self.events.clone();
                let delay = self.settings.settle_delay();
                tokio::spawn(async move {
                    time::sleep(delay).await;
                    let distance = actuator.global_position().distance(target);
                    let _ = events.send(WalkEvent::Notification {
                        message: format!("Finished walking {:.0} meters from destination", distance),
                    });
                });
            } else {
                let _ = self.events.send(WalkEvent::Notification {
                    message: "Finished walking".to_string(),
                });
            }
        }

        let _ = self.events.send(WalkEvent::WalkStateChanged { walking: false });
    }

    fn follow_update(&self, followed: DVec3) {
        let me = self.actuator.global_position();
        let keep = self.settings.follow_distance;
        if followed.distance(me) > keep {
            let target = followed + (me - followed).normalize_or_zero() * (keep - 1.0);
            self.actuator.auto_pilot_cancel();
            self.actuator.auto_pilot(target);
        } else {
            self.actuator.auto_pilot_cancel();
            self.actuator.turn_toward(followed);
        }
    }

    fn on_position_update(&self, update: &PositionUpdateEvent) {
        let followed = {
            let state = self.shared_state();
            if state.disposed {
                return;
            }
            match (&state.following, update.avatar_id) {
                (Some(follow), Some(id)) if follow.avatar_id == id => true,
                _ => false,
            }
        };

        if followed {
            self.follow_update(update.global_position());
        }
    }
}

/// Single target walker with follow mode
pub struct TargetWalker {
    shared: Arc<WalkerShared>,
}

impl TargetWalker {
    pub fn new(actuator: Arc<dyn MovementActuator>, settings: &WalkSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut settings = settings.clone();
        if settings.poll_interval_ms == 0 {
            settings.poll_interval_ms = WalkSettings::default().poll_interval_ms;
        }

        Self {
            shared: Arc::new(WalkerShared {
                state: Mutex::new(WalkerState {
                    target: DVec3::ZERO,
                    walking: false,
                    last_distance: 0,
                    last_distance_changed: Instant::now(),
                    ticker: None,
                    report_on_end: false,
                    following: None,
                    disposed: false,
                }),
                actuator,
                events,
                settings,
            }),
        }
    }

    /// Subscribe to walk state changes and finish notifications
    pub fn subscribe(&self) -> broadcast::Receiver<WalkEvent> {
        self.shared.events.subscribe()
    }

    /// Start walking to a global position, replacing any current walk or follow
    pub fn walk_to(&self, target: DVec3) {
        self.shared.walk_to(target);
    }

    /// Move to a region-local position by walking or by teleport
    ///
    /// Walks started here publish a finish notification when they end.
    pub fn move_to(&self, region: RegionHandle, position: Vec3, use_teleport: bool) {
        if use_teleport {
            info!("🚶 Teleporting to {} {}", region, position);
            self.shared.actuator.request_teleport(region, position);
            return;
        }

        let target = region.to_global(position);
        self.shared.shared_state().report_on_end = true;
        self.shared.actuator.turn_toward(target);
        self.shared.walk_to(target);
    }

    /// Stop walking. Does nothing when not walking.
    pub fn end_walking(&self) {
        let mut state = self.shared.shared_state();
        self.shared.end_walking_locked(&mut state);
    }

    pub fn is_walking(&self) -> bool {
        self.shared.shared_state().walking
    }

    pub fn target(&self) -> DVec3 {
        self.shared.shared_state().target
    }

    /// Server alerts reporting a cancelled autopilot end the walk
    pub fn on_alert_message(&self, alert: &AlertMessageEvent) {
        if alert.is_autopilot_cancel() {
            let mut state = self.shared.shared_state();
            if state.walking {
                self.shared.end_walking_locked(&mut state);
            }
        }
    }

    /// Follow an avatar, keeping the configured follow distance
    ///
    /// A nil id stops following. `last_known` is the avatar's current global
    /// position when already known.
    pub fn follow(&self, name: impl Into<String>, avatar_id: Uuid, last_known: Option<DVec3>) {
        let name = name.into();
        {
            let mut state = self.shared.shared_state();
            if avatar_id.is_nil() {
                state.following = None;
                return;
            }

            info!("🚶 Following {} ({})", name, avatar_id);
            state.following = Some(FollowTarget { name, avatar_id });
            state.report_on_end = false;
            self.shared.end_walking_locked(&mut state);
        }

        if let Some(position) = last_known.filter(|p| *p != DVec3::ZERO) {
            self.shared.actuator.turn_toward(position);
            self.shared.follow_update(position);
        }
    }

    pub fn stop_following(&self) {
        if let Some(follow) = self.shared.shared_state().following.take() {
            debug!("🚶 Stopped following {}", follow.name);
        }
    }

    pub fn is_following(&self) -> bool {
        self.shared.shared_state().following.is_some()
    }

    /// Name of the followed avatar, empty when not following
    pub fn follow_name(&self) -> String {
        self.shared
            .shared_state()
            .following
            .as_ref()
            .map(|f| f.name.clone())
            .unwrap_or_default()
    }

    pub fn on_position_update(&self, update: &PositionUpdateEvent) {
        self.shared.on_position_update(update);
    }

    /// Feed position updates from a broadcast channel until it closes or the
    /// walker is dropped
    pub fn spawn_position_feed(&self, mut updates: broadcast::Receiver<PositionUpdateEvent>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => match weak.upgrade() {
                        Some(shared) => shared.on_position_update(&update),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("🚶 Position feed lagged, skipped {} updates", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Wait until the agent is within `how_close` of `position` or `max_wait`
    /// elapses. Returns the last measured distance.
    pub async fn wait_until_position(&self, position: DVec3, max_wait: Duration, how_close: f64) -> f64 {
        let until = Instant::now() + max_wait;
        while Instant::now() < until {
            let distance = self.shared.actuator.global_position().distance(position);
            if how_close >= distance {
                return distance;
            }
            time::sleep(WAIT_POLL_INTERVAL).await;
        }
        self.shared.actuator.global_position().distance(position)
    }
}

impl Drop for TargetWalker {
    fn drop(&mut self) {
        let mut state = self.shared.shared_state();
        state.disposed = true;
        state.ticker = None;
    }
}
