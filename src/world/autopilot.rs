//! Waypoint autopilot
//!
//! Drives the agent along an ordered route of global positions. Arrival is
//! detected from position updates of our own avatar; getting stuck is
//! detected by a polling ticker that watches the distance to the next
//! waypoint.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use glam::DVec3;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::NavigationSettings;
use crate::utils::math::truncated_distance;
use super::{
    AlertMessageEvent, MovementActuator, NavigationError, NavigationEvent, NavigationResult,
    PositionUpdateEvent, Ticker,
};

const EVENT_CAPACITY: usize = 64;

/// Status of the autopilot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationStatus {
    /// Route loaded, not started
    #[default]
    Idle,
    Paused,
    /// Moving toward the next waypoint
    Moving,
    Cancelled,
    /// Reached the final waypoint of a non-looping route
    Finished,
    /// Stuck or cancelled by the server
    Failed,
}

impl NavigationStatus {
    /// Check if the route ended, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NavigationStatus::Cancelled | NavigationStatus::Finished | NavigationStatus::Failed
        )
    }
}

impl std::fmt::Display for NavigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigationStatus::Idle => write!(f, "Idle"),
            NavigationStatus::Paused => write!(f, "Paused"),
            NavigationStatus::Moving => write!(f, "Moving"),
            NavigationStatus::Cancelled => write!(f, "Cancelled"),
            NavigationStatus::Finished => write!(f, "Finished"),
            NavigationStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug)]
struct NavigatorState {
    waypoints: Vec<DVec3>,
    index: usize,
    status: NavigationStatus,
    looping: bool,
    waypoint_radius: f64,
    stuck_timeout: Duration,
    tick_interval: Duration,
    agent_local_id: Option<u32>,
    /// Last sampled global position of our avatar
    position: DVec3,
    last_distance: i64,
    /// `None` until the stuck detector has taken its first sample
    last_distance_changed: Option<Instant>,
    ticker: Option<Ticker>,
    disposed: bool,
}

impl NavigatorState {
    fn next_waypoint(&self) -> DVec3 {
        self.waypoints.get(self.index).copied().unwrap_or(DVec3::ZERO)
    }

    fn next_is_final(&self) -> bool {
        !self.waypoints.is_empty() && self.index == self.waypoints.len() - 1
    }

    fn require_route(&self) -> NavigationResult<()> {
        if self.waypoints.len() < 2 {
            return Err(NavigationError::RouteTooShort { count: self.waypoints.len() });
        }
        Ok(())
    }
}

struct NavigatorShared {
    state: Mutex<NavigatorState>,
    actuator: Arc<dyn MovementActuator>,
    events: broadcast::Sender<NavigationEvent>,
}

impl NavigatorShared {
    /// Returns true if the status actually changed and an event was published
    fn set_status(&self, state: &mut NavigatorState, status: NavigationStatus) -> bool {
        if state.status == status {
            return false;
        }

        debug!("🧭 Autopilot status: {} -> {}", state.status, status);
        state.status = status;
        // No subscribers is not an error
        let _ = self.events.send(NavigationEvent::StatusChanged {
            status,
            next_waypoint: state.next_waypoint(),
        });
        true
    }

    fn start_ticker(self: &Arc<Self>, state: &mut NavigatorState) {
        if state.ticker.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        state.ticker = Some(Ticker::spawn(state.tick_interval, move || match weak.upgrade() {
            Some(shared) => shared.check_stuck(),
            None => ControlFlow::Break(()),
        }));
    }

    /// Cancel the outstanding move and head for the current waypoint
    fn move_to_current(self: &Arc<Self>, state: &mut NavigatorState) {
        self.actuator.auto_pilot_cancel();
        self.start_ticker(state);
        self.set_status(state, NavigationStatus::Moving);

        let target = state.next_waypoint();
        debug!("🧭 Autopilot to waypoint {} at {}", state.index, target);
        self.actuator.auto_pilot(target);
    }

    fn stop_locked(&self, state: &mut NavigatorState, status: NavigationStatus) {
        state.ticker = None;
        self.actuator.auto_pilot_cancel();
        self.set_status(state, status);
        state.last_distance_changed = None;
        state.index = 0;
    }

    fn set_index_locked(self: &Arc<Self>, state: &mut NavigatorState, index: usize) -> NavigationResult<usize> {
        state.require_route()?;

        let count = state.waypoints.len();
        if state.looping {
            state.index = index % count;
        } else if index < count {
            state.index = index;
        } else {
            return Err(NavigationError::InvalidArgument {
                name: "waypoint_index",
                reason: format!("must be less than the number of waypoints ({}), got {}", count, index),
            });
        }

        if state.status != NavigationStatus::Idle {
            self.move_to_current(state);
        }
        Ok(state.index)
    }

    fn advance_locked(self: &Arc<Self>, state: &mut NavigatorState, increment: bool) -> NavigationResult<usize> {
        state.require_route()?;

        if increment {
            let next = state.index + 1;
            self.set_index_locked(state, next)
        } else {
            self.move_to_current(state);
            Ok(state.index)
        }
    }

    fn on_position_update(self: &Arc<Self>, update: &PositionUpdateEvent) {
        let mut state = self.state.lock();
        if state.disposed || state.status != NavigationStatus::Moving {
            return;
        }
        if !update.is_avatar || state.agent_local_id != Some(update.local_id) {
            return;
        }

        state.position = update.global_position();
        let next = state.next_waypoint();
        if state.position.distance(next) > state.waypoint_radius {
            return;
        }

        if state.next_is_final() && !state.looping {
            info!("🧭 Autopilot reached final waypoint {}", next);
            self.stop_locked(&mut state, NavigationStatus::Finished);
        } else {
            debug!("🧭 Arrived at waypoint {} ({})", state.index, next);
            let _ = self.events.send(NavigationEvent::ArrivedAtWaypoint { waypoint: next });
            if let Err(e) = self.advance_locked(&mut state, true) {
                warn!("🧭 Failed to advance after arrival: {}", e);
            }
        }
    }

    fn check_stuck(&self) -> ControlFlow<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return ControlFlow::Break(());
        }
        if state.status != NavigationStatus::Moving {
            return ControlFlow::Continue(());
        }

        let distance = truncated_distance(state.position, state.next_waypoint());
        let now = Instant::now();
        match state.last_distance_changed {
            Some(changed) if distance == state.last_distance => {
                let stalled = now.duration_since(changed);
                if stalled > state.stuck_timeout {
                    warn!(
                        "🧭 Autopilot stuck {}m from waypoint {} for {:?}",
                        distance, state.index, stalled
                    );
                    self.stop_locked(&mut state, NavigationStatus::Failed);
                    return ControlFlow::Break(());
                }
            }
            _ => {
                state.last_distance = distance;
                state.last_distance_changed = Some(now);
            }
        }
        ControlFlow::Continue(())
    }
}

/// Multi-waypoint autopilot
///
/// All operations are synchronous; the stuck detector runs on a tokio task,
/// so the navigator must be driven from inside a tokio runtime.
pub struct WaypointNavigator {
    shared: Arc<NavigatorShared>,
}

impl WaypointNavigator {
    pub fn new(actuator: Arc<dyn MovementActuator>, settings: &NavigationSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = NavigatorState {
            waypoints: Vec::new(),
            index: 0,
            status: NavigationStatus::Idle,
            looping: settings.loop_route,
            waypoint_radius: if settings.waypoint_radius > 0.0 {
                settings.waypoint_radius
            } else {
                NavigationSettings::default().waypoint_radius
            },
            stuck_timeout: if settings.stuck_timeout_ms > 0 {
                settings.stuck_timeout()
            } else {
                NavigationSettings::default().stuck_timeout()
            },
            tick_interval: settings.tick_interval().max(Duration::from_millis(1)),
            agent_local_id: None,
            position: DVec3::ZERO,
            last_distance: 0,
            last_distance_changed: None,
            ticker: None,
            disposed: false,
        };

        Self {
            shared: Arc::new(NavigatorShared {
                state: Mutex::new(state),
                actuator,
                events,
            }),
        }
    }

    /// Subscribe to status and arrival events
    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.shared.events.subscribe()
    }

    /// Local id of our own avatar in the current region
    pub fn set_agent_local_id(&self, local_id: u32) {
        self.shared.state.lock().agent_local_id = Some(local_id);
    }

    /// Replace the route. Stops the autopilot (status becomes Idle).
    pub fn set_route(&self, waypoints: Vec<DVec3>) -> NavigationResult<()> {
        if waypoints.len() < 2 {
            return Err(NavigationError::InvalidArgument {
                name: "waypoints",
                reason: format!("must have at least 2 waypoints, got {}", waypoints.len()),
            });
        }

        let mut state = self.shared.state.lock();
        self.shared.stop_locked(&mut state, NavigationStatus::Idle);
        info!("🧭 New autopilot route with {} waypoints", waypoints.len());
        state.waypoints = waypoints;
        Ok(())
    }

    /// Start from Idle toward the current waypoint. Returns the waypoint index.
    pub fn start(&self) -> NavigationResult<usize> {
        let mut state = self.shared.state.lock();
        state.require_route()?;
        if state.status != NavigationStatus::Idle {
            return Err(NavigationError::InvalidState {
                expected: NavigationStatus::Idle,
                actual: state.status,
            });
        }

        info!("🧭 Starting autopilot");
        self.shared.advance_locked(&mut state, false)
    }

    /// Cancel, then immediately head for the first waypoint again
    pub fn restart(&self) -> NavigationResult<usize> {
        let mut state = self.shared.state.lock();
        state.require_route()?;

        self.shared.stop_locked(&mut state, NavigationStatus::Cancelled);
        self.shared.advance_locked(&mut state, false)
    }

    pub fn pause(&self) -> NavigationResult<usize> {
        let mut state = self.shared.state.lock();
        if state.status != NavigationStatus::Moving {
            return Err(NavigationError::InvalidState {
                expected: NavigationStatus::Moving,
                actual: state.status,
            });
        }

        state.ticker = None;
        state.last_distance_changed = None;
        self.shared.actuator.auto_pilot_cancel();
        self.shared.set_status(&mut state, NavigationStatus::Paused);
        Ok(state.index)
    }

    pub fn resume(&self) -> NavigationResult<usize> {
        let mut state = self.shared.state.lock();
        if state.status != NavigationStatus::Paused {
            return Err(NavigationError::InvalidState {
                expected: NavigationStatus::Paused,
                actual: state.status,
            });
        }

        self.shared.advance_locked(&mut state, false)
    }

    /// Stop with status Cancelled
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        self.shared.stop_locked(&mut state, NavigationStatus::Cancelled);
    }

    /// Stop with the given status, which cannot be Moving
    pub fn stop_with(&self, status: NavigationStatus) -> NavigationResult<()> {
        if status == NavigationStatus::Moving {
            return Err(NavigationError::InvalidArgument {
                name: "status",
                reason: "cannot stop with status Moving".to_string(),
            });
        }

        let mut state = self.shared.state.lock();
        self.shared.stop_locked(&mut state, status);
        Ok(())
    }

    /// Head for the next waypoint, or re-issue the move to the current one
    /// when `increment` is false. Returns the resulting index.
    pub fn advance_to_next(&self, increment: bool) -> NavigationResult<usize> {
        let mut state = self.shared.state.lock();
        self.shared.advance_locked(&mut state, increment)
    }

    /// Jump to a waypoint. Takes effect immediately unless Idle.
    pub fn set_waypoint_index(&self, index: usize) -> NavigationResult<usize> {
        let mut state = self.shared.state.lock();
        self.shared.set_index_locked(&mut state, index)
    }

    pub fn on_position_update(&self, update: &PositionUpdateEvent) {
        self.shared.on_position_update(update);
    }

    /// Server alerts reporting a cancelled autopilot fail the route
    pub fn on_alert_message(&self, alert: &AlertMessageEvent) {
        if !alert.is_autopilot_cancel() {
            return;
        }

        let mut state = self.shared.state.lock();
        if !state.disposed && state.status == NavigationStatus::Moving {
            warn!("🧭 Autopilot cancelled by server: {}", alert.message);
            self.shared.stop_locked(&mut state, NavigationStatus::Failed);
        }
    }

    /// Feed position updates from a broadcast channel until it closes or the
    /// navigator is dropped
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
                        debug!("🧭 Position feed lagged, skipped {} updates", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn status(&self) -> NavigationStatus {
        self.shared.state.lock().status
    }

    pub fn waypoints(&self) -> Vec<DVec3> {
        self.shared.state.lock().waypoints.clone()
    }

    /// The waypoint being moved toward; zero when there is none
    pub fn next_waypoint(&self) -> DVec3 {
        self.shared.state.lock().next_waypoint()
    }

    /// The waypoint before the next one; zero at the start of the route
    pub fn previous_waypoint(&self) -> DVec3 {
        let state = self.shared.state.lock();
        if state.index >= 1 {
            state.waypoints.get(state.index - 1).copied().unwrap_or(DVec3::ZERO)
        } else {
            DVec3::ZERO
        }
    }

    pub fn next_waypoint_index(&self) -> usize {
        self.shared.state.lock().index
    }

    pub fn next_waypoint_is_final(&self) -> bool {
        self.shared.state.lock().next_is_final()
    }

    pub fn next_waypoint_is_start(&self) -> bool {
        let state = self.shared.state.lock();
        state.index == 0 && state.waypoints.len() > 1
    }

    pub fn is_looping(&self) -> bool {
        self.shared.state.lock().looping
    }

    pub fn set_looping(&self, looping: bool) {
        self.shared.state.lock().looping = looping;
    }

    pub fn waypoint_radius(&self) -> f64 {
        self.shared.state.lock().waypoint_radius
    }

    pub fn set_waypoint_radius(&self, radius: f64) -> NavigationResult<()> {
        if !(radius > 0.0) {
            return Err(NavigationError::InvalidArgument {
                name: "waypoint_radius",
                reason: format!("must be greater than 0, got {}", radius),
            });
        }
        self.shared.state.lock().waypoint_radius = radius;
        Ok(())
    }

    pub fn stuck_timeout(&self) -> Duration {
        self.shared.state.lock().stuck_timeout
    }

    pub fn set_stuck_timeout(&self, timeout: Duration) -> NavigationResult<()> {
        if timeout.is_zero() {
            return Err(NavigationError::InvalidArgument {
                name: "stuck_timeout",
                reason: "must be greater than 0".to_string(),
            });
        }
        self.shared.state.lock().stuck_timeout = timeout;
        Ok(())
    }
}

impl Drop for WaypointNavigator {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.disposed = true;
        state.ticker = None;
    }
}
