use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Context, Result};
use glam::{DVec3, Vec3};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{info, warn};

use slv_avatar::config::load_avatar_settings;
use slv_avatar::utils::logging::{init_logging, log_system_info};
use slv_avatar::utils::{parse_sl_vector, RegionHandle};
use slv_avatar::world::{
    MovementActuator, NavigationEvent, PositionUpdateEvent, TargetWalker, WalkEvent, WaypointNavigator,
};
use slv_avatar::{APP_NAME, VERSION};

const AGENT_LOCAL_ID: u32 = 1;
const STEP_INTERVAL: Duration = Duration::from_millis(100);
/// Meters per second
const WALK_SPEED: f64 = 4.0;

/// Stand-in for a simulator: walks toward the autopilot target and reports
/// terse position updates for the agent
struct SimulatedAgent {
    region: RegionHandle,
    position: Mutex<DVec3>,
    target: Mutex<Option<DVec3>>,
    updates: broadcast::Sender<PositionUpdateEvent>,
}

impl SimulatedAgent {
    fn new(region: RegionHandle, start: Vec3) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            region,
            position: Mutex::new(region.to_global(start)),
            target: Mutex::new(None),
            updates,
        }
    }

    fn step(&self, dt: Duration) {
        let Some(target) = *self.target.lock() else {
            return;
        };

        let position = {
            let mut position = self.position.lock();
            let to_target = target - *position;
            let step = WALK_SPEED * dt.as_secs_f64();
            if to_target.length() <= step {
                *position = target;
            } else {
                *position += to_target.normalize() * step;
            }
            *position
        };

        let local = (position - self.region.to_global(Vec3::ZERO)).as_vec3();
        // No receivers just means nobody listens yet
        let _ = self
            .updates
            .send(PositionUpdateEvent::avatar(AGENT_LOCAL_ID, None, self.region, local));
    }
}

impl MovementActuator for SimulatedAgent {
    fn auto_pilot(&self, target: DVec3) {
        *self.target.lock() = Some(target);
    }

    fn auto_pilot_cancel(&self) {
        *self.target.lock() = None;
    }

    fn global_position(&self) -> DVec3 {
        *self.position.lock()
    }

    fn turn_toward(&self, _target: DVec3) {}

    fn request_teleport(&self, region: RegionHandle, position: Vec3) {
        if region == self.region {
            *self.position.lock() = region.to_global(position);
            *self.target.lock() = None;
        } else {
            warn!("Teleport to another region ({}) is not simulated", region);
        }
    }
}

fn parse_route(args: &[String], region: RegionHandle) -> Result<Vec<DVec3>> {
    if args.is_empty() {
        return Ok([
            Vec3::new(128.0, 128.0, 25.0),
            Vec3::new(150.0, 128.0, 25.0),
            Vec3::new(150.0, 150.0, 25.0),
        ]
        .into_iter()
        .map(|local| region.to_global(local))
        .collect());
    }

    args.iter()
        .map(|arg| {
            parse_sl_vector(arg)
                .map(|local| region.to_global(local.as_vec3()))
                .map_err(|e| anyhow!("invalid waypoint '{}': {}", arg, e))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging().context("failed to initialize logging")?;
    info!("{} {}", APP_NAME, VERSION);
    log_system_info();

    let settings = load_avatar_settings().unwrap_or_default();
    let region = RegionHandle::from_grid(1000, 1000);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let route = parse_route(&args, region)?;

    let agent = Arc::new(SimulatedAgent::new(region, Vec3::new(120.0, 120.0, 25.0)));
    let stepper = {
        let agent = agent.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(STEP_INTERVAL);
            loop {
                interval.tick().await;
                agent.step(STEP_INTERVAL);
            }
        })
    };

    // Waypoint route
    let navigator = WaypointNavigator::new(agent.clone(), &settings.navigation);
    navigator.set_agent_local_id(AGENT_LOCAL_ID);
    navigator.spawn_position_feed(agent.updates.subscribe());
    let mut nav_events = navigator.subscribe();

    navigator.set_route(route)?;
    navigator.start()?;

    loop {
        match nav_events.recv().await? {
            NavigationEvent::ArrivedAtWaypoint { waypoint } => info!("Reached waypoint {}", waypoint),
            NavigationEvent::StatusChanged { status, next_waypoint } => {
                info!("Navigator is {} (next {})", status, next_waypoint);
                if status.is_terminal() {
                    break;
                }
            }
        }
    }
    drop(navigator);

    // Walk back to the start
    let walker = TargetWalker::new(agent.clone(), &settings.walking);
    walker.spawn_position_feed(agent.updates.subscribe());
    let mut walk_events = walker.subscribe();

    let home = Vec3::new(120.0, 120.0, 25.0);
    walker.move_to(region, home, false);

    loop {
        match walk_events.recv().await? {
            WalkEvent::WalkStateChanged { walking } => info!("Walking: {}", walking),
            WalkEvent::Notification { message } => {
                info!("{}", message);
                break;
            }
        }
    }

    let distance = walker
        .wait_until_position(region.to_global(home), Duration::from_secs(1), settings.walking.arrival_distance)
        .await;
    info!("Done, {:.1}m from home", distance);

    stepper.abort();
    Ok(())
}
