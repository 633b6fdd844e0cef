//! Movement actuator seam
//!
//! The navigator and walker never talk to the simulator directly; they issue
//! fire-and-forget commands through [`MovementActuator`].

use glam::{DVec3, Vec3};
use parking_lot::Mutex;
use crate::utils::math::RegionHandle;

/// Outbound movement commands for the agent
pub trait MovementActuator: Send + Sync {
    /// Ask the server to autopilot the agent to a global position
    fn auto_pilot(&self, target: DVec3);

    /// Cancel any outstanding autopilot request
    fn auto_pilot_cancel(&self);

    /// The agent's current global position
    fn global_position(&self) -> DVec3;

    /// Rotate the agent's body to face a global position
    fn turn_toward(&self, target: DVec3);

    /// Teleport to a region-local position
    fn request_teleport(&self, region: RegionHandle, position: Vec3);
}

/// A command as seen by [`RecordingActuator`]
#[derive(Debug, Clone, PartialEq)]
pub enum MovementCommand {
    AutoPilot(DVec3),
    Cancel,
    TurnToward(DVec3),
    Teleport { region: RegionHandle, position: Vec3 },
}

/// Actuator that records commands instead of sending them
///
/// Position is set by the caller, which makes it usable for offline replay
/// of position logs as well as for tests.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    commands: Mutex<Vec<MovementCommand>>,
    position: Mutex<DVec3>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&self, position: DVec3) {
        *self.position.lock() = position;
    }

    pub fn commands(&self) -> Vec<MovementCommand> {
        self.commands.lock().clone()
    }

    /// Autopilot targets requested so far, in order
    pub fn auto_pilot_targets(&self) -> Vec<DVec3> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                MovementCommand::AutoPilot(target) => Some(*target),
                _ => None,
            })
            .collect()
    }

    pub fn last_auto_pilot(&self) -> Option<DVec3> {
        self.auto_pilot_targets().last().copied()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }
}

impl MovementActuator for RecordingActuator {
    fn auto_pilot(&self, target: DVec3) {
        self.commands.lock().push(MovementCommand::AutoPilot(target));
    }

    fn auto_pilot_cancel(&self) {
        self.commands.lock().push(MovementCommand::Cancel);
    }

    fn global_position(&self) -> DVec3 {
        *self.position.lock()
    }

    fn turn_toward(&self, target: DVec3) {
        self.commands.lock().push(MovementCommand::TurnToward(target));
    }

    fn request_teleport(&self, region: RegionHandle, position: Vec3) {
        self.commands.lock().push(MovementCommand::Teleport { region, position });
    }
}
