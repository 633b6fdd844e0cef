use glam::{DVec3, Vec3};
use uuid::Uuid;
use std::time::SystemTime;

use crate::utils::math::RegionHandle;
use super::NavigationStatus;

/// Events fed into the avatar core by the networking layer, and events the
/// core publishes back to the application.

/// Terse position update for an object or avatar in a region
#[derive(Debug, Clone)]
pub struct PositionUpdateEvent {
    pub local_id: u32,
    /// Set when the update belongs to an avatar we know the identity of
    pub avatar_id: Option<Uuid>,
    pub is_avatar: bool,
    pub region: RegionHandle,
    /// Region-local position
    pub position: Vec3,
    pub timestamp: SystemTime,
}

impl PositionUpdateEvent {
    /// Create an avatar position update
    pub fn avatar(local_id: u32, avatar_id: Option<Uuid>, region: RegionHandle, position: Vec3) -> Self {
        Self {
            local_id,
            avatar_id,
            is_avatar: true,
            region,
            position,
            timestamp: SystemTime::now(),
        }
    }

    /// Create a position update for a plain object
    pub fn object(local_id: u32, region: RegionHandle, position: Vec3) -> Self {
        Self {
            local_id,
            avatar_id: None,
            is_avatar: false,
            region,
            position,
            timestamp: SystemTime::now(),
        }
    }

    pub fn global_position(&self) -> DVec3 {
        self.region.to_global(self.position)
    }
}

/// Alert message shown to the agent by the simulator
#[derive(Debug, Clone)]
pub struct AlertMessageEvent {
    pub message: String,
    pub timestamp: SystemTime,
}

impl AlertMessageEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Check if this alert reports that the server cancelled autopilot movement
    ///
    /// Matched on the human readable text; the simulator has no structured
    /// cancellation signal for this.
    pub fn is_autopilot_cancel(&self) -> bool {
        self.message.contains("Autopilot cancel")
    }
}

/// Events published by the waypoint navigator
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationEvent {
    /// The navigator changed status
    StatusChanged { status: NavigationStatus, next_waypoint: DVec3 },
    /// The agent reached an intermediate waypoint
    ArrivedAtWaypoint { waypoint: DVec3 },
}

/// Events published by the target walker
#[derive(Debug, Clone, PartialEq)]
pub enum WalkEvent {
    /// Walking toward a target started or stopped
    WalkStateChanged { walking: bool },
    /// Human readable status line for the chat console
    Notification { message: String },
}
