//! Avatar movement: waypoint autopilot, walk-to and follow
//!
//! Both components are driven by position updates from the networking layer
//! plus their own polling tickers, and steer the agent through a
//! [`MovementActuator`].

pub mod events;
pub mod movement;
pub mod ticker;
pub mod autopilot;
pub mod walker;

// Re-export all event types for easier access
pub use events::*;
pub use movement::{MovementActuator, MovementCommand, RecordingActuator};
pub use ticker::Ticker;
pub use autopilot::{WaypointNavigator, NavigationStatus};
pub use walker::TargetWalker;

// Error types
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavigationError {
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Invalid state: status must be {expected}, was {actual}")]
    InvalidState { expected: NavigationStatus, actual: NavigationStatus },

    #[error("Route must contain at least 2 waypoints, has {count}")]
    RouteTooShort { count: usize },
}

pub type NavigationResult<T> = Result<T, NavigationError>;
