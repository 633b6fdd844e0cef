// SLV-Avatar: avatar navigation and outfit tracking for the SLV viewer

pub mod utils;
pub mod config;
pub mod world;
pub mod inventory;

// Re-export commonly used types for convenience
pub use config::{AvatarSettings, NavigationSettings, WalkSettings, OutfitSettings};
pub use world::{
    WaypointNavigator, NavigationStatus, NavigationError, NavigationEvent, TargetWalker, WalkEvent,
    MovementActuator, PositionUpdateEvent, AlertMessageEvent,
};
pub use inventory::{OutfitReconciler, OutfitError, OutfitEvent};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
