//! Inventory side of the avatar: the current outfit folder
//!
//! The outfit folder holds links to every item the avatar wears. It is kept
//! in sync with the worn wearables and live attachments by
//! [`OutfitReconciler`].

pub mod types;
pub mod service;
pub mod outfit;

pub use types::*;
pub use service::{InventoryService, AppearanceService, DetachPolicy, AllowAllDetach};
pub use outfit::OutfitReconciler;

use uuid::Uuid;

// Error types
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutfitError {
    #[error("Outfit folder is not available")]
    FolderUnavailable,

    #[error("Link creation failed for item {item_id}: {reason}")]
    LinkCreation { item_id: Uuid, reason: String },
}

pub type OutfitResult<T> = Result<T, OutfitError>;

/// Notifications from the inventory and appearance layer
#[derive(Debug, Clone)]
pub enum OutfitEvent {
    /// The event queue of a region came up
    EventQueueRunning { current_region: bool },
    /// A folder listing was refreshed
    FolderUpdated { folder_id: Uuid, success: bool },
    /// A requested item arrived
    ItemReceived { item: InventoryItem },
    /// The server accepted our appearance
    AppearanceSet,
    /// An object was removed from the scene
    ObjectKilled {
        current_region: bool,
        /// The object as last seen, if it was known
        object: Option<Primitive>,
    },
}
