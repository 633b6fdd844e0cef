//! Seams to the inventory and appearance protocol layer

use async_trait::async_trait;
use uuid::Uuid;

use super::types::{
    AttachmentPoint, FolderType, InventoryFolder, InventoryItem, InventoryNode, InventoryType, Primitive,
};
use super::OutfitResult;

/// Local inventory store plus inventory protocol requests
///
/// Lookups read the local store; requests are fire-and-forget and their
/// results arrive later as [`super::OutfitEvent`]s. Link creation is the one
/// request that is awaited.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Our agent id, used as owner for fetch requests
    fn agent_id(&self) -> Uuid;

    fn root_folder_id(&self) -> Option<Uuid>;

    /// Folders and items currently known to be in a folder
    fn folder_contents(&self, folder_id: Uuid) -> Vec<InventoryNode>;

    fn folder(&self, folder_id: Uuid) -> Option<InventoryFolder>;

    fn item(&self, item_id: Uuid) -> Option<InventoryItem>;

    /// Create a folder. Returns the folder once it is in the local store.
    fn create_folder(&self, parent_id: Uuid, name: &str, folder_type: FolderType) -> Option<InventoryFolder>;

    /// Request the full descendant listing of a folder
    fn request_folder_contents(&self, folder_id: Uuid);

    /// Batch fetch of items by id and owner
    fn request_fetch_items(&self, items: &[(Uuid, Uuid)]);

    /// Remove items (or links) by id
    fn remove_items(&self, item_ids: &[Uuid]);

    /// Create a link in `folder_id` pointing at `target_id`, returning the new link
    async fn create_link(
        &self,
        folder_id: Uuid,
        target_id: Uuid,
        name: &str,
        description: &str,
        inventory_type: InventoryType,
    ) -> OutfitResult<InventoryItem>;
}

/// Appearance and attachment requests for our avatar
pub trait AppearanceService: Send + Sync {
    fn attach(&self, item: &InventoryItem, point: AttachmentPoint, replace: bool);

    fn detach(&self, item: &InventoryItem);

    fn replace_outfit(&self, items: &[InventoryItem], safe: bool);

    fn add_to_outfit(&self, items: &[InventoryItem], replace: bool);

    fn remove_from_outfit(&self, items: &[InventoryItem]);

    /// Ask for the appearance to be recomputed and sent
    fn request_set_appearance(&self, force_rebake: bool);

    /// Root objects currently attached to our avatar
    fn attached_objects(&self) -> Vec<Primitive>;
}

/// Restriction layer that may forbid detaching items
pub trait DetachPolicy: Send + Sync {
    fn is_detach_allowed(&self, item: &InventoryItem) -> bool;
}

/// Policy with no restrictions
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllDetach;

impl DetachPolicy for AllowAllDetach {
    fn is_detach_allowed(&self, _item: &InventoryItem) -> bool {
        true
    }
}
