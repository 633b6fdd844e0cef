//! Inventory data model used by the outfit reconciler

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name-value key carrying the inventory item id of an attached object
pub const ATTACH_ITEM_ID: &str = "AttachItemID";

/// Wearable layer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WearableType {
    Shape = 0,
    Skin = 1,
    Hair = 2,
    Eyes = 3,
    Shirt = 4,
    Pants = 5,
    Shoes = 6,
    Socks = 7,
    Jacket = 8,
    Gloves = 9,
    Undershirt = 10,
    Underpants = 11,
    Skirt = 12,
    Alpha = 13,
    Tattoo = 14,
    Physics = 15,
    Universal = 16,
}

impl WearableType {
    /// Body parts are worn exactly once per type
    pub fn is_body_part(&self) -> bool {
        matches!(
            self,
            WearableType::Shape | WearableType::Skin | WearableType::Eyes | WearableType::Hair
        )
    }

    /// Description tag for a link to a wearable of this type on `layer`
    pub fn link_description(&self, layer: u8) -> String {
        format!("@{}{:02}", *self as u8, layer)
    }
}

/// Inventory type of an item, as carried by links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InventoryType {
    Wearable,
    Attachment,
    Object,
    Notecard,
    Texture,
    Other,
}

/// Tagged item variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Wearable(WearableType),
    Attachment,
    Object,
    /// A link to another item. `inventory_type` is the linked item's type.
    Link { target: Uuid, inventory_type: InventoryType },
    Other(InventoryType),
}

impl ItemKind {
    pub fn inventory_type(&self) -> InventoryType {
        match self {
            ItemKind::Wearable(_) => InventoryType::Wearable,
            ItemKind::Attachment => InventoryType::Attachment,
            ItemKind::Object => InventoryType::Object,
            ItemKind::Link { inventory_type, .. } => *inventory_type,
            ItemKind::Other(inventory_type) => *inventory_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub kind: ItemKind,
}

impl InventoryItem {
    pub fn new(id: Uuid, name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id,
            parent_id: Uuid::nil(),
            owner_id: Uuid::nil(),
            name: name.into(),
            description: String::new(),
            kind,
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, ItemKind::Link { .. })
    }

    /// Target of a link, `None` for real items
    pub fn link_target(&self) -> Option<Uuid> {
        match self.kind {
            ItemKind::Link { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn wearable_type(&self) -> Option<WearableType> {
        match self.kind {
            ItemKind::Wearable(wearable_type) => Some(wearable_type),
            _ => None,
        }
    }

    /// Check if the item is an object or attachment that can be attached
    pub fn is_attachable(&self) -> bool {
        matches!(self.kind, ItemKind::Attachment | ItemKind::Object)
    }

    /// Check if the item, or the item a link points to, can be worn
    pub fn can_be_worn(&self) -> bool {
        matches!(
            self.kind.inventory_type(),
            InventoryType::Wearable | InventoryType::Attachment | InventoryType::Object
        )
    }
}

/// Preferred type of a system folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FolderType {
    None,
    Root,
    BodyPart,
    Clothing,
    Object,
    CurrentOutfit,
    Outfit,
    MyOutfits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFolder {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub name: String,
    pub preferred_type: FolderType,
    pub version: i32,
}

impl InventoryFolder {
    pub fn new(id: Uuid, parent_id: Uuid, name: impl Into<String>, preferred_type: FolderType) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
            preferred_type,
            version: 1,
        }
    }
}

/// Entry in a folder listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryNode {
    Folder(InventoryFolder),
    Item(InventoryItem),
}

/// Attachment point on the avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttachmentPoint {
    /// Use the point stored with the object
    Default = 0,
    Chest = 1,
    Skull = 2,
    LeftShoulder = 3,
    RightShoulder = 4,
    LeftHand = 5,
    RightHand = 6,
    LeftFoot = 7,
    RightFoot = 8,
    Spine = 9,
    Pelvis = 10,
    Mouth = 11,
    Chin = 12,
    LeftEar = 13,
    RightEar = 14,
    Nose = 17,
    HudCenter = 35,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

impl NameValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// An object in the scene, as far as attachment tracking cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primitive {
    pub local_id: u32,
    /// Local id of the parent; our own avatar for root attachments
    pub parent_id: u32,
    pub name_values: Vec<NameValue>,
}

impl Primitive {
    /// Root attachment on the avatar `parent_id`, created from `item_id`
    pub fn attachment(local_id: u32, parent_id: u32, item_id: Uuid) -> Self {
        Self {
            local_id,
            parent_id,
            name_values: vec![NameValue::new(ATTACH_ITEM_ID, item_id.to_string())],
        }
    }
}

/// A wearable currently worn by the avatar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WearableData {
    pub item_id: Uuid,
    pub asset_id: Uuid,
    pub wearable_type: WearableType,
}

/// Inventory item an attached object was rezzed from
pub fn attachment_item_id(prim: &Primitive) -> Option<Uuid> {
    prim.name_values
        .iter()
        .find(|nv| nv.name == ATTACH_ITEM_ID)
        .and_then(|nv| Uuid::parse_str(nv.value.trim()).ok())
        .filter(|id| !id.is_nil())
}

/// Check if an item is among the given root attachments
pub fn is_attached(attachments: &[Primitive], item: &InventoryItem) -> bool {
    attachments
        .iter()
        .any(|prim| attachment_item_id(prim) == Some(item.id))
}

/// Check if a wearable item is currently worn
pub fn is_worn(currently_worn: &[WearableData], item: &InventoryItem) -> bool {
    currently_worn.iter().any(|worn| worn.item_id == item.id)
}
