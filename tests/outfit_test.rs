use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time;
use uuid::Uuid;

use slv_avatar::config::OutfitSettings;
use slv_avatar::inventory::{
    AllowAllDetach, AppearanceService, AttachmentPoint, DetachPolicy, FolderType, InventoryFolder,
    InventoryItem, InventoryNode, InventoryService, InventoryType, ItemKind, OutfitError, OutfitEvent,
    OutfitReconciler, OutfitResult, Primitive, WearableType,
};

// =============================================================================
// Fakes
// =============================================================================

/// In-memory inventory that applies requests immediately
struct FakeInventory {
    agent_id: Uuid,
    root_id: Uuid,
    folders: Mutex<HashMap<Uuid, InventoryFolder>>,
    items: Mutex<HashMap<Uuid, InventoryItem>>,
    fetch_requests: Mutex<Vec<(Uuid, Uuid)>>,
    folder_requests: Mutex<Vec<Uuid>>,
    fail_links: Mutex<bool>,
    allow_create_folder: bool,
}

impl FakeInventory {
    fn new() -> Self {
        Self {
            agent_id: Uuid::new_v4(),
            root_id: Uuid::new_v4(),
            folders: Mutex::new(HashMap::new()),
            items: Mutex::new(HashMap::new()),
            fetch_requests: Mutex::new(Vec::new()),
            folder_requests: Mutex::new(Vec::new()),
            fail_links: Mutex::new(false),
            allow_create_folder: true,
        }
    }

    fn add_folder(&self, name: &str, folder_type: FolderType) -> InventoryFolder {
        let folder = InventoryFolder::new(Uuid::new_v4(), self.root_id, name, folder_type);
        self.folders.lock().insert(folder.id, folder.clone());
        folder
    }

    fn add_item(&self, name: &str, kind: ItemKind) -> InventoryItem {
        let mut item = InventoryItem::new(Uuid::new_v4(), name, kind);
        item.parent_id = self.root_id;
        item.owner_id = self.agent_id;
        self.items.lock().insert(item.id, item.clone());
        item
    }

    fn add_link(&self, folder_id: Uuid, target: &InventoryItem) -> InventoryItem {
        let mut link = InventoryItem::new(
            Uuid::new_v4(),
            target.name.clone(),
            ItemKind::Link { target: target.id, inventory_type: target.kind.inventory_type() },
        );
        link.parent_id = folder_id;
        link.owner_id = self.agent_id;
        self.items.lock().insert(link.id, link.clone());
        link
    }

    /// Targets of all links in a folder
    fn link_targets(&self, folder_id: Uuid) -> HashSet<Uuid> {
        self.items
            .lock()
            .values()
            .filter(|item| item.parent_id == folder_id)
            .filter_map(InventoryItem::link_target)
            .collect()
    }

    fn links_in(&self, folder_id: Uuid) -> Vec<InventoryItem> {
        self.items
            .lock()
            .values()
            .filter(|item| item.parent_id == folder_id && item.is_link())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InventoryService for FakeInventory {
    fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    fn root_folder_id(&self) -> Option<Uuid> {
        Some(self.root_id)
    }

    fn folder_contents(&self, folder_id: Uuid) -> Vec<InventoryNode> {
        let folders = self
            .folders
            .lock()
            .values()
            .filter(|f| f.parent_id == folder_id)
            .cloned()
            .map(InventoryNode::Folder)
            .collect::<Vec<_>>();
        let items = self
            .items
            .lock()
            .values()
            .filter(|i| i.parent_id == folder_id)
            .cloned()
            .map(InventoryNode::Item)
            .collect::<Vec<_>>();
        folders.into_iter().chain(items).collect()
    }

    fn folder(&self, folder_id: Uuid) -> Option<InventoryFolder> {
        self.folders.lock().get(&folder_id).cloned()
    }

    fn item(&self, item_id: Uuid) -> Option<InventoryItem> {
        self.items.lock().get(&item_id).cloned()
    }

    fn create_folder(&self, parent_id: Uuid, name: &str, folder_type: FolderType) -> Option<InventoryFolder> {
        if !self.allow_create_folder {
            return None;
        }
        let folder = InventoryFolder::new(Uuid::new_v4(), parent_id, name, folder_type);
        self.folders.lock().insert(folder.id, folder.clone());
        Some(folder)
    }

    fn request_folder_contents(&self, folder_id: Uuid) {
        self.folder_requests.lock().push(folder_id);
    }

    fn request_fetch_items(&self, items: &[(Uuid, Uuid)]) {
        self.fetch_requests.lock().extend_from_slice(items);
    }

    fn remove_items(&self, item_ids: &[Uuid]) {
        let mut items = self.items.lock();
        for id in item_ids {
            items.remove(id);
        }
    }

    async fn create_link(
        &self,
        folder_id: Uuid,
        target_id: Uuid,
        name: &str,
        description: &str,
        inventory_type: InventoryType,
    ) -> OutfitResult<InventoryItem> {
        // The server round trip lets other tasks run before the link exists
        tokio::task::yield_now().await;
        if *self.fail_links.lock() {
            return Err(OutfitError::LinkCreation {
                item_id: target_id,
                reason: "inventory server unavailable".to_string(),
            });
        }

        let mut link = InventoryItem::new(Uuid::new_v4(), name, ItemKind::Link { target: target_id, inventory_type });
        link.parent_id = folder_id;
        link.owner_id = self.agent_id;
        link.description = description.to_string();
        self.items.lock().insert(link.id, link.clone());
        Ok(link)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AppearanceCall {
    Attach(Uuid),
    Detach(Uuid),
    Replace(Vec<Uuid>),
    Add(Vec<Uuid>, bool),
    Remove(Vec<Uuid>),
    SetAppearance(bool),
}

#[derive(Default)]
struct FakeAppearance {
    attached: Mutex<Vec<Primitive>>,
    calls: Mutex<Vec<AppearanceCall>>,
}

impl FakeAppearance {
    fn calls(&self) -> Vec<AppearanceCall> {
        self.calls.lock().clone()
    }

    fn attach_calls(&self) -> Vec<Uuid> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AppearanceCall::Attach(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

fn ids(items: &[InventoryItem]) -> Vec<Uuid> {
    items.iter().map(|i| i.id).collect()
}

impl AppearanceService for FakeAppearance {
    fn attach(&self, item: &InventoryItem, _point: AttachmentPoint, _replace: bool) {
        self.calls.lock().push(AppearanceCall::Attach(item.id));
    }

    fn detach(&self, item: &InventoryItem) {
        self.calls.lock().push(AppearanceCall::Detach(item.id));
    }

    fn replace_outfit(&self, items: &[InventoryItem], _safe: bool) {
        self.calls.lock().push(AppearanceCall::Replace(ids(items)));
    }

    fn add_to_outfit(&self, items: &[InventoryItem], replace: bool) {
        self.calls.lock().push(AppearanceCall::Add(ids(items), replace));
    }

    fn remove_from_outfit(&self, items: &[InventoryItem]) {
        self.calls.lock().push(AppearanceCall::Remove(ids(items)));
    }

    fn request_set_appearance(&self, force_rebake: bool) {
        self.calls.lock().push(AppearanceCall::SetAppearance(force_rebake));
    }

    fn attached_objects(&self) -> Vec<Primitive> {
        self.attached.lock().clone()
    }
}

/// Forbids detaching a fixed set of items
struct LockedItems(HashSet<Uuid>);

impl DetachPolicy for LockedItems {
    fn is_detach_allowed(&self, item: &InventoryItem) -> bool {
        !self.0.contains(&item.id)
    }
}

struct Fixture {
    inventory: Arc<FakeInventory>,
    appearance: Arc<FakeAppearance>,
    outfit_folder: InventoryFolder,
    reconciler: OutfitReconciler,
}

fn fixture_with(inventory: FakeInventory, policy: Arc<dyn DetachPolicy>) -> Fixture {
    let inventory = Arc::new(inventory);
    let outfit_folder = inventory.add_folder("Current Outfit", FolderType::CurrentOutfit);
    let appearance = Arc::new(FakeAppearance::default());
    let reconciler = OutfitReconciler::new(
        inventory.clone(),
        appearance.clone(),
        policy,
        &OutfitSettings::default(),
    );
    reconciler.on_event_queue_running(true);

    Fixture { inventory, appearance, outfit_folder, reconciler }
}

fn fixture() -> Fixture {
    fixture_with(FakeInventory::new(), Arc::new(AllowAllDetach))
}

fn shirt(inventory: &FakeInventory) -> InventoryItem {
    inventory.add_item("Shirt", ItemKind::Wearable(WearableType::Shirt))
}

fn hat(inventory: &FakeInventory) -> InventoryItem {
    inventory.add_item("Hat", ItemKind::Object)
}

fn skin(inventory: &FakeInventory, name: &str) -> InventoryItem {
    inventory.add_item(name, ItemKind::Wearable(WearableType::Skin))
}

// =============================================================================
// Folder setup and readiness
// =============================================================================

#[tokio::test]
async fn test_existing_folder_is_found_once() {
    let inventory = FakeInventory::new();
    inventory.add_folder("Clothing", FolderType::Clothing);
    let f = fixture_with(inventory, Arc::new(AllowAllDetach));

    assert_eq!(f.reconciler.folder(), Some(f.outfit_folder.clone()));
    assert_eq!(*f.inventory.folder_requests.lock(), vec![f.outfit_folder.id]);

    f.reconciler.on_event_queue_running(true);
    assert_eq!(f.inventory.folder_requests.lock().len(), 1);
}

#[tokio::test]
async fn test_other_region_event_queue_is_ignored() {
    let inventory = Arc::new(FakeInventory::new());
    inventory.add_folder("Current Outfit", FolderType::CurrentOutfit);
    let reconciler = OutfitReconciler::new(
        inventory.clone(),
        Arc::new(FakeAppearance::default()),
        Arc::new(AllowAllDetach),
        &OutfitSettings::default(),
    );

    reconciler.on_event_queue_running(false);
    assert!(reconciler.folder().is_none());
    assert!(inventory.folder_requests.lock().is_empty());
}

#[tokio::test]
async fn test_missing_folder_is_created() {
    let inventory = Arc::new(FakeInventory::new());
    let reconciler = OutfitReconciler::new(
        inventory.clone(),
        Arc::new(FakeAppearance::default()),
        Arc::new(AllowAllDetach),
        &OutfitSettings::default(),
    );
    reconciler.on_event_queue_running(true);

    let folder = reconciler.folder().expect("outfit folder should be created");
    assert_eq!(folder.name, "Current Outfit");
    assert_eq!(folder.preferred_type, FolderType::CurrentOutfit);
    assert_eq!(folder.parent_id, inventory.root_id);
    assert!(reconciler.is_ready());
}

#[tokio::test]
async fn test_failed_folder_creation_leaves_tracking_off() {
    let mut inventory = FakeInventory::new();
    inventory.allow_create_folder = false;
    let inventory = Arc::new(inventory);
    let target = inventory.add_item("Hat", ItemKind::Object);
    let reconciler = OutfitReconciler::new(
        inventory.clone(),
        Arc::new(FakeAppearance::default()),
        Arc::new(AllowAllDetach),
        &OutfitSettings::default(),
    );
    reconciler.on_event_queue_running(true);

    assert!(reconciler.folder().is_none());
    assert!(!reconciler.is_ready());
    assert!(reconciler.content_links().is_empty());
    assert_eq!(reconciler.add_link(&target).await, Err(OutfitError::FolderUnavailable));
}

#[tokio::test]
async fn test_initial_update_reattaches_missing_objects_once() {
    let f = fixture();
    let shirt = shirt(&f.inventory);
    let hat = hat(&f.inventory);
    let ring = f.inventory.add_item("Ring", ItemKind::Attachment);
    let unrelated = f.inventory.add_item("Notecard", ItemKind::Other(InventoryType::Notecard));
    for item in [&shirt, &hat, &ring] {
        f.inventory.add_link(f.outfit_folder.id, item);
    }
    f.appearance.attached.lock().push(Primitive::attachment(10, 1, ring.id));

    f.reconciler.on_folder_updated(f.outfit_folder.id, true);
    let fetched: HashSet<(Uuid, Uuid)> = f.inventory.fetch_requests.lock().iter().copied().collect();
    let expected: HashSet<(Uuid, Uuid)> =
        [shirt.id, hat.id, ring.id].into_iter().map(|id| (id, f.inventory.agent_id)).collect();
    assert_eq!(fetched, expected);

    f.reconciler.on_item_received(&unrelated);
    f.reconciler.on_item_received(&shirt);
    f.reconciler.on_item_received(&hat);
    assert!(!f.reconciler.is_ready());
    assert_eq!(f.reconciler.content().len(), 2);

    f.reconciler.on_item_received(&ring);
    assert!(f.reconciler.is_ready());
    // Appearance not sent yet
    assert!(f.appearance.attach_calls().is_empty());

    f.reconciler.on_appearance_set();
    assert_eq!(f.appearance.attach_calls(), vec![hat.id]);
    assert!(f.reconciler.initial_update_done());

    f.reconciler.on_appearance_set();
    f.reconciler.on_item_received(&hat);
    assert_eq!(f.appearance.attach_calls(), vec![hat.id]);
}

#[tokio::test]
async fn test_appearance_before_folder_ready() {
    let f = fixture();
    let hat = hat(&f.inventory);
    f.inventory.add_link(f.outfit_folder.id, &hat);

    f.reconciler.on_appearance_set();
    f.reconciler.on_folder_updated(f.outfit_folder.id, true);
    assert!(f.appearance.attach_calls().is_empty());

    f.reconciler.on_item_received(&hat);
    assert_eq!(f.appearance.attach_calls(), vec![hat.id]);
}

#[tokio::test]
async fn test_folder_update_for_other_folder_is_ignored() {
    let f = fixture();
    let hat = hat(&f.inventory);
    f.inventory.add_link(f.outfit_folder.id, &hat);

    f.reconciler.on_folder_updated(Uuid::new_v4(), true);
    f.reconciler.on_folder_updated(f.outfit_folder.id, false);
    assert!(f.inventory.fetch_requests.lock().is_empty());
}

// =============================================================================
// Links
// =============================================================================

#[tokio::test]
async fn test_add_link_sets_layer_description_and_skips_duplicates() {
    let f = fixture();
    let shirt = shirt(&f.inventory);

    let link = f.reconciler.add_link(&shirt).await.unwrap().expect("link should be created");
    assert_eq!(link.description, "@400");
    assert_eq!(link.link_target(), Some(shirt.id));
    assert!(f.inventory.fetch_requests.lock().contains(&(shirt.id, f.inventory.agent_id)));

    assert_eq!(f.reconciler.add_link(&shirt).await, Ok(None));
    assert_eq!(f.inventory.links_in(f.outfit_folder.id).len(), 1);

    let hat = hat(&f.inventory);
    let hat_link = f.reconciler.add_link(&hat).await.unwrap().unwrap();
    assert_eq!(hat_link.description, "");
}

#[tokio::test]
async fn test_one_body_part_link_per_type() {
    let f = fixture();
    let old_skin = skin(&f.inventory, "Old Skin");
    let new_skin = skin(&f.inventory, "New Skin");
    let shirt = shirt(&f.inventory);
    f.inventory.add_link(f.outfit_folder.id, &old_skin);
    f.inventory.add_link(f.outfit_folder.id, &shirt);

    let link = f.reconciler.add_link(&new_skin).await.unwrap().unwrap();
    assert_eq!(link.description, "");

    let targets = f.inventory.link_targets(f.outfit_folder.id);
    assert_eq!(targets, HashSet::from([new_skin.id, shirt.id]));
    assert_eq!(ids(&f.reconciler.get_worn_at(WearableType::Skin)), vec![new_skin.id]);
    assert!(f.reconciler.is_body_part(&link));
    assert!(!f.reconciler.is_body_part(&shirt));
}

#[tokio::test]
async fn test_concurrent_links_keep_one_per_body_part() {
    let f = fixture();
    let skin_a = skin(&f.inventory, "Skin A");
    let skin_b = skin(&f.inventory, "Skin B");

    let (a, b) = tokio::join!(f.reconciler.add_link(&skin_a), f.reconciler.add_link(&skin_b));
    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_some());

    let worn = ids(&f.reconciler.get_worn_at(WearableType::Skin));
    assert_eq!(worn.len(), 1);
    assert!(worn[0] == skin_a.id || worn[0] == skin_b.id);
    assert_eq!(f.inventory.links_in(f.outfit_folder.id).len(), 1);
}

#[tokio::test]
async fn test_concurrent_links_to_same_item_create_one() {
    let f = fixture();
    let hat = hat(&f.inventory);

    let (a, b) = tokio::join!(f.reconciler.add_link(&hat), f.reconciler.add_link(&hat));
    let created = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
    assert_eq!(created, 1);
    assert_eq!(f.inventory.link_targets(f.outfit_folder.id), HashSet::from([hat.id]));
    assert_eq!(f.inventory.links_in(f.outfit_folder.id).len(), 1);
}

#[tokio::test]
async fn test_linking_through_a_link_targets_the_real_item() {
    let f = fixture();
    let hat = hat(&f.inventory);
    let elsewhere = f.inventory.add_link(f.inventory.root_id, &hat);

    let link = f.reconciler.add_link(&elsewhere).await.unwrap().unwrap();
    assert_eq!(link.link_target(), Some(hat.id));
    assert_eq!(f.reconciler.real_inventory_item(&elsewhere), hat);
}

#[tokio::test]
async fn test_remove_link_removes_every_link_to_item() {
    let f = fixture();
    let hat = hat(&f.inventory);
    let shirt = shirt(&f.inventory);
    f.inventory.add_link(f.outfit_folder.id, &hat);
    f.inventory.add_link(f.outfit_folder.id, &hat);
    f.inventory.add_link(f.outfit_folder.id, &shirt);

    f.reconciler.remove_link(&[hat.id]);
    assert_eq!(f.inventory.link_targets(f.outfit_folder.id), HashSet::from([shirt.id]));
}

#[tokio::test]
async fn test_killed_attachment_drops_link() {
    let f = fixture();
    let hat = hat(&f.inventory);
    f.inventory.add_link(f.outfit_folder.id, &hat);
    let prim = Primitive::attachment(22, 1, hat.id);

    f.reconciler.on_object_killed(false, Some(&prim));
    f.reconciler.on_object_killed(true, None);
    assert_eq!(f.inventory.links_in(f.outfit_folder.id).len(), 1);

    f.reconciler.on_object_killed(true, Some(&prim));
    assert!(f.inventory.links_in(f.outfit_folder.id).is_empty());
}

// =============================================================================
// Outfit changes
// =============================================================================

#[tokio::test]
async fn test_attach_links_item() {
    let f = fixture();
    let hat = hat(&f.inventory);

    f.reconciler.attach(&hat, AttachmentPoint::Skull, true).await.unwrap();
    assert_eq!(f.appearance.calls(), vec![AppearanceCall::Attach(hat.id)]);
    assert_eq!(f.inventory.link_targets(f.outfit_folder.id), HashSet::from([hat.id]));
}

#[tokio::test]
async fn test_attach_reports_link_failure() {
    let f = fixture();
    let hat = hat(&f.inventory);
    *f.inventory.fail_links.lock() = true;

    let result = f.reconciler.attach(&hat, AttachmentPoint::Default, false).await;
    assert!(matches!(result, Err(OutfitError::LinkCreation { item_id, .. }) if item_id == hat.id));
    assert_eq!(f.appearance.attach_calls(), vec![hat.id]);
}

#[tokio::test]
async fn test_detach_respects_policy() {
    let inventory = FakeInventory::new();
    let locked = inventory.add_item("Collar", ItemKind::Attachment);
    let f = fixture_with(inventory, Arc::new(LockedItems(HashSet::from([locked.id]))));
    let hat = hat(&f.inventory);
    f.inventory.add_link(f.outfit_folder.id, &locked);
    f.inventory.add_link(f.outfit_folder.id, &hat);

    assert!(!f.reconciler.detach(&locked));
    assert!(f.reconciler.detach(&hat));

    assert_eq!(f.appearance.calls(), vec![AppearanceCall::Detach(hat.id)]);
    assert_eq!(f.inventory.link_targets(f.outfit_folder.id), HashSet::from([locked.id]));
}

#[tokio::test(start_paused = true)]
async fn test_replace_outfit_keeps_unreplaced_body_parts() {
    let f = fixture();
    let skin = skin(&f.inventory, "Skin");
    let shape = f.inventory.add_item("Shape", ItemKind::Wearable(WearableType::Shape));
    let new_shape = f.inventory.add_item("Tall Shape", ItemKind::Wearable(WearableType::Shape));
    let shirt = shirt(&f.inventory);
    let hat = hat(&f.inventory);
    let pants = f.inventory.add_item("Pants", ItemKind::Wearable(WearableType::Pants));
    for item in [&skin, &shape, &shirt, &hat] {
        f.inventory.add_link(f.outfit_folder.id, item);
    }

    let outfit = vec![new_shape.clone(), pants.clone()];
    f.reconciler.replace_outfit(&outfit).await;

    assert_eq!(
        f.inventory.link_targets(f.outfit_folder.id),
        HashSet::from([skin.id, new_shape.id, pants.id])
    );
    assert_eq!(f.appearance.calls(), vec![AppearanceCall::Replace(ids(&outfit))]);

    time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(
        f.appearance.calls().last(),
        Some(&AppearanceCall::SetAppearance(true))
    );

    // Replacing with what is already worn changes nothing
    let before = f.inventory.link_targets(f.outfit_folder.id);
    f.reconciler.replace_outfit(&outfit).await;
    assert_eq!(f.inventory.link_targets(f.outfit_folder.id), before);
}

#[tokio::test(start_paused = true)]
async fn test_add_to_outfit_replaces_same_layer() {
    let f = fixture();
    let old_shirt = shirt(&f.inventory);
    let new_shirt = f.inventory.add_item("Blouse", ItemKind::Wearable(WearableType::Shirt));
    let hat = hat(&f.inventory);
    f.inventory.add_link(f.outfit_folder.id, &old_shirt);
    f.inventory.add_link(f.outfit_folder.id, &hat);

    f.reconciler.add_to_outfit(&[new_shirt.clone()], true).await;
    assert_eq!(
        f.inventory.link_targets(f.outfit_folder.id),
        HashSet::from([new_shirt.id, hat.id])
    );
    assert_eq!(f.appearance.calls(), vec![AppearanceCall::Add(vec![new_shirt.id], true)]);

    f.reconciler.add_to_outfit(&[old_shirt.clone()], false).await;
    assert_eq!(
        f.inventory.link_targets(f.outfit_folder.id),
        HashSet::from([old_shirt.id, new_shirt.id, hat.id])
    );

    time::sleep(Duration::from_secs(3)).await;
    let rebakes = f
        .appearance
        .calls()
        .into_iter()
        .filter(|c| *c == AppearanceCall::SetAppearance(true))
        .count();
    assert_eq!(rebakes, 2);
}

#[tokio::test]
async fn test_remove_from_outfit_keeps_body_part_links() {
    let inventory = FakeInventory::new();
    let locked = inventory.add_item("Locked Jacket", ItemKind::Wearable(WearableType::Jacket));
    let f = fixture_with(inventory, Arc::new(LockedItems(HashSet::from([locked.id]))));
    let skin = skin(&f.inventory, "Skin");
    let shirt = shirt(&f.inventory);
    for item in [&locked, &skin, &shirt] {
        f.inventory.add_link(f.outfit_folder.id, item);
    }

    f.reconciler.remove_from_outfit(&[locked.clone(), skin.clone(), shirt.clone()]);

    assert_eq!(
        f.inventory.link_targets(f.outfit_folder.id),
        HashSet::from([locked.id, skin.id])
    );
    assert_eq!(
        f.appearance.calls(),
        vec![AppearanceCall::Remove(vec![skin.id, shirt.id])]
    );
}

#[tokio::test]
async fn test_rebake_and_reset() {
    let f = fixture();
    f.reconciler.rebake_textures();
    assert_eq!(f.appearance.calls(), vec![AppearanceCall::SetAppearance(true)]);

    f.reconciler.reset();
    assert!(f.reconciler.folder().is_none());
    assert!(!f.reconciler.is_ready());

    // A new session locates the folder again
    f.reconciler.on_event_queue_running(true);
    assert_eq!(f.reconciler.folder(), Some(f.outfit_folder.clone()));
}

#[tokio::test]
async fn test_event_feed_dispatches_notifications() {
    let f = fixture();
    let hat = hat(&f.inventory);
    f.inventory.add_link(f.outfit_folder.id, &hat);
    let reconciler = Arc::new(f.reconciler);

    let (tx, rx) = broadcast::channel(16);
    let feed = reconciler.spawn_event_feed(rx);

    tx.send(OutfitEvent::FolderUpdated { folder_id: f.outfit_folder.id, success: true }).unwrap();
    tx.send(OutfitEvent::ItemReceived { item: hat.clone() }).unwrap();
    tx.send(OutfitEvent::AppearanceSet).unwrap();
    drop(tx);
    feed.await.unwrap();

    assert!(reconciler.is_ready());
    assert_eq!(f.appearance.attach_calls(), vec![hat.id]);
}
