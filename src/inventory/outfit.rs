//! Current outfit folder reconciliation
//!
//! The outfit folder is a system folder of links, one per worn wearable or
//! attachment. The reconciler locates (or creates) the folder, fetches the
//! real items behind its links, re-attaches anything the folder lists that
//! is not attached after login, and keeps the links in step with outfit
//! changes made through it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OutfitSettings;
use super::service::{AppearanceService, DetachPolicy, InventoryService};
use super::types::{
    attachment_item_id, is_attached, AttachmentPoint, FolderType, InventoryFolder, InventoryItem,
    InventoryNode, ItemKind, Primitive, WearableType,
};
use super::{OutfitError, OutfitEvent, OutfitResult};

#[derive(Debug, Default)]
struct OutfitState {
    folder: Option<InventoryFolder>,
    /// Real items behind the folder's links, by item id
    content: HashMap<Uuid, InventoryItem>,
    folder_initialized: bool,
    appearance_sent: bool,
    folder_ready: bool,
    initial_update_done: bool,
}

pub struct OutfitReconciler {
    inventory: Arc<dyn InventoryService>,
    appearance: Arc<dyn AppearanceService>,
    policy: Arc<dyn DetachPolicy>,
    settings: OutfitSettings,
    state: Mutex<OutfitState>,
    /// Serializes link creation from the duplicate check through `create_link`
    link_guard: tokio::sync::Mutex<()>,
}

impl OutfitReconciler {
    pub fn new(
        inventory: Arc<dyn InventoryService>,
        appearance: Arc<dyn AppearanceService>,
        policy: Arc<dyn DetachPolicy>,
        settings: &OutfitSettings,
    ) -> Self {
        Self {
            inventory,
            appearance,
            policy,
            settings: settings.clone(),
            state: Mutex::new(OutfitState::default()),
            link_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn folder(&self) -> Option<InventoryFolder> {
        self.state.lock().folder.clone()
    }

    fn folder_id(&self) -> Option<Uuid> {
        self.state.lock().folder.as_ref().map(|f| f.id)
    }

    /// Every link has its real item fetched
    pub fn is_ready(&self) -> bool {
        self.state.lock().folder_ready
    }

    pub fn initial_update_done(&self) -> bool {
        self.state.lock().initial_update_done
    }

    /// Fetched real items behind the folder's links
    pub fn content(&self) -> Vec<InventoryItem> {
        self.state.lock().content.values().cloned().collect()
    }

    /// Forget all session state, e.g. after logout or a client switch
    pub fn reset(&self) {
        debug!("📦 Resetting outfit folder state");
        *self.state.lock() = OutfitState::default();
    }

    // -------------------------------------------------------------------------
    // Event handling
    // -------------------------------------------------------------------------

    pub fn handle_event(&self, event: OutfitEvent) {
        match event {
            OutfitEvent::EventQueueRunning { current_region } => self.on_event_queue_running(current_region),
            OutfitEvent::FolderUpdated { folder_id, success } => self.on_folder_updated(folder_id, success),
            OutfitEvent::ItemReceived { item } => self.on_item_received(&item),
            OutfitEvent::AppearanceSet => self.on_appearance_set(),
            OutfitEvent::ObjectKilled { current_region, object } => {
                self.on_object_killed(current_region, object.as_ref())
            }
        }
    }

    /// Handle notifications from a broadcast channel until it closes or the
    /// reconciler is dropped
    pub fn spawn_event_feed(self: &Arc<Self>, mut events: broadcast::Receiver<OutfitEvent>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match weak.upgrade() {
                        Some(reconciler) => reconciler.handle_event(event),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("📦 Outfit event feed lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Locate the outfit folder once the current region's event queue is up
    pub fn on_event_queue_running(&self, current_region: bool) {
        if !current_region {
            return;
        }

        let first = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.folder_initialized, true)
        };
        if first {
            self.initialize();
        }
    }

    pub fn on_folder_updated(&self, folder_id: Uuid, success: bool) {
        if self.folder_id() != Some(folder_id) || !success {
            return;
        }

        let refreshed = self.inventory.folder(folder_id);
        {
            let mut state = self.state.lock();
            if let Some(folder) = refreshed {
                state.folder = Some(folder);
            }
            state.content.clear();
        }

        let owner = self.inventory.agent_id();
        let items: Vec<(Uuid, Uuid)> = self
            .content_links()
            .iter()
            .filter_map(InventoryItem::link_target)
            .map(|target| (target, owner))
            .collect();

        if !items.is_empty() {
            debug!("📦 Fetching {} items linked from the outfit folder", items.len());
            self.inventory.request_fetch_items(&items);
        }
    }

    pub fn on_item_received(&self, item: &InventoryItem) {
        let links = self.content_links();
        let linked = links.iter().any(|link| link.link_target() == Some(item.id));

        let run_initial_update = {
            let mut state = self.state.lock();
            if linked {
                state.content.insert(item.id, item.clone());
            }
            if state.content.len() != links.len() {
                return;
            }
            if !state.folder_ready {
                info!("📦 Outfit folder ready with {} items", links.len());
            }
            state.folder_ready = true;
            state.appearance_sent
        };

        if run_initial_update {
            self.initial_update();
        }
    }

    pub fn on_appearance_set(&self) {
        let ready = {
            let mut state = self.state.lock();
            state.appearance_sent = true;
            state.folder_ready
        };
        if ready {
            self.initial_update();
        }
    }

    /// A killed attachment drops its link
    pub fn on_object_killed(&self, current_region: bool, object: Option<&Primitive>) {
        if !current_region {
            return;
        }
        if let Some(item_id) = object.and_then(attachment_item_id) {
            debug!("📦 Attachment from item {} went away", item_id);
            self.remove_link(&[item_id]);
        }
    }

    // -------------------------------------------------------------------------
    // Folder setup
    // -------------------------------------------------------------------------

    /// Find the outfit folder among the root folders, creating it if missing
    pub fn initialize(&self) {
        let Some(root_id) = self.inventory.root_folder_id() else {
            warn!("📦 Inventory root unknown, outfit folder not initialized");
            return;
        };

        let existing = self
            .inventory
            .folder_contents(root_id)
            .into_iter()
            .find_map(|node| match node {
                InventoryNode::Folder(folder) if folder.preferred_type == FolderType::CurrentOutfit => Some(folder),
                _ => None,
            });

        match existing {
            Some(folder) => {
                info!("📦 Found outfit folder {}", folder.id);
                let folder_id = folder.id;
                self.state.lock().folder = Some(folder);
                self.inventory.request_folder_contents(folder_id);
            }
            None => self.create_folder(root_id),
        }
    }

    fn create_folder(&self, root_id: Uuid) {
        let created = self
            .inventory
            .create_folder(root_id, &self.settings.folder_name, FolderType::CurrentOutfit);

        let Some(folder) = created else {
            // No retry: outfit tracking stays off for this session
            warn!("📦 Could not create outfit folder, outfit links will not be tracked");
            return;
        };

        info!("📦 Created outfit folder {}", folder.id);
        let run_initial_update = {
            let mut state = self.state.lock();
            state.folder = Some(folder);
            state.folder_ready = true;
            state.appearance_sent
        };
        if run_initial_update {
            self.initial_update();
        }
    }

    /// Attach every linked object that is not attached yet. Runs once.
    fn initial_update(&self) {
        let items: Vec<InventoryItem> = {
            let mut state = self.state.lock();
            if state.initial_update_done {
                return;
            }
            state.initial_update_done = true;
            state.content.values().cloned().collect()
        };

        let attached = self.appearance.attached_objects();
        let mut count = 0;
        for item in items.iter().filter(|item| item.is_attachable()) {
            if !is_attached(&attached, item) {
                debug!("📦 Re-attaching {} ({})", item.name, item.id);
                self.appearance.attach(item, AttachmentPoint::Default, false);
                count += 1;
            }
        }
        info!("📦 Initial outfit update done, {} items re-attached", count);
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Links in the outfit folder that point at wearable or attachable items
    pub fn content_links(&self) -> Vec<InventoryItem> {
        let Some(folder_id) = self.folder_id() else {
            return Vec::new();
        };

        self.inventory
            .folder_contents(folder_id)
            .into_iter()
            .filter_map(|node| match node {
                InventoryNode::Item(item) if item.is_link() && item.can_be_worn() => Some(item),
                _ => None,
            })
            .collect()
    }

    /// Resolve a link to the item it points at, when that item is known
    pub fn real_inventory_item(&self, item: &InventoryItem) -> InventoryItem {
        item.link_target()
            .and_then(|target| self.inventory.item(target))
            .filter(|real| !real.is_link())
            .unwrap_or_else(|| item.clone())
    }

    pub fn is_body_part(&self, item: &InventoryItem) -> bool {
        self.real_inventory_item(item)
            .wearable_type()
            .is_some_and(|t| t.is_body_part())
    }

    /// Worn wearables of the given type
    pub fn get_worn_at(&self, wearable_type: WearableType) -> Vec<InventoryItem> {
        self.content_links()
            .iter()
            .map(|link| self.real_inventory_item(link))
            .filter(|item| item.wearable_type() == Some(wearable_type))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Links
    // -------------------------------------------------------------------------

    /// Link an item from the outfit folder
    ///
    /// Returns the created link, or `None` when the item is already linked.
    pub async fn add_link(&self, item: &InventoryItem) -> OutfitResult<Option<InventoryItem>> {
        let item = self.real_inventory_item(item);
        let description = match item.kind {
            ItemKind::Wearable(wearable_type) if !wearable_type.is_body_part() => {
                wearable_type.link_description(0)
            }
            _ => String::new(),
        };
        self.add_link_with_description(&item, &description).await
    }

    pub async fn add_link_with_description(
        &self,
        item: &InventoryItem,
        description: &str,
    ) -> OutfitResult<Option<InventoryItem>> {
        let folder_id = self.folder_id().ok_or(OutfitError::FolderUnavailable)?;
        let _guard = self.link_guard.lock().await;
        let links = self.content_links();

        if links.iter().any(|link| link.link_target() == Some(item.id)) {
            debug!("📦 {} is already linked", item.name);
            return Ok(None);
        }

        // Only one body part of each type may be linked
        if let Some(wearable_type) = item.wearable_type().filter(|t| t.is_body_part()) {
            let superseded: Vec<Uuid> = links
                .iter()
                .filter(|link| self.real_inventory_item(link).wearable_type() == Some(wearable_type))
                .map(|link| link.id)
                .collect();
            if !superseded.is_empty() {
                debug!("📦 Replacing {:?} link(s) for {}", wearable_type, item.name);
                self.inventory.remove_items(&superseded);
            }
        }

        let link = self
            .inventory
            .create_link(folder_id, item.id, &item.name, description, item.kind.inventory_type())
            .await?;
        debug!("📦 Linked {} as {}", item.name, link.id);

        self.inventory.request_fetch_items(&[(item.id, self.inventory.agent_id())]);
        Ok(Some(link))
    }

    /// Remove all links pointing at any of the given items
    pub fn remove_link(&self, item_ids: &[Uuid]) {
        if self.folder_id().is_none() {
            return;
        }

        let to_remove: Vec<Uuid> = self
            .content_links()
            .iter()
            .filter(|link| link.link_target().is_some_and(|target| item_ids.contains(&target)))
            .map(|link| link.id)
            .collect();

        if !to_remove.is_empty() {
            debug!("📦 Removing {} outfit links", to_remove.len());
            self.inventory.remove_items(&to_remove);
        }
    }

    async fn link_items(&self, items: &[InventoryItem]) {
        for item in items.iter().filter(|item| item.can_be_worn()) {
            if let Err(e) = self.add_link(item).await {
                warn!("📦 Could not link {}: {}", item.name, e);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Outfit changes
    // -------------------------------------------------------------------------

    pub async fn attach(&self, item: &InventoryItem, point: AttachmentPoint, replace: bool) -> OutfitResult<()> {
        self.appearance.attach(item, point, replace);
        self.add_link(item).await.map(|_| ())
    }

    /// Detach an item unless the restriction policy forbids it.
    /// Returns whether the detach was issued.
    pub fn detach(&self, item: &InventoryItem) -> bool {
        let real = self.real_inventory_item(item);
        if !self.policy.is_detach_allowed(&real) {
            debug!("📦 Detach of {} not allowed", real.name);
            return false;
        }

        self.appearance.detach(item);
        self.remove_link(&[real.id]);
        true
    }

    /// Replace the whole outfit
    ///
    /// Body part links survive unless the new outfit brings a body part of
    /// the same type.
    pub async fn replace_outfit(&self, new_outfit: &[InventoryItem]) {
        let outfit: Vec<InventoryItem> = new_outfit.iter().map(|item| self.real_inventory_item(item)).collect();
        let new_body_parts: HashSet<WearableType> = outfit
            .iter()
            .filter_map(InventoryItem::wearable_type)
            .filter(|t| t.is_body_part())
            .collect();

        let to_remove: Vec<Uuid> = self
            .content_links()
            .into_iter()
            .filter(|link| match self.real_inventory_item(link).wearable_type() {
                Some(t) if t.is_body_part() => new_body_parts.contains(&t),
                _ => true,
            })
            .map(|link| link.id)
            .collect();

        info!("📦 Replacing outfit: {} links out, {} items in", to_remove.len(), outfit.len());
        if !to_remove.is_empty() {
            self.inventory.remove_items(&to_remove);
        }

        self.link_items(&outfit).await;
        self.appearance.replace_outfit(&outfit, false);
        self.schedule_appearance_update();
    }

    /// Add items to the outfit. With `replace`, worn wearables of the same
    /// type are taken off first.
    pub async fn add_to_outfit(&self, items: &[InventoryItem], replace: bool) {
        let current = self.content_links();
        let mut to_remove = Vec::new();
        let mut outfit = Vec::with_capacity(items.len());

        for item in items {
            let real = self.real_inventory_item(item);
            if let (true, Some(wearable_type)) = (replace, real.wearable_type()) {
                for link in &current {
                    let same_item = link.link_target() == Some(real.id);
                    if same_item || self.real_inventory_item(link).wearable_type() == Some(wearable_type) {
                        to_remove.push(link.id);
                    }
                }
            }
            outfit.push(real);
        }

        to_remove.sort();
        to_remove.dedup();
        if !to_remove.is_empty() {
            self.inventory.remove_items(&to_remove);
        }

        self.link_items(&outfit).await;
        self.appearance.add_to_outfit(&outfit, replace);
        self.schedule_appearance_update();
    }

    /// Take items off. Body part links are kept since body parts can only be
    /// swapped, never removed.
    pub fn remove_from_outfit(&self, items: &[InventoryItem]) {
        let outfit: Vec<InventoryItem> = items
            .iter()
            .map(|item| self.real_inventory_item(item))
            .filter(|real| self.policy.is_detach_allowed(real))
            .collect();

        let unlink: Vec<Uuid> = outfit
            .iter()
            .filter(|item| item.can_be_worn() && !item.wearable_type().is_some_and(|t| t.is_body_part()))
            .map(|item| item.id)
            .collect();
        self.remove_link(&unlink);

        self.appearance.remove_from_outfit(&outfit);
    }

    /// Force the server to rebake our textures
    pub fn rebake_textures(&self) {
        self.appearance.request_set_appearance(true);
    }

    fn schedule_appearance_update(&self) {
        let appearance = self.appearance.clone();
        let delay = self.settings.appearance_settle_delay();
        tokio::spawn(async move {
            time::sleep(delay).await;
            appearance.request_set_appearance(true);
        });
    }
}
