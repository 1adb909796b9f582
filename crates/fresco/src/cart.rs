//! The cart store: a tab-wide mapping of product id to held quantity.
//!
//! Every mutation is synchronously persisted through the storage backend and
//! synchronously broadcast as a full-state snapshot on the bus. There is no
//! coordination between writers: mutations are snapshot read-modify-write,
//! last writer wins. Storage failures are logged and swallowed; they never
//! propagate to the mutating component.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::bus::{Decoded, EventBus, Subscription};
use crate::products::{Product, ProductId};
use crate::storage::StorageBackend;

/// Fixed storage key the snapshot is JSON-encoded under. Changing it orphans
/// every persisted cart.
pub static CART_STORAGE_KEY: &str = "cart";

/// Bus topic each mutation broadcasts the new snapshot under.
pub static CART_UPDATED_TOPIC: &str = "cartUpdated";

/// One cart line: the product's display attributes plus the held quantity.
///
/// Serialized with the product fields flattened, so the wire form is
/// `{ ...product, "quantity": n }` under the product-id key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartEntry {
    #[serde(flatten)]
    pub product: Product,
    pub quantity: u64,
}

impl CartEntry {
    /// Line total: price × quantity.
    pub fn subtotal(&self) -> f64 {
        self.product.price * self.quantity as f64
    }
}

/// Full cart state. Quantities are always ≥ 1: reaching 0 deletes the entry.
pub type CartSnapshot = BTreeMap<ProductId, CartEntry>;

/// Typed stream of snapshots, one per mutation (lagging observers skip
/// intermediate states, see [`EventBus::stream_with_capacity`]).
pub type CartUpdates = Decoded<CartSnapshot>;

/// The tab-wide cart.
///
/// Cheap to clone: clones share the backend and the bus, so every mounted
/// component holds its own handle to the same state.
#[derive(Clone)]
pub struct CartStore {
    backend: Rc<dyn StorageBackend>,
    bus: EventBus,
}

impl CartStore {
    pub fn new(backend: Rc<dyn StorageBackend>, bus: EventBus) -> Self {
        Self { backend, bus }
    }

    /// Current state, parsed from storage. Absent or corrupt payloads read
    /// as an empty cart, never as an error.
    pub fn get(&self) -> CartSnapshot {
        let Some(raw) = self.backend.load(CART_STORAGE_KEY) else {
            return CartSnapshot::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    /// Add one unit: increment an existing entry or insert with quantity 1.
    pub fn add(&self, product: &Product) {
        let mut snapshot = self.get();
        snapshot
            .entry(product.id)
            .and_modify(|entry| entry.quantity += 1)
            .or_insert_with(|| CartEntry {
                product: product.clone(),
                quantity: 1,
            });
        self.persist_and_broadcast(&snapshot);
    }

    /// Remove one unit: decrement, deleting the entry when it reaches 0.
    /// An absent id is a no-op and broadcasts nothing.
    pub fn remove(&self, id: ProductId) {
        let mut snapshot = self.get();
        let Some(entry) = snapshot.get_mut(&id) else {
            return;
        };
        entry.quantity = entry.quantity.saturating_sub(1);
        if entry.quantity == 0 {
            snapshot.remove(&id);
        }
        self.persist_and_broadcast(&snapshot);
    }

    /// Set an entry's quantity exactly; 0 deletes the entry. An id not in
    /// the cart is a no-op (an entry cannot be created without its product).
    pub fn set_quantity(&self, id: ProductId, quantity: u64) {
        let mut snapshot = self.get();
        let changed = if quantity == 0 {
            snapshot.remove(&id).is_some()
        } else if let Some(entry) = snapshot.get_mut(&id) {
            entry.quantity = quantity;
            true
        } else {
            false
        };
        if changed {
            self.persist_and_broadcast(&snapshot);
        }
    }

    /// Empty the cart.
    pub fn clear(&self) {
        self.persist_and_broadcast(&CartSnapshot::new());
    }

    /// Sum of price × quantity over all entries.
    pub fn total(&self) -> f64 {
        self.get().values().map(CartEntry::subtotal).sum()
    }

    /// Sum of quantities over all entries.
    pub fn item_count(&self) -> u64 {
        self.get().values().map(|entry| entry.quantity).sum()
    }

    /// Synchronous observer: runs inside every mutating call, with the new
    /// snapshot. Dropping the returned subscription unregisters it.
    pub fn on_change(&self, mut callback: impl FnMut(&CartSnapshot) + 'static) -> Subscription {
        self.bus.subscribe(CART_UPDATED_TOPIC, move |payload| {
            if let Ok(snapshot) = serde_json::from_value::<CartSnapshot>(payload.clone()) {
                callback(&snapshot);
            }
        })
    }

    /// Stream observer: one snapshot per mutation, bounded buffer.
    pub fn updates(&self) -> CartUpdates {
        Decoded::new(self.bus.stream(CART_UPDATED_TOPIC))
    }

    /// The bus mutations broadcast on, for wiring cross-tab bridges.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn persist_and_broadcast(&self, snapshot: &CartSnapshot) {
        let payload = match serde_json::to_value(snapshot) {
            Ok(payload) => payload,
            Err(error) => {
                eprintln!("Failed to encode the cart: {error}");
                return;
            }
        };
        if let Err(error) = self.backend.save(CART_STORAGE_KEY, &payload.to_string()) {
            eprintln!("Failed to persist the cart: {error}");
        }
        // Broadcast regardless: observers track the in-memory state.
        self.bus.publish(CART_UPDATED_TOPIC, &payload);
    }
}
