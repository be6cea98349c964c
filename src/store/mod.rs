// ============================================
// Persistence-Layer Accessors
// ============================================
//
// The engine does not own item, user or interaction storage. It consumes
// that data through the two traits below, which the request layer implements
// against its database. `MemoryStore` is the reference implementation used
// by tests and local tooling.

use crate::error::Result;
use crate::models::{Interaction, Item};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Read-only item metadata lookups.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_item(&self, item_id: &str) -> Result<Option<Item>>;

    /// Batch lookup; missing ids are silently skipped.
    async fn get_items(&self, item_ids: &[String]) -> Result<Vec<Item>>;
}

/// User interaction history reads and the append-only write path.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Item ids the user has already interacted with, most recent last.
    /// Used to build the exclude set.
    async fn user_history(&self, user_id: Uuid) -> Result<Vec<String>>;

    async fn append(&self, interaction: Interaction) -> Result<()>;
}

/// In-memory implementation of both accessor traits.
#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, Item>>,
    interactions: RwLock<Vec<Interaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        let store = Self::new();
        store.insert_items(items);
        store
    }

    pub fn insert_items(&self, items: impl IntoIterator<Item = Item>) {
        let mut guard = write_lock(&self.items);
        for item in items {
            guard.insert(item.id.clone(), item);
        }
    }

    pub fn interaction_count(&self) -> usize {
        read_lock(&self.interactions).len()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_item(&self, item_id: &str) -> Result<Option<Item>> {
        Ok(read_lock(&self.items).get(item_id).cloned())
    }

    async fn get_items(&self, item_ids: &[String]) -> Result<Vec<Item>> {
        let guard = read_lock(&self.items);
        Ok(item_ids
            .iter()
            .filter_map(|id| guard.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn user_history(&self, user_id: Uuid) -> Result<Vec<String>> {
        let guard = read_lock(&self.interactions);
        let mut seen = HashMap::new();
        let mut history = Vec::new();
        for interaction in guard.iter().filter(|i| i.user_id == user_id) {
            if seen.insert(interaction.item_id.clone(), ()).is_none() {
                history.push(interaction.item_id.clone());
            }
        }
        Ok(history)
    }

    async fn append(&self, interaction: Interaction) -> Result<()> {
        write_lock(&self.interactions).push(interaction);
        Ok(())
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
