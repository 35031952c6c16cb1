//! Per-`(entity_kind, entity_id)` serialization: command
//! application within one entity is strictly serial; different entities
//! proceed fully in parallel. A lazily-created `Mutex` per entity gives both.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::command::EntityKind;

#[derive(Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<(EntityKind, u32), Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, entity: (EntityKind, u32)) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(entity).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
