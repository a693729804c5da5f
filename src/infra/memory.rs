//! In-memory entity graph with transactional writes.
//!
//! Rows are kept per type, ordered by id. Writes go through a
//! [`Transaction`]; listeners hear about a transaction only after all of its
//! writes are applied, and never about one that was rolled back or dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::application::commit::{ChangeKind, ChangeNotice, CommitListener};
use crate::application::graph::{EntityGraph, GraphError};
use crate::cache::lock::RecoverRwLock;
use crate::domain::entities::{Entity, EntityId, EntityType};
use crate::domain::schema::Schema;

const SOURCE: &str = "infra::memory";

type Rows = HashMap<EntityType, BTreeMap<EntityId, Entity>>;

pub struct MemoryGraph {
    schema: Schema,
    rows: RwLock<Rows>,
    listeners: RwLock<Vec<Arc<dyn CommitListener>>>,
}

impl MemoryGraph {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for committed changes.
    pub fn subscribe(&self, listener: Arc<dyn CommitListener>) {
        self.listeners
            .write_recover(SOURCE, "subscribe")
            .push(listener);
    }

    /// Write a row directly, bypassing transactions and listeners.
    pub fn insert_row(&self, entity: Entity) {
        self.rows
            .write_recover(SOURCE, "insert_row")
            .entry(entity.entity_type.clone())
            .or_default()
            .insert(entity.id.clone(), entity);
    }

    pub fn get(&self, entity_type: &EntityType, id: &EntityId) -> Option<Entity> {
        self.rows
            .read_recover(SOURCE, "get")
            .get(entity_type)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    /// Number of rows of `entity_type`.
    pub fn count(&self, entity_type: &EntityType) -> usize {
        self.rows
            .read_recover(SOURCE, "count")
            .get(entity_type)
            .map_or(0, BTreeMap::len)
    }

    pub fn begin(&self) -> Transaction<'_> {
        Transaction {
            graph: self,
            writes: Vec::new(),
            finished: false,
        }
    }

    /// Insert one entity in its own transaction.
    pub fn create(&self, entity: Entity) -> Result<Vec<ChangeNotice>, GraphError> {
        let mut tx = self.begin();
        tx.insert(entity);
        tx.commit()
    }

    /// Replace one existing entity in its own transaction.
    pub fn save(&self, entity: Entity) -> Result<Vec<ChangeNotice>, GraphError> {
        let mut tx = self.begin();
        tx.update(entity);
        tx.commit()
    }

    /// Delete one entity in its own transaction.
    pub fn destroy(
        &self,
        entity_type: impl Into<EntityType>,
        id: impl Into<EntityId>,
    ) -> Result<Vec<ChangeNotice>, GraphError> {
        let mut tx = self.begin();
        tx.destroy(entity_type, id);
        tx.commit()
    }

    fn apply(&self, writes: Vec<Write>) -> Result<Vec<ChangeNotice>, GraphError> {
        let mut rows = self.rows.write_recover(SOURCE, "commit");
        // Staged on a copy so a failing write leaves nothing applied.
        let mut staged = rows.clone();
        let mut notices = Notices::default();

        for write in writes {
            match write {
                Write::Insert(entity) => {
                    let table = staged.entry(entity.entity_type.clone()).or_default();
                    if table.contains_key(&entity.id) {
                        return Err(GraphError::from_persistence(format!(
                            "`{}` with id `{}` already exists",
                            entity.entity_type, entity.id
                        )));
                    }
                    notices.record(&entity.entity_type, &entity.id, ChangeKind::Created);
                    table.insert(entity.id.clone(), entity);
                }
                Write::Update(entity) => {
                    let Some(existing) = staged
                        .get_mut(&entity.entity_type)
                        .and_then(|table| table.get_mut(&entity.id))
                    else {
                        return Err(GraphError::not_found(&entity.entity_type, &entity.id));
                    };
                    notices.record(&entity.entity_type, &entity.id, ChangeKind::Updated);
                    *existing = entity;
                }
                Write::Destroy(entity_type, id) => {
                    let removed = staged
                        .get_mut(&entity_type)
                        .and_then(|table| table.remove(&id));
                    if removed.is_none() {
                        return Err(GraphError::not_found(&entity_type, &id));
                    }
                    notices.record(&entity_type, &id, ChangeKind::Destroyed);
                }
            }
        }

        *rows = staged;
        Ok(notices.into_vec())
    }

    fn notify(&self, notices: &[ChangeNotice]) {
        let listeners = self.listeners.read_recover(SOURCE, "notify").clone();
        for notice in notices {
            for listener in &listeners {
                listener.on_commit(notice);
            }
        }
    }
}

#[async_trait]
impl EntityGraph for MemoryGraph {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn fetch(
        &self,
        entity_type: &EntityType,
        id: &EntityId,
    ) -> Result<Option<Entity>, GraphError> {
        Ok(self.get(entity_type, id))
    }

    async fn find_by(
        &self,
        entity_type: &EntityType,
        attribute: &str,
        value: &EntityId,
    ) -> Result<Vec<Entity>, GraphError> {
        Ok(self
            .rows
            .read_recover(SOURCE, "find_by")
            .get(entity_type)
            .map(|rows| {
                rows.values()
                    .filter(|entity| entity.references(attribute, value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

enum Write {
    Insert(Entity),
    Update(Entity),
    Destroy(EntityType, EntityId),
}

/// Pending writes against a [`MemoryGraph`].
///
/// Dropping an unfinished transaction rolls it back.
pub struct Transaction<'a> {
    graph: &'a MemoryGraph,
    writes: Vec<Write>,
    finished: bool,
}

impl Transaction<'_> {
    pub fn insert(&mut self, entity: Entity) -> &mut Self {
        self.writes.push(Write::Insert(entity));
        self
    }

    pub fn update(&mut self, entity: Entity) -> &mut Self {
        self.writes.push(Write::Update(entity));
        self
    }

    pub fn destroy(
        &mut self,
        entity_type: impl Into<EntityType>,
        id: impl Into<EntityId>,
    ) -> &mut Self {
        self.writes
            .push(Write::Destroy(entity_type.into(), id.into()));
        self
    }

    /// Apply every write atomically, then notify listeners.
    ///
    /// Returns one notice per changed entity.
    pub fn commit(mut self) -> Result<Vec<ChangeNotice>, GraphError> {
        self.finished = true;
        let writes = std::mem::take(&mut self.writes);
        let write_count = writes.len();

        let notices = self.graph.apply(writes)?;
        debug!(
            writes = write_count,
            notices = notices.len(),
            "Transaction committed"
        );
        self.graph.notify(&notices);
        Ok(notices)
    }

    pub fn rollback(mut self) {
        self.finished = true;
        debug!(writes = self.writes.len(), "Transaction rolled back");
        self.writes.clear();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.writes.is_empty() {
            debug!(
                writes = self.writes.len(),
                "Transaction dropped without commit; rolled back"
            );
        }
    }
}

/// Per-entity notices in first-touch order, collapsed to the net change.
#[derive(Default)]
struct Notices {
    entries: Vec<Option<ChangeNotice>>,
    index: HashMap<(EntityType, EntityId), usize>,
}

impl Notices {
    fn record(&mut self, entity_type: &EntityType, id: &EntityId, kind: ChangeKind) {
        let slot_key = (entity_type.clone(), id.clone());
        let Some(&slot) = self.index.get(&slot_key) else {
            self.index.insert(slot_key, self.entries.len());
            self.entries
                .push(Some(ChangeNotice::new(entity_type.clone(), id.clone(), kind)));
            return;
        };

        let previous = self.entries[slot].as_ref().map(|notice| notice.kind);
        let net = match (previous, kind) {
            (Some(ChangeKind::Created), ChangeKind::Updated) => Some(ChangeKind::Created),
            (Some(ChangeKind::Created), ChangeKind::Destroyed) => None,
            (Some(ChangeKind::Destroyed), ChangeKind::Created) => Some(ChangeKind::Updated),
            (_, kind) => Some(kind),
        };
        self.entries[slot] = net.map(|kind| ChangeNotice::new(entity_type.clone(), id.clone(), kind));
    }

    fn into_vec(self) -> Vec<ChangeNotice> {
        self.entries.into_iter().flatten().collect()
    }
}
