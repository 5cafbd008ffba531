// ./infrastructure/src/persistence/in_memory_store.rs
use application::{BatchWrite, DocumentStore, StoreError, StoredDocument, WriteBatch};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::Fields;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Document store kept in process memory.
///
/// Collections are created on first write. `list` returns documents ordered
/// by id, the order a hosted document database hands them back in.
#[derive(Debug, Clone)]
pub struct InMemoryDocumentStore {
    // Collection Name -> (Document ID -> Fields)
    store: Arc<DashMap<String, DashMap<String, Arc<Fields>>>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Takes the store offline (or back online). While offline every call
    /// fails with `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of documents currently held in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.store.get(collection).map_or(0, |docs| docs.len())
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            warn!("In-memory store is offline");
            Err(StoreError::Unavailable(
                "in-memory store is offline".to_string(),
            ))
        }
    }

    fn write(&self, collection: &str, id: String, fields: Fields) {
        self.store
            .entry(collection.to_string())
            .or_insert_with(DashMap::new) // Create if doesn't exist
            .insert(id, Arc::new(fields));
    }

    fn new_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    #[instrument(skip(self))]
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        self.ensure_available()?;
        debug!("Listing documents from in-memory store");
        let mut documents: Vec<StoredDocument> = match self.store.get(collection) {
            Some(docs) => docs
                .iter()
                .map(|entry| StoredDocument {
                    id: entry.key().clone(),
                    fields: (**entry.value()).clone(),
                })
                .collect(),
            None => Vec::new(), // Collection doesn't exist
        };
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documents)
    }

    #[instrument(skip(self))]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        self.ensure_available()?;
        debug!("Getting document from in-memory store");
        let document = self.store.get(collection).and_then(|docs| {
            docs.get(id).map(|doc_ref| StoredDocument {
                id: id.to_string(),
                fields: (**doc_ref).clone(),
            })
        });
        Ok(document)
    }

    #[instrument(skip(self, data))]
    async fn add(&self, collection: &str, data: Fields) -> Result<String, StoreError> {
        self.ensure_available()?;
        let id = Self::new_id();
        debug!(doc_id = %id, "Adding document to in-memory store");
        self.write(collection, id.clone(), data);
        Ok(id)
    }

    /// Merges into the existing document, or creates it when missing.
    #[instrument(skip(self, data))]
    async fn update(&self, collection: &str, id: &str, data: Fields) -> Result<(), StoreError> {
        self.ensure_available()?;
        debug!("Updating document in in-memory store");
        let docs = self
            .store
            .entry(collection.to_string())
            .or_insert_with(DashMap::new);
        let mut doc = docs
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Fields::new()));
        let merged = Arc::make_mut(doc.value_mut());
        for (name, value) in data {
            merged.insert(name, value);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        debug!("Deleting document from in-memory store");
        let removed = self
            .store
            .get(collection)
            .is_some_and(|docs| docs.remove(id).is_some());
        if !removed {
            debug!("Document was not present");
        }
        Ok(())
    }

    #[instrument(skip(self, data))]
    async fn set(&self, collection: &str, id: &str, data: Fields) -> Result<(), StoreError> {
        self.ensure_available()?;
        debug!("Setting document in in-memory store");
        self.write(collection, id.to_string(), data);
        Ok(())
    }

    /// Applies the whole batch or, when offline, none of it.
    #[instrument(skip(self, batch), fields(writes = batch.len()))]
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.ensure_available()?;
        debug!("Committing batch directly to in-memory store");
        for write in batch {
            match write {
                BatchWrite::Add { collection, fields } => {
                    self.write(&collection, Self::new_id(), fields);
                }
                BatchWrite::Set {
                    collection,
                    id,
                    fields,
                } => {
                    self.write(&collection, id, fields);
                }
            }
        }
        Ok(())
    }
}
