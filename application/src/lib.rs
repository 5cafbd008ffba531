// ./application/src/lib.rs
use async_trait::async_trait;
use domain::{
    AdjacentPosts, CategoryList, DomainError, Fields, NewPost, Post, PostId, Snapshot,
    adjacent_posts,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

// --- Store layout ---
pub const POSTS_COLLECTION: &str = "posts";
pub const CATEGORIES_COLLECTION: &str = "categories";
/// The category list lives in a single document with this id...
pub const CATEGORIES_DOCUMENT_ID: &str = "categories";
/// ...under this field.
pub const CATEGORIES_FIELD: &str = "categories";

// --- Errors ---

/// Failures reported by a document store, transport or query level.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed document '{id}' in collection '{collection}': {reason}")]
    MalformedDocument {
        collection: String,
        id: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Failed to fetch snapshot from '{location}': {reason}")]
    Fetch { location: String, reason: String },
    #[error("Failed to parse snapshot from '{location}': {reason}")]
    Parse { location: String, reason: String },
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// --- Infrastructure Interfaces (Traits) ---

/// A document as returned by the store: its id plus its field map.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Fields,
}

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchWrite {
    /// Create a document with a store-assigned id.
    Add { collection: String, fields: Fields },
    /// Create or replace the document with the given id.
    Set {
        collection: String,
        id: String,
        fields: Fields,
    },
}

/// Writes handed to the store in one go by the bulk initializer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<BatchWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, collection: &str, fields: Fields) -> &mut Self {
        self.writes.push(BatchWrite::Add {
            collection: collection.to_string(),
            fields,
        });
        self
    }

    pub fn set(&mut self, collection: &str, id: &str, fields: Fields) -> &mut Self {
        self.writes.push(BatchWrite::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = BatchWrite;
    type IntoIter = std::vec::IntoIter<BatchWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

/// Interface to a remote document database of named collections.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches every document in a collection, in store order.
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;
    /// Fetches one document, `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str)
    -> Result<Option<StoredDocument>, StoreError>;
    /// Creates a document and returns the id the store assigned to it.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;
    /// Merges `fields` into the document with the given id.
    async fn update(&self, collection: &str, id: &str, fields: Fields)
    -> Result<(), StoreError>;
    /// Removes a document. Removing a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
    /// Creates or fully replaces the document with the given id.
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;
    /// Applies a batch of writes.
    #[instrument(skip(self, batch), fields(writes = batch.len()))]
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        debug!("Committing batch via default iteration");
        // Sequential default: stop at the first failed write.
        for write in batch {
            match write {
                BatchWrite::Add { collection, fields } => {
                    self.add(&collection, fields).await?;
                }
                BatchWrite::Set {
                    collection,
                    id,
                    fields,
                } => {
                    self.set(&collection, &id, fields).await?;
                }
            }
        }
        Ok(())
    }
}

/// Where the migration snapshot is read from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Human-readable location (URL or path) used in logs and errors.
    fn location(&self) -> &str;
    /// Retrieves the raw snapshot body. Fails with `ApplicationError::Fetch`.
    async fn fetch(&self) -> Result<String, ApplicationError>;
}

/// Migration progress as shown to the user.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    InProgress,
    Success,
    Failure,
}

/// Display collaborator the migration driver keeps up to date.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, status: MigrationStatus, message: &str);
}

// --- Request/Response Models ---

#[derive(Deserialize, Debug)]
pub struct AddCategoryRequest {
    pub name: String,
}

#[derive(Serialize, Debug)]
pub struct PostCreatedResponse {
    pub id: PostId,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub status: MigrationStatus,
    pub message: String,
}

// --- Application Services ---

/// Typed access to the blog's posts and categories.
///
/// Every method talks to the store and logs failures before returning them
/// unchanged. Category updates are read-modify-write over the whole category
/// document with no transaction: two concurrent callers can lose an update.
pub struct BlogService {
    store: Arc<dyn DocumentStore>,
}

impl BlogService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn get_all_posts(&self) -> Result<Vec<Post>, ApplicationError> {
        debug!("Fetching all posts");
        let documents = self.store.list(POSTS_COLLECTION).await.map_err(|e| {
            error!("Failed to fetch posts: {}", e);
            e
        })?;
        Ok(documents.into_iter().map(into_post).collect())
    }

    #[instrument(skip(self), fields(post_id = %id))]
    pub async fn get_post(&self, id: &PostId) -> Result<Option<Post>, ApplicationError> {
        debug!("Fetching post");
        let document = self
            .store
            .get(POSTS_COLLECTION, id.as_str())
            .await
            .map_err(|e| {
                error!(post_id = %id, "Failed to fetch post: {}", e);
                e
            })?;
        Ok(document.map(into_post))
    }

    #[instrument(skip(self, data))]
    pub async fn add_post(&self, data: Fields) -> Result<PostId, ApplicationError> {
        let id = self.store.add(POSTS_COLLECTION, data).await.map_err(|e| {
            error!("Failed to add post: {}", e);
            e
        })?;
        info!(post_id = %id, "Post added");
        Ok(PostId::new(id))
    }

    /// Merges `data` into the post. Existence is not checked first; what
    /// happens for a missing id is up to the store.
    #[instrument(skip(self, data), fields(post_id = %id))]
    pub async fn update_post(&self, id: &PostId, data: Fields) -> Result<(), ApplicationError> {
        self.store
            .update(POSTS_COLLECTION, id.as_str(), data)
            .await
            .map_err(|e| {
                error!(post_id = %id, "Failed to update post: {}", e);
                e
            })?;
        info!("Post updated");
        Ok(())
    }

    #[instrument(skip(self), fields(post_id = %id))]
    pub async fn delete_post(&self, id: &PostId) -> Result<(), ApplicationError> {
        self.store
            .delete(POSTS_COLLECTION, id.as_str())
            .await
            .map_err(|e| {
                error!(post_id = %id, "Failed to delete post: {}", e);
                e
            })?;
        info!("Post deleted");
        Ok(())
    }

    /// Returns the category names, creating an empty category document first
    /// if none exists yet.
    #[instrument(skip(self))]
    pub async fn get_all_categories(&self) -> Result<Vec<String>, ApplicationError> {
        self.load_categories()
            .await
            .map(CategoryList::into_names)
            .map_err(|e| {
                error!("Failed to fetch categories: {}", e);
                e
            })
    }

    #[instrument(skip(self))]
    pub async fn add_category(&self, category: &str) -> Result<(), ApplicationError> {
        let result = async {
            let mut categories = self.load_categories().await?;
            if categories.add(category) {
                self.save_categories(&categories).await?;
                info!("Category added");
            } else {
                debug!("Category already present");
            }
            Ok::<(), ApplicationError>(())
        }
        .await;
        result.map_err(|e| {
            error!(category = %category, "Failed to add category: {}", e);
            e
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_category(&self, category: &str) -> Result<(), ApplicationError> {
        let result = async {
            let mut categories = self.load_categories().await?;
            if categories.remove(category) {
                self.save_categories(&categories).await?;
                info!("Category deleted");
            } else {
                debug!("Category not present");
            }
            Ok::<(), ApplicationError>(())
        }
        .await;
        result.map_err(|e| {
            error!(category = %category, "Failed to delete category: {}", e);
            e
        })
    }

    /// Finds the older (`prev`) and newer (`next`) neighbours of a post.
    #[instrument(skip(self), fields(post_id = %current_id))]
    pub async fn get_adjacent_posts(
        &self,
        current_id: &PostId,
    ) -> Result<AdjacentPosts, ApplicationError> {
        let posts = self.get_all_posts().await.map_err(|e| {
            error!(post_id = %current_id, "Failed to fetch adjacent posts: {}", e);
            e
        })?;
        if posts.is_empty() {
            return Ok(AdjacentPosts::default());
        }
        Ok(adjacent_posts(posts, current_id))
    }

    /// Bulk initializer used by the migration. Posts carrying an id keep it;
    /// the category document is replaced by `categories` without duplicates.
    ///
    /// A post whose id was already used earlier in the snapshot is added under
    /// a store-assigned id instead, so every snapshot post ends up stored.
    #[instrument(skip(self, posts, categories), fields(post_count = posts.len(), category_count = categories.len()))]
    pub async fn initialize_data(
        &self,
        posts: Vec<Fields>,
        categories: Vec<String>,
    ) -> Result<(), ApplicationError> {
        info!("Initializing store from snapshot data");
        let result = async {
            let mut batch = WriteBatch::new();
            let mut seen_ids: HashSet<PostId> = HashSet::new();
            for entry in posts {
                let new_post = NewPost::from_snapshot_entry(entry)?;
                match new_post.id {
                    Some(id) if seen_ids.insert(id.clone()) => {
                        batch.set(POSTS_COLLECTION, id.as_str(), new_post.fields)
                    }
                    Some(id) => {
                        warn!(post_id = %id, "Repeated snapshot post id, adding under a new id");
                        batch.add(POSTS_COLLECTION, new_post.fields)
                    }
                    None => batch.add(POSTS_COLLECTION, new_post.fields),
                };
            }
            let categories = CategoryList::deduplicated(categories);
            batch.set(
                CATEGORIES_COLLECTION,
                CATEGORIES_DOCUMENT_ID,
                categories_document(&categories),
            );
            debug!(writes = batch.len(), "Write batch prepared");
            self.store.commit(batch).await?;
            Ok::<(), ApplicationError>(())
        }
        .await;
        result.map_err(|e| {
            error!("Failed to initialize data: {}", e);
            e
        })?;
        info!("Store initialized from snapshot data");
        Ok(())
    }

    async fn load_categories(&self) -> Result<CategoryList, ApplicationError> {
        let document = self
            .store
            .get(CATEGORIES_COLLECTION, CATEGORIES_DOCUMENT_ID)
            .await?;
        let Some(document) = document else {
            info!("Category document missing, creating an empty one");
            self.save_categories(&CategoryList::new()).await?;
            return Ok(CategoryList::new());
        };
        match document.fields.get(CATEGORIES_FIELD) {
            None | Some(Value::Null) => Ok(CategoryList::new()),
            Some(value) => serde_json::from_value::<Vec<String>>(value.clone())
                .map(CategoryList::from)
                .map_err(|e| {
                    ApplicationError::from(StoreError::MalformedDocument {
                        collection: CATEGORIES_COLLECTION.to_string(),
                        id: CATEGORIES_DOCUMENT_ID.to_string(),
                        reason: e.to_string(),
                    })
                }),
        }
    }

    async fn save_categories(&self, categories: &CategoryList) -> Result<(), ApplicationError> {
        self.store
            .set(
                CATEGORIES_COLLECTION,
                CATEGORIES_DOCUMENT_ID,
                categories_document(categories),
            )
            .await?;
        Ok(())
    }
}

fn into_post(document: StoredDocument) -> Post {
    Post::new(PostId::new(document.id), document.fields)
}

fn categories_document(categories: &CategoryList) -> Fields {
    let mut fields = Fields::new();
    fields.insert(
        CATEGORIES_FIELD.to_string(),
        Value::from(categories.names().to_vec()),
    );
    fields
}

/// One-shot transfer of a JSON snapshot into the store.
pub struct MigrationService {
    source: Arc<dyn SnapshotSource>,
    blog: Arc<BlogService>,
}

impl MigrationService {
    pub fn new(source: Arc<dyn SnapshotSource>, blog: Arc<BlogService>) -> Self {
        Self { source, blog }
    }

    /// Runs the migration. Every failure is logged and reported as `false`;
    /// nothing is propagated.
    #[instrument(skip(self), fields(location = %self.source.location()))]
    pub async fn run(&self) -> bool {
        self.try_run().await.is_ok()
    }

    /// Runs the migration while keeping `reporter` informed. Returns the final
    /// status, never `InProgress`.
    #[instrument(skip(self, reporter), fields(location = %self.source.location()))]
    pub async fn run_with_status(&self, reporter: &dyn StatusReporter) -> MigrationReport {
        reporter
            .report(MigrationStatus::InProgress, "Starting data migration...")
            .await;

        let report = match self.try_run().await {
            Ok(()) => MigrationReport {
                status: MigrationStatus::Success,
                message: "Migration completed. Snapshot data has been imported into the store."
                    .to_string(),
            },
            Err(e) => MigrationReport {
                status: MigrationStatus::Failure,
                message: format!("Migration failed: {}", e),
            },
        };
        reporter.report(report.status, &report.message).await;
        report
    }

    async fn try_run(&self) -> Result<(), ApplicationError> {
        let location = self.source.location().to_string();
        info!(location = %location, "Starting snapshot migration");

        let result = async {
            let body = self.source.fetch().await?;
            let snapshot: Snapshot =
                serde_json::from_str(&body).map_err(|e| ApplicationError::Parse {
                    location: location.clone(),
                    reason: e.to_string(),
                })?;
            debug!(
                posts = snapshot.posts.len(),
                categories = snapshot.categories.len(),
                "Snapshot parsed"
            );
            self.blog
                .initialize_data(snapshot.posts, snapshot.categories)
                .await
        }
        .await;

        match &result {
            Ok(()) => info!(location = %location, "Snapshot migration finished"),
            Err(e) => error!(location = %location, "Snapshot migration failed: {}", e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store whose every call fails.
    struct UnavailableStore;

    #[async_trait]
    impl DocumentStore for UnavailableStore {
        async fn list(&self, _: &str) -> Result<Vec<StoredDocument>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn get(&self, _: &str, _: &str) -> Result<Option<StoredDocument>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn add(&self, _: &str, _: Fields) -> Result<String, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn update(&self, _: &str, _: &str, _: Fields) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn delete(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn set(&self, _: &str, _: &str, _: Fields) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    /// Store serving a fixed category document and recording `set` calls.
    #[derive(Default)]
    struct CategoryStore {
        document: Option<Fields>,
        sets: Mutex<Vec<Fields>>,
        commits: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for CategoryStore {
        async fn list(&self, _: &str) -> Result<Vec<StoredDocument>, StoreError> {
            Ok(Vec::new())
        }
        async fn get(&self, _: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
            Ok(self.document.clone().map(|fields| StoredDocument {
                id: id.to_string(),
                fields,
            }))
        }
        async fn add(&self, _: &str, _: Fields) -> Result<String, StoreError> {
            Ok("new".to_string())
        }
        async fn update(&self, _: &str, _: &str, _: Fields) -> Result<(), StoreError> {
            Ok(())
        }
        async fn delete(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn set(&self, _: &str, _: &str, fields: Fields) -> Result<(), StoreError> {
            self.sets.lock().unwrap().push(fields);
            Ok(())
        }
        async fn commit(&self, _: WriteBatch) -> Result<(), StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StaticSource(Result<String, String>);

    #[async_trait]
    impl SnapshotSource for StaticSource {
        fn location(&self) -> &str {
            "memory://snapshot"
        }
        async fn fetch(&self) -> Result<String, ApplicationError> {
            self.0.clone().map_err(|reason| ApplicationError::Fetch {
                location: self.location().to_string(),
                reason,
            })
        }
    }

    #[derive(Default)]
    struct RecordingReporter(Mutex<Vec<(MigrationStatus, String)>>);

    #[async_trait]
    impl StatusReporter for RecordingReporter {
        async fn report(&self, status: MigrationStatus, message: &str) {
            self.0.lock().unwrap().push((status, message.to_string()));
        }
    }

    fn doc(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn store_errors_are_propagated_unchanged() {
        let service = BlogService::new(Arc::new(UnavailableStore));
        let id = PostId::from("p1");

        let err = service.get_post(&id).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Store(StoreError::Unavailable(_))));
        assert!(matches!(
            service.get_all_posts().await,
            Err(ApplicationError::Store(StoreError::Unavailable(_)))
        ));
        assert!(service.add_post(Fields::new()).await.is_err());
        assert!(service.update_post(&id, Fields::new()).await.is_err());
        assert!(service.delete_post(&id).await.is_err());
        assert!(service.get_all_categories().await.is_err());
        assert!(service.add_category("rust").await.is_err());
        assert!(service.delete_category("rust").await.is_err());
        assert!(service.get_adjacent_posts(&id).await.is_err());
    }

    #[tokio::test]
    async fn add_existing_category_does_not_write() {
        let store = Arc::new(CategoryStore {
            document: Some(doc(json!({ "categories": ["rust"] }))),
            ..Default::default()
        });
        let service = BlogService::new(store.clone());

        service.add_category("rust").await.unwrap();
        assert!(store.sets.lock().unwrap().is_empty());

        service.add_category("web").await.unwrap();
        let sets = store.sets.lock().unwrap();
        assert_eq!(sets.as_slice(), [doc(json!({ "categories": ["rust", "web"] }))]);
    }

    #[tokio::test]
    async fn delete_missing_category_does_not_write() {
        let store = Arc::new(CategoryStore {
            document: Some(doc(json!({ "categories": ["rust"] }))),
            ..Default::default()
        });
        let service = BlogService::new(store.clone());

        service.delete_category("go").await.unwrap();
        assert!(store.sets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn category_document_without_field_reads_empty() {
        let store = Arc::new(CategoryStore {
            document: Some(Fields::new()),
            ..Default::default()
        });
        let service = BlogService::new(store.clone());
        assert!(service.get_all_categories().await.unwrap().is_empty());
        assert!(store.sets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_category_document_is_a_store_error() {
        let store = Arc::new(CategoryStore {
            document: Some(doc(json!({ "categories": "rust" }))),
            ..Default::default()
        });
        let service = BlogService::new(store);
        let err = service.get_all_categories().await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Store(StoreError::MalformedDocument { .. })
        ));
    }

    #[tokio::test]
    async fn failed_fetch_skips_initializer() {
        let store = Arc::new(CategoryStore::default());
        let blog = Arc::new(BlogService::new(store.clone()));
        let source = Arc::new(StaticSource(Err("404 Not Found".to_string())));
        let migration = MigrationService::new(source, blog);

        assert!(!migration.run().await);
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_snapshot_returns_false() {
        let store = Arc::new(CategoryStore::default());
        let blog = Arc::new(BlogService::new(store.clone()));
        let source = Arc::new(StaticSource(Ok("{ not json".to_string())));
        let migration = MigrationService::new(source, blog);

        assert!(!migration.run().await);
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn status_goes_in_progress_then_success() {
        let store = Arc::new(CategoryStore::default());
        let blog = Arc::new(BlogService::new(store.clone()));
        let body = json!({ "posts": [{ "title": "One" }], "categories": ["a"] }).to_string();
        let migration = MigrationService::new(Arc::new(StaticSource(Ok(body))), blog);
        let reporter = RecordingReporter::default();

        let report = migration.run_with_status(&reporter).await;
        assert_eq!(report.status, MigrationStatus::Success);
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);

        let statuses: Vec<_> = reporter.0.lock().unwrap().iter().map(|(s, _)| *s).collect();
        assert_eq!(
            statuses,
            vec![MigrationStatus::InProgress, MigrationStatus::Success]
        );
    }

    #[tokio::test]
    async fn status_reports_failure_with_reason() {
        let blog = Arc::new(BlogService::new(Arc::new(UnavailableStore)));
        let body = json!({ "posts": [], "categories": [] }).to_string();
        let migration = MigrationService::new(Arc::new(StaticSource(Ok(body))), blog);
        let reporter = RecordingReporter::default();

        let report = migration.run_with_status(&reporter).await;
        assert_eq!(report.status, MigrationStatus::Failure);
        assert!(report.message.contains("offline"));

        let recorded = reporter.0.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[1].0, MigrationStatus::Failure);
    }

    #[test]
    fn write_batch_keeps_order() {
        let mut batch = WriteBatch::new();
        batch
            .add(POSTS_COLLECTION, Fields::new())
            .set(CATEGORIES_COLLECTION, CATEGORIES_DOCUMENT_ID, Fields::new());
        assert_eq!(batch.len(), 2);
        let writes: Vec<BatchWrite> = batch.into_iter().collect();
        assert!(matches!(writes[0], BatchWrite::Add { .. }));
        assert!(matches!(&writes[1], BatchWrite::Set { id, .. } if id == "categories"));
    }
}
