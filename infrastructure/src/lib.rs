// ./infrastructure/src/lib.rs
// Module declarations
pub mod persistence;
pub mod snapshot;

// Re-export all implementations
pub use persistence::InMemoryDocumentStore;
pub use snapshot::{FileSnapshotSource, HttpSnapshotSource};
