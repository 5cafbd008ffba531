// ./infrastructure/src/snapshot/mod.rs
pub mod file_source;
pub mod http_source;

pub use file_source::FileSnapshotSource;
pub use http_source::HttpSnapshotSource;

/// Where the snapshot lives when nothing else is configured.
pub const DEFAULT_SNAPSHOT_PATH: &str = "blog/posts.json";
