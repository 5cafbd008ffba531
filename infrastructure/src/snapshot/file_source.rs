// ./infrastructure/src/snapshot/file_source.rs
use application::{ApplicationError, SnapshotSource};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Snapshot read from the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
    location: String,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let location = path.display().to_string();
        Self { path, location }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    fn location(&self) -> &str {
        &self.location
    }

    #[instrument(skip(self), fields(location = %self.location))]
    async fn fetch(&self) -> Result<String, ApplicationError> {
        debug!("Reading snapshot file");
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            error!(location = %self.location, "Snapshot read failed: {}", e);
            ApplicationError::Fetch {
                location: self.location.clone(),
                reason: e.to_string(),
            }
        })
    }
}
