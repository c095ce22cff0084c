use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::config::AppConfig;
use crate::models::job::ClaimedOrder;
use crate::models::metadata::MapData;
use crate::services::store::{encode_json, replace_file};

/// Prefix of the private working directory created for each dispatched order.
pub const WORKSPACE_PREFIX: &str = "printmaps_tempdir_";

/// Directory-backed order queue. One file per pending order, oldest first.
///
/// A single process drains the queue; the atomic rename of an order file into a
/// worker's private directory is the only claim protocol.
pub struct OrderQueue {
    orders_dir: PathBuf,
    workdir: PathBuf,
    retry_delay: Duration,
}

impl OrderQueue {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            orders_dir: config.orders_dir(),
            workdir: config.workdir.clone(),
            retry_delay: config.claim_retry_delay(),
        }
    }

    /// Write a build order (`<id>.json`) into the queue directory.
    pub async fn enqueue(&self, order: &MapData) -> Result<(), QueueError> {
        let path = self.orders_dir.join(format!("{}.json", order.id()));
        let payload = encode_json(order).map_err(QueueError::Serialize)?;

        tokio::fs::create_dir_all(&self.orders_dir)
            .await
            .map_err(|source| QueueError::io(&self.orders_dir, source))?;
        replace_file(&path, &payload)
            .await
            .map_err(|source| QueueError::io(&path, source))
    }

    /// Name of the oldest pending order, `None` when the queue is empty.
    pub async fn next_order(&self) -> Result<Option<String>, QueueError> {
        Ok(self.pending().await?.into_iter().next())
    }

    /// Names of all pending orders, oldest first.
    pub async fn pending_orders(&self) -> Result<Vec<String>, QueueError> {
        self.pending().await
    }

    /// Number of pending orders.
    pub async fn depth(&self) -> Result<usize, QueueError> {
        Ok(self.pending().await?.len())
    }

    /// Private directory for one build attempt, removed when dropped.
    pub fn create_workspace(&self) -> Result<TempDir, QueueError> {
        tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&self.workdir)
            .map_err(|source| QueueError::io(&self.workdir, source))
    }

    /// Move the order file into `workspace`. The rename is tried a second time
    /// after the retry delay; a second failure abandons the order.
    pub async fn claim(&self, name: &str, workspace: &Path) -> Result<ClaimedOrder, QueueError> {
        let source = self.orders_dir.join(name);
        let destination = workspace.join(name);

        if let Err(first) = tokio::fs::rename(&source, &destination).await {
            tracing::warn!(
                order = %name,
                error = %first,
                retry_in_ms = self.retry_delay.as_millis() as u64,
                "First attempt to claim order failed"
            );
            tokio::time::sleep(self.retry_delay).await;

            if let Err(second) = tokio::fs::rename(&source, &destination).await {
                metrics::counter!("order_claims_failed_total").increment(1);
                return Err(QueueError::Claim {
                    name: name.to_string(),
                    source: second,
                });
            }
        }

        Ok(ClaimedOrder {
            name: name.to_string(),
            path: destination,
        })
    }

    /// Regular, non-hidden files sorted by modification time (name breaks ties).
    async fn pending(&self) -> Result<Vec<String>, QueueError> {
        let mut entries = tokio::fs::read_dir(&self.orders_dir)
            .await
            .map_err(|source| QueueError::io(&self.orders_dir, source))?;

        let mut orders: Vec<(SystemTime, String)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| QueueError::io(&self.orders_dir, source))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            // Entries may vanish between listing and stat.
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            orders.push((modified, name));
        }

        orders.sort();
        Ok(orders.into_iter().map(|(_, name)| name).collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot claim order {name}: {source}")]
    Claim {
        name: String,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl QueueError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        QueueError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
