use chrono::Utc;
use garde::Validate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::mapstate::{MapStateDocument, Mapstate};
use crate::models::metadata::{MapData, MapDocument};
use crate::services::queue::{OrderQueue, QueueError};

pub const FILE_METADATA: &str = "metadata.json";
pub const FILE_MAPSTATE: &str = "mapstate.json";
pub const FILE_ARCHIVE: &str = "printmaps.zip";

/// File-backed store for the metadata and state document of each map.
pub struct RecordStore {
    maps_dir: PathBuf,
}

impl RecordStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            maps_dir: config.maps_dir(),
        }
    }

    /// Public directory of one map (documents, user uploads, final archive).
    pub fn map_dir(&self, id: Uuid) -> PathBuf {
        self.maps_dir.join(id.to_string())
    }

    pub fn archive_path(&self, id: Uuid) -> PathBuf {
        self.map_dir(id).join(FILE_ARCHIVE)
    }

    /// Write the metadata document and stamp `MapMetadataWritten`.
    pub async fn store_metadata(&self, data: &MapData) -> Result<(), StoreError> {
        let id = data.id();
        let mut stored = data.clone();
        stored.data.attributes.user_files = None;
        write_json(&self.map_dir(id).join(FILE_METADATA), &stored).await?;

        let mut state = self.read_mapstate_or_default(id).await?;
        state.data.attributes.record_metadata_written(Utc::now());
        self.write_mapstate(&state).await
    }

    /// Read the metadata document, including the list of uploaded user files.
    pub async fn read_metadata(&self, id: Uuid) -> Result<MapData, StoreError> {
        let mut data: MapData = read_json(&self.map_dir(id).join(FILE_METADATA), id).await?;
        data.data.attributes.user_files = self.list_user_files(id).await?;
        Ok(data)
    }

    pub async fn write_mapstate(&self, state: &MapStateDocument) -> Result<(), StoreError> {
        write_json(&self.map_dir(state.id()).join(FILE_MAPSTATE), state).await
    }

    pub async fn read_mapstate(&self, id: Uuid) -> Result<MapStateDocument, StoreError> {
        read_json(&self.map_dir(id).join(FILE_MAPSTATE), id).await
    }

    /// Like [`read_mapstate`](Self::read_mapstate), but a missing document is an empty state.
    pub async fn read_mapstate_or_default(&self, id: Uuid) -> Result<MapStateDocument, StoreError> {
        match self.read_mapstate(id).await {
            Err(StoreError::NotFound(_)) => Ok(MapDocument::new(id, Mapstate::default())),
            other => other,
        }
    }

    /// Current build lifecycle of a map.
    pub async fn read_state(&self, id: Uuid) -> Result<Mapstate, StoreError> {
        Ok(self.read_mapstate(id).await?.data.attributes)
    }

    /// Accept a build order for a map whose required metadata is complete.
    ///
    /// The state is reset before the order becomes visible in the queue, so a
    /// worker picking it up never has its `MapBuildStarted` overwritten.
    pub async fn submit_order(&self, id: Uuid, queue: &OrderQueue) -> Result<MapData, StoreError> {
        let data = self.read_metadata(id).await?;
        data.attributes()
            .validate()
            .map_err(|report| StoreError::Incomplete(report.to_string()))?;

        let mut state = self.read_mapstate_or_default(id).await?;
        state.data.attributes.record_order_submitted(Utc::now());
        self.write_mapstate(&state).await?;

        queue.enqueue(&data).await?;
        tracing::info!(map_id = %id, "Build order submitted");
        Ok(data)
    }

    /// Uploaded files as `name,size[,name,size...]`, `None` when there are none.
    async fn list_user_files(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let dir = self.map_dir(id);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| StoreError::io(&dir, source))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::io(&dir, source))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|source| StoreError::io(&entry.path(), source))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !meta.is_file()
                || name.starts_with('.')
                || [FILE_METADATA, FILE_MAPSTATE, FILE_ARCHIVE].contains(&name.as_str())
            {
                continue;
            }
            files.push(format!("{},{}", name, meta.len()));
        }

        files.sort();
        Ok((!files.is_empty()).then(|| files.join(",")))
    }
}

/// Create the `maps` and `orders` directories below the workdir.
pub async fn create_directories(config: &AppConfig) -> Result<(), StoreError> {
    for dir in [config.maps_dir(), config.orders_dir()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::io(&dir, source))?;
    }
    Ok(())
}

/// Serialize with 4-space indentation and replace `path` as a whole.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let buf = encode_json(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| StoreError::io(dir, source))?;
    }

    replace_file(path, &buf)
        .await
        .map_err(|source| StoreError::io(path, source))
}

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Replace `path` with `contents` through a private temp sibling and a rename.
///
/// Every call owns its temp file (`create_new`), so concurrent writers of the
/// same path never share one; the last rename wins.
pub(crate) async fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    for _ in 0..64 {
        let tmp = temp_sibling(path, TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed));
        let file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };

        let result = write_and_rename(file, &tmp, path, contents).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        return result;
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        "unable to allocate temporary file",
    ))
}

async fn write_and_rename(
    mut file: tokio::fs::File,
    tmp: &Path,
    path: &Path,
    contents: &[u8],
) -> std::io::Result<()> {
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, path).await
}

/// JSON with 4-space indentation, the layout shared with the web service.
pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

async fn read_json<T: DeserializeOwned>(path: &Path, id: Uuid) -> Result<T, StoreError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(id)),
        Err(source) => return Err(StoreError::io(path, source)),
    };
    serde_json::from_slice(&raw).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Hidden temp file next to `path` (`dir/.name.<pid>.<seq>.tmp`), ignored by directory listings.
fn temp_sibling(path: &Path, sequence: u64) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.{sequence}.tmp", std::process::id()))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Map {0} not found")]
    NotFound(Uuid),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON document {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Missing or invalid map attributes: {0}")]
    Incomplete(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
