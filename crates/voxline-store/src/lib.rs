use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not create storage directory {path}: {source}")]
    Init { path: PathBuf, source: io::Error },

    #[error("failed to write blob {key}: {source}")]
    Write { key: String, source: io::Error },

    #[error("storage key {0} already exists")]
    Collision(String),

    #[error("storage key {0:?} escapes the storage root")]
    InvalidKey(String),

    #[error("no blob stored under {0}")]
    NotFound(String),

    #[error("I/O error on blob {key}: {source}")]
    Io { key: String, source: io::Error },

    #[error("I/O on blob {0} timed out")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// An open stored blob, ready to stream.
pub struct Blob {
    pub file: fs::File,
    pub len: u64,
    /// File name of the blob inside the root.
    pub name: String,
}

/// Manages on-disk storage for audio clips.
///
/// Each clip is stored as a single flat file at `{root}/{key}`, where the key is
/// a random UUID plus the extension of the uploaded file name. Keys are never
/// derived from anything else the client sends.
pub struct FileStore {
    root: PathBuf,
    io_timeout: Duration,
}

impl FileStore {
    /// Create the root directory (and parents) if missing.
    pub async fn open(root: impl Into<PathBuf>, io_timeout: Duration) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|source| StoreError::Init {
            path: root.clone(),
            source,
        })?;
        let root = fs::canonicalize(&root).await.map_err(|source| StoreError::Init {
            path: root.clone(),
            source,
        })?;

        info!("Audio storage directory: {}", root.display());
        Ok(Self { root, io_timeout })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` under a fresh key and return the key.
    ///
    /// The file is created with create-new semantics, so a key collision is
    /// reported instead of overwriting an existing clip.
    pub async fn store(&self, data: &[u8], original_name: &str) -> Result<String> {
        let key = generate_key(original_name);
        self.write_new(&key, data).await?;
        debug!("Stored {} bytes as {}", data.len(), key);
        Ok(key)
    }

    async fn write_new(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.root.join(key);

        let write = async {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, io::Error>(())
        };

        match tokio::time::timeout(self.io_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::Collision(key.to_string()))
            }
            Ok(Err(source)) => {
                self.discard_partial(&path).await;
                Err(StoreError::Write {
                    key: key.to_string(),
                    source,
                })
            }
            Err(_) => {
                self.discard_partial(&path).await;
                Err(StoreError::Timeout(key.to_string()))
            }
        }
    }

    /// Map a key to the path of an existing blob inside the root.
    ///
    /// Keys that climb out of the root (`..`, absolute paths, or symlinks
    /// pointing elsewhere) fail with [`StoreError::InvalidKey`]. A key that
    /// names no existing blob, for whatever reason the lookup fails, is
    /// [`StoreError::NotFound`].
    pub async fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = normalize_key(key)?;
        let candidate = self.root.join(relative);

        let resolved = match fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) => {
                debug!("Storage key {:?} does not resolve: {}", key, e);
                return Err(StoreError::NotFound(key.to_string()));
            }
        };

        if !resolved.starts_with(&self.root) {
            warn!("Storage key {:?} resolves outside the storage root", key);
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let is_file = fs::metadata(&resolved)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(StoreError::NotFound(key.to_string()));
        }

        Ok(resolved)
    }

    /// Open a stored blob for streaming.
    pub async fn open_blob(&self, key: &str) -> Result<Blob> {
        let path = self.resolve(key).await?;
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };

        let file = fs::File::open(&path).await.map_err(io_err)?;
        let len = file.metadata().await.map_err(io_err)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.to_string());

        Ok(Blob { file, len, name })
    }

    /// Read a whole stored blob into memory.
    pub async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key).await?;
        match tokio::time::timeout(self.io_timeout, fs::read(&path)).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(source)) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
            Err(_) => Err(StoreError::Timeout(key.to_string())),
        }
    }

    /// Delete a stored blob. A blob that is already gone is not an error.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let path = match self.resolve(key).await {
            Ok(path) => path,
            Err(StoreError::NotFound(_)) => {
                warn!("Blob {} already gone", key);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted blob {}", key);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn discard_partial(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove partial blob {}: {}", path.display(), e);
            }
        }
    }
}

/// Random token plus the extension of `original_name`, if it has a usable one.
pub fn generate_key(original_name: &str) -> String {
    let token = Uuid::new_v4();
    match extension_of(original_name) {
        Some(ext) => format!("{}.{}", token, ext),
        None => token.to_string(),
    }
}

/// Extension after the last `.` of the file's base name.
///
/// No extension when there is no dot, the dot starts the base name, or the dot
/// is the last character. Extensions with anything but ASCII alphanumerics are
/// dropped so a key can never carry a path separator.
pub fn extension_of(original_name: &str) -> Option<&str> {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);

    let dot = base.rfind('.')?;
    if dot == 0 || dot == base.len() - 1 {
        return None;
    }

    let ext = &base[dot + 1..];
    ext.chars()
        .all(|c| c.is_ascii_alphanumeric())
        .then_some(ext)
}

/// Lexically normalize `key` relative to the root, rejecting anything that
/// would leave it.
fn normalize_key(key: &str) -> Result<PathBuf> {
    if key.contains('\0') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(StoreError::InvalidKey(key.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::InvalidKey(key.to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(normalized)
}
