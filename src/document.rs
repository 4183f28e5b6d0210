//! Structured document I/O shared by the state store and the intelligence log.
//!
//! Documents are plain serde types persisted as YAML (the default, used for
//! `.mdc` and `.yaml` files) or JSON (`.json`). A [`Checkout`] covers one
//! load-mutate-persist cycle:
//!
//! 1. an exclusive advisory lock on a sidecar `<file>.lock` (optional),
//! 2. a SHA-256 fingerprint of the bytes that were loaded,
//! 3. a fingerprint re-check at commit time, failing with
//!    [`StateError::ConcurrentModification`] if the file changed underneath,
//! 4. an atomic write through a temp file in the same directory.

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::StateError;

/// Mapping key for a field name.
pub(crate) fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

/// Text of a scalar value; `None` for null, sequences and mappings.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// On-disk encoding of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Pick the format from the file extension. Anything but `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }

    /// Parse a document. Blank or `null` content yields `T::default()`.
    pub fn parse<T>(self, text: &str, path: &Path) -> Result<T, StateError>
    where
        T: DeserializeOwned + Default,
    {
        if text.trim().is_empty() {
            return Ok(T::default());
        }

        let parsed = match self {
            DocumentFormat::Yaml => {
                serde_yaml::from_str::<Option<T>>(text).map_err(|e| e.to_string())
            }
            DocumentFormat::Json => {
                serde_json::from_str::<Option<T>>(text).map_err(|e| e.to_string())
            }
        };

        parsed
            .map(Option::unwrap_or_default)
            .map_err(|message| StateError::Parse {
                path: path.to_path_buf(),
                message,
            })
    }

    /// Render a document to text.
    pub fn render<T: Serialize>(self, document: &T, path: &Path) -> Result<String, StateError> {
        let rendered = match self {
            DocumentFormat::Yaml => serde_yaml::to_string(document).map_err(|e| e.to_string()),
            DocumentFormat::Json => serde_json::to_string_pretty(document)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| e.to_string()),
        };

        rendered.map_err(|message| StateError::Serialize {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// Content fingerprint of a document file at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fingerprint {
    Absent,
    Digest(String),
}

impl Fingerprint {
    fn of(bytes: Option<&[u8]>) -> Self {
        match bytes {
            None => Fingerprint::Absent,
            Some(bytes) => {
                let mut hasher = Sha256::new();
                hasher.update(bytes);
                Fingerprint::Digest(format!("{:x}", hasher.finalize()))
            }
        }
    }
}

/// Exclusive advisory lock on `<document>.lock`, released on drop.
#[derive(Debug)]
pub struct DocumentLock {
    file: File,
    path: PathBuf,
}

impl DocumentLock {
    /// Block until the lock for `document` is held.
    pub fn acquire(document: &Path) -> Result<Self, StateError> {
        let path = lock_path_for(document);
        ensure_parent_dir(&path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StateError::Lock {
                path: path.clone(),
                source,
            })?;

        file.lock_exclusive().map_err(|source| StateError::Lock {
            path: path.clone(),
            source,
        })?;

        debug!("Acquired document lock at {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        if FileExt::unlock(&self.file).is_ok() {
            debug!("Released document lock at {}", self.path.display());
        }
    }
}

/// Sidecar lock file path for a document: `state.mdc` -> `state.mdc.lock`.
pub fn lock_path_for(document: &Path) -> PathBuf {
    let mut name = document
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    document.with_file_name(name)
}

/// A file-backed document location.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
    format: DocumentFormat,
    locking: bool,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = DocumentFormat::from_path(&path);
        Self {
            path,
            format,
            locking: true,
        }
    }

    /// Enable or disable the advisory lock taken by [`DocumentStore::checkout`].
    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read-only load. A missing file yields `T::default()`.
    pub fn load<T>(&self) -> Result<T, StateError>
    where
        T: DeserializeOwned + Default,
    {
        match read_bytes(&self.path)? {
            Some(bytes) => self.decode(&bytes),
            None => Ok(T::default()),
        }
    }

    /// Start a load-mutate-persist cycle. A missing file yields `T::default()`
    /// and is created on commit.
    pub fn checkout<T>(&self) -> Result<Checkout<T>, StateError>
    where
        T: DeserializeOwned + Default,
    {
        let lock = if self.locking {
            Some(DocumentLock::acquire(&self.path)?)
        } else {
            None
        };

        let bytes = read_bytes(&self.path)?;
        let fingerprint = Fingerprint::of(bytes.as_deref());
        let document = match bytes {
            Some(bytes) => self.decode(&bytes)?,
            None => T::default(),
        };

        debug!(
            "Checked out {} ({:?}, locked: {})",
            self.path.display(),
            self.format,
            lock.is_some()
        );

        Ok(Checkout {
            document,
            store: self.clone(),
            fingerprint,
            _lock: lock,
        })
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, StateError>
    where
        T: DeserializeOwned + Default,
    {
        let text = std::str::from_utf8(bytes).map_err(|e| StateError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        self.format.parse(text, &self.path)
    }
}

/// A loaded document plus what is needed to persist it safely.
#[derive(Debug)]
pub struct Checkout<T> {
    pub document: T,
    store: DocumentStore,
    fingerprint: Fingerprint,
    _lock: Option<DocumentLock>,
}

impl<T: Serialize> Checkout<T> {
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Persist the document, failing if the file changed since checkout.
    pub fn commit(self) -> Result<(), StateError> {
        let path = self.store.path();

        let current = Fingerprint::of(read_bytes(path)?.as_deref());
        if current != self.fingerprint {
            return Err(StateError::ConcurrentModification {
                path: path.to_path_buf(),
            });
        }

        let text = self.store.format.render(&self.document, path)?;
        write_atomic(path, text.as_bytes())?;
        debug!("Committed {}", path.display());
        Ok(())
    }
}

fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, StateError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StateError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), StateError> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent).map_err(|source| StateError::Write {
        path: parent,
        source,
    })
}

/// Write through a temp file in the target directory, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StateError> {
    let write_err = |source: std::io::Error| StateError::Write {
        path: path.to_path_buf(),
        source,
    };

    ensure_parent_dir(path)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(path)).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    // Keep the original file mode rather than the temp file's 0600.
    if let Ok(meta) = fs::metadata(path) {
        if let Err(e) = fs::set_permissions(tmp.path(), meta.permissions()) {
            warn!(
                "Could not carry file permissions over to {}: {}",
                path.display(),
                e
            );
        }
    }

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
