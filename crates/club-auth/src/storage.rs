//! Durable key-value storage for session data
//!
//! `Storage` is the seam between the token store and wherever the session
//! actually lives. Every method works on several keys at once and is atomic
//! relative to other calls on the same backend, so a reader never sees half
//! of a login or half of a logout.
//!
//! `FileStorage` keeps a JSON object on disk and replaces the whole file on
//! every change through a per-file temp sibling. Changes to one file are
//! serialized by a tokio Mutex. `MemoryStorage` is the same map without the
//! file.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by `Storage` methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Multi-key string storage.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Storage>`).
pub trait Storage: Send + Sync {
    /// Read several keys. The result has one slot per requested key, `None`
    /// where the key is absent.
    fn get_many<'a>(&'a self, keys: &'a [&'a str]) -> StorageFuture<'a, Vec<Option<String>>>;

    /// Write several entries in one step.
    fn set_many<'a>(&'a self, entries: &'a [(&'a str, String)]) -> StorageFuture<'a, ()>;

    /// Remove several keys in one step. Missing keys are ignored.
    fn remove_many<'a>(&'a self, keys: &'a [&'a str]) -> StorageFuture<'a, ()>;
}

type Entries = BTreeMap<String, String>;

fn read_keys(state: &Entries, keys: &[&str]) -> Vec<Option<String>> {
    keys.iter().map(|k| state.get(*k).cloned()).collect()
}

/// In-process storage. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<Entries>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_many<'a>(&'a self, keys: &'a [&'a str]) -> StorageFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(read_keys(&state, keys))
        })
    }

    fn set_many<'a>(&'a self, entries: &'a [(&'a str, String)]) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for (key, value) in entries {
                state.insert((*key).to_string(), value.clone());
            }
            Ok(())
        })
    }

    fn remove_many<'a>(&'a self, keys: &'a [&'a str]) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for key in keys {
                state.remove(*key);
            }
            Ok(())
        })
    }
}

/// JSON file storage.
///
/// The in-memory map mirrors the file. Mutations are applied to a copy,
/// written to disk, and only then swapped in, so a failed write leaves both
/// the file and the map at the previous state.
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<Entries>,
}

impl FileStorage {
    /// Open the session file at `path`.
    ///
    /// If the file doesn't exist, creates it as `{}` (nobody logged in yet).
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let entries: Entries = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded session storage");
            entries
        } else {
            info!(path = %path.display(), "session file not found, starting empty");
            let entries = Entries::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn get_many<'a>(&'a self, keys: &'a [&'a str]) -> StorageFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(read_keys(&state, keys))
        })
    }

    fn set_many<'a>(&'a self, entries: &'a [(&'a str, String)]) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            for (key, value) in entries {
                next.insert((*key).to_string(), value.clone());
            }
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(keys = entries.len(), "stored session entries");
            Ok(())
        })
    }

    fn remove_many<'a>(&'a self, keys: &'a [&'a str]) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !keys.iter().any(|k| state.contains_key(*k)) {
                return Ok(());
            }
            let mut next = state.clone();
            for key in keys {
                next.remove(*key);
            }
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(keys = keys.len(), "removed session entries");
            Ok(())
        })
    }
}

/// Sibling temp path for `path`: `.<file name>.tmp.<pid>`.
///
/// Unique per target file, so session files sharing a directory never write
/// through the same temp file.
fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Io(format!("session path {} has no file name", path.display())))?;
    let mut tmp_name = OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(format!(".tmp.{}", std::process::id()));
    Ok(path.with_file_name(tmp_name))
}

/// Replace the session file with `data`.
///
/// The temp file is created owner-only (0600 on unix), synced, then renamed
/// over the target, so the file on disk is always a complete map.
async fn write_atomic(path: &Path, data: &Entries) -> Result<()> {
    let json = serde_json::to_vec_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing session: {e}")))?;
    let tmp_path = temp_path_for(path)?;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let written = async {
        let mut file = options.open(&tmp_path).await?;
        // `mode` only applies on creation; a leftover temp file keeps its own.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Io(format!(
            "writing session file {}: {e}",
            path.display()
        )));
    }

    debug!(path = %path.display(), bytes = json.len(), "persisted session");
    Ok(())
}
