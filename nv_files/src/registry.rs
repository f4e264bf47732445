//! Path to handle directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use nv_core::IdGenerator;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::cipher::{CipherBackend, bytes_stream, collect_stream};
use crate::config::RegistryConfig;
use crate::handle::{HandleGuard, HandleId, ManagedFileHandle};
use crate::{FilesResult, HandleError, OpenError};

type OpenFuture = Shared<BoxFuture<'static, Result<Arc<ManagedFileHandle>, OpenError>>>;

#[derive(Clone)]
struct Slot {
    id: HandleId,
    handle: OpenFuture,
}

impl Slot {
    fn ready(&self) -> Option<Arc<ManagedFileHandle>> {
        match self.handle.peek() {
            Some(Ok(handle)) => Some(handle.clone()),
            _ => None,
        }
    }
}

/// Locks held from `prepare_all_for_key_update` until
/// `complete_key_update_for_all`.
struct KeyUpdate {
    guards: Vec<HandleGuard>,
    _paused: OwnedRwLockWriteGuard<()>,
}

pub(crate) struct RegistryInner {
    table: DashMap<PathBuf, Slot>,
    cipher: parking_lot::RwLock<Arc<dyn CipherBackend>>,
    config: RegistryConfig,
    ids: IdGenerator,
    opened: AtomicU64,
    /// Taken shared by every lock acquisition and exclusively by key
    /// updates.
    rotation: Arc<RwLock<()>>,
    /// Set while a key update holds every lock, also serializes rotations.
    held: Mutex<Option<KeyUpdate>>,
}

impl RegistryInner {
    pub(crate) fn cipher(&self) -> Arc<dyn CipherBackend> {
        self.cipher.read().clone()
    }

    /// The handle registered at `path`, if it is ready and still `id`.
    pub(crate) fn live_handle(&self, path: &Path, id: HandleId) -> Option<Arc<ManagedFileHandle>> {
        let slot = self.table.get(path)?;
        if slot.id != id {
            return None;
        }
        slot.ready()
    }

    /// Removes the slot at `path` only if it still holds handle `id`.
    pub(crate) fn remove_slot(&self, path: &Path, id: HandleId) -> Option<HandleId> {
        self.table
            .remove_if(path, |_, slot| slot.id == id)
            .map(|(_, slot)| slot.id)
    }
}

/// Owns every [`ManagedFileHandle`] and guarantees one live handle per path.
///
/// Paths are used as given; callers that mix relative and absolute forms of
/// the same file get two handles.
#[derive(Clone)]
pub struct FileHandleRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for FileHandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandleRegistry")
            .field("handles", &self.inner.table.len())
            .field("cipher", &self.inner.cipher())
            .field("config", &self.inner.config)
            .finish()
    }
}

async fn open_handle(
    registry: std::sync::Weak<RegistryInner>,
    path: PathBuf,
    id: HandleId,
) -> Result<Arc<ManagedFileHandle>, OpenError> {
    let fail = |e| OpenError::new(path.clone(), e);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => {
            return Err(fail(std::io::Error::other("path is a directory")));
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(fail(e)),
    }
    let Some(inner) = registry.upgrade() else {
        return Err(fail(std::io::Error::other("registry was dropped")));
    };
    inner.opened.fetch_add(1, Ordering::Relaxed);
    debug!(handle = %id, path = %path.display(), "handle opened");
    Ok(Arc::new(ManagedFileHandle::new(
        id,
        path,
        inner.config.cleanup_delay(),
        inner.rotation.clone(),
        registry,
    )))
}

impl FileHandleRegistry {
    pub fn new(cipher: Arc<dyn CipherBackend>, config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                table: DashMap::new(),
                cipher: parking_lot::RwLock::new(cipher),
                config,
                ids: IdGenerator::new(),
                opened: AtomicU64::new(0),
                rotation: Arc::new(RwLock::new(())),
                held: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn cipher(&self) -> Arc<dyn CipherBackend> {
        self.inner.cipher()
    }

    /// Returns the handle for `path`, creating it if needed.
    ///
    /// Concurrent callers for the same path share one open. If the open
    /// fails every waiter gets the same error and the slot is cleared so the
    /// next call retries.
    pub async fn get_handle(&self, path: impl AsRef<Path>) -> FilesResult<Arc<ManagedFileHandle>> {
        let path = path.as_ref().to_path_buf();
        let slot = match self.inner.table.entry(path.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let id = HandleId(self.inner.ids.next_u64());
                let handle = open_handle(Arc::downgrade(&self.inner), path.clone(), id)
                    .boxed()
                    .shared();
                entry.insert(Slot { id, handle }).clone()
            }
        };

        match slot.handle.await {
            Ok(handle) => Ok(handle),
            Err(err) => {
                if self.inner.remove_slot(&path, slot.id).is_some() {
                    warn!(handle = %slot.id, "open failed, slot cleared: {err}");
                }
                Err(err.into())
            }
        }
    }

    /// Gets the handle for `path` and locks it.
    ///
    /// If the handle is evicted between lookup and acquisition a fresh one
    /// is requested.
    pub async fn lock(&self, path: impl AsRef<Path>) -> FilesResult<HandleGuard> {
        let path = path.as_ref();
        loop {
            let handle = self.get_handle(path).await?;
            match handle.acquire_lock().await {
                Ok(guard) => return Ok(guard),
                Err(HandleError::IllegalState(_)) if handle.is_evicted() => {
                    debug!(handle = %handle.id(), "handle evicted while waiting, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Evicts the handle at `path` if it is still `expected`, unlocked and
    /// unreferenced. Returns false and leaves the handle alone otherwise.
    pub fn cleanup_interface(&self, path: impl AsRef<Path>, expected: HandleId) -> bool {
        let path = path.as_ref();
        let Some(handle) = self.inner.live_handle(path, expected) else {
            return false;
        };
        let evicted = handle.try_evict(None);
        if !evicted {
            debug!(handle = %expected, path = %path.display(), "handle busy, not removed");
        }
        evicted
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.inner.table.contains_key(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.inner.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.table.is_empty()
    }

    /// Number of handles constructed over the registry's lifetime.
    pub fn handles_opened(&self) -> u64 {
        self.inner.opened.load(Ordering::Relaxed)
    }

    /// Ready handles, sorted by path.
    pub fn handles(&self) -> Vec<Arc<ManagedFileHandle>> {
        let mut handles: Vec<_> = self
            .inner
            .table
            .iter()
            .filter_map(|entry| entry.value().ready())
            .collect();
        handles.sort_by(|a, b| a.path().cmp(b.path()));
        handles
    }

    /// Evicts every unlocked handle with no references. Returns the count.
    pub fn cleanup_unused_interfaces(&self) -> usize {
        let removed = self
            .handles()
            .into_iter()
            .filter(|handle| handle.try_evict(None))
            .count();
        if removed > 0 {
            info!(removed, "swept idle handles");
        }
        removed
    }

    /// Closes the rotation gate, then locks every registered handle in path
    /// order. Handles opened afterwards cannot be locked until the returned
    /// update is dropped.
    async fn pause_all(&self) -> KeyUpdate {
        let paused = self.inner.rotation.clone().write_owned().await;
        let pending: Vec<OpenFuture> = self
            .inner
            .table
            .iter()
            .map(|entry| entry.value().handle.clone())
            .collect();
        let mut handles: Vec<_> = join_all(pending)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect();
        handles.sort_by(|a, b| a.path().cmp(b.path()));
        let guards = join_all(handles.iter().map(|handle| handle.lock_for_update()))
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect();
        KeyUpdate {
            guards,
            _paused: paused,
        }
    }

    /// Locks every registered handle. Completes once all locks are held.
    pub async fn prepare_all_for_key_update(&self) -> FilesResult<usize> {
        let mut held = self.inner.held.lock().await;
        if held.is_some() {
            return Err(HandleError::illegal("key update already in progress"));
        }
        let update = self.pause_all().await;
        let locked = update.guards.len();
        *held = Some(update);
        debug!(handles = locked, "all handles locked for key update");
        Ok(locked)
    }

    /// Releases the locks taken by [`Self::prepare_all_for_key_update`].
    pub async fn complete_key_update_for_all(&self) -> usize {
        let update = self.inner.held.lock().await.take();
        let released = update.as_ref().map_or(0, |update| update.guards.len());
        drop(update);
        debug!(handles = released, "key update complete");
        released
    }

    /// Re-encrypts every registered file with `new_cipher` and installs it.
    ///
    /// All handles stay locked for the whole rotation and no new lock is
    /// granted until it finishes. If any file fails,
    /// files already rewritten are restored with the old cipher and the old
    /// cipher stays installed. Returns the number of files rewritten.
    pub async fn rotate_key(&self, new_cipher: Arc<dyn CipherBackend>) -> FilesResult<usize> {
        let held = self.inner.held.lock().await;
        if held.is_some() {
            return Err(HandleError::illegal("key update already in progress"));
        }
        let update = self.pause_all().await;
        let old_cipher = self.cipher();

        let mut plaintexts = Vec::new();
        for guard in &update.guards {
            let handle = guard.handle();
            if !handle.is_file().await {
                continue;
            }
            let stream = old_cipher.decrypt(handle.path()).await?;
            plaintexts.push((handle.path().to_path_buf(), collect_stream(stream).await?));
        }

        for (done, (path, plaintext)) in plaintexts.iter().enumerate() {
            if let Err(err) = new_cipher
                .encrypt_and_swap(path, bytes_stream(plaintext.clone()))
                .await
            {
                error!(path = %path.display(), "key rotation failed: {err:#}");
                for (path, plaintext) in &plaintexts[..done] {
                    if let Err(restore) = old_cipher
                        .encrypt_and_swap(path, bytes_stream(plaintext.clone()))
                        .await
                    {
                        error!(path = %path.display(), "rollback failed: {restore:#}");
                    }
                }
                return Err(err.into());
            }
        }

        *self.inner.cipher.write() = new_cipher;
        info!(files = plaintexts.len(), "key rotated");
        drop(update);
        drop(held);
        Ok(plaintexts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlaintextCipher;
    use std::time::Duration;

    fn registry(delay_ms: u64) -> FileHandleRegistry {
        FileHandleRegistry::new(
            Arc::new(PlaintextCipher),
            RegistryConfig::with_cleanup_delay(Duration::from_millis(delay_ms)),
        )
    }

    #[tokio::test]
    async fn same_path_same_handle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(60_000);
        let a = registry.get_handle(dir.path().join("x")).await.unwrap();
        let b = registry.get_handle(dir.path().join("x")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.handles_opened(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_interface_is_identity_guarded() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(60_000);
        let path = dir.path().join("x");
        let first = registry.get_handle(&path).await.unwrap();

        assert!(registry.cleanup_interface(&path, first.id()));
        assert!(first.is_evicted());
        let second = registry.get_handle(&path).await.unwrap();
        assert_ne!(first.id(), second.id());

        assert!(!registry.cleanup_interface(&path, first.id()));
        assert!(registry.contains(&path));
        assert!(first.acquire_lock().await.is_err());
    }

    #[tokio::test]
    async fn sweep_skips_locked_and_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(60_000);
        let locked = registry.lock(dir.path().join("locked")).await.unwrap();
        let referenced = registry.get_handle(dir.path().join("referenced")).await.unwrap();
        referenced.add_reference("reader").unwrap();
        registry.get_handle(dir.path().join("idle")).await.unwrap();

        assert_eq!(registry.cleanup_unused_interfaces(), 1);
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(dir.path().join("idle")));
        drop(locked);
    }
}
