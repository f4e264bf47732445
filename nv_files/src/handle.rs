//! Per-path file handle: a fair lock, a reference set and deferred cleanup.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use nv_core::{Note, NoteList, NoteMap, NoteResult};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, trace};

use crate::cipher::{ByteStream, CipherBackend, bytes_stream, collect_stream};
use crate::registry::RegistryInner;
use crate::spawn::spawn_delayed;
use crate::{FilesResult, HandleError};

/// Identity of one handle instance. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u64);

impl HandleId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Holder of a reference on a handle, usually a node or session id.
pub type ReferenceId = Note;

#[derive(Default)]
struct HandleState {
    refs: HashSet<ReferenceId>,
    /// Bumped every time a cleanup timer is armed; a timer only acts if the
    /// epoch it captured is still current.
    cleanup_epoch: u64,
}

/// Exclusive, reference-counted access to one backing file.
///
/// Created only by [`crate::FileHandleRegistry`]; at most one live handle
/// exists per path. Once evicted a handle cannot be locked again and callers
/// must ask the registry for a fresh one.
pub struct ManagedFileHandle {
    id: HandleId,
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    /// Registry-wide gate, held exclusively while a key update is running.
    rotation: Arc<RwLock<()>>,
    locked: AtomicBool,
    evicted: AtomicBool,
    state: parking_lot::Mutex<HandleState>,
    cleanup_delay: Duration,
    registry: Weak<RegistryInner>,
}

impl fmt::Debug for ManagedFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedFileHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("locked", &self.is_locked())
            .field("evicted", &self.is_evicted())
            .field("references", &self.reference_count())
            .finish()
    }
}

/// Proof that the holder owns a handle's lock. Dropping it releases the lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct HandleGuard {
    handle: Arc<ManagedFileHandle>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl HandleGuard {
    pub fn handle_id(&self) -> HandleId {
        self.handle.id
    }

    pub fn handle(&self) -> &Arc<ManagedFileHandle> {
        &self.handle
    }

    pub fn path(&self) -> &Path {
        &self.handle.path
    }

    /// Releases the lock now instead of at end of scope.
    pub fn release(self) {}
}

impl fmt::Debug for HandleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleGuard")
            .field("handle", &self.handle.id)
            .field("path", &self.handle.path)
            .finish()
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.handle.locked.store(false, Ordering::SeqCst);
            drop(permit);
            trace!(handle = %self.handle.id, "lock released");
            self.handle.arm_cleanup_if_idle();
        }
    }
}

impl ManagedFileHandle {
    pub(crate) fn new(
        id: HandleId,
        path: PathBuf,
        cleanup_delay: Duration,
        rotation: Arc<RwLock<()>>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        Self {
            id,
            path,
            lock: Arc::new(Mutex::new(())),
            rotation,
            locked: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
            state: parking_lot::Mutex::new(HandleState::default()),
            cleanup_delay,
            registry,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    pub fn reference_count(&self) -> usize {
        self.state.lock().refs.len()
    }

    pub fn has_reference(&self, id: &ReferenceId) -> bool {
        self.state.lock().refs.contains(id)
    }

    /// Waits for the lock. Waiters are served in FIFO order, and none are
    /// admitted while a registry-wide key update is running.
    ///
    /// Cancelling the returned future while it waits leaves the lock
    /// untouched.
    pub async fn acquire_lock(self: &Arc<Self>) -> FilesResult<HandleGuard> {
        if self.is_evicted() {
            return Err(self.evicted_error());
        }
        let permit = {
            let _rotation = self.rotation.read().await;
            self.lock.clone().lock_owned().await
        };
        let guard = self.guard(permit)?;
        debug!(handle = %self.id, path = %self.path.display(), "lock acquired");
        Ok(guard)
    }

    /// Takes the lock only if it is free right now.
    pub fn try_acquire_lock(self: &Arc<Self>) -> FilesResult<Option<HandleGuard>> {
        if self.is_evicted() {
            return Err(self.evicted_error());
        }
        let Ok(_rotation) = self.rotation.try_read() else {
            return Ok(None);
        };
        let Ok(permit) = self.lock.clone().try_lock_owned() else {
            return Ok(None);
        };
        self.guard(permit).map(Some)
    }

    /// Lock path for the key update itself, which already holds the
    /// rotation gate exclusively.
    pub(crate) async fn lock_for_update(self: &Arc<Self>) -> FilesResult<HandleGuard> {
        let permit = self.lock.clone().lock_owned().await;
        self.guard(permit)
    }

    fn guard(self: &Arc<Self>, permit: OwnedMutexGuard<()>) -> FilesResult<HandleGuard> {
        if self.is_evicted() {
            return Err(self.evicted_error());
        }
        self.locked.store(true, Ordering::SeqCst);
        Ok(HandleGuard {
            handle: self.clone(),
            permit: Some(permit),
        })
    }

    /// Same as [`ManagedFileHandle::acquire_lock`]; the guard is held for the
    /// duration of a key rotation.
    pub async fn prepare_for_key_update(self: &Arc<Self>) -> FilesResult<HandleGuard> {
        self.acquire_lock().await
    }

    /// Same as dropping the guard.
    pub fn complete_key_update(&self, guard: HandleGuard) -> FilesResult<()> {
        self.check_guard(&guard)?;
        guard.release();
        Ok(())
    }

    /// Registers `id` as a user of this handle.
    pub fn add_reference(&self, id: impl Into<ReferenceId>) -> FilesResult<bool> {
        let mut state = self.state.lock();
        if self.is_evicted() {
            return Err(self.evicted_error());
        }
        Ok(state.refs.insert(id.into()))
    }

    /// Drops `id`. Removing the last reference arms the deferred cleanup.
    pub fn remove_reference(&self, id: &ReferenceId) -> bool {
        let (removed, now_empty) = {
            let mut state = self.state.lock();
            let removed = state.refs.remove(id);
            (removed, state.refs.is_empty())
        };
        if removed && now_empty {
            self.arm_cleanup();
        }
        removed
    }

    fn arm_cleanup_if_idle(&self) {
        if self.state.lock().refs.is_empty() {
            self.arm_cleanup();
        }
    }

    fn arm_cleanup(&self) {
        if self.is_evicted() {
            return;
        }
        let epoch = {
            let mut state = self.state.lock();
            state.cleanup_epoch += 1;
            state.cleanup_epoch
        };
        let registry = self.registry.clone();
        let path = self.path.clone();
        let id = self.id;
        let scheduled = spawn_delayed(self.cleanup_delay, async move {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if let Some(handle) = registry.live_handle(&path, id) {
                handle.try_evict(Some(epoch));
            }
        });
        if scheduled {
            trace!(handle = %self.id, epoch, delay = ?self.cleanup_delay, "cleanup armed");
        } else {
            debug!(handle = %self.id, "no runtime, cleanup left to the sweep");
        }
    }

    /// Evicts this handle if it is unlocked and unreferenced.
    ///
    /// With `Some(epoch)` the eviction is skipped when a newer cleanup timer
    /// has been armed since.
    pub(crate) fn try_evict(&self, expected_epoch: Option<u64>) -> bool {
        if self.is_evicted() {
            return false;
        }
        let Ok(_permit) = self.lock.clone().try_lock_owned() else {
            return false;
        };
        let state = self.state.lock();
        if !state.refs.is_empty() {
            return false;
        }
        if expected_epoch.is_some_and(|epoch| epoch != state.cleanup_epoch) {
            return false;
        }
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        if registry.remove_slot(&self.path, self.id).is_none() {
            return false;
        }
        self.evicted.store(true, Ordering::SeqCst);
        drop(state);
        debug!(handle = %self.id, path = %self.path.display(), "handle evicted");
        true
    }

    fn evicted_error(&self) -> HandleError {
        HandleError::illegal(format!(
            "handle {} for {} was evicted",
            self.id,
            self.path.display()
        ))
    }

    fn check_guard(&self, guard: &HandleGuard) -> FilesResult<()> {
        if guard.handle.id != self.id || !std::ptr::eq(Arc::as_ptr(&guard.handle), self) {
            return Err(HandleError::illegal(format!(
                "guard for handle {} used on handle {}",
                guard.handle.id, self.id
            )));
        }
        Ok(())
    }

    fn cipher(&self) -> FilesResult<Arc<dyn CipherBackend>> {
        self.registry
            .upgrade()
            .map(|registry| registry.cipher())
            .ok_or_else(|| HandleError::illegal("registry was dropped"))
    }

    pub async fn is_file(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Size of the backing file on disk; zero when it does not exist yet.
    pub async fn file_size(&self) -> FilesResult<u64> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Streams the current plaintext into `source_sink` while `dest_stream`
    /// is encrypted and swapped into place.
    ///
    /// Fails with `IllegalState` before touching the file when `guard` was
    /// not issued by this handle. Returns `(bytes read, bytes written)`.
    pub async fn read_write_file<W>(
        &self,
        guard: &HandleGuard,
        source_sink: &mut W,
        dest_stream: ByteStream,
    ) -> FilesResult<(u64, u64)>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.check_guard(guard)?;
        let cipher = self.cipher()?;
        let source = cipher.decrypt(&self.path).await?;

        let read = async {
            let mut reader = tokio_util::io::StreamReader::new(source);
            let n = tokio::io::copy(&mut reader, source_sink).await?;
            source_sink.flush().await?;
            Ok::<_, HandleError>(n)
        };
        let write = async {
            cipher
                .encrypt_and_swap(&self.path, dest_stream)
                .await
                .map_err(HandleError::from)
        };
        let (read, written) = tokio::try_join!(read, write)?;
        debug!(handle = %self.id, read, written, "file rewritten");
        Ok((read, written))
    }

    pub async fn read_file(&self, guard: &HandleGuard) -> FilesResult<Bytes> {
        self.check_guard(guard)?;
        let stream = self.cipher()?.decrypt(&self.path).await?;
        Ok(collect_stream(stream).await?)
    }

    pub async fn write_file(&self, guard: &HandleGuard, contents: Bytes) -> FilesResult<u64> {
        self.check_guard(guard)?;
        let written = self
            .cipher()?
            .encrypt_and_swap(&self.path, bytes_stream(contents))
            .await?;
        Ok(written)
    }

    /// The file's plaintext as a raw note.
    pub async fn read_note(&self, guard: &HandleGuard) -> FilesResult<Note> {
        Ok(Note::raw(self.read_file(guard).await?))
    }

    pub async fn write_note(&self, guard: &HandleGuard, note: &Note) -> FilesResult<u64> {
        self.write_file(guard, note.bytes()).await
    }

    pub async fn read_map(&self, guard: &HandleGuard) -> FilesResult<NoteMap> {
        Ok(NoteMap::parse(self.read_note(guard).await?)?)
    }

    pub async fn write_map(&self, guard: &HandleGuard, map: &NoteMap) -> FilesResult<u64> {
        self.write_note(guard, &map.to_note()).await
    }

    pub async fn read_list(&self, guard: &HandleGuard) -> FilesResult<NoteList> {
        Ok(NoteList::parse(self.read_note(guard).await?)?)
    }

    pub async fn write_list(&self, guard: &HandleGuard, list: &NoteList) -> FilesResult<u64> {
        self.write_note(guard, &list.to_note()).await
    }

    /// Read-modify-write of the file as a [`NoteMap`]. Nothing is written if
    /// `edit` fails.
    pub async fn update_map<R>(
        &self,
        guard: &HandleGuard,
        edit: impl FnOnce(&mut NoteMap) -> NoteResult<R>,
    ) -> FilesResult<R> {
        let mut map = self.read_map(guard).await?;
        let result = edit(&mut map)?;
        self.write_map(guard, &map).await?;
        Ok(result)
    }

    /// Read-modify-write of the file as a [`NoteList`].
    pub async fn update_list<R>(
        &self,
        guard: &HandleGuard,
        edit: impl FnOnce(&mut NoteList) -> NoteResult<R>,
    ) -> FilesResult<R> {
        let mut list = self.read_list(guard).await?;
        let result = edit(&mut list)?;
        self.write_list(guard, &list).await?;
        Ok(result)
    }
}
