// Process wide bookkeeping shared by every drawable
//
// The kernel handle space and the server's pixmap space are numbered
// independently, and a client thread may close a handle before or after
// we are done with it. The three tables here are what let us tell those
// orders apart. All of them live behind one lock.
use crate::drawable::DrawableHandle;
use crate::present::{ConnectionId, DrawableId, GemHandle, KernelDevice};
use crate::{Dri2to3Error, Result};
use utils::{log, Context};

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::os::unix::io::{BorrowedFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sizes of handles the client is about to open by name.
///
/// A DRI2 client gets a buffer name in the GetBuffers reply and then
/// opens it with GEM_OPEN, which has to report the object size. We
/// record the size when handing the name out and consume it on the
/// open. Every record is consumed exactly once, so nothing stale
/// survives the kernel reusing a handle number.
#[derive(Debug, Default)]
pub struct HandleSizes {
    /// Most recent record last. More than one record per handle only
    /// exists briefly while two threads race.
    hs_sizes: HashMap<GemHandle, Vec<u64>>,
}

impl HandleSizes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, handle: GemHandle, size: u64) {
        self.hs_sizes.entry(handle).or_default().push(size);
    }

    /// Remove and return the most recent size recorded for `handle`
    pub fn consume(&mut self, handle: GemHandle) -> Result<u64> {
        let sizes = self
            .hs_sizes
            .get_mut(&handle)
            .ok_or(Dri2to3Error::UNKNOWN_HANDLE(handle))?;
        let size = sizes.pop().ok_or(Dri2to3Error::UNKNOWN_HANDLE(handle))?;

        if sizes.is_empty() {
            self.hs_sizes.remove(&handle);
        }

        Ok(size)
    }

    /// Number of records waiting to be consumed
    pub fn len(&self) -> usize {
        self.hs_sizes.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hs_sizes.is_empty()
    }
}

/// GEM closes that were swallowed because the other owner of the handle
/// still had it.
///
/// Each handle we give out has two owners, the client and the pool. The
/// first one to close is recorded here and swallowed, the second one
/// finds the record and the close goes through to the kernel.
#[derive(Debug, Default)]
pub struct DeferredCloses {
    dc_pending: HashSet<(RawFd, GemHandle)>,
}

impl DeferredCloses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the deferred close for `(fd, handle)`, returning if there
    /// was one.
    pub fn try_reconcile(&mut self, fd: RawFd, handle: GemHandle) -> bool {
        self.dc_pending.remove(&(fd, handle))
    }

    /// Record a close for `(fd, handle)`. Returns false if one was
    /// already pending, in which case the two collapse into one.
    pub fn defer(&mut self, fd: RawFd, handle: GemHandle) -> bool {
        self.dc_pending.insert((fd, handle))
    }

    pub fn is_pending(&self, fd: RawFd, handle: GemHandle) -> bool {
        self.dc_pending.contains(&(fd, handle))
    }

    pub fn len(&self) -> usize {
        self.dc_pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dc_pending.is_empty()
    }
}

/// What the caller of `close_handle` should do with its close request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseAction {
    /// Both owners are done, issue the real close
    Forward,
    /// The other owner still holds the handle, pretend it succeeded
    Deferred,
}

/// Drawables are only unique per connection
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DrawableKey {
    pub conn: ConnectionId,
    pub drawable: DrawableId,
}

impl DrawableKey {
    pub fn new(conn: ConnectionId, drawable: DrawableId) -> Self {
        Self { conn, drawable }
    }
}

#[derive(Default)]
struct RegistryState {
    rs_sizes: HandleSizes,
    rs_closes: DeferredCloses,
    rs_drawables: HashMap<DrawableKey, DrawableHandle>,
}

/// The shared state of the layer.
///
/// There is normally one of these per process (`Registry::global`), but
/// it can also be created and injected directly.
///
/// Lock order: a caller holding a drawable lock may take this lock. This
/// lock is never held while taking a drawable lock.
#[derive(Default)]
pub struct Registry {
    r_state: Mutex<RegistryState>,
}

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<Registry> = Arc::new(Registry::new());
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process wide registry, created on first use
    pub fn global() -> Arc<Registry> {
        GLOBAL_REGISTRY.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every update below is a single map operation, so a panicking
        // holder cannot leave the tables half written
        self.r_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_handle_size(&self, handle: GemHandle, size: u64) {
        self.lock().rs_sizes.record(handle, size);
    }

    pub fn consume_handle_size(&self, handle: GemHandle) -> Result<u64> {
        self.lock().rs_sizes.consume(handle)
    }

    pub fn pending_handle_sizes(&self) -> usize {
        self.lock().rs_sizes.len()
    }

    pub fn try_reconcile_close(&self, fd: RawFd, handle: GemHandle) -> bool {
        self.lock().rs_closes.try_reconcile(fd, handle)
    }

    pub fn defer_close(&self, fd: RawFd, handle: GemHandle) {
        if !self.lock().rs_closes.defer(fd, handle) {
            log::debug!(
                "GEM close of handle {} on fd {} was already deferred",
                handle,
                fd
            );
        }
    }

    pub fn is_close_deferred(&self, fd: RawFd, handle: GemHandle) -> bool {
        self.lock().rs_closes.is_pending(fd, handle)
    }

    pub fn deferred_close_count(&self) -> usize {
        self.lock().rs_closes.len()
    }

    /// Decide what to do with a close of `handle` from one of its two
    /// owners.
    ///
    /// The reconcile and the defer happen under one lock acquisition, so
    /// two racing closes cannot both be deferred.
    pub fn close_handle(&self, fd: RawFd, handle: GemHandle) -> CloseAction {
        let mut state = self.lock();

        if state.rs_closes.try_reconcile(fd, handle) {
            return CloseAction::Forward;
        }

        state.rs_closes.defer(fd, handle);
        CloseAction::Deferred
    }

    /// Register a drawable, returning any stale entry it replaced
    pub fn insert_drawable(
        &self,
        key: DrawableKey,
        drawable: DrawableHandle,
    ) -> Option<DrawableHandle> {
        self.lock().rs_drawables.insert(key, drawable)
    }

    pub fn get_drawable(&self, key: DrawableKey) -> Result<DrawableHandle> {
        self.lock()
            .rs_drawables
            .get(&key)
            .cloned()
            .ok_or(Dri2to3Error::UNKNOWN_DRAWABLE(key.conn, key.drawable))
    }

    pub fn remove_drawable(&self, key: DrawableKey) -> Option<DrawableHandle> {
        self.lock().rs_drawables.remove(&key)
    }

    pub fn drawable_count(&self) -> usize {
        self.lock().rs_drawables.len()
    }
}

/// Import a dmabuf into `kernel`, remembering its size for the GEM_OPEN
/// that will follow.
pub fn import(
    registry: &Registry,
    kernel: &dyn KernelDevice,
    fd: BorrowedFd<'_>,
) -> Result<GemHandle> {
    let (handle, size) = kernel
        .import_fd(fd)
        .context("Could not import dmabuf into the kernel device")?;

    log::debug!("Imported dmabuf as handle {} ({} bytes)", handle, size);
    registry.record_handle_size(handle, size);

    Ok(handle)
}
