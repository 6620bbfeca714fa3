// The collaborators we translate onto
//
// The kernel side hands out GEM buffer objects. The server side speaks
// DRI3 (turn a dmabuf into a pixmap) and Present (put a pixmap on screen
// and tell us when it has let go of it). Both are traits so the pool can
// be driven by fakes in tests.
use bitflags::bitflags;
use utils::Result;

use std::os::unix::io::{BorrowedFd, OwnedFd, RawFd};
use std::time::Duration;

/// A kernel GEM handle. Handle numbers are reused by the kernel.
pub type GemHandle = u32;
/// An X drawable (window or pixmap)
pub type DrawableId = u32;
/// The server side identity of one of our buffers
pub type PixmapId = u32;

// Connection Id
//
// This uniquely identifies one connection to the display server.
// Drawable ids are only unique within a connection.
#[derive(Copy, Clone, PartialEq, Debug, Eq, Hash)]
pub struct ConnectionId(pub u64);

bitflags! {
    /// Present pixmap options. Values match the Present extension.
    pub struct PresentOptions: u32 {
        const NONE = 0;
        const ASYNC = 1;
        const COPY = 2;
        const UST = 4;
        const SUBOPTIMAL = 8;
    }
}

bitflags! {
    /// Present event selection mask
    pub struct EventMask: u32 {
        const NO_EVENT = 0;
        const CONFIGURE_NOTIFY = 1;
        const COMPLETE_NOTIFY = 2;
        const IDLE_NOTIFY = 4;
        const REDIRECT_NOTIFY = 8;
    }
}

/// Drawable geometry as reported by the server
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub depth: u8,
}

/// A freshly allocated dumb buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DumbBuffer {
    pub handle: GemHandle,
    /// Bytes per scanline. May be larger than width * cpp.
    pub pitch: u32,
    /// Total size in bytes
    pub size: u64,
}

/// How the server should interpret the dmabuf behind a new pixmap
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PixmapLayout {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub depth: u8,
    pub bpp: u8,
}

/// Result of a real kernel close
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseStatus {
    Closed,
    /// The kernel no longer knew the handle
    AlreadyClosed,
}

/// Our selection of Present events on one drawable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSubscription {
    /// The Present event id
    pub es_eid: u32,
    pub es_drawable: DrawableId,
}

/// The Present notifications the pool cares about
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentEvent {
    /// The drawable changed size, every buffer we have is now stale
    ConfigureNotify { width: u32, height: u32 },
    /// The server is done reading from `pixmap`
    IdleNotify { pixmap: PixmapId, serial: u32 },
    /// A present request finished
    CompleteNotify { serial: u32, msc: u64 },
    /// Anything else delivered on our event id
    Other(u16),
}

/// The outcome of blocking on the event queue
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaitResult {
    Event(PresentEvent),
    /// The caller's timeout expired before anything arrived
    TimedOut,
    /// The connection is gone and no more events will arrive
    Closed,
}

/// The kernel buffer allocation device
pub trait KernelDevice: Send + Sync {
    /// The descriptor the client uses for this device. This is what
    /// deferred closes are keyed on.
    fn raw_fd(&self) -> RawFd;

    /// Allocate a linear buffer of `width` x `height` pixels
    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> Result<DumbBuffer>;

    /// Share `handle` as a dmabuf
    fn export_handle(&self, handle: GemHandle) -> Result<OwnedFd>;

    /// Turn a dmabuf into a handle on this device, returning the size
    /// of the underlying object
    fn import_fd(&self, fd: BorrowedFd<'_>) -> Result<(GemHandle, u64)>;

    /// Really close `handle`. Callers go through the deferred close
    /// ledger before getting here.
    fn gem_close(&self, handle: GemHandle) -> Result<CloseStatus>;
}

/// A display server connection supporting DRI3 and Present
pub trait PresentConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Negotiate the DRI3 version, returning what the server supports
    fn query_dri3_version(&self, major: u32, minor: u32) -> Result<(u32, u32)>;

    fn get_geometry(&self, drawable: DrawableId) -> Result<Geometry>;

    /// Create a pixmap backed by the dmabuf `fd`. Ownership of the fd
    /// passes to the server.
    fn create_pixmap_from_buffer(
        &self,
        drawable: DrawableId,
        fd: OwnedFd,
        layout: &PixmapLayout,
    ) -> Result<PixmapId>;

    fn present_pixmap(
        &self,
        drawable: DrawableId,
        pixmap: PixmapId,
        serial: u32,
        options: PresentOptions,
    ) -> Result<()>;

    fn select_input(&self, drawable: DrawableId, mask: EventMask) -> Result<EventSubscription>;

    fn unselect_input(&self, sub: &EventSubscription) -> Result<()>;

    /// Return the next queued event without blocking
    fn poll_event(&self, sub: &EventSubscription) -> Option<PresentEvent>;

    /// Block until an event arrives, the timeout expires or the
    /// connection closes. A `None` timeout blocks indefinitely.
    fn wait_event(&self, sub: &EventSubscription, timeout: Option<Duration>) -> WaitResult;

    fn free_pixmap(&self, pixmap: PixmapId) -> Result<()>;
}
