// One kernel buffer object and its server side pixmap
use crate::present::{GemHandle, PixmapId};

/// The client visible description of a buffer.
///
/// This is what `acquire` hands out. It is a copy, the pool keeps
/// ownership of the buffer itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    pub pixmap: PixmapId,
    pub handle: GemHandle,
    pub pitch: u32,
    /// bytes per pixel
    pub cpp: u32,
    pub width: u32,
    pub height: u32,
    pub size: u64,
}

/// A pool buffer
///
/// A buffer is freed only once it is both stale and released by the
/// server, i.e. `dead && !busy`.
#[derive(Debug)]
pub struct Buffer {
    pub(crate) b_info: BufferInfo,
    /// The server may still be reading from this buffer. Set on swap,
    /// cleared by an IdleNotify naming our pixmap.
    pub(crate) b_busy: bool,
    /// The drawable was reconfigured after this was allocated, so the
    /// geometry no longer matches.
    pub(crate) b_dead: bool,
}

impl Buffer {
    pub(crate) fn new(info: BufferInfo) -> Self {
        Self {
            b_info: info,
            b_busy: false,
            b_dead: false,
        }
    }

    pub fn info(&self) -> &BufferInfo {
        &self.b_info
    }

    pub fn is_busy(&self) -> bool {
        self.b_busy
    }

    pub fn is_dead(&self) -> bool {
        self.b_dead
    }

    /// Can this buffer be destroyed right now
    pub fn is_reclaimable(&self) -> bool {
        self.b_dead && !self.b_busy
    }
}
