// The per-drawable buffer pool
//
// A drawable owns up to `max_buffers` kernel buffers. At most one of them
// is current (handed to the client to render into), the rest have been
// swapped and sit in the retired list until the server lets go of them.
use crate::buffer::{Buffer, BufferInfo};
use crate::config::CreateInfo;
use crate::present::{
    DrawableId, DumbBuffer, EventMask, EventSubscription, KernelDevice, PixmapId, PixmapLayout,
    PresentConnection,
};
use crate::registry::{CloseAction, Registry};
use crate::Result;
use utils::{anyhow, log, Context};

use std::collections::VecDeque;
use std::convert::TryFrom;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How drawables are shared between the registry and callers
pub type DrawableHandle = Arc<Mutex<Drawable>>;

/// One DRI2 drawable and its buffer pool.
///
/// Access to a single drawable is serialized by the mutex in
/// `DrawableHandle`. The registry lock may be taken while holding it.
pub struct Drawable {
    pub(crate) d_conn: Arc<dyn PresentConnection>,
    pub(crate) d_kernel: Arc<dyn KernelDevice>,
    pub(crate) d_drawable: DrawableId,
    /// Our Present event selection for this drawable
    pub(crate) d_events: EventSubscription,
    /// Serial of the last present request we sent
    pub(crate) d_present_serial: u32,
    /// Serial of the last present the server reported complete
    pub(crate) d_complete_serial: u32,
    /// Swap buffer count
    pub(crate) d_sbc: u64,
    d_max_buffers: usize,
    d_bytes_per_pixel: u32,
    /// Every buffer we own, current and retired
    pub(crate) d_num_buffers: usize,
    /// The buffer checked out to the client
    pub(crate) d_cur: Option<Buffer>,
    /// Swapped buffers in the order they were retired
    pub(crate) d_buffers: VecDeque<Buffer>,
}

impl Drawable {
    /// Set up the pool for `drawable`, selecting the Present events that
    /// drive buffer recycling.
    pub fn new(
        conn: Arc<dyn PresentConnection>,
        kernel: Arc<dyn KernelDevice>,
        drawable: DrawableId,
        info: &CreateInfo,
    ) -> Result<Self> {
        let events = conn
            .select_input(
                drawable,
                EventMask::CONFIGURE_NOTIFY | EventMask::IDLE_NOTIFY,
            )
            .context("Could not select Present events")?;

        Ok(Self {
            d_conn: conn,
            d_kernel: kernel,
            d_drawable: drawable,
            d_events: events,
            d_present_serial: 0,
            d_complete_serial: 0,
            d_sbc: 0,
            d_max_buffers: info.max_buffers,
            d_bytes_per_pixel: info.bytes_per_pixel,
            d_num_buffers: 0,
            d_cur: None,
            d_buffers: VecDeque::new(),
        })
    }

    pub fn id(&self) -> DrawableId {
        self.d_drawable
    }

    pub fn num_buffers(&self) -> usize {
        self.d_num_buffers
    }

    pub fn max_buffers(&self) -> usize {
        self.d_max_buffers
    }

    pub fn current(&self) -> Option<&Buffer> {
        self.d_cur.as_ref()
    }

    pub fn retired(&self) -> impl Iterator<Item = &Buffer> {
        self.d_buffers.iter()
    }

    pub fn sbc(&self) -> u64 {
        self.d_sbc
    }

    pub fn present_serial(&self) -> u32 {
        self.d_present_serial
    }

    pub fn complete_serial(&self) -> u32 {
        self.d_complete_serial
    }

    pub(crate) fn drm_fd(&self) -> RawFd {
        self.d_kernel.raw_fd()
    }

    /// Get a buffer for the client to render into.
    ///
    /// This never returns a buffer the server may still be reading from,
    /// and never grows the pool past `max_buffers`. If the pool is full
    /// we block on the Present queue for up to `timeout` in total.
    ///
    /// Calling this twice without a swap in between returns the same
    /// buffer again.
    ///
    /// Returns `None` if allocation fails, the connection closes or the
    /// timeout expires.
    pub fn acquire(
        &mut self,
        registry: &Registry,
        timeout: Option<Duration>,
    ) -> Option<BufferInfo> {
        if let Some(cur) = self.d_cur.take() {
            return Some(self.set_current(registry, cur, true));
        }

        self.flush_events(registry);

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // Oldest retired buffer first
            if let Some(index) = self.d_buffers.iter().position(|b| !b.b_busy) {
                if let Some(buf) = self.d_buffers.remove(index) {
                    return Some(self.set_current(registry, buf, true));
                }
            }

            if self.d_num_buffers < self.d_max_buffers {
                return match self.create_buffer() {
                    Ok(buf) => Some(self.set_current(registry, buf, false)),
                    Err(e) => {
                        log::error!(
                            "Could not allocate a buffer for drawable {:#x}: {:?}",
                            self.d_drawable,
                            e
                        );
                        None
                    }
                };
            }

            let remaining = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        log::error!(
                            "Timed out waiting for a free buffer on drawable {:#x}",
                            self.d_drawable
                        );
                        return None;
                    }
                    Some(d - now)
                }
                None => None,
            };

            if !self.wait_for_event(registry, remaining) {
                return None;
            }
        }
    }

    /// Make `buf` current.
    ///
    /// A reused buffer's handle goes back to the client without a fresh
    /// open, so any close the client sent for it earlier is void.
    fn set_current(&mut self, registry: &Registry, buf: Buffer, reused: bool) -> BufferInfo {
        if reused {
            registry.try_reconcile_close(self.drm_fd(), buf.b_info.handle);
        }

        let info = buf.b_info;
        self.d_cur = Some(buf);
        info
    }

    /// Retire the current buffer after it has been presented.
    ///
    /// Returns false if there was nothing current.
    pub fn swap(&mut self) -> bool {
        match self.d_cur.take() {
            Some(mut buf) => {
                buf.b_busy = true;
                self.d_buffers.push_back(buf);
                self.d_sbc += 1;
                true
            }
            None => false,
        }
    }

    /// Allocate a new buffer matching the drawable's current geometry
    fn create_buffer(&mut self) -> utils::Result<Buffer> {
        let geom = self
            .d_conn
            .get_geometry(self.d_drawable)
            .context("Could not get drawable geometry")?;

        let bpp = self
            .d_bytes_per_pixel
            .checked_mul(8)
            .and_then(|bits| u8::try_from(bits).ok())
            .ok_or_else(|| {
                anyhow!(
                    "{} bytes per pixel does not fit a pixmap",
                    self.d_bytes_per_pixel
                )
            })?;
        let dumb = self
            .d_kernel
            .create_dumb(geom.width, geom.height, bpp as u32)
            .context("Could not create dumb buffer")?;

        // This handle has never been handed out, so if anything below
        // fails it is ours alone to close
        let pixmap = match self.share_buffer(&dumb, geom.width, geom.height, geom.depth, bpp) {
            Ok(pixmap) => pixmap,
            Err(e) => {
                if let Err(close_err) = self.d_kernel.gem_close(dumb.handle) {
                    log::error!(
                        "Could not close handle {} after failed allocation: {:?}",
                        dumb.handle,
                        close_err
                    );
                }
                return Err(e);
            }
        };

        self.d_num_buffers += 1;
        log::info!(
            "Allocated buffer {} ({}x{}, pitch {}) as pixmap {:#x} for drawable {:#x}, {} in pool",
            dumb.handle,
            geom.width,
            geom.height,
            dumb.pitch,
            pixmap,
            self.d_drawable,
            self.d_num_buffers
        );

        Ok(Buffer::new(BufferInfo {
            pixmap,
            handle: dumb.handle,
            pitch: dumb.pitch,
            cpp: self.d_bytes_per_pixel,
            width: geom.width,
            height: geom.height,
            size: dumb.size,
        }))
    }

    /// Export the buffer and wrap it in a pixmap on the server
    fn share_buffer(
        &self,
        dumb: &DumbBuffer,
        width: u32,
        height: u32,
        depth: u8,
        bpp: u8,
    ) -> utils::Result<PixmapId> {
        let fd = self
            .d_kernel
            .export_handle(dumb.handle)
            .context("Could not export buffer handle as a dmabuf")?;

        let layout = PixmapLayout {
            width,
            height,
            stride: dumb.pitch,
            depth,
            bpp,
        };

        self.d_conn
            .create_pixmap_from_buffer(self.d_drawable, fd, &layout)
            .context("Could not create pixmap from buffer")
    }

    /// Destroy a buffer the pool no longer holds.
    ///
    /// The kernel close goes through the deferred close ledger since the
    /// client may still have the handle open.
    pub(crate) fn free_buffer(&mut self, registry: &Registry, buf: Buffer) {
        let handle = buf.b_info.handle;

        match registry.close_handle(self.drm_fd(), handle) {
            CloseAction::Forward => {
                if let Err(e) = self.d_kernel.gem_close(handle) {
                    log::error!("Could not close GEM handle {}: {:?}", handle, e);
                }
            }
            CloseAction::Deferred => {
                log::debug!("Deferring close of handle {} until the client closes it", handle)
            }
        }

        if let Err(e) = self.d_conn.free_pixmap(buf.b_info.pixmap) {
            log::error!("Could not free pixmap {:#x}: {:?}", buf.b_info.pixmap, e);
        }

        self.d_num_buffers -= 1;
        log::info!(
            "Freed buffer {} of drawable {:#x}, {} left in pool",
            handle,
            self.d_drawable,
            self.d_num_buffers
        );
    }

    /// Free every buffer regardless of what the server thinks of it.
    ///
    /// Only called once the drawable has been removed from the registry.
    pub(crate) fn teardown(&mut self, registry: &Registry) {
        let retired: Vec<Buffer> = self.d_buffers.drain(..).collect();
        for buf in retired {
            self.free_buffer(registry, buf);
        }
        if let Some(cur) = self.d_cur.take() {
            self.free_buffer(registry, cur);
        }

        if let Err(e) = self.d_conn.unselect_input(&self.d_events) {
            log::error!(
                "Could not drop Present events for drawable {:#x}: {:?}",
                self.d_drawable,
                e
            );
        }
    }
}
