// The DRI2 side of the bridge
//
// Each method here answers one DRI2 request (or one intercepted GEM ioctl)
// using DRI3/Present underneath. The replies are plain structs; putting
// them on the wire is up to whoever intercepted the request.
use crate::config::CreateInfo;
use crate::drawable::Drawable;
use crate::present::{
    ConnectionId, DrawableId, GemHandle, KernelDevice, PresentConnection, PresentOptions,
};
use crate::registry::{self, CloseAction, DrawableKey, Registry};
use crate::{Dri2to3Error, Result};
use utils::{log, Context};

use std::os::unix::io::{BorrowedFd, RawFd};
use std::sync::{Arc, Mutex, PoisonError};

pub const ATTACHMENT_FRONT_LEFT: u32 = 0;
pub const ATTACHMENT_BACK_LEFT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    pub device_name: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AuthenticateReply {
    pub authenticated: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QueryVersionReply {
    pub major_version: u32,
    pub minor_version: u32,
}

/// One buffer in a GetBuffers reply. `name` is the GEM handle the
/// client will open.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Dri2Buffer {
    pub attachment: u32,
    pub name: u32,
    pub pitch: u32,
    pub cpp: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBuffersReply {
    pub width: u32,
    pub height: u32,
    pub count: u32,
    pub buffers: Vec<Dri2Buffer>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwapBuffersReply {
    pub sbc: u64,
}

/// Result of an intercepted GEM_OPEN
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GemOpenReply {
    pub handle: GemHandle,
    pub size: u64,
}

/// The bridge itself.
///
/// This is cheap to create; all of the state lives in the `Registry`,
/// so several `Dri2to3` objects may share one.
pub struct Dri2to3 {
    d_registry: Arc<Registry>,
    d_info: CreateInfo,
}

impl Dri2to3 {
    /// Create a bridge on the process wide registry
    pub fn new(info: CreateInfo) -> Result<Self> {
        Self::with_registry(Registry::global(), info)
    }

    pub fn with_registry(registry: Arc<Registry>, info: CreateInfo) -> Result<Self> {
        info.validate()?;

        Ok(Self {
            d_registry: registry,
            d_info: info,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.d_registry
    }

    pub fn info(&self) -> &CreateInfo {
        &self.d_info
    }

    pub fn connect(&self, conn: &dyn PresentConnection) -> Result<ConnectReply> {
        let (want_major, want_minor) = self.d_info.dri3_version;
        let (major, minor) = conn
            .query_dri3_version(want_major, want_minor)
            .context("Could not query the DRI3 version")?;
        log::debug!("DRI3 version: {}.{}", major, minor);

        Ok(ConnectReply {
            device_name: self.d_info.device_name.clone(),
        })
    }

    /// DRI3 has no notion of authentication, every client is fine
    pub fn authenticate(&self, window: DrawableId, magic: u32) -> AuthenticateReply {
        log::debug!("authenticate window {:#x} magic {}", window, magic);
        AuthenticateReply {
            authenticated: true,
        }
    }

    pub fn query_version(&self, major: u32, minor: u32) -> QueryVersionReply {
        log::debug!("Client DRI2 version {}.{}", major, minor);
        QueryVersionReply {
            major_version: self.d_info.dri2_version.0,
            minor_version: self.d_info.dri2_version.1,
        }
    }

    /// Swaps are always async, the interval is ignored
    pub fn swap_interval(&self, drawable: DrawableId, interval: u32) {
        log::debug!("swap_interval {} on drawable {:#x}", interval, drawable);
    }

    pub fn create_drawable(
        &self,
        conn: Arc<dyn PresentConnection>,
        kernel: Arc<dyn KernelDevice>,
        drawable: DrawableId,
    ) -> Result<()> {
        log::debug!("create_drawable {:#x}", drawable);
        let key = DrawableKey::new(conn.id(), drawable);
        let d = Drawable::new(conn, kernel, drawable, &self.d_info)?;

        if let Some(stale) = self
            .d_registry
            .insert_drawable(key, Arc::new(Mutex::new(d)))
        {
            log::error!(
                "Drawable {:#x} was created twice, dropping the old pool",
                drawable
            );
            stale
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .teardown(&self.d_registry);
        }

        Ok(())
    }

    /// Hand the client a back buffer to render into.
    ///
    /// `Ok(None)` means no buffer could be produced and the client should
    /// get an empty reply.
    pub fn get_buffers(
        &self,
        conn: ConnectionId,
        drawable: DrawableId,
        attachments: &[u32],
    ) -> Result<Option<GetBuffersReply>> {
        log::debug!("get_buffers {:#x}: {:?}", drawable, attachments);
        if attachments.len() != 1 || attachments[0] != ATTACHMENT_BACK_LEFT {
            return Err(Dri2to3Error::UNSUPPORTED_ATTACHMENTS(attachments.to_vec()));
        }

        let handle = self
            .d_registry
            .get_drawable(DrawableKey::new(conn, drawable))?;
        let mut d = handle.lock().unwrap_or_else(PoisonError::into_inner);

        let buf = match d.acquire(&self.d_registry, self.d_info.acquire_timeout) {
            Some(buf) => buf,
            None => return Ok(None),
        };

        // The client will GEM_OPEN this name next and needs the size
        self.d_registry.record_handle_size(buf.handle, buf.size);

        Ok(Some(GetBuffersReply {
            width: buf.width,
            height: buf.height,
            count: 1,
            buffers: vec![Dri2Buffer {
                attachment: ATTACHMENT_BACK_LEFT,
                name: buf.handle,
                pitch: buf.pitch,
                cpp: buf.cpp,
                flags: 0,
            }],
        }))
    }

    /// Present the current back buffer and retire it
    pub fn swap_buffers(
        &self,
        conn: ConnectionId,
        drawable: DrawableId,
    ) -> Result<SwapBuffersReply> {
        log::debug!("swap_buffers {:#x}", drawable);
        let handle = self
            .d_registry
            .get_drawable(DrawableKey::new(conn, drawable))?;
        let mut d = handle.lock().unwrap_or_else(PoisonError::into_inner);

        let current = d.current().map(|cur| cur.info().pixmap);
        let pixmap = match current {
            Some(pixmap) => pixmap,
            None => {
                log::debug!("Swap on drawable {:#x} with no buffer, acquiring one", drawable);
                d.acquire(&self.d_registry, self.d_info.acquire_timeout)
                    .ok_or(Dri2to3Error::NO_CURRENT_BUFFER(drawable))?
                    .pixmap
            }
        };

        d.d_present_serial = d.d_present_serial.wrapping_add(1);
        d.d_conn
            .present_pixmap(drawable, pixmap, d.d_present_serial, PresentOptions::ASYNC)
            .context("Could not present pixmap")?;

        d.swap();

        Ok(SwapBuffersReply { sbc: d.sbc() })
    }

    /// Drop a drawable and every buffer it owns.
    ///
    /// Returns false if no such drawable was registered.
    pub fn destroy_drawable(&self, conn: ConnectionId, drawable: DrawableId) -> bool {
        log::debug!("destroy_drawable {:#x}", drawable);

        // Unregister first so no new acquisitions can find it
        let handle = match self
            .d_registry
            .remove_drawable(DrawableKey::new(conn, drawable))
        {
            Some(handle) => handle,
            None => return false,
        };

        handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .teardown(&self.d_registry);
        true
    }

    /// An intercepted GEM_OPEN of a name from a GetBuffers reply.
    ///
    /// The name is the handle itself, all we need to supply is the size.
    pub fn gem_open(&self, name: u32) -> Result<GemOpenReply> {
        log::debug!("GEM_OPEN {}", name);
        let size = self.d_registry.consume_handle_size(name)?;

        Ok(GemOpenReply { handle: name, size })
    }

    /// An intercepted GEM_CLOSE. The caller only issues the real ioctl
    /// when this returns `Forward`.
    pub fn gem_close(&self, fd: RawFd, handle: GemHandle) -> CloseAction {
        log::debug!("GEM_CLOSE {} on fd {}", handle, fd);
        self.d_registry.close_handle(fd, handle)
    }

    /// Import a dmabuf, remembering its size for a following GEM_OPEN
    pub fn import(&self, kernel: &dyn KernelDevice, fd: BorrowedFd<'_>) -> Result<GemHandle> {
        registry::import(&self.d_registry, kernel, fd)
    }
}
