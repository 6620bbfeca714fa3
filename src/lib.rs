//! # dri2to3
//!
//! Runs DRI2 clients on a display stack that only speaks DRI3 and Present.
//!
//! A DRI2 client asks the server for named buffers and then tells it to
//! swap them. DRI3 turns that around: the client allocates buffer objects
//! itself, shares them as dmabufs, and the Present extension reports when
//! the server is done reading from each one. This crate sits in between
//! and answers the DRI2 requests using a small pool of kernel buffers per
//! drawable.
//!
//! The pieces are:
//! * `registry` - process-wide bookkeeping behind a single lock: the
//!   sizes of handles visible to the client, the deferred GEM closes and the
//!   drawable table.
//! * `drawable` - the per-drawable buffer pool and the acquisition loop.
//! * `events` - reacts to Present idle/configure notifications and frees
//!   stale buffers once the server lets go of them.
//! * `dri2` - the legacy facade that turns DRI2 requests into pool calls.
//! * `present` - the traits our two collaborators (the kernel device and
//!   the display connection) implement.
//!
//! ```ignore
//! let bridge = dri2to3::Dri2to3::new(dri2to3::CreateInfo::from_env())?;
//! bridge.create_drawable(conn.clone(), kernel.clone(), window)?;
//!
//! let reply = bridge.get_buffers(conn.id(), window, &[dri2to3::ATTACHMENT_BACK_LEFT])?;
//! // ... render into reply.buffers[0].name ...
//! bridge.swap_buffers(conn.id(), window)?;
//! ```
extern crate lazy_static;
extern crate utils;

mod buffer;
mod config;
mod dri2;
mod drawable;
mod error;
mod events;
mod present;
mod registry;

#[cfg(feature = "drm")]
mod drm_device;


pub use buffer::{Buffer, BufferInfo};
pub use config::{CreateInfo, CreateInfoBuilder, MAX_BUFFERS};
pub use dri2::{
    AuthenticateReply, ConnectReply, Dri2Buffer, Dri2to3, GemOpenReply, GetBuffersReply,
    QueryVersionReply, SwapBuffersReply, ATTACHMENT_BACK_LEFT, ATTACHMENT_FRONT_LEFT,
};
pub use drawable::{Drawable, DrawableHandle};
pub use error::{Dri2to3Error, Result};
pub use present::{
    CloseStatus, ConnectionId, DrawableId, DumbBuffer, EventMask, EventSubscription, GemHandle,
    Geometry, KernelDevice, PixmapId, PixmapLayout, PresentConnection, PresentEvent,
    PresentOptions, WaitResult,
};
pub use registry::{import, CloseAction, DeferredCloses, DrawableKey, HandleSizes, Registry};

#[cfg(feature = "drm")]
pub use drm_device::DrmDevice;
