// Present event handling for drawable pools
//
// The server tells us two things that matter for recycling: a buffer is
// idle (it will not read from it again) and the drawable was reconfigured
// (every buffer we have is the wrong size). Events are applied strictly
// in the order the server delivered them.
use crate::buffer::Buffer;
use crate::drawable::Drawable;
use crate::present::{PresentEvent, WaitResult};
use crate::registry::Registry;
use utils::log;

use std::time::Duration;

impl Drawable {
    /// Apply one Present event to the pool and then reap anything that
    /// became reclaimable.
    pub fn handle_present_event(&mut self, registry: &Registry, event: PresentEvent) {
        match event {
            PresentEvent::ConfigureNotify { width, height } => {
                log::profiling!(
                    "ConfigureNotify {}x{} on drawable {:#x}",
                    width,
                    height,
                    self.d_drawable
                );

                for buf in self.d_buffers.iter_mut() {
                    buf.b_dead = true;
                }
                if let Some(cur) = self.d_cur.as_mut() {
                    cur.b_dead = true;
                }
            }
            PresentEvent::IdleNotify { pixmap, serial } => {
                log::profiling!(
                    "IdleNotify for pixmap {:#x} (serial {}) on drawable {:#x}",
                    pixmap,
                    serial,
                    self.d_drawable
                );

                for buf in self
                    .d_buffers
                    .iter_mut()
                    .filter(|b| b.b_info.pixmap == pixmap)
                {
                    buf.b_busy = false;
                }
            }
            PresentEvent::CompleteNotify { serial, msc } => {
                log::profiling!("CompleteNotify serial {} at msc {}", serial, msc);
                self.d_complete_serial = serial;
            }
            PresentEvent::Other(evtype) => {
                log::debug!("Ignoring Present event type {}", evtype);
            }
        }

        self.sweep(registry);
    }

    /// Free every retired buffer that is both stale and idle.
    ///
    /// Returns the number of buffers freed. Running this again without
    /// any new events frees nothing.
    pub fn sweep(&mut self, registry: &Registry) -> usize {
        let (stale, keep): (Vec<Buffer>, Vec<Buffer>) = std::mem::take(&mut self.d_buffers)
            .into_iter()
            .partition(|b| b.is_reclaimable());

        self.d_buffers = keep.into();

        let count = stale.len();
        for buf in stale {
            self.free_buffer(registry, buf);
        }

        count
    }

    /// Apply every event that is already queued, without blocking
    pub fn flush_events(&mut self, registry: &Registry) {
        while let Some(event) = self.d_conn.poll_event(&self.d_events) {
            self.handle_present_event(registry, event);
        }
    }

    /// Block until one event arrives and apply it.
    ///
    /// Returns false if the wait timed out or the connection closed.
    pub fn wait_for_event(&mut self, registry: &Registry, timeout: Option<Duration>) -> bool {
        match self.d_conn.wait_event(&self.d_events, timeout) {
            WaitResult::Event(event) => {
                self.handle_present_event(registry, event);
                true
            }
            WaitResult::TimedOut => {
                log::error!(
                    "Timed out waiting for Present events on drawable {:#x}",
                    self.d_drawable
                );
                false
            }
            WaitResult::Closed => {
                log::error!(
                    "Present event queue for drawable {:#x} closed",
                    self.d_drawable
                );
                false
            }
        }
    }
}
