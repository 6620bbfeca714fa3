/// DRM kernel device
///
/// The real `KernelDevice`: dumb buffer allocation and PRIME sharing on a
/// DRM node.
use crate::present::{CloseStatus, DumbBuffer, GemHandle, KernelDevice};
use utils::{anyhow, log, Context, Result};

use nix::sys::stat::{fstat, SFlag};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

/// Our DRM node accessor helper
///
/// This provides drm-rs with access to the DRM fd
/// and gives us a place to make calls to DRM
pub struct DrmDevice {
    dd_file: File,
}

/// Implementing `AsFd` is a prerequisite to implementing the traits found
/// in drm-rs.
impl AsFd for DrmDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.dd_file.as_fd()
    }
}

impl drm::Device for DrmDevice {}

impl DrmDevice {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut options = std::fs::OpenOptions::new();
        options.read(true);
        options.write(true);
        let file = options
            .open(path)
            .with_context(|| format!("Could not open DRM device {}", path.display()))?;

        Self::from_fd(file.into())
    }

    /// Wrap a DRM descriptor the client already opened
    pub fn from_fd(fd: OwnedFd) -> Result<Self> {
        let stat = fstat(fd.as_raw_fd()).context("Could not stat DRM fd")?;
        if SFlag::from_bits_truncate(stat.st_mode) & SFlag::S_IFMT != SFlag::S_IFCHR {
            return Err(anyhow!("fd {} is not a character device", fd.as_raw_fd()));
        }

        let ret = Self {
            dd_file: File::from(fd),
        };

        match drm::Device::get_driver(&ret) {
            Ok(driver) => log::debug!("Using DRM driver {:?}", driver.name()),
            Err(e) => log::error!("Could not query the DRM driver: {}", e),
        }

        Ok(ret)
    }
}

impl KernelDevice for DrmDevice {
    fn raw_fd(&self) -> RawFd {
        self.dd_file.as_raw_fd()
    }

    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> Result<DumbBuffer> {
        let create = drm_ffi::mode::dumbbuffer::create(self.as_fd(), width, height, bpp, 0)
            .context("DRM_IOCTL_MODE_CREATE_DUMB failed")?;

        Ok(DumbBuffer {
            handle: create.handle,
            pitch: create.pitch,
            size: create.size,
        })
    }

    fn export_handle(&self, handle: GemHandle) -> Result<OwnedFd> {
        let flags = (libc::O_CLOEXEC | libc::O_RDWR) as u32;
        let prime = drm_ffi::gem::handle_to_fd(self.as_fd(), handle, flags)
            .context("DRM_IOCTL_PRIME_HANDLE_TO_FD failed")?;

        // SAFETY: the kernel just handed us this fd and nothing else owns it
        Ok(unsafe { OwnedFd::from_raw_fd(prime.fd) })
    }

    fn import_fd(&self, fd: BorrowedFd<'_>) -> Result<(GemHandle, u64)> {
        let prime = drm_ffi::gem::fd_to_handle(self.as_fd(), fd)
            .context("DRM_IOCTL_PRIME_FD_TO_HANDLE failed")?;

        // dmabufs report their size through lseek
        let mut file = File::from(fd.try_clone_to_owned().context("Could not dup dmabuf fd")?);
        let size = file
            .seek(SeekFrom::End(0))
            .context("Could not get dmabuf size")?;

        Ok((prime.handle, size))
    }

    fn gem_close(&self, handle: GemHandle) -> Result<CloseStatus> {
        match drm_ffi::gem::close(self.as_fd(), handle) {
            Ok(_) => Ok(CloseStatus::Closed),
            Err(e) if matches!(e.raw_os_error(), Some(libc::EINVAL) | Some(libc::ENOENT)) => {
                Ok(CloseStatus::AlreadyClosed)
            }
            Err(e) => Err(e).context("DRM_IOCTL_GEM_CLOSE failed"),
        }
    }
}
