// Runtime configuration for the translation layer
use crate::{Dri2to3Error, Result};
use utils::log;

use std::str::FromStr;
use std::time::Duration;

/// Default bound on the number of buffers a drawable pool may own
pub const MAX_BUFFERS: usize = 4;

/// Device path reported to DRI2 clients in the connect reply
pub const DEFAULT_DEVICE_NAME: &str = "/dev/dri/card0";

/// Present pixmaps top out at 32 bits per pixel
pub const MAX_BYTES_PER_PIXEL: u32 = 4;

const MAX_BUFFERS_ENV: &str = "DRI2TO3_MAX_BUFFERS";
const DEVICE_ENV: &str = "DRI2TO3_DEVICE";
const ACQUIRE_TIMEOUT_ENV: &str = "DRI2TO3_ACQUIRE_TIMEOUT_MS";

/// Parameters for `Dri2to3` creation.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateInfo {
    /// The most buffers any one drawable pool may hold at once
    pub max_buffers: usize,
    /// Name of the DRM node handed back in the DRI2 connect reply
    pub device_name: String,
    /// Size of one pixel in every allocated buffer
    pub bytes_per_pixel: u32,
    /// How long an acquisition may block waiting for the server to
    /// release a buffer. `None` waits forever.
    pub acquire_timeout: Option<Duration>,
    /// The DRI2 version we claim to implement
    pub dri2_version: (u32, u32),
    /// The DRI3 version we ask the server for
    pub dri3_version: (u32, u32),
}

impl Default for CreateInfo {
    fn default() -> Self {
        Self {
            max_buffers: MAX_BUFFERS,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            bytes_per_pixel: 4,
            acquire_timeout: None,
            dri2_version: (1, 4),
            dri3_version: (1, 2),
        }
    }
}

/// Read and parse an override. Garbage is reported and ignored instead
/// of taking down the client we have been loaded into.
fn env_override<T: FromStr>(name: &str) -> Option<T> {
    let val = std::env::var(name).ok()?;
    match T::from_str(val.trim()) {
        Ok(v) => {
            log::debug!("Using user specified {}={}", name, val);
            Some(v)
        }
        Err(_) => {
            log::error!("Ignoring invalid value {:?} for {}", val, name);
            None
        }
    }
}

impl CreateInfo {
    pub fn builder() -> CreateInfoBuilder {
        CreateInfoBuilder {
            ci: CreateInfo::default(),
        }
    }

    /// The defaults, with any user overrides from the environment applied
    pub fn from_env() -> Self {
        let mut ret = Self::default();

        if let Some(max) = env_override::<usize>(MAX_BUFFERS_ENV) {
            ret.max_buffers = max;
        }
        if let Ok(dev) = std::env::var(DEVICE_ENV) {
            ret.device_name = dev;
        }
        if let Some(ms) = env_override::<u64>(ACQUIRE_TIMEOUT_ENV) {
            ret.acquire_timeout = Some(Duration::from_millis(ms));
        }

        ret
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_buffers == 0 {
            return Err(Dri2to3Error::INVALID_CONFIG(
                "max_buffers must be at least 1".to_string(),
            ));
        }
        if self.bytes_per_pixel == 0 || self.bytes_per_pixel > MAX_BYTES_PER_PIXEL {
            return Err(Dri2to3Error::INVALID_CONFIG(format!(
                "bytes_per_pixel must be between 1 and {}, got {}",
                MAX_BYTES_PER_PIXEL, self.bytes_per_pixel
            )));
        }

        Ok(())
    }
}

/// Implements the builder pattern for easier configuration
pub struct CreateInfoBuilder {
    ci: CreateInfo,
}

impl CreateInfoBuilder {
    pub fn max_buffers(mut self, max: usize) -> Self {
        self.ci.max_buffers = max;
        self
    }

    pub fn device_name(mut self, name: &str) -> Self {
        self.ci.device_name = name.to_string();
        self
    }

    pub fn bytes_per_pixel(mut self, cpp: u32) -> Self {
        self.ci.bytes_per_pixel = cpp;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.ci.acquire_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> CreateInfo {
        self.ci
    }
}
