// Errors reported by the translation layer
use crate::present::{ConnectionId, DrawableId, GemHandle};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Dri2to3Error>;

/// Failures that can be handed back to the legacy caller.
///
/// The lookup misses indicate that the DRI2 and DRI3 id spaces have
/// drifted apart. The caller should treat them as fatal for the request
/// but the layer itself is left consistent.
#[allow(non_camel_case_types)]
#[derive(Error, Debug)]
pub enum Dri2to3Error {
    #[error("No size was recorded for GEM handle {0}")]
    UNKNOWN_HANDLE(GemHandle),
    #[error("Drawable {1:#x} is not registered on connection {0:?}")]
    UNKNOWN_DRAWABLE(ConnectionId, DrawableId),
    #[error("Drawable {0:#x} has no buffer to present")]
    NO_CURRENT_BUFFER(DrawableId),
    #[error("Only a single back left attachment is supported, got {0:?}")]
    UNSUPPORTED_ATTACHMENTS(Vec<u32>),
    #[error("Invalid configuration: {0}")]
    INVALID_CONFIG(String),
    #[error(transparent)]
    BACKEND(#[from] utils::Error),
}
