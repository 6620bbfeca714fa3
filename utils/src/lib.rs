// A set of helper structs for common operations
//
// Shared by the dri2to3 library and its backends.
pub mod timing;
#[macro_use]
pub mod logging;
pub mod log;

extern crate anyhow;
pub use anyhow::{anyhow, bail, Context, Error, Result};
