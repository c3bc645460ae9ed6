//! Block store backends.

pub mod azure;
pub mod memory;
