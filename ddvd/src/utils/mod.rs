//! Utility functions and supporting infrastructure.
//!
//! Provides the nibble cursor used by the subpicture decoder, error types,
//! buffer management and the clock/deadline primitives of the playback loop.

pub mod bitstream_io;
pub mod buffer_pool;
pub mod errors;
pub mod timing;
