//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, CRC-32, little-endian sample packing, error types and
//! the pending output file used by the file operations.

pub mod bitstream_io;
pub mod crc;
pub mod errors;
pub mod pcm;
pub mod pending_file;
