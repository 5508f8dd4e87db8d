//! Data structures of the Onda file format.
//!
//! The attributes record, the private data carried over from the source file,
//! and the IFF container tying them to the compressed sample data.

pub mod attributes;
pub mod container;
pub mod private_data;
