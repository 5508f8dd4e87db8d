//! Lossless compression of PCM audio samples.
//!
//! ## Technical Overview
//!
//! Samples are coded per channel as the second difference of the signal, in a
//! bit width chosen per block. Second differences that do not fit are escaped
//! and followed by the raw sample, so any input round-trips exactly.
//!
//! ### File Organization
//!
//! **External Structure**: An IFF group `FORM`/`ONDA` holding the attributes,
//! optional private data (chunks of the source audio file), and the data chunk.
//! **Internal Structure**: Independent blocks of up to `block_length` sample
//! frames, each led by one encoding key per channel.
//!
//! ### Integrity
//!
//! A CRC-32 of the uncompressed little-endian sample bytes is stored in the
//! attributes and checked after decoding. Private data carries its own Adler-32.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::fs::File;
//! use onda::process::pipeline::{Context, compress, expand};
//! use onda::structs::attributes::Attributes;
//! use onda::structs::container::OndaReader;
//!
//! // 16-bit stereo, one second at 44.1 kHz, as little-endian bytes
//! let raw = vec![0u8; 44100 * 4];
//! let attributes = Attributes::new(2, 16, 44100, 44100)?;
//!
//! let ctx = Context::new();
//! let (file, stats) = compress(&mut &raw[..], File::create("tone.onda")?, attributes, None, &ctx)?;
//! drop(file);
//! println!("{:.1}% of the original size", stats.compression_percent());
//!
//! let mut reader = OndaReader::new(File::open("tone.onda")?)?;
//! let (expanded, _) = expand(&mut reader, Vec::new(), &ctx)?;
//! assert_eq!(expanded, raw);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Byte serialisation of fixed-layout records and IFF/RIFF chunk headers.
pub mod byteorder;

/// The block codec and the operations built on it.
///
/// 1. **Encoding** ([`process::encode`]): per-block choice of encoding lengths
///    and bit packing.
/// 2. **Decoding** ([`process::decode`]): the inverse.
/// 3. **Pipeline** ([`process::pipeline`]): compress, expand and validate with
///    cancellation and progress reporting.
pub mod process;

/// Data structures of the Onda file format.
///
/// - **Attributes** ([`structs::attributes`]): global parameters
/// - **Private Data** ([`structs::private_data`]): preserved source chunks
/// - **Container** ([`structs::container`]): reading and writing the IFF group
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading/writing
/// - **CRC Validation** ([`utils::crc`]): CRC-32 of the sample data
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Sample Packing** ([`utils::pcm`]): Little-endian sample bytes
/// - **Pending Files** ([`utils::pending_file`]): Write-then-rename outputs
pub mod utils;
