//! Ancillary chunks of the source audio file, carried through compression.
//!
//! Stored big-endian: source kind (u16), Adler-32 of the uncompressed chunk
//! bodies (u32), chunk count (u32), one `(id, size)` pair per chunk, then the
//! zlib stream of the concatenated bodies.
//!
//! The chunk list keeps the source file's order. Chunks the audio writer
//! produces itself (format and sample data) are listed with size 0 to mark
//! their position.

use std::fmt;
use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use log::trace;

use crate::join_bytes_be;
use crate::utils::errors::PrivateDataError;

const HEADER_SIZE: usize = 10;
const ENTRY_SIZE: usize = 8;

const AIFF_CRITICAL_IDS: [[u8; 4]; 2] = [*b"COMM", *b"SSND"];
const WAVE_CRITICAL_IDS: [[u8; 4]; 2] = [*b"fmt ", *b"data"];

/// Container format the private data was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Aiff,
    Wave,
}

impl SourceKind {
    pub const fn code(self) -> u16 {
        match self {
            SourceKind::Aiff => 0,
            SourceKind::Wave => 1,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(SourceKind::Aiff),
            1 => Some(SourceKind::Wave),
            _ => None,
        }
    }

    /// Chunks the audio writer always regenerates.
    pub const fn critical_chunk_ids(self) -> &'static [[u8; 4]] {
        match self {
            SourceKind::Aiff => &AIFF_CRITICAL_IDS,
            SourceKind::Wave => &WAVE_CRITICAL_IDS,
        }
    }

    pub fn is_critical(self, id: &[u8; 4]) -> bool {
        self.critical_chunk_ids().contains(id)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Aiff => write!(f, "AIFF"),
            SourceKind::Wave => write!(f, "WAVE"),
        }
    }
}

/// One entry of the chunk list. Critical chunks have an empty body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateChunk {
    pub id: [u8; 4],
    pub data: Vec<u8>,
}

impl PrivateChunk {
    pub fn new(id: [u8; 4], data: Vec<u8>) -> Self {
        Self { id, data }
    }

    pub fn placeholder(id: [u8; 4]) -> Self {
        Self {
            id,
            data: Vec::new(),
        }
    }

    pub fn id_str(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateData {
    pub source_kind: SourceKind,
    pub chunks: Vec<PrivateChunk>,
}

impl PrivateData {
    pub fn new(source_kind: SourceKind, chunks: Vec<PrivateChunk>) -> Self {
        Self {
            source_kind,
            chunks,
        }
    }

    /// Chunks other than the critical ones.
    pub fn ancillary_chunks(&self) -> impl Iterator<Item = &PrivateChunk> {
        self.chunks
            .iter()
            .filter(|c| !self.source_kind.is_critical(&c.id))
    }

    /// Whether there is anything worth storing.
    pub fn has_ancillary_chunks(&self) -> bool {
        self.ancillary_chunks().next().is_some()
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let num_chunks = u32::try_from(self.chunks.len())
            .ok()
            .filter(|&n| n <= i32::MAX as u32)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "too many chunks"))?;

        let mut adler = simd_adler32::Adler32::new();
        let mut deflater = ZlibEncoder::new(Vec::new(), Compression::best());
        let mut entries = Vec::with_capacity(self.chunks.len() * ENTRY_SIZE);

        for chunk in &self.chunks {
            let size = u32::try_from(chunk.data.len()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("chunk '{}' too large", chunk.id_str()),
                )
            })?;
            entries.extend(join_bytes_be!(chunk.id, size));
            adler.write(&chunk.data);
            deflater.write_all(&chunk.data)?;
        }

        let compressed = deflater.finish()?;
        let mut out = join_bytes_be!(self.source_kind.code(), adler.finish(), num_chunks);
        out.extend(entries);
        out.extend(compressed);

        trace!(
            "Private data: {} chunks, {} bytes stored",
            self.chunks.len(),
            out.len()
        );
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PrivateDataError> {
        if data.len() < HEADER_SIZE {
            return Err(PrivateDataError::MalformedData);
        }

        let kind_code = u16::from_be_bytes([data[0], data[1]]);
        let stored = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
        let num_chunks = u32::from_be_bytes([data[6], data[7], data[8], data[9]]);

        let source_kind = SourceKind::from_code(kind_code)
            .ok_or(PrivateDataError::UnrecognisedSourceKind(kind_code))?;
        if num_chunks > i32::MAX as u32 {
            return Err(PrivateDataError::InvalidNumChunks(num_chunks));
        }

        let list_end = (num_chunks as usize)
            .checked_mul(ENTRY_SIZE)
            .and_then(|n| n.checked_add(HEADER_SIZE))
            .filter(|&end| end <= data.len())
            .ok_or(PrivateDataError::MalformedData)?;

        let entries: Vec<([u8; 4], u64)> = data[HEADER_SIZE..list_end]
            .chunks_exact(ENTRY_SIZE)
            .map(|e| {
                let id = [e[0], e[1], e[2], e[3]];
                (id, u32::from_be_bytes([e[4], e[5], e[6], e[7]]) as u64)
            })
            .collect();
        let total: u64 = entries.iter().map(|&(_, size)| size).sum();

        let mut bodies = Vec::new();
        ZlibDecoder::new(&data[list_end..])
            .take(total + 1)
            .read_to_end(&mut bodies)
            .map_err(|_| PrivateDataError::InvalidData)?;
        if bodies.len() as u64 != total {
            return Err(PrivateDataError::InvalidData);
        }

        let mut adler = simd_adler32::Adler32::new();
        adler.write(&bodies);
        let calculated = adler.finish();
        if calculated != stored {
            return Err(PrivateDataError::IncorrectAdler32 { calculated, stored });
        }

        let mut offset = 0;
        let chunks = entries
            .into_iter()
            .map(|(id, size)| {
                let size = size as usize;
                let chunk = PrivateChunk::new(id, bodies[offset..offset + size].to_vec());
                offset += size;
                chunk
            })
            .collect();

        Ok(Self {
            source_kind,
            chunks,
        })
    }
}
