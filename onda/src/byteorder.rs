//! Byte serialisation helpers for fixed-layout records and chunk headers.

use std::io::{self, Read, Write};

pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

pub trait WriteBytesBe {
    fn write_be(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num_le_be {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
        impl WriteBytesBe for $t { #[inline] fn write_be(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_be_bytes()); }}
    )+ }
}

impl_num_le_be!(u8, i8, u16, i16, u32, i32, u64, i64);

macro_rules! impl_collection {
    ($trait:ident, $method:ident) => {
        impl<T: $trait> $trait for Vec<T> {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
        impl<T: $trait, const N: usize> $trait for [T; N] {
            #[inline]
            fn $method(&self, dst: &mut Vec<u8>) {
                self.iter().for_each(|item| item.$method(dst));
            }
        }
    };
}

impl_collection!(WriteBytesLe, write_le);
impl_collection!(WriteBytesBe, write_be);

#[macro_export]
macro_rules! join_bytes_le {
    ( $($value:expr),+ $(,)? ) => {{
        let mut vec = Vec::<u8>::new();
        $( $crate::byteorder::WriteBytesLe::write_le(&$value, &mut vec); )+
        vec
    }};
}

#[macro_export]
macro_rules! join_bytes_be {
    ( $($value:expr),+ $(,)? ) => {{
        let mut vec = Vec::<u8>::new();
        $( $crate::byteorder::WriteBytesBe::write_be(&$value, &mut vec); )+
        vec
    }};
}

/// Byte order of chunk sizes and chunk bodies: big-endian for IFF, little-endian for RIFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    pub fn u32_to_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Big => value.to_be_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
        }
    }

    pub fn u32_from_bytes(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }
}

/// Length of a chunk header: 4-byte id followed by a 32-bit size.
pub const CHUNK_HEADER_SIZE: u64 = 8;

/// A chunk whose body is a fixed-layout record. Implemented by `#[chunk_type]`.
pub trait Chunk {
    const BYTE_ORDER: ByteOrder;

    fn chunk_id(&self) -> &[u8; 4];
    fn chunk_data(&self) -> Vec<u8>;

    fn write_chunk<W: Write>(&self, writer: &mut W) -> io::Result<u64> {
        write_chunk(writer, self.chunk_id(), &self.chunk_data(), Self::BYTE_ORDER)
    }
}

/// Writes a complete chunk, including the pad byte after an odd-sized body.
///
/// Returns the number of bytes written.
pub fn write_chunk<W: Write>(
    writer: &mut W,
    id: &[u8; 4],
    data: &[u8],
    order: ByteOrder,
) -> io::Result<u64> {
    let size = u32::try_from(data.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "chunk '{}' too large: {} bytes",
                String::from_utf8_lossy(id),
                data.len()
            ),
        )
    })?;

    writer.write_all(id)?;
    writer.write_all(&order.u32_to_bytes(size))?;
    writer.write_all(data)?;

    let mut written = CHUNK_HEADER_SIZE + data.len() as u64;
    if data.len() & 1 != 0 {
        writer.write_all(&[0])?;
        written += 1;
    }

    Ok(written)
}

/// Reads a chunk header, or `None` at a clean end of stream.
pub fn read_chunk_header<R: Read>(
    reader: &mut R,
    order: ByteOrder,
) -> io::Result<Option<([u8; 4], u32)>> {
    let mut header = [0u8; 8];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated chunk header",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let mut id = [0u8; 4];
    id.copy_from_slice(&header[..4]);
    let mut size = [0u8; 4];
    size.copy_from_slice(&header[4..]);

    Ok(Some((id, order.u32_from_bytes(size))))
}

/// Size of a chunk body on disk, including the pad byte.
#[inline]
pub const fn padded_size(size: u32) -> u64 {
    size as u64 + (size as u64 & 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use onda_macros::{ToBytes, chunk_type};

    #[derive(ToBytes)]
    struct Mini {
        a: u16,
        b: u32,
        guid: [u8; 4],
    }

    #[derive(ToBytes)]
    #[chunk_type(b"ODD ")]
    struct Odd {
        a: u16,
        b: u8,
    }

    #[derive(ToBytes)]
    #[chunk_type(b"odd ", le)]
    struct OddLe {
        a: u16,
        b: u8,
    }

    #[test]
    fn to_bytes_both_orders() {
        let s = Mini {
            a: 0x1234,
            b: 0xABCDEF01,
            guid: *b"TEST",
        };

        let vec_le = &mut Vec::new();
        let vec_be = &mut Vec::new();

        s.write_le(vec_le);
        s.write_be(vec_be);

        let expected_le = [0x34, 0x12, 0x01, 0xEF, 0xCD, 0xAB, b'T', b'E', b'S', b'T'];
        let expected_be = [0x12, 0x34, 0xAB, 0xCD, 0xEF, 0x01, b'T', b'E', b'S', b'T'];

        assert_eq!(&vec_le[..], &expected_le);
        assert_eq!(&vec_be[..], &expected_be);
    }

    #[test]
    fn odd_chunk_is_padded() -> io::Result<()> {
        let mut be = Vec::new();
        let written = Odd { a: 0x0102, b: 3 }.write_chunk(&mut be)?;
        assert_eq!(written, 12);
        assert_eq!(be, [b'O', b'D', b'D', b' ', 0, 0, 0, 3, 1, 2, 3, 0]);

        let mut le = Vec::new();
        OddLe { a: 0x0102, b: 3 }.write_chunk(&mut le)?;
        assert_eq!(le, [b'o', b'd', b'd', b' ', 3, 0, 0, 0, 2, 1, 3, 0]);

        let mut cursor = io::Cursor::new(&le);
        let header = read_chunk_header(&mut cursor, ByteOrder::Little)?;
        assert_eq!(header, Some((*b"odd ", 3)));
        assert_eq!(padded_size(3), 4);

        Ok(())
    }

    #[test]
    fn chunk_header_at_end_of_stream() -> io::Result<()> {
        let mut empty = io::Cursor::new(Vec::<u8>::new());
        assert_eq!(read_chunk_header(&mut empty, ByteOrder::Big)?, None);

        let mut short = io::Cursor::new(vec![b'D', b'A']);
        let err = read_chunk_header(&mut short, ByteOrder::Big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        Ok(())
    }

    #[test]
    fn join_bytes_mixed_widths() {
        let be = crate::join_bytes_be!(1u16, 2u32);
        assert_eq!(be, [0, 1, 0, 0, 0, 2]);
        let le = crate::join_bytes_le!(1u16, 2u32);
        assert_eq!(le, [1, 0, 2, 0, 0, 0]);
    }
}
