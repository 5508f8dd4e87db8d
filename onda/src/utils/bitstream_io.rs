//! Bitstream I/O for the compressed sample data.
//!
//! Values are packed MSB-first into bytes. The writer zero-pads the final partial
//! byte in its low bits; the reader is bounded by the declared data length and
//! reports reads past it as `UnexpectedEof`.
//!
//! Single reads and writes are up to 32 bits wide. The accumulator lives in
//! `bitstream_io`, which carries wider values than that internally, so the full
//! 32-bit sample width is representable.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, UnsignedInteger};

/// Size of the byte buffer between the bitstream and the underlying stream.
pub const BUFFER_SIZE: usize = 1 << 13;

/// Widest single read or write, in bits.
pub const MAX_WIDTH: u32 = 32;

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read> {
    bs: BitReader<R, BigEndian>,
    len: u64,
    pos: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

/// Reader over a chunk body of known length inside a larger stream.
pub type BsIoDataReader<R> = BitstreamIoReader<io::BufReader<io::Take<R>>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
            pos: 0,
        }
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        self.check_available(n, "get_n")?;
        let value = self.bs.read_unsigned_var(n)?;
        self.pos += n as u64;
        Ok(value)
    }

    #[inline(always)]
    fn check_available(&self, n: u32, what: &str) -> io::Result<()> {
        if n as u64 > self.available() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{what}({n}): out of bounds bits at {}", self.pos),
            ));
        }
        Ok(())
    }

    #[inline(always)]
    pub fn available(&self) -> u64 {
        self.len - self.pos
    }

    #[inline(always)]
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<R: io::Read> BsIoDataReader<R> {
    /// Reads at most `len_bytes` from `read`, buffered in `BUFFER_SIZE` pieces.
    pub fn buffered(read: R, len_bytes: u64) -> Self {
        let read = io::BufReader::with_capacity(BUFFER_SIZE, io::Read::take(read, len_bytes));
        Self::new(read, len_bytes)
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

pub struct BitstreamIoWriter<W: io::Write> {
    bs: BitWriter<io::BufWriter<W>, BigEndian>,
    bits_written: u64,
}

impl<W: io::Write> BitstreamIoWriter<W> {
    pub fn new(write: W) -> Self {
        Self {
            bs: BitWriter::new(io::BufWriter::with_capacity(BUFFER_SIZE, write)),
            bits_written: 0,
        }
    }

    /// Appends the low `n` bits of `value`.
    #[inline(always)]
    pub fn put_n(&mut self, n: u32, value: u32) -> io::Result<()> {
        debug_assert!((1..=MAX_WIDTH).contains(&n));
        let value = if n < 32 { value & ((1 << n) - 1) } else { value };
        self.bs.write_unsigned_var(n, value)?;
        self.bits_written += n as u64;
        Ok(())
    }

    #[inline(always)]
    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    /// Bytes produced once the final partial byte is padded.
    #[inline(always)]
    pub fn bytes_written(&self) -> u64 {
        self.bits_written.div_ceil(8)
    }

    /// Pads to a byte boundary, flushes, and hands back the underlying writer.
    pub fn close(mut self) -> io::Result<W> {
        self.bs.byte_align()?;
        self.bs.into_writer().into_inner().map_err(|e| e.into_error())
    }
}
