//! The Onda file container.
//!
//! An IFF group `FORM` of type `ONDA` holding, in order, the attributes chunk
//! `ATTR`, the optional private data chunk `PRVT`, and the data chunk `DATA` with
//! the codec blocks. Sizes are big-endian and odd-sized chunks are padded.
//!
//! The writer leaves the group size, the data size and the CRC at zero and
//! patches them once the sample data is complete.

use std::io::{self, Read, Seek, SeekFrom, Write};

use log::Level::Warn;
use log::{debug, trace};

use crate::byteorder::{self, ByteOrder, CHUNK_HEADER_SIZE, Chunk, padded_size};
use crate::log_or_err;
use crate::process::decode::BlockDecoder;
use crate::process::encode::BlockEncoder;
use crate::structs::attributes::{Attributes, VERSION_PLAIN, VERSION_PRIVATE};
use crate::structs::private_data::PrivateData;
use crate::utils::bitstream_io::{BitstreamIoWriter, BsIoDataReader};
use crate::utils::errors::{DecodeError, OndaError, PrivateDataError, Result, ValidationError};

pub const FORM_ID: &[u8; 4] = b"FORM";
pub const ONDA_ID: &[u8; 4] = b"ONDA";
pub const ATTRIBUTES_ID: &[u8; 4] = b"ATTR";
pub const PRIVATE_ID: &[u8; 4] = b"PRVT";
pub const DATA_ID: &[u8; 4] = b"DATA";

/// Offset of the CRC field from the start of the file.
const CRC_OFFSET: u64 = 12 + CHUNK_HEADER_SIZE + 18;

/// Options for reading an Onda file.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Structural oddities at or above this level are errors, the rest are logged.
    pub fail_level: log::Level,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
        }
    }
}

impl ReadOptions {
    pub fn strict() -> Self {
        Self {
            fail_level: log::Level::Warn,
        }
    }
}

/// Writes an Onda file block by block.
pub struct OndaWriter<W: Write + Seek> {
    bits: BitstreamIoWriter<W>,
    encoder: BlockEncoder,
    attributes: Attributes,
    start: u64,
    data_start: u64,
    frames_written: u64,
}

impl<W: Write + Seek> OndaWriter<W> {
    /// Writes the header chunks and opens the data chunk.
    ///
    /// The attributes version follows the presence of `private_data`.
    pub fn new(mut writer: W, attributes: Attributes, private_data: Option<&[u8]>) -> Result<Self> {
        let mut attributes = attributes;
        attributes.validate()?;
        attributes.require_supported_width()?;
        attributes.version = if private_data.is_some() {
            VERSION_PRIVATE
        } else {
            VERSION_PLAIN
        };
        attributes.crc_value = 0;

        let start = writer.stream_position()?;
        writer.write_all(FORM_ID)?;
        writer.write_all(&0u32.to_be_bytes())?;
        writer.write_all(ONDA_ID)?;
        attributes.write_chunk(&mut writer)?;
        if let Some(data) = private_data {
            byteorder::write_chunk(&mut writer, PRIVATE_ID, data, ByteOrder::Big)?;
        }
        writer.write_all(DATA_ID)?;
        writer.write_all(&0u32.to_be_bytes())?;

        let data_start = writer.stream_position()?;
        debug!(
            "Onda header written: {} bytes, private data: {}",
            data_start - start,
            private_data.map_or(0, <[u8]>::len)
        );

        Ok(Self {
            bits: BitstreamIoWriter::new(writer),
            encoder: BlockEncoder::with_attributes(&attributes),
            attributes,
            start,
            data_start,
            frames_written: 0,
        })
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Encodes one block of interleaved samples, at most `block_length` frames.
    pub fn write_block(&mut self, samples: &[i32]) -> Result<()> {
        let frames = samples.len() / self.attributes.num_channels as usize;
        debug_assert!(frames <= self.attributes.block_length as usize);

        self.encoder.write_block(&mut self.bits, samples)?;
        self.frames_written += frames as u64;
        Ok(())
    }

    /// Pads the data chunk, patches the sizes and stores `crc_value`.
    ///
    /// Returns the underlying writer and the total file size.
    pub fn finish(self, crc_value: u32) -> Result<(W, u64)> {
        let expected = self.attributes.num_sample_frames;
        if self.frames_written != expected {
            return Err(ValidationError::FrameCountMismatch {
                written: self.frames_written,
                expected,
            }
            .into());
        }

        let data_size = self.bits.bytes_written();
        let mut writer = self.bits.close()?;
        if data_size & 1 != 0 {
            writer.write_all(&[0])?;
        }

        let end = writer.stream_position()?;
        let data_size = to_chunk_size(data_size)?;
        let group_size = to_chunk_size(end - self.start - CHUNK_HEADER_SIZE)?;

        writer.seek(SeekFrom::Start(self.start + 4))?;
        writer.write_all(&group_size.to_be_bytes())?;
        writer.seek(SeekFrom::Start(self.start + CRC_OFFSET))?;
        writer.write_all(&crc_value.to_be_bytes())?;
        writer.seek(SeekFrom::Start(self.data_start - 4))?;
        writer.write_all(&data_size.to_be_bytes())?;
        writer.seek(SeekFrom::Start(end))?;
        writer.flush()?;

        trace!("Data chunk: {data_size} bytes, CRC {crc_value:#010X}");
        Ok((writer, end - self.start))
    }
}

fn to_chunk_size(size: u64) -> io::Result<u32> {
    u32::try_from(size).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{size} bytes do not fit an IFF chunk"),
        )
    })
}

/// A parsed Onda file, positioned for reading its blocks.
#[derive(Debug)]
pub struct OndaReader<R: Read + Seek> {
    reader: R,
    options: ReadOptions,
    attributes: Attributes,
    private_data: Option<Vec<u8>>,
    data_offset: u64,
    data_size: u64,
    file_size: u64,
}

impl<R: Read + Seek> OndaReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        Self::with_options(reader, ReadOptions::default())
    }

    /// Reads and checks the chunk layout of the whole group.
    pub fn with_options(mut reader: R, options: ReadOptions) -> Result<Self> {
        let start = reader.stream_position()?;
        let stream_end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(start))?;

        let mut header = [0u8; 12];
        if reader.read_exact(&mut header).is_err()
            || &header[..4] != FORM_ID
            || &header[8..] != ONDA_ID
        {
            return Err(ValidationError::NotAnOndaFile.into());
        }

        let group_size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as u64;
        let group_end = start + CHUNK_HEADER_SIZE + group_size;
        if group_end > stream_end {
            return Err(ValidationError::GroupSizeMismatch {
                found: stream_end - start - CHUNK_HEADER_SIZE,
                expected: group_size,
            }
            .into());
        }

        let mut attributes = None;
        let mut private_data = None;
        let mut data = None;
        let mut position = start + header.len() as u64;

        while position + CHUNK_HEADER_SIZE <= group_end {
            let Some((id, size)) = byteorder::read_chunk_header(&mut reader, ByteOrder::Big)?
            else {
                break;
            };
            let body_start = position + CHUNK_HEADER_SIZE;
            let next = body_start + padded_size(size);
            if body_start + size as u64 > group_end {
                return Err(
                    ValidationError::MalformedFile("chunk extends past the end of the group").into(),
                );
            }

            match &id {
                ATTRIBUTES_ID => {
                    if attributes.is_some() {
                        return Err(ValidationError::MultipleAttributesChunks.into());
                    }
                    let body = read_body(&mut reader, size)?;
                    attributes = Some(Attributes::from_bytes(&body)?);
                }
                PRIVATE_ID => {
                    if data.is_some() {
                        return Err(ValidationError::PrivateChunkAfterData.into());
                    }
                    if private_data.is_some() {
                        return Err(ValidationError::MultiplePrivateChunks.into());
                    }
                    private_data = Some(read_body(&mut reader, size)?);
                }
                DATA_ID => {
                    if attributes.is_none() {
                        return Err(ValidationError::NoAttributesChunkBeforeData.into());
                    }
                    if data.is_some() {
                        return Err(ValidationError::MultipleDataChunks.into());
                    }
                    data = Some((body_start, size as u64));
                }
                _ => {
                    log_or_err!(
                        options,
                        Warn,
                        ValidationError::UnknownChunk(String::from_utf8_lossy(&id).into_owned())
                    );
                }
            }

            position = next.min(group_end);
            reader.seek(SeekFrom::Start(position))?;
        }

        let attributes = attributes.ok_or(ValidationError::NoAttributesChunk)?;
        let (data_offset, data_size) = data.ok_or(ValidationError::NoDataChunk)?;

        if attributes.has_private_data() != private_data.is_some() {
            log_or_err!(
                options,
                Warn,
                ValidationError::MalformedFile("version does not match the private data chunk")
            );
        }

        debug!(
            "Onda file: {} ch, {} bit, {} Hz, {} frames, data {} bytes",
            attributes.num_channels,
            attributes.bits_per_sample,
            attributes.sample_rate,
            attributes.num_sample_frames,
            data_size
        );

        Ok(Self {
            reader,
            options,
            attributes,
            private_data,
            data_offset,
            data_size,
            file_size: group_end - start,
        })
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn private_data_bytes(&self) -> Option<&[u8]> {
        self.private_data.as_deref()
    }

    pub fn private_data(&self) -> std::result::Result<Option<PrivateData>, PrivateDataError> {
        self.private_data
            .as_deref()
            .map(PrivateData::from_bytes)
            .transpose()
    }

    /// Size of the compressed sample data.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Size of the whole container, headers included.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Starts decoding from the first block.
    pub fn blocks(&mut self) -> Result<BlockReader<'_, R>> {
        self.attributes.require_supported_width()?;
        self.reader.seek(SeekFrom::Start(self.data_offset))?;

        Ok(BlockReader {
            bits: BsIoDataReader::buffered(&mut self.reader, self.data_size),
            decoder: BlockDecoder::with_attributes(&self.attributes),
            options: self.options,
            block_length: self.attributes.block_length as u64,
            total_frames: self.attributes.num_sample_frames,
            frames_read: 0,
        })
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn read_body<R: Read>(reader: &mut R, size: u32) -> io::Result<Vec<u8>> {
    let mut body = vec![0u8; size as usize];
    reader.read_exact(&mut body)?;
    Ok(body)
}

/// Sequential decoder over the blocks of a data chunk.
pub struct BlockReader<'a, R: Read> {
    bits: BsIoDataReader<&'a mut R>,
    decoder: BlockDecoder,
    options: ReadOptions,
    block_length: u64,
    total_frames: u64,
    frames_read: u64,
}

impl<R: Read> BlockReader<'_, R> {
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Decodes the next block into `out`, replacing its contents.
    ///
    /// Returns the number of sample frames, or `None` after the last block.
    pub fn next_block(&mut self, out: &mut Vec<i32>) -> Result<Option<usize>> {
        out.clear();
        let frames = (self.total_frames - self.frames_read).min(self.block_length) as usize;
        if frames == 0 {
            return Ok(None);
        }

        self.decoder.read_block(&mut self.bits, frames, out)?;
        self.frames_read += frames as u64;

        if self.frames_read == self.total_frames && self.bits.available() >= 8 {
            log_or_err!(
                self.options,
                Warn,
                OndaError::from(DecodeError::TrailingData(self.total_frames))
            );
        }

        Ok(Some(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn attributes(channels: u16, bits: u16, frames: u64, block_length: u32) -> Attributes {
        Attributes::new(channels, bits, 48000, frames)
            .and_then(|a| a.with_block_length(block_length))
            .unwrap()
    }

    fn write_file(
        attributes: Attributes,
        private: Option<&[u8]>,
        samples: &[i32],
        crc: u32,
    ) -> Result<Vec<u8>> {
        let mut writer = OndaWriter::new(Cursor::new(Vec::new()), attributes, private)?;
        let per_block = attributes.block_length as usize * attributes.num_channels as usize;
        for block in samples.chunks(per_block) {
            writer.write_block(block)?;
        }
        let (cursor, size) = writer.finish(crc)?;
        let bytes = cursor.into_inner();
        assert_eq!(size, bytes.len() as u64);
        Ok(bytes)
    }

    fn read_all(bytes: &[u8], options: ReadOptions) -> Result<(Attributes, Vec<i32>)> {
        let mut reader = OndaReader::with_options(Cursor::new(bytes), options)?;
        let attributes = *reader.attributes();
        let mut blocks = reader.blocks()?;
        let mut samples = Vec::new();
        let mut block = Vec::new();
        while blocks.next_block(&mut block)?.is_some() {
            samples.extend_from_slice(&block);
        }
        Ok((attributes, samples))
    }

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        byteorder::write_chunk(&mut out, id, body, ByteOrder::Big).unwrap();
        out
    }

    fn group(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut out = FORM_ID.to_vec();
        out.extend(((body.len() + 4) as u32).to_be_bytes());
        out.extend(ONDA_ID);
        out.extend(body);
        out
    }

    #[test]
    fn layout_and_patched_fields() -> Result<()> {
        let samples: Vec<i32> = (0..7 * 2).map(|i| i * 100 - 700).collect();
        let bytes = write_file(attributes(2, 16, 7, 3), Some(b"abc"), &samples, 0x1234_5678)?;

        assert_eq!(&bytes[..4], b"FORM");
        assert_eq!(
            u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as usize,
            bytes.len() - 8
        );
        assert_eq!(&bytes[8..16], b"ONDAATTR");
        assert_eq!(&bytes[16..20], &28u32.to_be_bytes());
        // Version 1 because private data is present.
        assert_eq!(&bytes[20..22], &[0, 1]);
        assert_eq!(&bytes[38..42], &0x1234_5678u32.to_be_bytes());
        assert_eq!(&bytes[48..56], b"PRVT\0\0\0\x03");
        assert_eq!(&bytes[56..60], b"abc\0");
        assert_eq!(&bytes[60..64], b"DATA");
        let data_size = u32::from_be_bytes(bytes[64..68].try_into().unwrap()) as usize;
        assert_eq!(68 + data_size + (data_size & 1), bytes.len());

        let (attributes, decoded) = read_all(&bytes, ReadOptions::default())?;
        assert_eq!(attributes.crc_value, 0x1234_5678);
        assert!(attributes.has_private_data());
        assert_eq!(decoded, samples);
        Ok(())
    }

    #[test]
    fn private_data_reads_back() -> Result<()> {
        let bytes = write_file(attributes(1, 24, 0, 256), Some(b"opaque"), &[], 0)?;
        let reader = OndaReader::new(Cursor::new(&bytes))?;
        assert_eq!(reader.private_data_bytes(), Some(&b"opaque"[..]));
        assert!(matches!(
            reader.private_data(),
            Err(PrivateDataError::MalformedData)
        ));

        let bytes = write_file(attributes(1, 24, 0, 256), None, &[], 0)?;
        let reader = OndaReader::new(Cursor::new(&bytes))?;
        assert_eq!(reader.attributes().version, VERSION_PLAIN);
        assert!(reader.private_data()?.is_none());
        assert_eq!(reader.data_size(), 0);
        Ok(())
    }

    #[test]
    fn frame_count_must_match() -> Result<()> {
        let mut writer = OndaWriter::new(Cursor::new(Vec::new()), attributes(1, 16, 10, 4), None)?;
        writer.write_block(&[1, 2, 3, 4])?;
        let err = writer.finish(0).err().unwrap();
        assert!(matches!(
            err,
            OndaError::Validation(ValidationError::FrameCountMismatch {
                written: 4,
                expected: 10
            })
        ));
        Ok(())
    }

    #[test]
    fn rejects_other_files() {
        for bytes in [&b"RIFF\0\0\0\0WAVE"[..], &b"FORM\0\0\0\x04AIFF"[..], &b"FORM"[..]] {
            let err = OndaReader::new(Cursor::new(bytes)).unwrap_err();
            assert!(matches!(
                err,
                OndaError::Validation(ValidationError::NotAnOndaFile)
            ));
        }
    }

    #[test]
    fn structural_errors() {
        let attr = attributes(1, 16, 0, 16).chunk_data();
        let a = chunk(ATTRIBUTES_ID, &attr);
        let p = chunk(PRIVATE_ID, b"x");
        let d = chunk(DATA_ID, b"");

        let cases: [(Vec<Vec<u8>>, fn(&ValidationError) -> bool); 7] = [
            (vec![a.clone(), a.clone(), d.clone()], |e| {
                matches!(e, ValidationError::MultipleAttributesChunks)
            }),
            (vec![d.clone(), a.clone()], |e| {
                matches!(e, ValidationError::NoAttributesChunkBeforeData)
            }),
            (vec![a.clone(), d.clone(), p.clone()], |e| {
                matches!(e, ValidationError::PrivateChunkAfterData)
            }),
            (vec![a.clone(), p.clone(), p.clone(), d.clone()], |e| {
                matches!(e, ValidationError::MultiplePrivateChunks)
            }),
            (vec![a.clone(), d.clone(), d.clone()], |e| {
                matches!(e, ValidationError::MultipleDataChunks)
            }),
            (vec![p.clone()], |e| matches!(e, ValidationError::NoAttributesChunk)),
            (vec![a.clone()], |e| matches!(e, ValidationError::NoDataChunk)),
        ];

        for (chunks, expected) in cases {
            match OndaReader::new(Cursor::new(group(&chunks))) {
                Err(OndaError::Validation(e)) => assert!(expected(&e), "unexpected {e}"),
                other => panic!("expected a validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_chunks_fail_only_when_strict() -> Result<()> {
        let attr = attributes(1, 16, 0, 16).chunk_data();
        let bytes = group(&[
            chunk(ATTRIBUTES_ID, &attr),
            chunk(b"NOTE", b"hello"),
            chunk(DATA_ID, b""),
        ]);

        let reader = OndaReader::new(Cursor::new(&bytes))?;
        assert_eq!(reader.data_size(), 0);

        let err = OndaReader::with_options(Cursor::new(&bytes), ReadOptions::strict()).unwrap_err();
        assert!(matches!(
            err,
            OndaError::Validation(ValidationError::UnknownChunk(ref id)) if id == "NOTE"
        ));
        Ok(())
    }

    #[test]
    fn truncated_group_is_reported() -> Result<()> {
        let samples: Vec<i32> = (0..64).collect();
        let mut bytes = write_file(attributes(1, 16, 64, 16), None, &samples, 0)?;
        bytes.truncate(bytes.len() - 5);

        let err = OndaReader::new(Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(
            err,
            OndaError::Validation(ValidationError::GroupSizeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn short_data_chunk_is_end_of_data() -> Result<()> {
        let attr = attributes(1, 16, 64, 16).chunk_data();
        let bytes = group(&[chunk(ATTRIBUTES_ID, &attr), chunk(DATA_ID, &[0u8; 20])]);

        let err = read_all(&bytes, ReadOptions::default()).unwrap_err();
        assert!(matches!(err, OndaError::Decode(DecodeError::EndOfData)));
        Ok(())
    }
}
