//! AIFF and WAVE files as seen by the codec: a format description, the ordered
//! chunk list, and a stream of little-endian sample bytes.

pub mod aiff;
pub mod chunk_filter;
pub mod wave;

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use onda::byteorder::{self, ByteOrder, CHUNK_HEADER_SIZE, padded_size};
use onda::structs::attributes::Attributes;
use onda::structs::private_data::{PrivateChunk, PrivateData, SourceKind};

use aiff::{AiffReader, AiffWriter};
use wave::{WaveReader, WaveWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum AudioFileKind {
    /// Audio Interchange File Format.
    Aiff,
    /// RIFF WAVE.
    Wave,
}

impl AudioFileKind {
    /// Identifies a file by its first 12 bytes.
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        if header.len() < 12 {
            return None;
        }
        match (&header[..4], &header[8..12]) {
            (b"FORM", b"AIFF") => Some(AudioFileKind::Aiff),
            (b"RIFF", b"WAVE") => Some(AudioFileKind::Wave),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "aif" | "aiff" => Some(AudioFileKind::Aiff),
            "wav" | "wave" => Some(AudioFileKind::Wave),
            _ => None,
        }
    }

    /// Detects the kind from the file header, falling back to the extension.
    pub fn detect(path: &Path) -> io::Result<Option<Self>> {
        let mut header = Vec::with_capacity(12);
        File::open(path)?.take(12).read_to_end(&mut header)?;
        Ok(Self::from_magic(&header).or_else(|| Self::from_extension(path)))
    }

    pub const fn extension(self) -> &'static str {
        match self {
            AudioFileKind::Aiff => "aiff",
            AudioFileKind::Wave => "wav",
        }
    }

    pub const fn source_kind(self) -> SourceKind {
        match self {
            AudioFileKind::Aiff => SourceKind::Aiff,
            AudioFileKind::Wave => SourceKind::Wave,
        }
    }

    pub const fn from_source_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Aiff => AudioFileKind::Aiff,
            SourceKind::Wave => AudioFileKind::Wave,
        }
    }

    /// Chunk ids of the format description and the sample data.
    pub const fn critical_chunk_ids(self) -> [[u8; 4]; 2] {
        match self {
            AudioFileKind::Aiff => [*b"COMM", *b"SSND"],
            AudioFileKind::Wave => [*b"fmt ", *b"data"],
        }
    }

    pub fn open_reader<R: Read + Seek>(self, reader: R) -> io::Result<AudioReader<R>> {
        Ok(match self {
            AudioFileKind::Aiff => AudioReader::Aiff(AiffReader::new(reader)?),
            AudioFileKind::Wave => AudioReader::Wave(WaveReader::new(reader)?),
        })
    }

    /// Starts a file with the chunks of `private_data` in their recorded order.
    pub fn create_writer<W: Write + Seek>(
        self,
        writer: W,
        info: &AudioInfo,
        private_data: Option<&PrivateData>,
    ) -> io::Result<AudioWriter<W>> {
        let layout = ChunkLayout::new(self, private_data);
        Ok(match self {
            AudioFileKind::Aiff => AudioWriter::Aiff(AiffWriter::new(writer, info, layout)?),
            AudioFileKind::Wave => AudioWriter::Wave(WaveWriter::new(writer, info, layout)?),
        })
    }
}

impl fmt::Display for AudioFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFileKind::Aiff => write!(f, "AIFF"),
            AudioFileKind::Wave => write!(f, "WAVE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub num_channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub num_sample_frames: u64,
}

impl AudioInfo {
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    pub fn bytes_per_sample_frame(&self) -> usize {
        self.bytes_per_sample() * self.num_channels as usize
    }

    pub fn data_length(&self) -> u64 {
        self.num_sample_frames * self.bytes_per_sample_frame() as u64
    }
}

impl From<&Attributes> for AudioInfo {
    fn from(attributes: &Attributes) -> Self {
        Self {
            num_channels: attributes.num_channels,
            bits_per_sample: attributes.bits_per_sample,
            sample_rate: attributes.sample_rate,
            num_sample_frames: attributes.num_sample_frames,
        }
    }
}

/// A source audio file, yielding little-endian sample bytes.
pub enum AudioReader<R: Read + Seek> {
    Aiff(AiffReader<R>),
    Wave(WaveReader<R>),
}

impl<R: Read + Seek> AudioReader<R> {
    pub fn kind(&self) -> AudioFileKind {
        match self {
            AudioReader::Aiff(_) => AudioFileKind::Aiff,
            AudioReader::Wave(_) => AudioFileKind::Wave,
        }
    }

    pub fn info(&self) -> &AudioInfo {
        match self {
            AudioReader::Aiff(r) => r.info(),
            AudioReader::Wave(r) => r.info(),
        }
    }

    /// Every chunk in file order; the critical ones without a body.
    pub fn chunks(&self) -> &[PrivateChunk] {
        match self {
            AudioReader::Aiff(r) => r.chunks(),
            AudioReader::Wave(r) => r.chunks(),
        }
    }
}

impl<R: Read + Seek> Read for AudioReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            AudioReader::Aiff(r) => r.read(buf),
            AudioReader::Wave(r) => r.read(buf),
        }
    }
}

/// An audio file being written from little-endian sample bytes.
pub enum AudioWriter<W: Write + Seek> {
    Aiff(AiffWriter<W>),
    Wave(WaveWriter<W>),
}

impl<W: Write + Seek> AudioWriter<W> {
    /// Writes the chunks that follow the sample data and patches the sizes.
    pub fn finish(self) -> io::Result<W> {
        match self {
            AudioWriter::Aiff(w) => w.finish(),
            AudioWriter::Wave(w) => w.finish(),
        }
    }
}

impl<W: Write + Seek> Write for AudioWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            AudioWriter::Aiff(w) => w.write(buf),
            AudioWriter::Wave(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            AudioWriter::Aiff(w) => w.flush(),
            AudioWriter::Wave(w) => w.flush(),
        }
    }
}

/// One entry of the chunk order an audio writer follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutEntry {
    Format,
    Data,
    Ancillary(PrivateChunk),
}

/// Chunk order for a new audio file, split around the sample data.
#[derive(Debug, Clone, Default)]
pub struct ChunkLayout {
    pub before_data: Vec<LayoutEntry>,
    pub after_data: Vec<LayoutEntry>,
}

impl ChunkLayout {
    /// Follows the recorded order, keeping the first format and data entries and
    /// adding whichever of them is missing.
    pub fn new(kind: AudioFileKind, private_data: Option<&PrivateData>) -> Self {
        let [format_id, data_id] = kind.critical_chunk_ids();
        let mut entries = Vec::new();
        let (mut has_format, mut has_data) = (false, false);

        for chunk in private_data.map_or(&[][..], |p| &p.chunks[..]) {
            if chunk.id == format_id {
                if !has_format {
                    entries.push(LayoutEntry::Format);
                    has_format = true;
                }
            } else if chunk.id == data_id {
                if !has_data {
                    entries.push(LayoutEntry::Data);
                    has_data = true;
                }
            } else {
                entries.push(LayoutEntry::Ancillary(chunk.clone()));
            }
        }

        if !has_data {
            entries.push(LayoutEntry::Data);
        }
        if !has_format {
            let data_pos = entries
                .iter()
                .position(|e| *e == LayoutEntry::Data)
                .unwrap_or(entries.len());
            entries.insert(data_pos, LayoutEntry::Format);
        }

        let data_pos = entries
            .iter()
            .position(|e| *e == LayoutEntry::Data)
            .unwrap_or(entries.len());
        let after_data = entries.split_off(data_pos + 1);
        entries.pop();

        Self {
            before_data: entries,
            after_data,
        }
    }
}

/// A chunk found while scanning a group.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkLocation {
    pub id: [u8; 4],
    pub size: u32,
    pub offset: u64,
}

/// Checks the group header and lists its chunks, up to the end of the group or
/// the end of the file, whichever comes first.
pub(crate) fn scan_group<R: Read + Seek>(
    reader: &mut R,
    order: ByteOrder,
    group_id: &[u8; 4],
    form_type: &[u8; 4],
) -> io::Result<Vec<ChunkLocation>> {
    let start = reader.stream_position()?;
    let file_end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(start))?;

    let mut header = [0u8; 12];
    reader.read_exact(&mut header)?;
    if &header[..4] != group_id || &header[8..] != form_type {
        return Err(invalid_data(format!(
            "not a {}/{} file",
            String::from_utf8_lossy(group_id),
            String::from_utf8_lossy(form_type)
        )));
    }

    let group_size = order.u32_from_bytes([header[4], header[5], header[6], header[7]]);
    let group_end = (start + CHUNK_HEADER_SIZE + group_size as u64).min(file_end);
    if group_end < start + CHUNK_HEADER_SIZE + group_size as u64 {
        log::debug!("Group size runs past the end of the file, reading up to the end");
    }

    let mut chunks = Vec::new();
    let mut position = start + header.len() as u64;
    while position + CHUNK_HEADER_SIZE <= group_end {
        let Some((id, size)) = byteorder::read_chunk_header(reader, order)? else {
            break;
        };
        let offset = position + CHUNK_HEADER_SIZE;
        if offset + size as u64 > file_end {
            return Err(invalid_data(format!(
                "chunk '{}' runs past the end of the file",
                String::from_utf8_lossy(&id)
            )));
        }

        chunks.push(ChunkLocation { id, size, offset });
        position = offset + padded_size(size);
        reader.seek(SeekFrom::Start(position))?;
    }

    Ok(chunks)
}

pub(crate) fn read_chunk_body<R: Read + Seek>(
    reader: &mut R,
    chunk: &ChunkLocation,
) -> io::Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(chunk.offset))?;
    let mut body = vec![0u8; chunk.size as usize];
    reader.read_exact(&mut body)?;
    Ok(body)
}

pub(crate) fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Reads as many bytes as available into `buf`, stopping early only at end of stream.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
