use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Take, Write};

use onda::byteorder::{self, ByteOrder, Chunk};
use onda::structs::private_data::PrivateChunk;
use onda_macros::{ToBytes, chunk_type};

use super::{
    AudioInfo, ChunkLayout, ChunkLocation, LayoutEntry, invalid_data, read_chunk_body, read_full,
    scan_group,
};

const COMMON_SIZE: usize = 18;
const SOUND_HEADER_SIZE: u32 = 8;

#[derive(Debug, ToBytes)]
#[chunk_type(b"COMM")]
pub struct CommonChunk {
    pub num_channels: u16,
    pub num_sample_frames: u32,
    pub sample_size: u16,
    pub sample_rate: [u8; 10],
}

impl CommonChunk {
    fn parse(body: &[u8]) -> io::Result<Self> {
        if body.len() < COMMON_SIZE {
            return Err(invalid_data(format!(
                "COMM chunk too short: {} bytes",
                body.len()
            )));
        }
        let mut sample_rate = [0u8; 10];
        sample_rate.copy_from_slice(&body[8..18]);
        Ok(Self {
            num_channels: u16::from_be_bytes([body[0], body[1]]),
            num_sample_frames: u32::from_be_bytes([body[2], body[3], body[4], body[5]]),
            sample_size: u16::from_be_bytes([body[6], body[7]]),
            sample_rate,
        })
    }
}

/// Decodes an 80-bit IEEE 754 extended precision value.
pub fn f80_to_f64(bytes: [u8; 10]) -> f64 {
    let negative = bytes[0] & 0x80 != 0;
    let exponent = u16::from_be_bytes([bytes[0] & 0x7F, bytes[1]]) as i32;
    let mut significand = [0u8; 8];
    significand.copy_from_slice(&bytes[2..]);
    let significand = u64::from_be_bytes(significand);

    if exponent == 0 && significand == 0 {
        return 0.0;
    }

    // The integer bit is explicit, so the significand is scaled by 2^-63.
    let value = significand as f64 * 2f64.powi(exponent - 16383 - 63);
    if negative { -value } else { value }
}

pub fn u32_to_f80(value: u32) -> [u8; 10] {
    let mut bytes = [0u8; 10];
    if value == 0 {
        return bytes;
    }

    let exponent = 31 - value.leading_zeros();
    let biased = (16383 + exponent) as u16;
    let significand = (value as u64) << (63 - exponent);
    bytes[..2].copy_from_slice(&biased.to_be_bytes());
    bytes[2..].copy_from_slice(&significand.to_be_bytes());
    bytes
}

fn sample_rate_from_f80(bytes: [u8; 10]) -> io::Result<u32> {
    let rate = f80_to_f64(bytes);
    let rounded = rate.round();
    if !(1.0..=u32::MAX as f64).contains(&rounded) {
        return Err(invalid_data(format!("unsupported AIFF sample rate: {rate}")));
    }
    if rounded != rate {
        log::debug!("Rounded AIFF sample rate {rate} to {rounded}");
    }
    Ok(rounded as u32)
}

/// Reverses the byte order of each `width`-byte sample read through it.
pub struct SwapBytes<R> {
    inner: R,
    width: usize,
    pending: Vec<u8>,
    pos: usize,
}

impl<R: Read> SwapBytes<R> {
    pub fn new(inner: R, width: usize) -> Self {
        Self {
            inner,
            width: width.max(1),
            pending: Vec::new(),
            pos: 0,
        }
    }

    fn refill(&mut self, wanted: usize) -> io::Result<()> {
        let len = wanted.max(self.width).div_ceil(self.width) * self.width;
        self.pending.resize(len, 0);
        let filled = read_full(&mut self.inner, &mut self.pending)?;
        if filled % self.width != 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "sample data ends inside a sample",
            ));
        }

        self.pending.truncate(filled);
        self.pending
            .chunks_exact_mut(self.width)
            .for_each(<[u8]>::reverse);
        self.pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for SwapBytes<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos == self.pending.len() {
            self.refill(buf.len())?;
        }

        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

pub struct AiffReader<R: Read + Seek> {
    samples: SwapBytes<Take<BufReader<R>>>,
    info: AudioInfo,
    chunks: Vec<PrivateChunk>,
}

impl<R: Read + Seek> AiffReader<R> {
    pub fn new(mut reader: R) -> io::Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let found = scan_group(&mut reader, ByteOrder::Big, b"FORM", b"AIFF")?;

        let mut common = None;
        let mut sound = None;
        let mut chunks = Vec::with_capacity(found.len());

        for chunk in &found {
            match &chunk.id {
                b"COMM" if common.is_none() => {
                    common = Some(CommonChunk::parse(&read_chunk_body(&mut reader, chunk)?)?);
                    chunks.push(PrivateChunk::placeholder(chunk.id));
                }
                b"SSND" if sound.is_none() => {
                    sound = Some(*chunk);
                    chunks.push(PrivateChunk::placeholder(chunk.id));
                }
                b"COMM" | b"SSND" => {
                    log::warn!(
                        "Ignoring repeated '{}' chunk",
                        String::from_utf8_lossy(&chunk.id)
                    );
                }
                _ => chunks.push(PrivateChunk::new(
                    chunk.id,
                    read_chunk_body(&mut reader, chunk)?,
                )),
            }
        }

        let common = common.ok_or_else(|| invalid_data("no COMM chunk"))?;
        if !(1..=32).contains(&common.sample_size) {
            return Err(invalid_data(format!(
                "unsupported AIFF sample size: {}",
                common.sample_size
            )));
        }
        let info = AudioInfo {
            num_channels: common.num_channels,
            bits_per_sample: common.sample_size,
            sample_rate: sample_rate_from_f80(common.sample_rate)?,
            num_sample_frames: common.num_sample_frames as u64,
        };

        let data_length = info.data_length();
        let data_start = match sound {
            Some(sound) => {
                let header = read_chunk_body(
                    &mut reader,
                    &ChunkLocation {
                        size: SOUND_HEADER_SIZE.min(sound.size),
                        ..sound
                    },
                )?;
                if header.len() < SOUND_HEADER_SIZE as usize {
                    return Err(invalid_data("SSND chunk too short"));
                }
                let offset = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
                let available = (sound.size as u64)
                    .checked_sub(SOUND_HEADER_SIZE as u64 + offset as u64)
                    .ok_or_else(|| invalid_data("SSND data offset past the end of the chunk"))?;
                if available < data_length {
                    return Err(invalid_data(format!(
                        "SSND chunk holds {available} bytes of samples, COMM declares {data_length}"
                    )));
                }
                sound.offset + SOUND_HEADER_SIZE as u64 + offset as u64
            }
            None if data_length == 0 => 0,
            None => return Err(invalid_data("no SSND chunk")),
        };

        reader.seek(SeekFrom::Start(data_start))?;
        let samples = SwapBytes::new(
            BufReader::new(reader).take(data_length),
            info.bytes_per_sample(),
        );

        Ok(Self {
            samples,
            info,
            chunks,
        })
    }

    pub fn info(&self) -> &AudioInfo {
        &self.info
    }

    pub fn chunks(&self) -> &[PrivateChunk] {
        &self.chunks
    }
}

impl<R: Read + Seek> Read for AiffReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.samples.read(buf)
    }
}

pub struct AiffWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    info: AudioInfo,
    width: usize,
    after_data: Vec<LayoutEntry>,
    form_start: u64,
    sound_size_pos: u64,
    data_written: u64,
    partial: Vec<u8>,
    scratch: Vec<u8>,
}

impl<W: Write + Seek> AiffWriter<W> {
    pub fn new(mut writer: W, info: &AudioInfo, layout: ChunkLayout) -> io::Result<Self> {
        let form_start = writer.stream_position()?;
        let mut writer = BufWriter::new(writer);

        writer.write_all(b"FORM")?;
        writer.write_all(&0u32.to_be_bytes())?;
        writer.write_all(b"AIFF")?;

        for entry in &layout.before_data {
            write_entry(&mut writer, entry, info)?;
        }

        let sound_size_pos = writer.stream_position()? + 4;
        writer.write_all(b"SSND")?;
        writer.write_all(&SOUND_HEADER_SIZE.to_be_bytes())?;
        // offset, block size
        writer.write_all(&[0u8; 8])?;

        Ok(Self {
            writer,
            info: *info,
            width: info.bytes_per_sample().max(1),
            after_data: layout.after_data,
            form_start,
            sound_size_pos,
            data_written: 0,
            partial: Vec::new(),
            scratch: Vec::new(),
        })
    }

    pub fn finish(mut self) -> io::Result<W> {
        if !self.partial.is_empty() {
            return Err(invalid_data("sample data ends inside a sample"));
        }
        let expected = self.info.data_length();
        if self.data_written != expected {
            return Err(invalid_data(format!(
                "wrote {} bytes of samples, COMM declares {expected}",
                self.data_written
            )));
        }

        let sound_size = size_u32(SOUND_HEADER_SIZE as u64 + self.data_written)?;
        if sound_size & 1 != 0 {
            self.writer.write_all(&[0])?;
        }
        for entry in &self.after_data {
            write_entry(&mut self.writer, entry, &self.info)?;
        }

        let end = self.writer.stream_position()?;
        let form_size = size_u32(end - self.form_start - 8)?;

        let mut writer = self.writer.into_inner().map_err(|e| e.into_error())?;
        writer.seek(SeekFrom::Start(self.sound_size_pos))?;
        writer.write_all(&sound_size.to_be_bytes())?;
        writer.seek(SeekFrom::Start(self.form_start + 4))?;
        writer.write_all(&form_size.to_be_bytes())?;
        writer.seek(SeekFrom::Start(end))?;
        writer.flush()?;

        Ok(writer)
    }
}

impl<W: Write + Seek> Write for AiffWriter<W> {
    /// Takes little-endian samples, which may be split across calls.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let width = self.width;
        let mut rest = buf;

        if !self.partial.is_empty() {
            let take = (width - self.partial.len()).min(rest.len());
            self.partial.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.partial.len() == width {
                self.partial.reverse();
                self.writer.write_all(&self.partial)?;
                self.partial.clear();
            }
        }

        let whole = rest.len() / width * width;
        self.scratch.clear();
        self.scratch.extend_from_slice(&rest[..whole]);
        self.scratch
            .chunks_exact_mut(width)
            .for_each(<[u8]>::reverse);
        self.writer.write_all(&self.scratch)?;
        self.partial.extend_from_slice(&rest[whole..]);

        self.data_written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

fn write_entry<W: Write>(writer: &mut W, entry: &LayoutEntry, info: &AudioInfo) -> io::Result<()> {
    match entry {
        LayoutEntry::Format => {
            let num_sample_frames = u32::try_from(info.num_sample_frames)
                .map_err(|_| invalid_data("too many sample frames for AIFF"))?;
            CommonChunk {
                num_channels: info.num_channels,
                num_sample_frames,
                sample_size: info.bits_per_sample,
                sample_rate: u32_to_f80(info.sample_rate),
            }
            .write_chunk(writer)?;
        }
        LayoutEntry::Ancillary(chunk) => {
            byteorder::write_chunk(writer, &chunk.id, &chunk.data, ByteOrder::Big)?;
        }
        LayoutEntry::Data => {}
    }
    Ok(())
}

fn size_u32(size: u64) -> io::Result<u32> {
    u32::try_from(size).map_err(|_| invalid_data("file too large for AIFF"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFileKind;
    use onda::structs::private_data::{PrivateData, SourceKind};
    use std::io::Cursor;

    const RATE_44100: [u8; 10] = [0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0];
    const RATE_48000: [u8; 10] = [0x40, 0x0E, 0xBB, 0x80, 0, 0, 0, 0, 0, 0];

    fn info(bits: u16, channels: u16, frames: u64) -> AudioInfo {
        AudioInfo {
            num_channels: channels,
            bits_per_sample: bits,
            sample_rate: 48000,
            num_sample_frames: frames,
        }
    }

    #[test]
    fn extended_sample_rates() {
        assert_eq!(f80_to_f64(RATE_44100), 44100.0);
        assert_eq!(f80_to_f64(RATE_48000), 48000.0);
        assert_eq!(u32_to_f80(44100), RATE_44100);
        assert_eq!(u32_to_f80(48000), RATE_48000);
        assert_eq!(u32_to_f80(0), [0; 10]);
        for rate in [1, 8000, 11025, 22050, 96000, 192000, 2_822_400, u32::MAX] {
            assert_eq!(f80_to_f64(u32_to_f80(rate)), rate as f64);
        }
    }

    #[test]
    fn fractional_rate_is_rounded() -> io::Result<()> {
        // 22050.5
        let mut bytes = u32_to_f80(22050);
        bytes[3] |= 0x01;
        assert_eq!(f80_to_f64(bytes), 22050.5);
        assert_eq!(sample_rate_from_f80(bytes)?, 22051);
        assert!(sample_rate_from_f80([0; 10]).is_err());
        Ok(())
    }

    #[test]
    fn swap_bytes_across_small_reads() -> io::Result<()> {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut swap = SwapBytes::new(&data[..], 3);
        let mut out = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let n = swap.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, [3, 2, 1, 6, 5, 4, 9, 8, 7]);

        let mut short = SwapBytes::new(&data[..8], 3);
        let err = short.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        Ok(())
    }

    #[test]
    fn write_then_read_with_ancillary_chunks() -> io::Result<()> {
        let private = PrivateData::new(
            SourceKind::Aiff,
            vec![
                PrivateChunk::new(*b"NAME", b"tone".to_vec()),
                PrivateChunk::placeholder(*b"COMM"),
                PrivateChunk::placeholder(*b"SSND"),
                PrivateChunk::new(*b"ANNO", b"odd".to_vec()),
            ],
        );
        let info = info(24, 1, 3);
        let samples_le = [0x01, 0x02, 0x03, 0xFD, 0xFE, 0xFF, 0x00, 0x00, 0x80];

        let mut writer = AudioFileKind::Aiff.create_writer(
            Cursor::new(Vec::new()),
            &info,
            Some(&private),
        )?;
        // Split inside samples on purpose.
        writer.write_all(&samples_le[..4])?;
        writer.write_all(&samples_le[4..5])?;
        writer.write_all(&samples_le[5..])?;
        let file = writer.finish()?.into_inner();

        assert_eq!(&file[..4], b"FORM");
        assert_eq!(u32::from_be_bytes(file[4..8].try_into().unwrap()) as usize, file.len() - 8);
        assert_eq!(&file[12..16], b"NAME");
        assert_eq!(&file[24..28], b"COMM");
        let ssnd = 24 + 8 + COMMON_SIZE;
        assert_eq!(&file[ssnd..ssnd + 4], b"SSND");
        assert_eq!(&file[ssnd + 16..ssnd + 19], [0x03, 0x02, 0x01]);

        let mut reader = AiffReader::new(Cursor::new(file))?;
        assert_eq!(*reader.info(), info);
        assert_eq!(reader.chunks(), &private.chunks[..]);
        let mut read_back = Vec::new();
        reader.read_to_end(&mut read_back)?;
        assert_eq!(read_back, samples_le);
        Ok(())
    }

    #[test]
    fn finish_checks_sample_count() -> io::Result<()> {
        let layout = ChunkLayout::new(AudioFileKind::Aiff, None);
        let mut writer = AiffWriter::new(Cursor::new(Vec::new()), &info(16, 2, 2), layout)?;
        writer.write_all(&[0; 6])?;
        assert!(writer.finish().is_err());
        Ok(())
    }

    #[test]
    fn short_sound_chunk_is_rejected() -> io::Result<()> {
        let layout = ChunkLayout::new(AudioFileKind::Aiff, None);
        let mut writer = AiffWriter::new(Cursor::new(Vec::new()), &info(16, 1, 2), layout)?;
        writer.write_all(&[1, 0, 2, 0])?;
        let mut file = writer.finish()?.into_inner();

        // Claim four frames in COMM.
        file[12 + 8 + 5] = 4;
        let err = AiffReader::new(Cursor::new(file)).err().map(|e| e.kind());
        assert_eq!(err, Some(io::ErrorKind::InvalidData));
        Ok(())
    }
}
