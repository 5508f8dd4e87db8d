use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Take, Write};

use onda::byteorder::{self, ByteOrder, Chunk};
use onda::structs::private_data::PrivateChunk;
use onda_macros::{ToBytes, chunk_type};

use super::{AudioInfo, ChunkLayout, LayoutEntry, invalid_data, read_chunk_body, scan_group};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

const FORMAT_SIZE: usize = 16;
const EXTENSIBLE_FORMAT_SIZE: usize = 40;

/// KSDATAFORMAT_SUBTYPE_PCM after its leading format tag.
const PCM_SUBFORMAT_TAIL: [u8; 14] = [
    0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
];

#[derive(Debug, ToBytes)]
#[chunk_type(b"fmt ", le)]
pub struct FormatChunk {
    pub format_tag: u16,
    pub num_channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    pub fn pcm(info: &AudioInfo) -> io::Result<Self> {
        let block_align = u16::try_from(info.bytes_per_sample_frame())
            .map_err(|_| invalid_data("sample frame too large for WAVE"))?;
        Ok(Self {
            format_tag: WAVE_FORMAT_PCM,
            num_channels: info.num_channels,
            sample_rate: info.sample_rate,
            byte_rate: info.sample_rate.saturating_mul(block_align as u32),
            block_align,
            bits_per_sample: info.bits_per_sample,
        })
    }

    fn parse(body: &[u8]) -> io::Result<Self> {
        if body.len() < FORMAT_SIZE {
            return Err(invalid_data(format!(
                "fmt chunk too short: {} bytes",
                body.len()
            )));
        }
        let u16_at = |i: usize| u16::from_le_bytes([body[i], body[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([body[i], body[i + 1], body[i + 2], body[i + 3]]);

        let format = Self {
            format_tag: u16_at(0),
            num_channels: u16_at(2),
            sample_rate: u32_at(4),
            byte_rate: u32_at(8),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
        };

        match format.format_tag {
            WAVE_FORMAT_PCM => {}
            WAVE_FORMAT_EXTENSIBLE => {
                if body.len() < EXTENSIBLE_FORMAT_SIZE {
                    return Err(invalid_data("WAVE_FORMAT_EXTENSIBLE fmt chunk too short"));
                }
                let sub_format = u16_at(24);
                if sub_format != WAVE_FORMAT_PCM || body[26..40] != PCM_SUBFORMAT_TAIL {
                    return Err(invalid_data(format!(
                        "unsupported WAVE sub-format {sub_format:#06X}"
                    )));
                }
            }
            tag => {
                return Err(invalid_data(format!("unsupported WAVE format tag {tag:#06X}")));
            }
        }

        Ok(format)
    }
}

pub struct WaveReader<R: Read + Seek> {
    samples: Take<BufReader<R>>,
    info: AudioInfo,
    chunks: Vec<PrivateChunk>,
}

impl<R: Read + Seek> WaveReader<R> {
    pub fn new(mut reader: R) -> io::Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let found = scan_group(&mut reader, ByteOrder::Little, b"RIFF", b"WAVE")?;

        let mut format = None;
        let mut data = None;
        let mut chunks = Vec::with_capacity(found.len());

        for chunk in &found {
            match &chunk.id {
                b"fmt " if format.is_none() => {
                    format = Some(FormatChunk::parse(&read_chunk_body(&mut reader, chunk)?)?);
                    chunks.push(PrivateChunk::placeholder(chunk.id));
                }
                b"data" if data.is_none() => {
                    data = Some(*chunk);
                    chunks.push(PrivateChunk::placeholder(chunk.id));
                }
                b"fmt " | b"data" => {
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

        let format = format.ok_or_else(|| invalid_data("no fmt chunk"))?;
        let data = data.ok_or_else(|| invalid_data("no data chunk"))?;

        if !(1..=32).contains(&format.bits_per_sample) {
            return Err(invalid_data(format!(
                "unsupported WAVE bits per sample: {}",
                format.bits_per_sample
            )));
        }
        let mut info = AudioInfo {
            num_channels: format.num_channels,
            bits_per_sample: format.bits_per_sample,
            sample_rate: format.sample_rate,
            num_sample_frames: 0,
        };
        let block_align = info.bytes_per_sample_frame() as u64;
        if block_align == 0 || block_align != format.block_align as u64 {
            return Err(invalid_data(format!(
                "block align {} does not match {} channels of {} bits",
                format.block_align, format.num_channels, format.bits_per_sample
            )));
        }

        info.num_sample_frames = data.size as u64 / block_align;
        let leftover = data.size as u64 % block_align;
        if leftover != 0 {
            log::warn!("Ignoring {leftover} bytes after the last whole sample frame");
        }

        reader.seek(SeekFrom::Start(data.offset))?;
        let samples = BufReader::new(reader).take(info.data_length());

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

impl<R: Read + Seek> Read for WaveReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.samples.read(buf)
    }
}

pub struct WaveWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    info: AudioInfo,
    after_data: Vec<LayoutEntry>,
    riff_start: u64,
    data_size_pos: u64,
    data_written: u64,
}

impl<W: Write + Seek> WaveWriter<W> {
    pub fn new(mut writer: W, info: &AudioInfo, layout: ChunkLayout) -> io::Result<Self> {
        let riff_start = writer.stream_position()?;
        let mut writer = BufWriter::new(writer);

        writer.write_all(b"RIFF")?;
        writer.write_all(&0u32.to_le_bytes())?;
        writer.write_all(b"WAVE")?;

        for entry in &layout.before_data {
            write_entry(&mut writer, entry, info)?;
        }

        let data_size_pos = writer.stream_position()? + 4;
        writer.write_all(b"data")?;
        writer.write_all(&0u32.to_le_bytes())?;

        Ok(Self {
            writer,
            info: *info,
            after_data: layout.after_data,
            riff_start,
            data_size_pos,
            data_written: 0,
        })
    }

    pub fn finish(mut self) -> io::Result<W> {
        let expected = self.info.data_length();
        if self.data_written != expected {
            return Err(invalid_data(format!(
                "wrote {} bytes of samples, fmt declares {expected}",
                self.data_written
            )));
        }

        let data_size = size_u32(self.data_written)?;
        if data_size & 1 != 0 {
            self.writer.write_all(&[0])?;
        }
        for entry in &self.after_data {
            write_entry(&mut self.writer, entry, &self.info)?;
        }

        let end = self.writer.stream_position()?;
        let riff_size = size_u32(end - self.riff_start - 8)?;

        let mut writer = self.writer.into_inner().map_err(|e| e.into_error())?;
        writer.seek(SeekFrom::Start(self.data_size_pos))?;
        writer.write_all(&data_size.to_le_bytes())?;
        writer.seek(SeekFrom::Start(self.riff_start + 4))?;
        writer.write_all(&riff_size.to_le_bytes())?;
        writer.seek(SeekFrom::Start(end))?;
        writer.flush()?;

        Ok(writer)
    }
}

impl<W: Write + Seek> Write for WaveWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.data_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

fn write_entry<W: Write>(writer: &mut W, entry: &LayoutEntry, info: &AudioInfo) -> io::Result<()> {
    match entry {
        LayoutEntry::Format => {
            FormatChunk::pcm(info)?.write_chunk(writer)?;
        }
        LayoutEntry::Ancillary(chunk) => {
            byteorder::write_chunk(writer, &chunk.id, &chunk.data, ByteOrder::Little)?;
        }
        LayoutEntry::Data => {}
    }
    Ok(())
}

fn size_u32(size: u64) -> io::Result<u32> {
    u32::try_from(size).map_err(|_| invalid_data("file too large for WAVE"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFileKind;
    use onda::structs::private_data::{PrivateData, SourceKind};
    use std::io::Cursor;

    fn stereo_16(frames: u64) -> AudioInfo {
        AudioInfo {
            num_channels: 2,
            bits_per_sample: 16,
            sample_rate: 44100,
            num_sample_frames: frames,
        }
    }

    fn extensible_fmt(sub_format: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(WAVE_FORMAT_EXTENSIBLE.to_le_bytes());
        body.extend(2u16.to_le_bytes());
        body.extend(48000u32.to_le_bytes());
        body.extend((48000u32 * 6).to_le_bytes());
        body.extend(6u16.to_le_bytes());
        body.extend(24u16.to_le_bytes());
        body.extend(22u16.to_le_bytes());
        body.extend(24u16.to_le_bytes());
        body.extend(3u32.to_le_bytes());
        body.extend(sub_format.to_le_bytes());
        body.extend(PCM_SUBFORMAT_TAIL);
        body
    }

    fn riff(chunks: &[(&[u8; 4], &[u8])]) -> io::Result<Vec<u8>> {
        let mut body = b"WAVE".to_vec();
        for (id, data) in chunks {
            byteorder::write_chunk(&mut body, id, data, ByteOrder::Little)?;
        }
        let mut file = b"RIFF".to_vec();
        file.extend((body.len() as u32).to_le_bytes());
        file.extend(body);
        Ok(file)
    }

    #[test]
    fn write_then_read_with_ancillary_chunks() -> io::Result<()> {
        let private = PrivateData::new(
            SourceKind::Wave,
            vec![
                PrivateChunk::placeholder(*b"fmt "),
                PrivateChunk::new(*b"bext", vec![7; 5]),
                PrivateChunk::placeholder(*b"data"),
                PrivateChunk::new(*b"LIST", b"INFOtest".to_vec()),
            ],
        );
        let info = stereo_16(3);
        let samples: Vec<u8> = (0..12).collect();

        let mut writer =
            AudioFileKind::Wave.create_writer(Cursor::new(Vec::new()), &info, Some(&private))?;
        writer.write_all(&samples)?;
        let file = writer.finish()?.into_inner();

        assert_eq!(&file[..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(file[4..8].try_into().unwrap()) as usize, file.len() - 8);
        assert_eq!(&file[12..16], b"fmt ");
        assert_eq!(&file[36..40], b"bext");
        assert_eq!(&file[50..54], b"data");
        assert_eq!(u32::from_le_bytes(file[54..58].try_into().unwrap()), 12);

        let mut reader = WaveReader::new(Cursor::new(file))?;
        assert_eq!(*reader.info(), info);
        assert_eq!(reader.chunks(), &private.chunks[..]);
        let mut read_back = Vec::new();
        reader.read_to_end(&mut read_back)?;
        assert_eq!(read_back, samples);
        Ok(())
    }

    #[test]
    fn extensible_pcm_is_accepted() -> io::Result<()> {
        let file = riff(&[(b"fmt ", &extensible_fmt(1)), (b"data", &[0; 12])])?;
        let reader = WaveReader::new(Cursor::new(file))?;
        assert_eq!(reader.info().bits_per_sample, 24);
        assert_eq!(reader.info().num_sample_frames, 2);
        Ok(())
    }

    #[test]
    fn float_formats_are_rejected() -> io::Result<()> {
        let file = riff(&[(b"fmt ", &extensible_fmt(3)), (b"data", &[0; 12])])?;
        assert!(WaveReader::new(Cursor::new(file)).is_err());

        let mut plain = extensible_fmt(1);
        plain[0] = 3;
        plain.truncate(FORMAT_SIZE);
        let file = riff(&[(b"fmt ", &plain), (b"data", &[0; 12])])?;
        assert!(WaveReader::new(Cursor::new(file)).is_err());
        Ok(())
    }

    #[test]
    fn partial_trailing_frame_is_dropped() -> io::Result<()> {
        let format = FormatChunk::pcm(&stereo_16(0))?.chunk_data();
        let file = riff(&[(b"fmt ", &format), (b"data", &[1; 10])])?;
        let mut reader = WaveReader::new(Cursor::new(file))?;
        assert_eq!(reader.info().num_sample_frames, 2);
        let mut samples = Vec::new();
        reader.read_to_end(&mut samples)?;
        assert_eq!(samples.len(), 8);
        Ok(())
    }

    #[test]
    fn missing_chunks_are_rejected() -> io::Result<()> {
        let format = FormatChunk::pcm(&stereo_16(0))?.chunk_data();
        let no_data = riff(&[(b"fmt ", &format)])?;
        assert!(WaveReader::new(Cursor::new(no_data)).is_err());
        let no_format = riff(&[(b"data", &[0; 4])])?;
        assert!(WaveReader::new(Cursor::new(no_format)).is_err());
        Ok(())
    }
}
