use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use anyhow::{Context as _, Result, bail};
use serde::Serialize;

use onda::structs::attributes::Attributes;
use onda::structs::container::{FORM_ID, ONDA_ID, OndaReader};
use onda::structs::private_data::{PrivateChunk, PrivateData};

use super::command::{Cli, InfoArgs};
use super::expand::read_options;
use crate::audio::{AudioFileKind, AudioInfo, AudioReader};
use crate::timestamp::{frames_to_secs, time_str};

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileInfo {
    Onda(OndaInfo),
    Audio(AudioFileInfo),
}

#[derive(Debug, Serialize)]
pub struct OndaInfo {
    pub file_size: u64,
    pub data_size: u64,
    pub compression_percent: f64,
    pub duration: String,
    pub attributes: AttributesInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_data: Option<PrivateDataInfo>,
}

#[derive(Debug, Serialize)]
pub struct AttributesInfo {
    pub version: u16,
    pub num_channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub num_sample_frames: u64,
    pub crc_value: String,
    pub key_length: u16,
    pub block_length: u32,
}

#[derive(Debug, Serialize)]
pub struct PrivateDataInfo {
    pub source_kind: String,
    pub chunks: Vec<ChunkInfo>,
}

#[derive(Debug, Serialize)]
pub struct AudioFileInfo {
    pub kind: String,
    pub num_channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub num_sample_frames: u64,
    pub duration: String,
    pub chunks: Vec<ChunkInfo>,
}

#[derive(Debug, Serialize)]
pub struct ChunkInfo {
    pub id: String,
    /// Absent for the format and sample data chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl ChunkInfo {
    fn new(chunk: &PrivateChunk, kind: AudioFileKind) -> Self {
        let critical = kind.source_kind().is_critical(&chunk.id);
        Self {
            id: chunk.id_str(),
            size: (!critical).then_some(chunk.data.len()),
        }
    }
}

impl From<&Attributes> for AttributesInfo {
    fn from(a: &Attributes) -> Self {
        Self {
            version: a.version,
            num_channels: a.num_channels,
            bits_per_sample: a.bits_per_sample,
            sample_rate: a.sample_rate,
            num_sample_frames: a.num_sample_frames,
            crc_value: format!("{:#010X}", a.crc_value),
            key_length: a.key_length,
            block_length: a.block_length,
        }
    }
}

impl From<&PrivateData> for PrivateDataInfo {
    fn from(p: &PrivateData) -> Self {
        let kind = AudioFileKind::from_source_kind(p.source_kind);
        Self {
            source_kind: p.source_kind.to_string(),
            chunks: p.chunks.iter().map(|c| ChunkInfo::new(c, kind)).collect(),
        }
    }
}

pub fn cmd_info(args: &InfoArgs, cli: &Cli) -> Result<()> {
    log::info!("Analyzing {}", args.input.display());

    let info = describe(&args.input, cli)?;
    print!("{}", serde_yaml_ng::to_string(&info)?);
    Ok(())
}

fn describe(path: &Path, cli: &Cli) -> Result<FileInfo> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut header = Vec::with_capacity(12);
    (&mut file).take(12).read_to_end(&mut header)?;
    file.rewind()?;

    if header.len() == 12 && &header[..4] == FORM_ID && &header[8..] == ONDA_ID {
        let reader = OndaReader::with_options(BufReader::new(file), read_options(cli))
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return Ok(FileInfo::Onda(describe_onda(&reader)?));
    }

    let Some(kind) = AudioFileKind::from_magic(&header) else {
        bail!("{} is not an Onda, AIFF or WAVE file", path.display());
    };
    let reader = kind
        .open_reader(BufReader::new(file))
        .with_context(|| format!("Failed to read {kind} file {}", path.display()))?;
    Ok(FileInfo::Audio(describe_audio(&reader)))
}

pub fn describe_onda<R: Read + Seek>(reader: &OndaReader<R>) -> Result<OndaInfo> {
    let attributes = reader.attributes();
    let private_data = reader.private_data()?;

    let data_length = attributes.data_length();
    let compression_percent = if data_length == 0 {
        100.0
    } else {
        reader.file_size() as f64 * 100.0 / data_length as f64
    };

    Ok(OndaInfo {
        file_size: reader.file_size(),
        data_size: reader.data_size(),
        compression_percent: (compression_percent * 10.0).round() / 10.0,
        duration: time_str(attributes.duration_secs()),
        attributes: attributes.into(),
        private_data: private_data.as_ref().map(PrivateDataInfo::from),
    })
}

pub fn describe_audio<R: Read + Seek>(reader: &AudioReader<R>) -> AudioFileInfo {
    let kind = reader.kind();
    let info: &AudioInfo = reader.info();
    AudioFileInfo {
        kind: kind.to_string(),
        num_channels: info.num_channels,
        bits_per_sample: info.bits_per_sample,
        sample_rate: info.sample_rate,
        num_sample_frames: info.num_sample_frames,
        duration: time_str(frames_to_secs(info.num_sample_frames, info.sample_rate)),
        chunks: reader.chunks().iter().map(|c| ChunkInfo::new(c, kind)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onda::process::pipeline::{Context, compress};
    use onda::structs::private_data::SourceKind;
    use std::io::Cursor;

    #[test]
    fn onda_summary_as_yaml() -> Result<()> {
        let private = PrivateData::new(
            SourceKind::Aiff,
            vec![
                PrivateChunk::placeholder(*b"COMM"),
                PrivateChunk::new(*b"NAME", b"Tone".to_vec()),
                PrivateChunk::placeholder(*b"SSND"),
            ],
        );
        let samples = vec![0u8; 48000 * 6];
        let attributes = Attributes::new(2, 24, 48000, 48000)?;
        let (file, _) = compress(
            &mut &samples[..],
            Cursor::new(Vec::new()),
            attributes,
            Some(&private.to_bytes()?),
            &Context::new(),
        )?;

        let reader = OndaReader::new(Cursor::new(file.into_inner()))?;
        let yaml = serde_yaml_ng::to_string(&FileInfo::Onda(describe_onda(&reader)?))?;

        assert!(yaml.contains("00:00:01.000"), "{yaml}");
        assert!(yaml.contains("num_channels: 2"), "{yaml}");
        assert!(yaml.contains("source_kind: AIFF"), "{yaml}");
        assert!(yaml.contains("id: NAME"), "{yaml}");
        assert!(yaml.contains("size: 4"), "{yaml}");
        Ok(())
    }
}
