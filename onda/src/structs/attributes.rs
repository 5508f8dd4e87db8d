//! The attributes chunk: global parameters of an Onda file.
//!
//! A fixed 28-byte big-endian record:
//!
//! | Field | Size |
//! |---|---|
//! | version | 2 |
//! | numChannels | 2 |
//! | bitsPerSample | 2 |
//! | sampleRate | 4 |
//! | numSampleFrames | 8 |
//! | crc32 | 4 |
//! | keyLength | 2 |
//! | blockLength | 4 |

use onda_macros::{ToBytes, chunk_type};

use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::ValidationError;

/// Size of the attributes chunk body in bytes.
pub const ATTRIBUTES_SIZE: u32 = 28;

/// Version of a file without private data.
pub const VERSION_PLAIN: u16 = 0;
/// Version of a file carrying private data.
pub const VERSION_PRIVATE: u16 = 1;

pub const MAX_CHANNELS: u16 = 128;
pub const MAX_BITS_PER_SAMPLE: u16 = 32;
pub const MAX_SAMPLE_RATE: u32 = i32::MAX as u32;
pub const MAX_SAMPLE_FRAMES: u64 = (1 << 62) - 1;
pub const MAX_KEY_LENGTH: u16 = 5;
pub const MAX_BLOCK_LENGTH: u32 = 65536;
pub const DEFAULT_BLOCK_LENGTH: u32 = 256;

/// Largest uncompressed sample data, in bytes.
pub const MAX_DATA_LENGTH: u64 = i32::MAX as u64;

/// Sample widths accepted for compression and expansion.
pub const SUPPORTED_BITS_PER_SAMPLE: [u16; 2] = [16, 24];

/// Key length that reaches every encoding length for the given sample width.
pub const fn default_key_length(bits_per_sample: u16) -> u16 {
    match bits_per_sample {
        0..=16 => 4,
        _ => 5,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
#[chunk_type(b"ATTR")]
pub struct Attributes {
    pub version: u16,
    pub num_channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub num_sample_frames: u64,
    pub crc_value: u32,
    pub key_length: u16,
    pub block_length: u32,
}

impl Attributes {
    /// Attributes for compressing a source, with the default block and key length.
    ///
    /// The CRC is filled in once the data has been written.
    pub fn new(
        num_channels: u16,
        bits_per_sample: u16,
        sample_rate: u32,
        num_sample_frames: u64,
    ) -> Result<Self, ValidationError> {
        let attributes = Self {
            version: VERSION_PLAIN,
            num_channels,
            bits_per_sample,
            sample_rate,
            num_sample_frames,
            crc_value: 0,
            key_length: default_key_length(bits_per_sample),
            block_length: DEFAULT_BLOCK_LENGTH,
        };
        attributes.validate()?;
        attributes.require_supported_width()?;
        Ok(attributes)
    }

    pub fn with_block_length(mut self, block_length: u32) -> Result<Self, ValidationError> {
        self.block_length = block_length;
        self.validate()?;
        Ok(self)
    }

    pub fn with_key_length(mut self, key_length: u16) -> Result<Self, ValidationError> {
        self.key_length = key_length;
        self.validate()?;
        Ok(self)
    }

    /// Parses and range-checks an attributes chunk body.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ValidationError> {
        let size = data.len() as u32;
        if data.len() < 2 {
            return Err(ValidationError::InvalidAttributesChunk(size, ATTRIBUTES_SIZE));
        }

        let version = u16::from_be_bytes([data[0], data[1]]);
        if version > VERSION_PRIVATE {
            return Err(ValidationError::UnsupportedVersion(version));
        }
        if size != ATTRIBUTES_SIZE {
            return Err(ValidationError::InvalidAttributesChunk(size, ATTRIBUTES_SIZE));
        }

        let mut reader = BsIoSliceReader::from_slice(&data[2..]);
        let truncated = |_| ValidationError::MalformedFile("truncated attributes chunk");

        let attributes = Self {
            version,
            num_channels: reader.get_n(16).map_err(truncated)?,
            bits_per_sample: reader.get_n(16).map_err(truncated)?,
            sample_rate: reader.get_n(32).map_err(truncated)?,
            num_sample_frames: reader.get_n(64).map_err(truncated)?,
            crc_value: reader.get_n(32).map_err(truncated)?,
            key_length: reader.get_n(16).map_err(truncated)?,
            block_length: reader.get_n(32).map_err(truncated)?,
        };

        attributes.validate()?;
        Ok(attributes)
    }

    /// Checks every field against its bounds, and the total data length.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=MAX_CHANNELS).contains(&self.num_channels) {
            return Err(ValidationError::NumChannelsOutOfRange(self.num_channels as u32));
        }
        if !(1..=MAX_BITS_PER_SAMPLE).contains(&self.bits_per_sample) {
            return Err(ValidationError::BitsPerSampleOutOfRange(
                self.bits_per_sample as u32,
            ));
        }
        if !(1..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(ValidationError::SampleRateOutOfRange(self.sample_rate as u64));
        }
        if self.num_sample_frames > MAX_SAMPLE_FRAMES {
            return Err(ValidationError::NumSampleFramesOutOfRange(
                self.num_sample_frames,
            ));
        }
        if !(1..=MAX_KEY_LENGTH).contains(&self.key_length) {
            return Err(ValidationError::KeyLengthOutOfRange(self.key_length as u32));
        }
        if !(1..=MAX_BLOCK_LENGTH).contains(&self.block_length) {
            return Err(ValidationError::BlockLengthOutOfRange(self.block_length as u64));
        }

        let bytes_per_frame = self.bytes_per_sample_frame();
        match self.num_sample_frames.checked_mul(bytes_per_frame as u64) {
            Some(len) if len <= MAX_DATA_LENGTH => Ok(()),
            _ => Err(ValidationError::TooManySampleFrames {
                frames: self.num_sample_frames,
                bytes_per_frame,
            }),
        }
    }

    /// Rejects sample widths other than 16 and 24 bits.
    pub fn require_supported_width(&self) -> Result<(), ValidationError> {
        if SUPPORTED_BITS_PER_SAMPLE.contains(&self.bits_per_sample) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedBitsPerSample(
                self.bits_per_sample as u32,
            ))
        }
    }

    pub fn has_private_data(&self) -> bool {
        self.version == VERSION_PRIVATE
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    pub fn bytes_per_sample_frame(&self) -> u32 {
        self.bytes_per_sample() as u32 * self.num_channels as u32
    }

    /// Size of the uncompressed sample data in bytes.
    pub fn data_length(&self) -> u64 {
        self.num_sample_frames * self.bytes_per_sample_frame() as u64
    }

    pub fn num_blocks(&self) -> u64 {
        self.num_sample_frames.div_ceil(self.block_length as u64)
    }

    pub fn duration_secs(&self) -> f64 {
        self.num_sample_frames as f64 / self.sample_rate as f64
    }
}
