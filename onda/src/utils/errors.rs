use std::io;

/// Returns `$err` when `$level` is at or above the configured fail level,
/// otherwise logs it at `$level` and carries on.
#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Not an Onda file")]
    NotAnOndaFile,

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("Invalid attributes chunk: size = {0}, expected {1}")]
    InvalidAttributesChunk(u32, u32),

    #[error("Number of channels out of range (1-128): {0}")]
    NumChannelsOutOfRange(u32),

    #[error("Bits per sample out of range (1-32): {0}")]
    BitsPerSampleOutOfRange(u32),

    #[error("Unsupported bits per sample: {0}")]
    UnsupportedBitsPerSample(u32),

    #[error("Sample rate out of range (1-2147483647): {0}")]
    SampleRateOutOfRange(u64),

    #[error("Number of sample frames out of range: {0}")]
    NumSampleFramesOutOfRange(u64),

    #[error("Key length out of range (1-5): {0}")]
    KeyLengthOutOfRange(u32),

    #[error("Block length out of range (1-65536): {0}")]
    BlockLengthOutOfRange(u64),

    #[error("Too many sample frames: {frames} frames of {bytes_per_frame} bytes")]
    TooManySampleFrames { frames: u64, bytes_per_frame: u32 },

    #[error("Multiple attributes chunks")]
    MultipleAttributesChunks,

    #[error("No attributes chunk before the data chunk")]
    NoAttributesChunkBeforeData,

    #[error("Private data chunk after the data chunk")]
    PrivateChunkAfterData,

    #[error("Multiple private data chunks")]
    MultiplePrivateChunks,

    #[error("Multiple data chunks")]
    MultipleDataChunks,

    #[error("No attributes chunk")]
    NoAttributesChunk,

    #[error("No data chunk")]
    NoDataChunk,

    #[error("Data chunk size mismatch: {found} bytes, group declares {expected}")]
    GroupSizeMismatch { found: u64, expected: u64 },

    #[error("Unknown chunk '{0}' in Onda file")]
    UnknownChunk(String),

    #[error("Malformed file: {0}")]
    MalformedFile(&'static str),

    #[error("Sample data of {0} bytes is not a whole number of samples")]
    PartialSample(usize),

    #[error("Wrote {written} sample frames, attributes declare {expected}")]
    FrameCountMismatch { written: u64, expected: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Unexpected end of compressed data")]
    EndOfData,

    #[error("Incorrect CRC: calculated {calculated:#010X}, stored {stored:#010X}")]
    IncorrectCrc { calculated: u32, stored: u32 },

    #[error("Invalid encoding key for channel {channel}: {key}")]
    InvalidEncodingKey { channel: usize, key: u32 },

    #[error("Compressed data continues past {0} sample frames")]
    TrailingData(u64),
}

#[derive(thiserror::Error, Debug)]
pub enum PrivateDataError {
    #[error("Malformed private data")]
    MalformedData,

    #[error("Invalid private data")]
    InvalidData,

    #[error("Unrecognised source file kind: {0}")]
    UnrecognisedSourceKind(u16),

    #[error("Invalid number of chunks: {0}")]
    InvalidNumChunks(u32),

    #[error("Incorrect Adler-32: calculated {calculated:#010X}, stored {stored:#010X}")]
    IncorrectAdler32 { calculated: u32, stored: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum OndaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("The file is corrupt: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    PrivateData(#[from] PrivateDataError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Pipeline thread stopped before the end of the data")]
    Disconnected,

    #[error("Pipeline thread panicked")]
    ThreadPanicked,
}

impl OndaError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OndaError::Cancelled)
    }

    /// Failures that mean the compressed file contents are damaged.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            OndaError::Decode(_)
                | OndaError::PrivateData(PrivateDataError::IncorrectAdler32 { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, OndaError>;
