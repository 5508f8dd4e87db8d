use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

use crate::audio::AudioFileKind;
use crate::audio::chunk_filter::ChunkFilter;

#[derive(Debug, ClapParser)]
#[command(
    name         = "onda",
    version      = env!("CARGO_PKG_VERSION"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (codec ", env!("ONDA_VERSION"), ", built ", env!("BUILD_TIMESTAMP"), ")"
    ),
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Lossless compressor for AIFF and WAVE audio files",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compress AIFF or WAVE files into Onda files.
    Compress(CompressArgs),

    /// Expand Onda files back into AIFF or WAVE files.
    Expand(ExpandArgs),

    /// Decode Onda files and check their CRC without writing anything.
    Validate(ValidateArgs),

    /// Print file information
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Directory for the output files (defaults to each input's directory).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Replace existing output files.
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Debug, Args)]
pub struct CompressArgs {
    /// Input AIFF or WAVE files.
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Sample frames per block.
    #[arg(long, value_name = "N", default_value_t = 256,
          value_parser = clap::value_parser!(u32).range(1..=65536))]
    pub block_length: u32,

    /// Encoding key width in bits (default: 4 for 16-bit sources, 5 for 24-bit).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..=5))]
    pub key_length: Option<u16>,

    /// Ancillary AIFF chunks to keep: "+/ID/ID" keeps only those, "-/ID/ID" all
    /// but those, "-" everything, "+" nothing.
    #[arg(long, value_name = "FILTER", default_value = "-", allow_hyphen_values = true)]
    pub aiff_chunk_filter: ChunkFilter,

    /// Ancillary WAVE chunks to keep, with the same syntax as --aiff-chunk-filter.
    #[arg(long, value_name = "FILTER", default_value = "-", allow_hyphen_values = true)]
    pub wave_chunk_filter: ChunkFilter,
}

#[derive(Debug, Args)]
pub struct ExpandArgs {
    /// Input Onda files.
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Kind of file to write (default: the kind the file was compressed from).
    #[arg(long, value_enum)]
    pub kind: Option<AudioFileKind>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Input Onda files.
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input Onda, AIFF or WAVE file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn compress_arguments() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "onda",
            "--strict",
            "compress",
            "a.wav",
            "b.aiff",
            "--block-length",
            "1024",
            "--wave-chunk-filter=+/bext",
        ])?;
        assert!(cli.strict);
        let Commands::Compress(args) = cli.command else {
            panic!("expected compress");
        };
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.block_length, 1024);
        assert_eq!(args.key_length, None);
        assert!(args.wave_chunk_filter.accepts(b"bext"));
        assert!(!args.wave_chunk_filter.accepts(b"LIST"));
        assert!(args.aiff_chunk_filter.accepts(b"ANNO"));
        Ok(())
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for args in [
            &["onda", "compress", "a.wav", "--block-length", "0"][..],
            &["onda", "compress", "a.wav", "--block-length", "65537"],
            &["onda", "compress", "a.wav", "--key-length", "6"],
            &["onda", "compress", "a.wav", "--aiff-chunk-filter", "bext"],
            &["onda", "expand", "a.onda", "--kind", "flac"],
        ] {
            assert!(Cli::try_parse_from(args).is_err(), "{args:?}");
        }
    }
}
