#![allow(dead_code)]

use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::command::{Cli, Commands, LogFormat};
use cli::compress::cmd_compress;
use cli::expand::cmd_expand;
use cli::info::cmd_info;
use cli::validate::cmd_validate;

mod audio;
mod cli;
pub(crate) mod timestamp;

// Chunk records derived with `onda_macros` resolve their traits through `crate::byteorder`.
pub(crate) use onda::byteorder;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let multi = MultiProgress::new();
    let bars = init_logging(&cli, &multi)?;

    match &cli.command {
        Commands::Compress(args) => cmd_compress(args, &cli, bars),
        Commands::Expand(args) => cmd_expand(args, &cli, bars),
        Commands::Validate(args) => cmd_validate(args, &cli, bars),
        Commands::Info(args) => cmd_info(args, &cli),
    }
}

/// Installs the logger. With `--progress`, log lines go through `multi` so they
/// do not tear the progress bars, and `multi` is returned for the commands.
fn init_logging<'a>(cli: &Cli, multi: &'a MultiProgress) -> Result<Option<&'a MultiProgress>> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(cli.loglevel.to_level_filter());

    match cli.log_format {
        LogFormat::Plain => {
            builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            builder.format(|buf, record| {
                use std::io::Write;
                writeln!(
                    buf,
                    "{{\"ts\":\"{}\",\"lvl\":\"{}\",\"target\":{:?},\"msg\":{:?}}}",
                    buf.timestamp(),
                    record.level(),
                    record.target(),
                    record.args().to_string()
                )
            });
        }
    }

    if cli.progress {
        LogWrapper::new(multi.clone(), builder.build()).try_init()?;
        Ok(Some(multi))
    } else {
        builder.try_init()?;
        Ok(None)
    }
}
