use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context as _, Result, bail};
use indicatif::MultiProgress;
use onda::process::pipeline::{self, ValidateStats};
use onda::structs::container::{OndaReader, ReadOptions};

use super::command::{Cli, ValidateArgs};
use super::expand::read_options;
use super::is_cancelled;
use super::progress::{
    create_progress_bar, fail_progress_bar, finalize_progress_bar, progress_context,
};
use crate::timestamp::time_str;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    /// Files named on the command line.
    pub found: usize,
    /// Files that opened as Onda files.
    pub validated: usize,
    pub valid: usize,
}

pub fn cmd_validate(args: &ValidateArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let tally = validate_all(&args.inputs, read_options(cli), multi);

    println!("Validation Results");
    println!("  Files found                 {}", tally.found);
    println!("  Files validated             {}", tally.validated);
    println!("  Files valid                 {}", tally.valid);

    if tally.valid < tally.found {
        bail!("{} of {} files are not valid", tally.found - tally.valid, tally.found);
    }
    Ok(())
}

pub fn validate_all(
    inputs: &[PathBuf],
    options: ReadOptions,
    multi: Option<&MultiProgress>,
) -> Tally {
    let mut tally = Tally {
        found: inputs.len(),
        ..Tally::default()
    };

    for input in inputs {
        let reader = match open(input, options) {
            Ok(reader) => reader,
            Err(e) => {
                log::error!("{e:#}");
                continue;
            }
        };
        tally.validated += 1;

        match validate_file(input, reader, multi) {
            Ok(stats) => {
                tally.valid += 1;
                log::info!(
                    "{}: valid, {} sample frames ({})",
                    input.display(),
                    stats.frames,
                    time_str(stats.duration_secs)
                );
            }
            Err(e) if is_cancelled(&e) => {
                log::info!("Cancelled while validating {}", input.display());
                break;
            }
            Err(e) => log::error!("{}: {e:#}", input.display()),
        }
    }

    tally
}

fn open(input: &Path, options: ReadOptions) -> Result<OndaReader<BufReader<File>>> {
    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    OndaReader::with_options(BufReader::new(file), options)
        .with_context(|| format!("Failed to read {}", input.display()))
}

fn validate_file(
    input: &Path,
    mut reader: OndaReader<BufReader<File>>,
    multi: Option<&MultiProgress>,
) -> Result<ValidateStats> {
    let start_time = Instant::now();
    let attributes = *reader.attributes();

    let pb = multi
        .map(|m| {
            let message = format!("validating {}", input.display());
            create_progress_bar(m, attributes.num_sample_frames, message)
        })
        .transpose()?;
    let ctx = progress_context(pb.as_ref());

    match pipeline::validate(&mut reader, &ctx) {
        Ok(stats) => {
            finalize_progress_bar(pb.as_ref(), stats.frames, attributes.sample_rate, start_time);
            Ok(stats)
        }
        Err(e) => {
            fail_progress_bar(pb.as_ref(), "validation failed");
            Err(e.into())
        }
    }
}
