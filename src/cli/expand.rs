use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context as _, Result, bail};
use indicatif::MultiProgress;
use onda::process::pipeline;
use onda::structs::container::{OndaReader, ReadOptions};
use onda::structs::private_data::PrivateData;
use onda::utils::pending_file::PendingFile;

use super::command::{Cli, ExpandArgs};
use super::progress::{
    create_progress_bar, fail_progress_bar, finalize_progress_bar, progress_context,
};
use super::{check_overwrite, output_path, remove_leftovers, run_batch};
use crate::audio::{AudioFileKind, AudioInfo};

pub fn cmd_expand(args: &ExpandArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let options = read_options(cli);
    let extensions = [AudioFileKind::Aiff.extension(), AudioFileKind::Wave.extension()];
    remove_leftovers(&args.inputs, args.output.output_dir.as_deref(), &extensions);
    run_batch(&args.inputs, |input| expand_file(input, args, options, multi))
}

pub fn read_options(cli: &Cli) -> ReadOptions {
    if cli.strict {
        ReadOptions::strict()
    } else {
        ReadOptions::default()
    }
}

/// The kind to expand to: the requested one, which must match the kind the
/// chunks were recorded from, or else the recorded kind, or else WAVE.
pub fn target_kind(
    requested: Option<AudioFileKind>,
    private_data: Option<&PrivateData>,
) -> Result<AudioFileKind> {
    let recorded = private_data.map(|p| AudioFileKind::from_source_kind(p.source_kind));
    match (requested, recorded) {
        (Some(requested), Some(recorded)) if requested != recorded => bail!(
            "inconsistent file kinds: the preserved chunks come from a {recorded} file, \
             cannot expand to {requested}"
        ),
        (Some(kind), _) | (None, Some(kind)) => Ok(kind),
        (None, None) => Ok(AudioFileKind::Wave),
    }
}

fn expand_file(
    input: &Path,
    args: &ExpandArgs,
    options: ReadOptions,
    multi: Option<&MultiProgress>,
) -> Result<()> {
    let start_time = Instant::now();

    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let mut reader = OndaReader::with_options(BufReader::new(file), options)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let private_data = reader
        .private_data()
        .with_context(|| format!("Failed to read the preserved chunks of {}", input.display()))?;

    let kind = target_kind(args.kind, private_data.as_ref())
        .with_context(|| format!("Cannot expand {}", input.display()))?;
    let info = AudioInfo::from(reader.attributes());

    let output = output_path(input, args.output.output_dir.as_deref(), kind.extension());
    check_overwrite(&output, args.output.overwrite)?;
    log::info!("Expanding {} -> {}", input.display(), output.display());
    if let Some(private_data) = &private_data {
        let ids: Vec<String> = private_data
            .ancillary_chunks()
            .map(|c| c.id_str())
            .collect();
        log::info!("Restoring chunks: {}", ids.join(", "));
    }

    let pending = PendingFile::new(&output)?;
    let file = pending
        .create()
        .with_context(|| format!("Failed to create {}", pending.temp_path().display()))?;
    let writer = kind.create_writer(file, &info, private_data.as_ref())?;

    let pb = multi
        .map(|m| {
            let message = format!("expanding {}", input.display());
            create_progress_bar(m, info.num_sample_frames, message)
        })
        .transpose()?;
    let ctx = progress_context(pb.as_ref());

    let (writer, stats) = match pipeline::expand(&mut reader, writer, &ctx) {
        Ok(done) => done,
        Err(e) => {
            fail_progress_bar(pb.as_ref(), "expansion failed");
            return Err(e).with_context(|| format!("Failed to expand {}", input.display()));
        }
    };

    let file = writer
        .finish()
        .with_context(|| format!("Failed to finish {}", output.display()))?;
    file.sync_all()?;
    drop(file);
    pending.commit()?;

    finalize_progress_bar(pb.as_ref(), stats.frames, info.sample_rate, start_time);
    log::info!(
        "Expanded {} sample frames ({} bytes, CRC {:#010X})",
        stats.frames,
        stats.data_length,
        stats.crc_value
    );
    log::info!("Elapsed: {:.2} s", start_time.elapsed().as_secs_f64());
    Ok(())
}
