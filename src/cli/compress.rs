use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context as _, Result, anyhow};
use indicatif::MultiProgress;
use onda::process::pipeline;
use onda::structs::attributes::Attributes;
use onda::structs::private_data::PrivateData;
use onda::utils::pending_file::PendingFile;

use super::command::{Cli, CompressArgs};
use super::progress::{
    create_progress_bar, fail_progress_bar, finalize_progress_bar, progress_context,
};
use super::{check_overwrite, output_path, remove_leftovers, run_batch};
use crate::audio::chunk_filter::ChunkFilter;
use crate::audio::{AudioFileKind, AudioReader};

pub fn cmd_compress(args: &CompressArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::debug!(
        "Compressing {} files (block length: {}, key length: {}, strict mode: {})",
        args.inputs.len(),
        args.block_length,
        args.key_length
            .map_or_else(|| "default".to_string(), |k| k.to_string()),
        cli.strict
    );

    remove_leftovers(&args.inputs, args.output.output_dir.as_deref(), &["onda"]);
    run_batch(&args.inputs, |input| compress_file(input, args, multi))
}

fn compress_file(input: &Path, args: &CompressArgs, multi: Option<&MultiProgress>) -> Result<()> {
    let start_time = Instant::now();

    let kind = AudioFileKind::detect(input)
        .with_context(|| format!("Failed to open {}", input.display()))?
        .ok_or_else(|| anyhow!("{} is not an AIFF or WAVE file", input.display()))?;
    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let mut reader = kind
        .open_reader(file)
        .with_context(|| format!("Failed to read {kind} file {}", input.display()))?;

    let info = *reader.info();
    let mut attributes = Attributes::new(
        info.num_channels,
        info.bits_per_sample,
        info.sample_rate,
        info.num_sample_frames,
    )
    .and_then(|a| a.with_block_length(args.block_length))
    .with_context(|| format!("Cannot compress {}", input.display()))?;
    if let Some(key_length) = args.key_length {
        attributes = attributes.with_key_length(key_length)?;
    }

    let filter = match kind {
        AudioFileKind::Aiff => &args.aiff_chunk_filter,
        AudioFileKind::Wave => &args.wave_chunk_filter,
    };
    let private_data = collect_private_data(&reader, filter);
    if let Some(private_data) = &private_data {
        let ids: Vec<String> = private_data
            .ancillary_chunks()
            .map(|c| c.id_str())
            .collect();
        log::info!("Preserved chunks: {}", ids.join(", "));
    }
    let private_bytes = private_data
        .as_ref()
        .map(PrivateData::to_bytes)
        .transpose()
        .context("Failed to pack the preserved chunks")?;

    let output = output_path(input, args.output.output_dir.as_deref(), "onda");
    check_overwrite(&output, args.output.overwrite)?;
    log::info!("Compressing {} -> {}", input.display(), output.display());

    let pending = PendingFile::new(&output)?;
    let file = pending
        .create()
        .with_context(|| format!("Failed to create {}", pending.temp_path().display()))?;

    let pb = multi
        .map(|m| {
            let message = format!("compressing {}", input.display());
            create_progress_bar(m, info.num_sample_frames, message)
        })
        .transpose()?;
    let ctx = progress_context(pb.as_ref());

    let result = pipeline::compress(
        &mut reader,
        BufWriter::new(file),
        attributes,
        private_bytes.as_deref(),
        &ctx,
    );
    let (writer, stats) = match result {
        Ok(done) => done,
        Err(e) => {
            fail_progress_bar(pb.as_ref(), "compression failed");
            return Err(e).with_context(|| format!("Failed to compress {}", input.display()));
        }
    };

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    pending.commit()?;

    finalize_progress_bar(pb.as_ref(), stats.frames, info.sample_rate, start_time);
    log::info!(
        "Compressed {} sample frames to {:.1}% ({} -> {} bytes)",
        stats.frames,
        stats.compression_percent(),
        stats.data_length,
        stats.file_size
    );
    log::info!("Elapsed: {:.2} s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// The source's chunk list, if the filter leaves any ancillary chunk in it.
fn collect_private_data<R>(reader: &AudioReader<R>, filter: &ChunkFilter) -> Option<PrivateData>
where
    R: std::io::Read + std::io::Seek,
{
    if filter.is_exclude_all() {
        return None;
    }

    let source_kind = reader.kind().source_kind();
    let chunks = reader
        .chunks()
        .iter()
        .filter(|c| source_kind.is_critical(&c.id) || filter.accepts(&c.id))
        .cloned()
        .collect();
    let private_data = PrivateData::new(source_kind, chunks);

    private_data.has_ancillary_chunks().then_some(private_data)
}
