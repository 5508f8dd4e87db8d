//! Compress, expand and validate operations.
//!
//! Compress and expand run on two threads joined by a capacity-1 channel. The
//! calling thread produces byte blocks (source samples to compress, or decoded
//! samples) and keeps the CRC; a scoped worker consumes them (encoding into the
//! container, or writing to the sink). At most one block is in flight.
//!
//! Either side stops on cancellation or when the other side has gone away. The
//! first error raised is the one returned; errors caused by the unwind are dropped.

use std::io::{Read, Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::structs::attributes::Attributes;
use crate::structs::container::{OndaReader, OndaWriter};
use crate::utils::crc::Crc32Digest;
use crate::utils::errors::{DecodeError, OndaError, Result};
use crate::utils::pcm::{pack_le, unpack_le};

/// How long a worker waits for the next block before checking for cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cloneable flag requesting that running operations stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress callback, given the sample frames done and the total.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// State shared by both sides of one operation.
#[derive(Default)]
pub struct Context {
    cancel: CancelToken,
    progress: Option<Box<ProgressFn>>,
    error: Mutex<Option<OndaError>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn report(&self, done: u64, total: u64) {
        if let Some(progress) = &self.progress {
            progress(done, total);
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(OndaError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Records `err` unless an earlier error is already recorded.
    fn offer_error(&self, err: OndaError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            None => *slot = Some(err),
            Some(_) => trace!("Suppressed follow-up error: {err}"),
        }
    }

    fn take_error(&self) -> Option<OndaError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

enum Handoff {
    Block(Vec<u8>),
    Finished(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressStats {
    pub frames: u64,
    /// Uncompressed sample data, in bytes.
    pub data_length: u64,
    /// The whole Onda file, in bytes.
    pub file_size: u64,
    pub crc_value: u32,
}

impl CompressStats {
    /// Output size as a percentage of the uncompressed sample data.
    pub fn compression_percent(&self) -> f64 {
        if self.data_length == 0 {
            return 100.0;
        }
        self.file_size as f64 * 100.0 / self.data_length as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandStats {
    pub frames: u64,
    pub data_length: u64,
    pub crc_value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidateStats {
    pub frames: u64,
    pub duration_secs: f64,
}

/// Compresses `attributes.num_sample_frames` frames of little-endian samples
/// read from `source` into an Onda file written to `output`.
///
/// Returns `output` positioned at the end of the file.
pub fn compress<R, W>(
    source: &mut R,
    output: W,
    attributes: Attributes,
    private_data: Option<&[u8]>,
    ctx: &Context,
) -> Result<(W, CompressStats)>
where
    R: Read,
    W: Write + Seek + Send,
{
    ctx.take_error();
    ctx.check_cancelled()?;

    let writer = OndaWriter::new(output, attributes, private_data)?;
    let attributes = *writer.attributes();
    let bytes_per_frame = attributes.bytes_per_sample_frame() as usize;
    let block_length = attributes.block_length as u64;

    debug!(
        "Compressing {} frames in blocks of {}",
        attributes.num_sample_frames, block_length
    );

    let finished = thread::scope(|s| {
        let (tx, rx) = sync_channel::<Handoff>(1);

        let secondary = s.spawn(move || {
            let result = write_blocks(writer, &rx, ctx);
            result.map_err(|e| ctx.offer_error(e)).ok()
        });

        let produced = (|| -> Result<u32> {
            let mut crc = Crc32Digest::default();
            let mut remaining = attributes.num_sample_frames;
            while remaining > 0 {
                ctx.check_cancelled()?;
                let frames = remaining.min(block_length);
                let mut block = vec![0u8; frames as usize * bytes_per_frame];
                source.read_exact(&mut block)?;
                crc.update(&block);
                send(&tx, Handoff::Block(block))?;
                remaining -= frames;
            }

            let crc_value = crc.value();
            send(&tx, Handoff::Finished(crc_value))?;
            Ok(crc_value)
        })();

        if let Err(e) = &produced {
            debug!("Compress source side stopped: {e}");
        }
        let produced = produced.map_err(|e| ctx.offer_error(e)).ok();
        drop(tx);

        match secondary.join() {
            Ok(written) => Ok(produced.zip(written)),
            Err(_) => Err(OndaError::ThreadPanicked),
        }
    })?;

    match (ctx.take_error(), finished) {
        (Some(e), _) => Err(e),
        (None, Some((crc_value, (output, file_size)))) => Ok((
            output,
            CompressStats {
                frames: attributes.num_sample_frames,
                data_length: attributes.data_length(),
                file_size,
                crc_value,
            },
        )),
        (None, None) => Err(OndaError::Disconnected),
    }
}

fn write_blocks<W: Write + Seek>(
    mut writer: OndaWriter<W>,
    rx: &Receiver<Handoff>,
    ctx: &Context,
) -> Result<(W, u64)> {
    let attributes = *writer.attributes();
    let bytes_per_sample = attributes.bytes_per_sample();
    let total = attributes.num_sample_frames;
    let mut samples = Vec::new();

    loop {
        match receive(rx, ctx)? {
            Handoff::Block(bytes) => {
                samples.clear();
                unpack_le(&bytes, bytes_per_sample, &mut samples);
                writer.write_block(&samples)?;
                ctx.report(writer.frames_written(), total);
            }
            Handoff::Finished(crc_value) => return writer.finish(crc_value),
        }
    }
}

/// Decodes the Onda file behind `reader` and writes its little-endian sample
/// bytes to `sink`.
///
/// The CRC is checked before the sink side is told the data is complete, so a
/// corrupt file never yields a successful result.
pub fn expand<R, W>(reader: &mut OndaReader<R>, sink: W, ctx: &Context) -> Result<(W, ExpandStats)>
where
    R: Read + Seek,
    W: Write + Send,
{
    ctx.take_error();
    ctx.check_cancelled()?;

    let attributes = *reader.attributes();
    let total = attributes.num_sample_frames;
    let bytes_per_sample = attributes.bytes_per_sample();
    let bytes_per_frame = attributes.bytes_per_sample_frame() as u64;
    let mut blocks = reader.blocks()?;

    debug!("Expanding {total} frames");

    let finished = thread::scope(|s| {
        let (tx, rx) = sync_channel::<Handoff>(1);

        let secondary = s.spawn(move || {
            let result = write_bytes(sink, &rx, ctx, bytes_per_frame, total);
            result.map_err(|e| ctx.offer_error(e)).ok()
        });

        let produced = (|| -> Result<u32> {
            let mut crc = Crc32Digest::default();
            let mut samples = Vec::new();
            loop {
                ctx.check_cancelled()?;
                if blocks.next_block(&mut samples)?.is_none() {
                    break;
                }
                let mut bytes = Vec::new();
                pack_le(&samples, bytes_per_sample, &mut bytes);
                crc.update(&bytes);
                send(&tx, Handoff::Block(bytes))?;
            }

            let calculated = crc.value();
            if calculated != attributes.crc_value {
                return Err(DecodeError::IncorrectCrc {
                    calculated,
                    stored: attributes.crc_value,
                }
                .into());
            }

            send(&tx, Handoff::Finished(calculated))?;
            Ok(calculated)
        })();

        let produced = produced.map_err(|e| ctx.offer_error(e)).ok();
        drop(tx);

        match secondary.join() {
            Ok(written) => Ok(produced.zip(written)),
            Err(_) => Err(OndaError::ThreadPanicked),
        }
    })?;

    match (ctx.take_error(), finished) {
        (Some(e), _) => Err(e),
        (None, Some((crc_value, sink))) => Ok((
            sink,
            ExpandStats {
                frames: total,
                data_length: attributes.data_length(),
                crc_value,
            },
        )),
        (None, None) => Err(OndaError::Disconnected),
    }
}

fn write_bytes<W: Write>(
    mut sink: W,
    rx: &Receiver<Handoff>,
    ctx: &Context,
    bytes_per_frame: u64,
    total: u64,
) -> Result<W> {
    let mut written = 0u64;
    loop {
        match receive(rx, ctx)? {
            Handoff::Block(bytes) => {
                sink.write_all(&bytes)?;
                written += bytes.len() as u64;
                ctx.report(written / bytes_per_frame, total);
            }
            Handoff::Finished(_) => {
                sink.flush()?;
                return Ok(sink);
            }
        }
    }
}

/// Decodes the whole file and checks its CRC and private data, without output.
pub fn validate<R: Read + Seek>(reader: &mut OndaReader<R>, ctx: &Context) -> Result<ValidateStats> {
    ctx.check_cancelled()?;

    let attributes = *reader.attributes();
    reader.private_data()?;

    let bytes_per_sample = attributes.bytes_per_sample();
    let total = attributes.num_sample_frames;
    let mut blocks = reader.blocks()?;
    let mut crc = Crc32Digest::default();
    let mut samples = Vec::new();
    let mut bytes = Vec::new();

    while blocks.next_block(&mut samples)?.is_some() {
        ctx.check_cancelled()?;
        bytes.clear();
        pack_le(&samples, bytes_per_sample, &mut bytes);
        crc.update(&bytes);
        ctx.report(blocks.frames_read(), total);
    }

    let calculated = crc.value();
    if calculated != attributes.crc_value {
        return Err(DecodeError::IncorrectCrc {
            calculated,
            stored: attributes.crc_value,
        }
        .into());
    }

    Ok(ValidateStats {
        frames: total,
        duration_secs: attributes.duration_secs(),
    })
}

fn send(tx: &SyncSender<Handoff>, message: Handoff) -> Result<()> {
    tx.send(message).map_err(|_| OndaError::Disconnected)
}

fn receive(rx: &Receiver<Handoff>, ctx: &Context) -> Result<Handoff> {
    loop {
        ctx.check_cancelled()?;
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(message) => return Ok(message),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Err(OndaError::Disconnected),
        }
    }
}
