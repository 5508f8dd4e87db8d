use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use onda::process::pipeline::Context;

use crate::timestamp::{frames_to_secs, time_str};

const RUNNING_TEMPLATE: &str = "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}";
const FINISHED_TEMPLATE: &str =
    "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise}";

pub fn create_progress_bar(
    multi: &MultiProgress,
    total_frames: u64,
    message: String,
) -> Result<ProgressBar> {
    let pb = multi.add(ProgressBar::new(total_frames));
    pb.set_style(ProgressStyle::with_template(RUNNING_TEMPLATE)?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    Ok(pb)
}

/// A pipeline context that moves `pb` along with the processed frames.
pub fn progress_context(pb: Option<&ProgressBar>) -> Context {
    match pb {
        Some(pb) => {
            let pb = pb.clone();
            Context::new().with_progress(move |done, _total| pb.set_position(done))
        }
        None => Context::new(),
    }
}

pub fn finalize_progress_bar(
    pb: Option<&ProgressBar>,
    frames: u64,
    sample_rate: u32,
    start_time: Instant,
) {
    if let Some(pb) = pb {
        let audio_duration_secs = frames_to_secs(frames, sample_rate);
        let realtime_multiplier = audio_duration_secs / start_time.elapsed().as_secs_f64();

        pb.set_style(
            ProgressStyle::with_template(FINISHED_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.finish_with_message(format!(
            "speed: {realtime_multiplier:.1}x | duration: {}",
            time_str(audio_duration_secs)
        ));
    }
}

pub fn fail_progress_bar(pb: Option<&ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.abandon_with_message(message.to_string());
    }
}
