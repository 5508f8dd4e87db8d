/// Formats a duration in seconds as `HH:MM:SS.mmm`, with wider hours past 99.
pub fn time_str(sec: f64) -> String {
    let total_ms = (sec.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (seconds, milliseconds) = (rest / 1000, rest % 1000);

    format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
}

/// Duration of `frames` sample frames at `sample_rate`.
pub fn frames_to_secs(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting() {
        assert_eq!(time_str(0.0), "00:00:00.000");
        assert_eq!(time_str(1.0), "00:00:01.000");
        assert_eq!(time_str(61.5), "00:01:01.500");
        assert_eq!(time_str(3599.9996), "01:00:00.000");
        assert_eq!(time_str(360_000.25), "100:00:00.250");
        assert_eq!(time_str(-3.0), "00:00:00.000");
    }

    #[test]
    fn frame_durations() {
        assert_eq!(frames_to_secs(44100, 44100), 1.0);
        assert_eq!(frames_to_secs(24000, 48000), 0.5);
        assert_eq!(frames_to_secs(10, 0), 0.0);
    }
}
