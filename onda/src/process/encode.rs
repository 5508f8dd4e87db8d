use std::io;

use crate::process::{ChannelCoding, Predictor, encoding_limit, min_encoding_length};
use crate::structs::attributes::Attributes;
use crate::utils::bitstream_io::BitstreamIoWriter;

/// Encodes blocks of interleaved sample frames.
///
/// Samples must fit in `sample_length` signed bits.
#[derive(Debug, Clone)]
pub struct BlockEncoder {
    num_channels: usize,
    sample_length: u32,
    key_length: u32,
    min_encoding_length: u32,
    codings: Vec<ChannelCoding>,
    predictors: Vec<Predictor>,
}

impl BlockEncoder {
    pub fn new(num_channels: usize, sample_length: u32, key_length: u32) -> Self {
        debug_assert!(num_channels > 0);
        debug_assert!((1..=32).contains(&sample_length));
        debug_assert!((1..=5).contains(&key_length));

        Self {
            num_channels,
            sample_length,
            key_length,
            min_encoding_length: min_encoding_length(sample_length, key_length),
            codings: vec![ChannelCoding::new(sample_length); num_channels],
            predictors: vec![Predictor::default(); num_channels],
        }
    }

    pub fn with_attributes(attributes: &Attributes) -> Self {
        Self::new(
            attributes.num_channels as usize,
            attributes.bits_per_sample as u32,
            attributes.key_length as u32,
        )
    }

    pub fn min_encoding_length(&self) -> u32 {
        self.min_encoding_length
    }

    /// Encoding lengths chosen for the most recent block, in channel order.
    pub fn encoding_lengths(&self) -> impl Iterator<Item = u32> + '_ {
        self.codings.iter().map(|c| c.encoding_length)
    }

    /// Picks, for every channel, the encoding length with the smallest estimated
    /// output: `(frames - 1) * j + (excess[j] + 1) * sample_length` bits, where
    /// `excess[j]` counts the second differences that overflow `j` bits.
    ///
    /// Candidates are tried in ascending order and only a strict improvement
    /// replaces the current choice, so ties go to the shortest length.
    pub fn choose_encoding_lengths(&mut self, samples: &[i32]) {
        let nc = self.num_channels;
        let sl = self.sample_length;
        let frames = (samples.len() / nc) as u64;
        if frames == 0 {
            return;
        }

        for ch in 0..nc {
            // needed[n]: second differences whose shortest escape-free length is n.
            let mut needed = [0u64; 34];
            let mut predictor = Predictor::default();

            for (frame, &sample) in samples.iter().skip(ch).step_by(nc).enumerate() {
                let sample = sample as i64;
                // Only the block's very first sample is written unconditionally raw.
                if frame > 0 || ch > 0 {
                    let epsilon = (sample - predictor.prev_sample - predictor.prev_delta).abs();
                    let n = (65 - epsilon.leading_zeros()).min(sl);
                    needed[n as usize] += 1;
                }
                predictor.update(sample);
            }

            let mut encoding_length = sl;
            let mut min_cost = frames * sl as u64;
            let mut excess: u64 = needed[self.min_encoding_length as usize + 1..=sl as usize]
                .iter()
                .sum();

            for j in self.min_encoding_length..sl {
                debug_assert!(encoding_limit(j) >= 0);
                let cost = (frames - 1) * j as u64 + (excess + 1) * sl as u64;
                if cost < min_cost {
                    min_cost = cost;
                    encoding_length = j;
                }
                excess -= needed[j as usize + 1];
            }

            self.codings[ch] = ChannelCoding::new(encoding_length);
        }
    }

    /// Writes one block: the per-channel keys, then every sample.
    pub fn write_block<W: io::Write>(
        &mut self,
        bits: &mut BitstreamIoWriter<W>,
        samples: &[i32],
    ) -> io::Result<()> {
        debug_assert_eq!(samples.len() % self.num_channels, 0);
        if samples.is_empty() {
            return Ok(());
        }

        self.choose_encoding_lengths(samples);

        for coding in &self.codings {
            bits.put_n(self.key_length, self.sample_length - coding.encoding_length)?;
        }

        let sl = self.sample_length;
        self.predictors.fill(Predictor::default());

        for (frame, sample_frame) in samples.chunks_exact(self.num_channels).enumerate() {
            for (channel, ((&sample, coding), predictor)) in sample_frame
                .iter()
                .zip(&self.codings)
                .zip(&mut self.predictors)
                .enumerate()
            {
                let sample = sample as i64;

                if (frame == 0 && channel == 0) || coding.encoding_length == sl {
                    bits.put_n(sl, sample as u32)?;
                } else {
                    let epsilon = sample - predictor.prev_sample - predictor.prev_delta;
                    if coding.fits(epsilon) {
                        bits.put_n(coding.encoding_length, epsilon as u32)?;
                    } else {
                        bits.put_n(coding.encoding_length, coding.excess_code)?;
                        bits.put_n(sl, sample as u32)?;
                    }
                }

                predictor.update(sample);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lengths(encoder: &BlockEncoder) -> Vec<u32> {
        encoder.encoding_lengths().collect()
    }

    #[test]
    fn single_frame_stays_raw() {
        let mut encoder = BlockEncoder::new(2, 16, 4);
        encoder.choose_encoding_lengths(&[1234, -99]);
        assert_eq!(lengths(&encoder), [16, 16]);
    }

    #[test]
    fn constant_signal_uses_shortest_length() {
        let mut encoder = BlockEncoder::new(2, 24, 5);
        encoder.choose_encoding_lengths(&[0; 512]);
        assert_eq!(lengths(&encoder), [1, 1]);

        // A DC offset only costs the first difference.
        let mut encoder = BlockEncoder::new(1, 16, 4);
        encoder.choose_encoding_lengths(&[500; 256]);
        assert_eq!(lengths(&encoder), [1]);
    }

    #[test]
    fn linear_ramp_has_zero_second_difference() {
        let ramp: Vec<i32> = (0..64).map(|i| i * 37 - 1000).collect();
        let mut encoder = BlockEncoder::new(1, 16, 4);
        encoder.choose_encoding_lengths(&ramp);
        // Only the second frame, whose delta follows the implicit zero start,
        // overflows a 1-bit code.
        assert_eq!(lengths(&encoder), [1]);
    }

    #[test]
    fn choice_respects_key_range() {
        // Full-scale noise: whatever wins stays inside the key's range.
        let mut rng = fastrand::Rng::with_seed(7);
        let noise: Vec<i32> = (0..256).map(|_| rng.i32(-32768..=32767)).collect();

        let mut encoder = BlockEncoder::new(1, 16, 3);
        assert_eq!(encoder.min_encoding_length(), 9);
        encoder.choose_encoding_lengths(&noise);
        let chosen = lengths(&encoder)[0];
        assert!((9..=16).contains(&chosen));

        // Small steps would like 3 bits, but a 2-bit key can only reach 13.
        let small: Vec<i32> = (0..256).map(|i| i % 3).collect();
        let mut encoder = BlockEncoder::new(1, 16, 2);
        encoder.choose_encoding_lengths(&small);
        assert_eq!(lengths(&encoder), [13]);
    }

    #[test]
    fn cheapest_length_wins() {
        // Frames = 2, one second difference of 1:
        //   j = 1: 1 + (1 + 1) * 4 = 9; j = 2: 2 + 4 = 6; j = 3: 3 + 4 = 7; raw: 8.
        let mut encoder = BlockEncoder::new(1, 4, 2);
        encoder.choose_encoding_lengths(&[0, 1]);
        assert_eq!(lengths(&encoder), [2]);
    }

    #[test]
    fn ties_prefer_shorter_length() {
        // Frames = 9, 8-bit samples, a single second difference of 1:
        //   j = 1: 8 + (1 + 1) * 8 = 24; j = 2: 16 + 8 = 24; j = 3: 32. Raw: 72.
        let mut encoder = BlockEncoder::new(1, 8, 3);
        encoder.choose_encoding_lengths(&[0, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(lengths(&encoder), [1]);
    }

    fn encode_block(channels: usize, samples: &[i32]) -> io::Result<(Vec<u32>, Vec<u8>)> {
        let mut bits = BitstreamIoWriter::new(Vec::new());
        let mut encoder = BlockEncoder::new(channels, 16, 4);
        encoder.write_block(&mut bits, samples)?;
        Ok((lengths(&encoder), bits.close()?))
    }

    #[test]
    fn keys_lead_the_block() -> io::Result<()> {
        let (chosen, out) = encode_block(2, &[0, 7, 0, 7, 0, 7, 0, 7])?;

        // Channel 0 is silent: length 1, key 15. Channel 1 starts with an
        // epsilon of 7 against the zero predictor, then -7: length 4, key 12.
        assert_eq!(chosen, [1, 4]);
        // Keys, channel 0 raw 0, then 0111 | 0 1001 | 0 0000 | 0 0000.
        assert_eq!(out, [0xfc, 0x00, 0x00, 0x74, 0x80, 0x00]);
        Ok(())
    }

    #[test]
    fn only_the_first_sample_of_a_block_is_raw() -> io::Result<()> {
        // Two frames of stereo silence: keys 15 and 15, 16 raw bits for
        // channel 0, then three 1-bit codes.
        let (chosen, out) = encode_block(2, &[0; 4])?;
        assert_eq!(chosen, [1, 1]);
        assert_eq!(out, [0xff, 0x00, 0x00, 0x00]);

        // Channel 1 starts at 3, inside a 3-bit epsilon: keys 12 and 13, raw 5,
        // then 011 | 1011 101 | 0000 000.
        let (chosen, out) = encode_block(2, &[5, 3, 5, 3, 5, 3])?;
        assert_eq!(chosen, [4, 3]);
        assert_eq!(out, [0xcd, 0x00, 0x05, 0x77, 0x40, 0x00]);
        Ok(())
    }

    #[test]
    fn first_sample_of_later_channels_counts_toward_excess() {
        // Channel 1 opens far from zero and then holds still. Its opening
        // epsilon needs 16 bits, so every shorter length pays one escape.
        let mut encoder = BlockEncoder::new(2, 16, 4);
        encoder.choose_encoding_lengths(&[0, 20000, 0, 20000, 0, 20000]);
        // Frames = 3; channel 1 second differences 20000, -20000, 0:
        //   j = 1: 2 + 3 * 16 = 50, raw: 48.
        assert_eq!(lengths(&encoder), [1, 16]);
    }
}
