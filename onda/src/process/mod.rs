//! The block codec and the streaming pipeline around it.
//!
//! A block is a run of up to `block_length` interleaved sample frames. It starts with
//! one key per channel giving that channel's encoding length, followed by the samples.
//! Each sample is either written raw (`sample_length` bits) or as the second
//! difference of the channel (`encoding_length` bits). A second difference that does
//! not fit is replaced by the escape code, followed by the raw sample.
//!
//! Nothing carries over from one block to the next.

/// Block encoding, including the choice of encoding length per channel.
///
/// Provides the [`BlockEncoder`](encode::BlockEncoder).
pub mod encode;

/// Block decoding.
///
/// Provides the [`BlockDecoder`](decode::BlockDecoder).
pub mod decode;

/// Two-thread compress, expand and validate operations.
pub mod pipeline;

/// Smallest encoding length a key of `key_length` bits can express.
#[inline]
pub const fn min_encoding_length(sample_length: u32, key_length: u32) -> u32 {
    let span = (1u32 << key_length) - 1;
    if sample_length > span + 1 {
        sample_length - span
    } else {
        1
    }
}

/// Largest second difference magnitude representable in `encoding_length` bits,
/// with the top code reserved for the escape.
#[inline]
pub const fn encoding_limit(encoding_length: u32) -> i64 {
    (1i64 << (encoding_length - 1)) - 1
}

/// Encoding parameters of one channel within one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCoding {
    pub encoding_length: u32,
    pub excess_code: u32,
    pub pos_limit: i64,
    pub neg_limit: i64,
}

impl ChannelCoding {
    pub const fn new(encoding_length: u32) -> Self {
        let excess_code = 1u32 << (encoding_length - 1);
        let pos_limit = excess_code as i64 - 1;
        Self {
            encoding_length,
            excess_code,
            pos_limit,
            neg_limit: -pos_limit,
        }
    }

    #[inline(always)]
    pub const fn fits(&self, epsilon: i64) -> bool {
        epsilon >= self.neg_limit && epsilon <= self.pos_limit
    }

    /// Recovers a second difference from its `encoding_length`-bit code.
    #[inline(always)]
    pub const fn sign_extend(&self, code: u32) -> i64 {
        if code & self.excess_code != 0 {
            (code | !(self.excess_code - 1)) as i32 as i64
        } else {
            code as i64
        }
    }
}

/// Predictor state of one channel, reset at every block start.
#[derive(Debug, Default, Clone, Copy)]
pub struct Predictor {
    pub prev_sample: i64,
    pub prev_delta: i64,
}

impl Predictor {
    #[inline(always)]
    pub fn update(&mut self, sample: i64) {
        self.prev_delta = sample - self.prev_sample;
        self.prev_sample = sample;
    }
}

/// Sign-extends the low `bits` bits of a raw sample.
#[inline(always)]
pub const fn sign_extend_raw(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_encoding_length_by_key_width() {
        assert_eq!(min_encoding_length(16, 4), 1);
        assert_eq!(min_encoding_length(16, 3), 9);
        assert_eq!(min_encoding_length(24, 5), 1);
        assert_eq!(min_encoding_length(24, 4), 9);
        assert_eq!(min_encoding_length(24, 1), 23);
        assert_eq!(min_encoding_length(8, 5), 1);
    }

    #[test]
    fn coding_limits() {
        let c = ChannelCoding::new(4);
        assert_eq!(c.excess_code, 8);
        assert_eq!((c.neg_limit, c.pos_limit), (-7, 7));
        assert_eq!(encoding_limit(4), 7);
        assert!(c.fits(-7) && c.fits(7));
        assert!(!c.fits(8) && !c.fits(-8));

        assert_eq!(c.sign_extend(0b0111), 7);
        assert_eq!(c.sign_extend(0b1001), -7);
        assert_eq!(c.sign_extend(0b1111), -1);

        let one = ChannelCoding::new(1);
        assert_eq!((one.excess_code, one.pos_limit, one.neg_limit), (1, 0, 0));
        assert_eq!(one.sign_extend(0), 0);
    }

    #[test]
    fn raw_sign_extension() {
        assert_eq!(sign_extend_raw(0xffff, 16), -1);
        assert_eq!(sign_extend_raw(0x7fff, 16), 32767);
        assert_eq!(sign_extend_raw(0x80_0000, 24), -8_388_608);
        assert_eq!(sign_extend_raw(0xffff_fffe, 32), -2);
    }
}
