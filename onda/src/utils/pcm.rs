//! Little-endian packing of interleaved integer samples.

/// Appends the samples held in `bytes` to `out`, sign-extending each
/// `bytes_per_sample`-byte little-endian value. Trailing bytes that do not make
/// a whole sample are ignored.
pub fn unpack_le(bytes: &[u8], bytes_per_sample: usize, out: &mut Vec<i32>) {
    out.reserve(bytes.len() / bytes_per_sample);
    match bytes_per_sample {
        2 => out.extend(
            bytes
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as i32),
        ),
        3 => out.extend(
            bytes
                .chunks_exact(3)
                .map(|b| i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8),
        ),
        4 => out.extend(
            bytes
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ),
        n => out.extend(bytes.chunks_exact(n).map(|b| {
            let shift = 32 - 8 * n as u32;
            let raw = b
                .iter()
                .rev()
                .fold(0u32, |acc, &byte| (acc << 8) | byte as u32);
            ((raw << shift) as i32) >> shift
        })),
    }
}

/// Appends `samples` to `out` as `bytes_per_sample`-byte little-endian values.
pub fn pack_le(samples: &[i32], bytes_per_sample: usize, out: &mut Vec<u8>) {
    out.reserve(samples.len() * bytes_per_sample);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes()[..bytes_per_sample]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_bit() {
        let bytes = [0x34, 0x12, 0xff, 0xff, 0x00, 0x80];
        let mut samples = Vec::new();
        unpack_le(&bytes, 2, &mut samples);
        assert_eq!(samples, [0x1234, -1, -32768]);

        let mut packed = Vec::new();
        pack_le(&samples, 2, &mut packed);
        assert_eq!(packed, bytes);
    }

    #[test]
    fn twenty_four_bit_sign_extends() {
        let bytes = [0x56, 0x34, 0x12, 0x00, 0x00, 0x80, 0xfe, 0xff, 0xff];
        let mut samples = Vec::new();
        unpack_le(&bytes, 3, &mut samples);
        assert_eq!(samples, [0x12_3456, -8_388_608, -2]);

        let mut packed = Vec::new();
        pack_le(&samples, 3, &mut packed);
        assert_eq!(packed, bytes);
    }

    #[test]
    fn odd_widths_and_leftovers() {
        let mut samples = Vec::new();
        unpack_le(&[0x80, 0x7f, 0x01], 1, &mut samples);
        assert_eq!(samples, [-128, 127, 1]);

        samples.clear();
        unpack_le(&[0x01, 0x00, 0x02], 2, &mut samples);
        assert_eq!(samples, [1]);
    }
}
