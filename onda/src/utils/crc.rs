//! CRC-32 over uncompressed sample bytes.
//!
//! The reflected IEEE 802.3 polynomial (as used by zlib and PNG); the value stored
//! in the attributes chunk is directly comparable with other CRC-32 tools.

/// CRC algorithm specification with polynomial, initial value and final XOR.
pub struct Algorithm<T> {
    poly: T,
    init: T,
    xorout: T,
}

/// CRC-32 (IEEE), reflected polynomial form.
pub const CRC_32_IEEE_ALG: Algorithm<u32> = Algorithm {
    poly: 0xedb8_8320,
    init: 0xffff_ffff,
    xorout: 0xffff_ffff,
};

/// Shifts `len` bits out of a reflected CRC-32 register.
#[inline(always)]
pub const fn crc32(poly: u32, mut value: u32, len: usize) -> u32 {
    let mut i = 0;
    while i < len {
        value = (value >> 1) ^ ((value & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc32(poly, i as u32, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc32 {
    pub poly: u32,
    pub init: u32,
    pub xorout: u32,
    table: [u32; 256],
}

impl Crc32 {
    pub const fn new(algorithm: &Algorithm<u32>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            xorout: algorithm.xorout,
            table: crc32_table(algorithm.poly),
        }
    }

    const fn table_entry(&self, index: u32) -> u32 {
        self.table[(index & 0xff) as usize]
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table_entry(crc ^ bytes[i] as u32) ^ (crc >> 8);
            i += 1;
        }

        crc
    }

    #[inline(always)]
    pub const fn finalize(&self, crc: u32) -> u32 {
        crc ^ self.xorout
    }

    pub const fn checksum(&self, bytes: &[u8]) -> u32 {
        self.finalize(self.update(self.init, bytes))
    }
}

pub static CRC32: Crc32 = Crc32::new(&CRC_32_IEEE_ALG);

/// Running CRC-32 of a byte stream fed in pieces.
#[derive(Debug, Clone, Copy)]
pub struct Crc32Digest {
    value: u32,
}

impl Default for Crc32Digest {
    fn default() -> Self {
        Self { value: CRC32.init }
    }
}

impl Crc32Digest {
    pub fn update(&mut self, bytes: &[u8]) {
        self.value = CRC32.update(self.value, bytes);
    }

    pub fn value(&self) -> u32 {
        CRC32.finalize(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(CRC32.checksum(b"123456789"), 0xcbf4_3926);
        assert_eq!(CRC32.checksum(b""), 0);
    }

    #[test]
    fn digest_matches_one_shot() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 + i / 13) as u8).collect();

        let mut digest = Crc32Digest::default();
        for piece in data.chunks(333) {
            digest.update(piece);
        }

        assert_eq!(digest.value(), CRC32.checksum(&data));
    }
}
