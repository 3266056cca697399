//! CRC-32 (IEEE 802.3) used to seal permit text.
//!
//! Reflected polynomial 0xEDB88320, register preset to all ones, result
//! inverted. User permits carry it as 8 hex digits; cell permits carry it
//! big-endian inside the encrypted checksum block.

/// Lookup table for the reflected polynomial.
const TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut reg = n as u32;
        let mut bit = 0;
        while bit < 8 {
            reg = if reg & 1 == 1 {
                (reg >> 1) ^ 0xEDB88320
            } else {
                reg >> 1
            };
            bit += 1;
        }
        table[n] = reg;
        n += 1;
    }
    table
};

/// Incremental CRC-32 state.
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    reg: u32,
}

impl Crc32 {
    /// Fresh state with the register preset to all ones.
    pub fn new() -> Self {
        Self { reg: !0 }
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        for &b in data {
            self.reg = (self.reg >> 8) ^ TABLE[((self.reg ^ b as u32) & 0xFF) as usize];
        }
    }

    /// Inverted register value.
    pub fn finalize(self) -> u32 {
        !self.reg
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksum of `data` in one shot.
pub fn checksum(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let text = b"73871727080876A07E450C043031";
        let mut crc = Crc32::new();
        crc.update(&text[..5]);
        crc.update(&text[5..16]);
        assert_eq!(crc.finalize(), checksum(&text[..16]));
    }

    #[test]
    fn test_single_char_change_detected() {
        let base = *b"GB100001202612310123456789ABCDEF";
        let reference = checksum(&base);
        for i in 0..base.len() {
            let mut tampered = base;
            tampered[i] ^= 0x01;
            assert_ne!(checksum(&tampered), reference, "flip at {}", i);
        }
    }
}
