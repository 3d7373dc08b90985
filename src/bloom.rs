use xxhash_rust::xxh3::xxh3_128;

/// Set-membership filter fronting each sorted table's binary search.
///
/// A zero bit means the key is definitely absent, so a lookup can skip the
/// table without touching disk; all-ones means "probably present" and the
/// binary search proceeds. The filter is rebuilt whenever a table is
/// written or re-opened — the scan touches every record anyway, so
/// construction rides along for free and nothing extra hits the disk
/// format.
///
/// Sizing follows the standard formulas:
/// `bits_per_key = -1.44 * log2(fpr)`, `hashes = bits_per_key * ln 2`.
/// The k probe positions come from double hashing: one 128-bit xxh3 hash
/// split into two 64-bit halves, `h_i = h1 + i * h2 (mod m)`.
pub struct BloomFilter {
    words: Vec<u64>,
    bits: u32,
    hashes: u32,
}

impl BloomFilter {
    /// Size the filter for `expected_items` keys at the target false
    /// positive rate.
    ///
    /// # Panics
    /// Panics if `expected_items` is 0 or `fpr` is outside (0, 1).
    pub fn new(expected_items: usize, fpr: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(fpr > 0.0 && fpr < 1.0, "fpr must be in (0, 1)");

        let bits_per_key = -1.44 * fpr.log2();
        let bits = (((expected_items as f64) * bits_per_key).ceil() as u32).max(64);
        let hashes = ((bits_per_key * 2.0f64.ln()).ceil() as u32).max(1);

        BloomFilter {
            words: vec![0u64; bits.div_ceil(64) as usize],
            bits,
            hashes,
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = split_hash(key);
        for i in 0..self.hashes {
            let pos = self.position(h1, h2, i);
            self.words[(pos / 64) as usize] |= 1 << (pos % 64);
        }
    }

    /// `false` means definitely absent; `true` means probably present.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = split_hash(key);
        (0..self.hashes).all(|i| {
            let pos = self.position(h1, h2, i);
            (self.words[(pos / 64) as usize] >> (pos % 64)) & 1 == 1
        })
    }

    fn position(&self, h1: u64, h2: u64, i: u32) -> u32 {
        (h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.bits as u64) as u32
    }
}

fn split_hash(key: &[u8]) -> (u64, u64) {
    let h = xxh3_128(key);
    (h as u64, (h >> 64) as u64)
}
