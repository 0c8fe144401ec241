// Seeded, portable pseudo-random stream for song generation.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// Hand-rolled so the exact output sequence is pinned by this crate rather than
// by the version of an external RNG crate.
//
// Every stochastic call in `autocomposer_music` takes a `&mut SongRng`
// explicitly. One song owns one stream; batch generation derives a separate
// seed per song with `song_seed` so songs can be generated in parallel without
// their draws interleaving.
//
// **Critical constraint: determinism.** Given the same seed, every method here
// must produce the same values on every platform. The integer core never
// touches floating point; the float helpers derive from the integer core with
// exact power-of-two scaling.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG, the only source of randomness in song generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SongRng {
    s: [u64; 4],
}

impl SongRng {
    /// Create a new stream seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    /// Two streams created with the same seed produce identical sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Generate a uniform random `u16` in `[low, high]`, both ends inclusive.
    ///
    /// Panics if `low > high`.
    pub fn range_u16_inclusive(&mut self, low: u16, high: u16) -> u16 {
        assert!(low <= high, "range_u16_inclusive: low must be <= high");
        self.range_u64(low as u64, high as u64 + 1) as u16
    }

    /// Generate a uniform random `u8` in `[low, high]`, both ends inclusive.
    ///
    /// Panics if `low > high`.
    pub fn range_u8_inclusive(&mut self, low: u8, high: u8) -> u8 {
        assert!(low <= high, "range_u8_inclusive: low must be <= high");
        self.range_u64(low as u64, high as u64 + 1) as u8
    }

    /// Return `true` with probability `p`.
    ///
    /// `p <= 0.0` always returns false, `p >= 1.0` always returns true.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Pick one element uniformly. Returns `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.range_usize(0, items.len());
        items.get(idx)
    }

    /// Pick an index with probability proportional to `weights[i]`.
    ///
    /// Weights are relative; they need not sum to 1. Non-positive and
    /// non-finite weights are never selected. Returns `None` when no weight
    /// is selectable. Always consumes exactly one draw when it returns `Some`.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let usable = |w: f64| w.is_finite() && w > 0.0;
        let total: f64 = weights.iter().copied().filter(|&w| usable(w)).sum();
        if total <= 0.0 {
            return None;
        }

        let target = self.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last_usable = None;
        for (i, &w) in weights.iter().enumerate() {
            if !usable(w) {
                continue;
            }
            cumulative += w;
            last_usable = Some(i);
            if cumulative > target {
                return Some(i);
            }
        }
        // Float accumulation can land a hair under `target`.
        last_usable
    }
}

/// Derive an independent per-song seed from a batch seed and a song id.
///
/// Runs one SplitMix64 round over the combined value, so neighbouring ids
/// give unrelated streams.
pub fn song_seed(base_seed: u64, song_id: u64) -> u64 {
    let mut state = base_seed ^ song_id.wrapping_mul(0xd1b5_4a32_d192_ed03);
    splitmix64(&mut state)
}

/// SplitMix64, used for seeding xoshiro256++ and deriving per-song seeds.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = SongRng::new(42);
        let mut b = SongRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = SongRng::new(42);
        let mut b = SongRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn f64_in_unit_range() {
        let mut rng = SongRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn range_u64_within_bounds() {
        let mut rng = SongRng::new(999);
        for _ in 0..10_000 {
            let v = rng.range_u64(10, 20);
            assert!((10..20).contains(&v), "range_u64 out of range: {v}");
        }
    }

    #[test]
    fn range_u16_inclusive_reaches_both_ends() {
        let mut rng = SongRng::new(666);
        let mut saw_low = false;
        let mut saw_high = false;
        for _ in 0..10_000 {
            let v = rng.range_u16_inclusive(70, 90);
            assert!((70..=90).contains(&v), "tempo out of range: {v}");
            saw_low |= v == 70;
            saw_high |= v == 90;
        }
        assert!(saw_low && saw_high);
    }

    #[test]
    fn range_u8_inclusive_single_value() {
        let mut rng = SongRng::new(1);
        for _ in 0..100 {
            assert_eq!(rng.range_u8_inclusive(127, 127), 127);
        }
    }

    #[test]
    fn random_bool_distribution() {
        let mut rng = SongRng::new(42);
        let n = 10_000;
        let hits = (0..n).filter(|_| rng.random_bool(0.7)).count();
        let pct = hits as f64 / n as f64;
        assert!(
            (0.67..0.73).contains(&pct),
            "random_bool(0.7) should be ~70%, got {:.1}%",
            pct * 100.0
        );
    }

    #[test]
    fn random_bool_extremes() {
        let mut rng = SongRng::new(42);
        for _ in 0..100 {
            assert!(!rng.random_bool(0.0));
            assert!(rng.random_bool(1.0));
        }
    }

    #[test]
    fn choose_empty_is_none() {
        let mut rng = SongRng::new(3);
        let empty: [u8; 0] = [];
        assert!(rng.choose(&empty).is_none());
        assert_eq!(rng.choose(&[7]), Some(&7));
    }

    #[test]
    fn weighted_index_skips_zero_weights() {
        let mut rng = SongRng::new(5);
        for _ in 0..1000 {
            let idx = rng.weighted_index(&[0.0, 3.0, 0.0, 1.0]);
            assert!(matches!(idx, Some(1) | Some(3)), "got {idx:?}");
        }
    }

    #[test]
    fn weighted_index_is_proportional_not_normalized() {
        // 0.3 + 0.3 + 0.3 + 0.1 vs 0.5 + 0.5 + 0.5: sums differ from 1.0.
        let mut rng = SongRng::new(77);
        let mut counts = [0usize; 3];
        let n = 30_000;
        for _ in 0..n {
            let idx = rng.weighted_index(&[0.5, 0.5, 0.5]).unwrap();
            counts[idx] += 1;
        }
        for c in counts {
            let share = c as f64 / n as f64;
            assert!((0.30..0.37).contains(&share), "share {share}");
        }
    }

    #[test]
    fn weighted_index_all_zero_is_none() {
        let mut rng = SongRng::new(5);
        assert_eq!(rng.weighted_index(&[0.0, 0.0]), None);
        assert_eq!(rng.weighted_index(&[]), None);
        assert_eq!(rng.weighted_index(&[f64::NAN, -1.0]), None);
    }

    #[test]
    fn song_seeds_are_distinct() {
        let seeds: std::collections::BTreeSet<u64> = (1..=20).map(|id| song_seed(42, id)).collect();
        assert_eq!(seeds.len(), 20);
        assert_eq!(song_seed(42, 3), song_seed(42, 3));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = SongRng::new(42);
        for _ in 0..100 {
            rng.next_u64();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: SongRng = serde_json::from_str(&json).unwrap();
        for _ in 0..100 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }
}
