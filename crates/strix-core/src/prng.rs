//! Deterministic xorshift generator used for synthetic graphs and search randomisation.

/// Default seed.
pub const SEED: u64 = 0x5a4f_4252_4953_5421;

/// One step of xorshift64. Returns `(value, next_state)`.
#[inline]
pub const fn xorshift64(mut state: u64) -> (u64, u64) {
    state ^= state << 13;
    state ^= state >> 7;
    state ^= state << 17;
    (state, state)
}

/// Small, fast, non-cryptographic PRNG.
#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    /// Create a generator. A zero seed is replaced by [`SEED`], since xorshift
    /// would otherwise stay at zero forever.
    pub const fn new(seed: u64) -> Prng {
        Prng {
            state: if seed == 0 { SEED } else { seed },
        }
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let (value, next) = xorshift64(self.state);
        self.state = next;
        value
    }

    /// Uniform value in `0..bound`. `bound` must be non-zero.
    #[inline]
    pub fn below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        self.next_u64() % bound
    }

    /// Uniform value in `lo..=hi`.
    pub fn range_i32(&mut self, lo: i32, hi: i32) -> i32 {
        debug_assert!(lo <= hi);
        let span = (hi as i64 - lo as i64 + 1) as u64;
        (lo as i64 + self.below(span) as i64) as i32
    }

    /// `true` with probability `1 / n`.
    #[inline]
    pub fn one_in(&mut self, n: u64) -> bool {
        self.below(n) == 0
    }
}

/// Finalizer mixing a 64-bit value into a well-spread key.
#[inline]
pub const fn mix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}
