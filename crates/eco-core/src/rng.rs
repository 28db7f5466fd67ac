//! Random number service.
//!
//! The engine only needs uniformly distributed integers in a closed range.
//! [`UniformSource`] is that seam; [`SimRng`] is the seedable ChaCha8 stream
//! used by real runs.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A source of uniformly distributed integers.
pub trait UniformSource {
    /// Draw an integer uniformly from the closed interval `[min, max]`.
    ///
    /// When `min >= max` this returns `min` and must not advance the stream.
    fn uniform(&mut self, min: u32, max: u32) -> u32;
}

/// Deterministic simulation RNG
#[derive(Debug, Clone)]
pub struct SimRng {
    seed: u64,
    inner: ChaCha8Rng,
}

impl SimRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Seed from OS entropy. The chosen seed is kept so the run can be replayed.
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::rngs::OsRng.next_u64())
    }

    /// Seed with `seed` if given, otherwise from entropy.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl UniformSource for SimRng {
    fn uniform(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        self.inner.gen_range(min..=max)
    }
}

/// Pick `k` of the `n` indices `0..n`, each `k`-subset equally likely.
///
/// Robert Floyd's combination algorithm: `k` draws, no rejection loop.
/// Returns a membership mask of length `n`.
///
/// # Panics
///
/// Panics if `k > n`. Callers check capacity first.
pub fn combination<R: UniformSource + ?Sized>(n: u32, k: u32, rng: &mut R) -> Vec<bool> {
    assert!(k <= n, "cannot choose {} of {} items", k, n);
    let mut chosen = vec![false; n as usize];
    for j in (n - k)..n {
        let r = rng.uniform(0, j) as usize;
        if chosen[r] {
            chosen[j as usize] = true;
        } else {
            chosen[r] = true;
        }
    }
    chosen
}
