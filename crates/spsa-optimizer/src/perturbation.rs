//! Sources of the ±1 perturbation direction.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Produces one direction vector per call, every component exactly `+1.0` or
/// `-1.0`.
pub trait PerturbationSource: Send {
    fn draw(&mut self, n: usize) -> Vec<f64>;
}

/// Symmetric Bernoulli (Rademacher) draws from any RNG.
#[derive(Debug, Clone)]
pub struct Rademacher<R> {
    rng: R,
}

impl<R: Rng + Send> Rademacher<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl Rademacher<ChaCha8Rng> {
    /// Reproducible across platforms and `rand` releases.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(ChaCha8Rng::from_entropy())
    }
}

impl<R: Rng + Send> PerturbationSource for Rademacher<R> {
    fn draw(&mut self, n: usize) -> Vec<f64> {
        (0..n)
            .map(|_| if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 })
            .collect()
    }
}

/// Replays a fixed list of directions, cycling when exhausted.
///
/// Negative entries become `-1.0`, everything else `+1.0`; short rows are
/// padded with `+1.0`.
#[derive(Debug, Clone)]
pub struct FixedPerturbation {
    rows: Vec<Vec<f64>>,
    cursor: usize,
}

impl FixedPerturbation {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows, cursor: 0 }
    }

    /// Same direction every iteration.
    pub fn constant(row: Vec<f64>) -> Self {
        Self::new(vec![row])
    }
}

impl PerturbationSource for FixedPerturbation {
    fn draw(&mut self, n: usize) -> Vec<f64> {
        if self.rows.is_empty() {
            return vec![1.0; n];
        }
        let row = &self.rows[self.cursor % self.rows.len()];
        self.cursor += 1;
        (0..n)
            .map(|i| match row.get(i) {
                Some(v) if *v < 0.0 => -1.0,
                _ => 1.0,
            })
            .collect()
    }
}
