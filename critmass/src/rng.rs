//! The single deterministic random source of a run.
//!
//! Every stochastic draw in a run goes through one `RandomStream`, in a fixed
//! call order, so seed + configuration + step count pin down the whole
//! trajectory.

use rand::rngs::StdRng;
use rand::seq::{SliceRandom, index};
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

#[derive(Debug, Clone)]
pub struct RandomStream {
    rng: StdRng,
    seed: u64,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.random()
    }

    /// Normal draw. Always consumes exactly one standard-normal sample, so a
    /// zero `std_dev` returns `mean` without shifting later draws.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        mean + std_dev * z
    }

    /// A fresh uniformly random permutation of `0..n`.
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut self.rng);
        order
    }

    /// Up to `amount` distinct indices from `0..n`, never `exclude`.
    pub fn sample_others(&mut self, n: usize, exclude: usize, amount: usize) -> Vec<usize> {
        if n <= 1 {
            return Vec::new();
        }
        let amount = amount.min(n - 1);
        index::sample(&mut self.rng, n - 1, amount)
            .into_iter()
            .map(|j| if j >= exclude { j + 1 } else { j })
            .collect()
    }
}

/// Deterministically mix a base seed with a salt.
pub fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut value = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    value ^= value.rotate_left(29);
    value = value.wrapping_mul(0x517C_C1B7_2722_0A95);
    value ^ (value >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_draws() {
        let mut a = RandomStream::new(7);
        let mut b = RandomStream::new(7);
        for _ in 0..50 {
            assert_eq!(a.uniform().to_bits(), b.uniform().to_bits());
            assert_eq!(a.normal(1.0, 2.0).to_bits(), b.normal(1.0, 2.0).to_bits());
        }
        assert_eq!(a.permutation(20), b.permutation(20));
    }

    #[test]
    fn test_zero_std_normal_is_mean_and_consumes_a_draw() {
        let mut a = RandomStream::new(3);
        let mut b = RandomStream::new(3);
        assert_eq!(a.normal(0.4, 0.0), 0.4);
        b.normal(9.0, 1.0);
        assert_eq!(a.uniform().to_bits(), b.uniform().to_bits());
    }

    #[test]
    fn test_permutation_covers_every_index_once() {
        let mut rng = RandomStream::new(11);
        let mut order = rng.permutation(100);
        order.sort_unstable();
        assert_eq!(order, (0..100).collect::<Vec<_>>());
        assert!(rng.permutation(0).is_empty());
    }

    #[test]
    fn test_sample_others_excludes_self_and_is_distinct() {
        let mut rng = RandomStream::new(5);
        for exclude in [0, 3, 9] {
            let mut picked = rng.sample_others(10, exclude, 5);
            assert_eq!(picked.len(), 5);
            assert!(!picked.contains(&exclude));
            assert!(picked.iter().all(|&i| i < 10));
            picked.sort_unstable();
            picked.dedup();
            assert_eq!(picked.len(), 5);
        }

        // Small populations: everyone else, at most
        let mut picked = rng.sample_others(3, 1, 5);
        picked.sort_unstable();
        assert_eq!(picked, vec![0, 2]);
        assert!(rng.sample_others(1, 0, 5).is_empty());
    }

    #[test]
    fn test_mix_seed_separates_salts() {
        assert_ne!(mix_seed(0, 1), mix_seed(0, 2));
        assert_eq!(mix_seed(4, 9), mix_seed(4, 9));
    }
}
