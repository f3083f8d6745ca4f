//! Lightweight xorshift32 PRNG shared by emitters and the stochastic engine

#[derive(Debug, Clone)]
pub struct ParticleRng {
    state: u32,
}

impl ParticleRng {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Returns a float in [0, 1)
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Returns a float in [min, max)
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_f32() * (max - min)
    }

    /// `base` plus a uniform offset in [-variation, variation)
    pub fn vary(&mut self, base: f32, variation: f32) -> f32 {
        if variation == 0.0 {
            return base;
        }
        base + self.range(-variation, variation)
    }

    /// Picks an index with probability proportional to its weight.
    /// Returns `None` when no weight is positive.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let mut pick = self.next_f32() as f64 * total;
        let mut last = None;
        for (i, w) in weights.iter().enumerate() {
            if *w <= 0.0 {
                continue;
            }
            if pick < *w {
                return Some(i);
            }
            pick -= *w;
            last = Some(i);
        }
        last
    }
}

impl Default for ParticleRng {
    fn default() -> Self {
        Self::new(0x9e37_79b9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_range_bounds() {
        let mut rng = ParticleRng::new(42);
        for _ in 0..1000 {
            let v = rng.range(0.0, 10.0);
            assert!((0.0..10.0).contains(&v));
        }
    }

    #[test]
    fn vary_without_variation_is_exact() {
        let mut rng = ParticleRng::new(7);
        assert_eq!(rng.vary(3.5, 0.0), 3.5);
        let v = rng.vary(3.5, 1.0);
        assert!((2.5..4.5).contains(&v));
    }

    #[test]
    fn weighted_index_skips_zero_weights() {
        let mut rng = ParticleRng::new(99);
        for _ in 0..200 {
            assert_eq!(rng.weighted_index(&[0.0, 2.0, 0.0]), Some(1));
        }
        assert_eq!(rng.weighted_index(&[0.0, 0.0]), None);
        assert_eq!(rng.weighted_index(&[]), None);
    }

    #[test]
    fn weighted_index_covers_all_choices() {
        let mut rng = ParticleRng::new(5);
        let mut seen = [false; 3];
        for _ in 0..500 {
            if let Some(i) = rng.weighted_index(&[1.0, 1.0, 1.0]) {
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }
}
