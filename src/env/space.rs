use rand::Rng;

/// A fixed-size vector space with the same bounds on every component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSpace {
    pub low: f32,
    pub high: f32,
    pub shape: usize,
}

impl BoxSpace {
    pub fn new(low: f32, high: f32, shape: usize) -> Self {
        Self { low, high, shape }
    }

    /// Symmetric unit box, [-1, 1] on every component
    pub fn unit(shape: usize) -> Self {
        Self::new(-1.0, 1.0, shape)
    }

    /// No bounds on any component
    pub fn unbounded(shape: usize) -> Self {
        Self::new(f32::NEG_INFINITY, f32::INFINITY, shape)
    }

    pub fn is_bounded(&self) -> bool {
        self.low.is_finite() && self.high.is_finite()
    }

    pub fn contains_value(&self, value: f64) -> bool {
        value >= self.low as f64 && value <= self.high as f64
    }

    pub fn contains(&self, values: &[f64]) -> bool {
        values.len() == self.shape && values.iter().all(|value| self.contains_value(*value))
    }

    /// Uniform draw per component. An infinite bound is replaced by the
    /// matching unit bound.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        let low = if self.low.is_finite() { self.low as f64 } else { -1.0 };
        let high = if self.high.is_finite() { self.high as f64 } else { 1.0 };
        let high = high.max(low);

        (0..self.shape)
            .map(|_| rng.gen_range(low..=high))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn contains_checks_shape_and_bounds() {
        let space = BoxSpace::unit(3);

        assert!(space.contains(&[-1.0, 0.0, 1.0]));
        assert!(!space.contains(&[0.0, 0.0]));
        assert!(!space.contains(&[0.0, 1.5, 0.0]));
        assert!(!space.contains(&[0.0, f64::NAN, 0.0]));
    }

    #[test]
    fn samples_stay_inside() {
        let space = BoxSpace::unit(3);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            assert!(space.contains(&space.sample(&mut rng)));
        }
    }

    #[test]
    fn unbounded_space_accepts_raw_prices() {
        let space = BoxSpace::unbounded(2);
        let mut rng = StdRng::seed_from_u64(7);

        assert!(!space.is_bounded());
        assert!(BoxSpace::unit(2).is_bounded());
        assert!(space.contains(&[62_000.5, -3.0]));
        assert!(!space.contains(&[0.0, f64::NAN]));
        assert!(space.contains(&space.sample(&mut rng)));
    }
}
