//! Bounded random-walk stepping for simulated telemetry channels

use rand::Rng;

/// One telemetry channel: a value taking a reflected random walk in
/// `[min, max]`.
///
/// A value inside the range never leaves it; a value pushed below the
/// range (fault-mode entry) walks back up one step per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub value: f64,
    pub step: f64,
    pub min: f64,
    pub max: f64,
}

impl Channel {
    pub fn new(value: f64, step: f64, min: f64, max: f64) -> Self {
        debug_assert!(step > 0.0);
        debug_assert!(min <= max);
        Self {
            value,
            step,
            min,
            max,
        }
    }

    /// Advance one tick: walk randomly inside the range, reflect at the edges
    pub fn step(&mut self, rng: &mut impl Rng) {
        self.value = if self.value <= self.min {
            self.value + self.step
        } else if self.value >= self.max {
            self.value - self.step
        } else {
            let delta = if rng.gen_bool(0.5) {
                self.step
            } else {
                -self.step
            };
            (self.value + delta).clamp(self.min, self.max)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn never_leaves_the_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut channel = Channel::new(3.9, 0.01, 3.0, 4.2);
        for _ in 0..10_000 {
            channel.step(&mut rng);
            assert!(
                channel.value >= channel.min && channel.value <= channel.max,
                "value {} escaped [{}, {}]",
                channel.value,
                channel.min,
                channel.max
            );
        }
    }

    #[test]
    fn reflects_upward_at_the_lower_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut channel = Channel::new(3.0, 0.1, 3.0, 4.2);
        channel.step(&mut rng);
        assert!((channel.value - 3.1).abs() < 1e-9);
    }

    #[test]
    fn reflects_downward_at_the_upper_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut channel = Channel::new(4.2, 0.1, 3.0, 4.2);
        channel.step(&mut rng);
        assert!((channel.value - 4.1).abs() < 1e-9);
    }

    #[test]
    fn recovers_from_a_forced_out_of_range_value() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut channel = Channel::new(3.9, 0.01, 3.0, 4.2);
        channel.value = 2.0;
        channel.step(&mut rng);
        assert!((channel.value - 2.01).abs() < 1e-9);
    }
}
