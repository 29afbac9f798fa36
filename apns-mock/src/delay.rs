//! Artificial processing delay for replies.
//!
//! Every reply is held back for a delay drawn uniformly from
//! `[min, max]`.  Because each delay is drawn independently, a later
//! notification can be answered before an earlier one, which is how a busy
//! gateway behaves.  With `min == max` the delay is fixed and replies keep
//! arrival order.

use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DelaySampler {
    pub min: Duration,
    pub max: Duration,
}

impl DelaySampler {
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::DelayRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// A sampler that always yields `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.min >= self.max
    }

    /// Draw one delay.  Never touches `rng` for a fixed delay.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.is_fixed() {
            return self.min;
        }
        let span = (self.max - self.min).as_micros().min(u128::from(u64::MAX)) as u64;
        self.min + Duration::from_micros(rng.random_range(0..=span))
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn fixed_delay_is_returned_exactly() {
        let mut rng = StdRng::seed_from_u64(0);
        let d = DelaySampler::fixed(Duration::from_millis(15));
        assert!(d.is_fixed());
        for _ in 0..10 {
            assert_eq!(d.sample(&mut rng), Duration::from_millis(15));
        }
    }

    #[test]
    fn samples_stay_within_range() {
        let mut rng = StdRng::seed_from_u64(9);
        let d = DelaySampler::new(Duration::from_millis(5), Duration::from_millis(50)).unwrap();
        for _ in 0..1000 {
            let s = d.sample(&mut rng);
            assert!(s >= d.min && s <= d.max, "{s:?}");
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert_eq!(
            DelaySampler::new(Duration::from_secs(2), Duration::from_secs(1)),
            Err(ConfigError::DelayRange {
                min: Duration::from_secs(2),
                max: Duration::from_secs(1),
            })
        );
    }

    #[test]
    fn same_seed_same_delays() {
        let d = DelaySampler::new(Duration::ZERO, Duration::from_secs(1)).unwrap();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let xs: Vec<_> = (0..20).map(|_| d.sample(&mut a)).collect();
        let ys: Vec<_> = (0..20).map(|_| d.sample(&mut b)).collect();
        assert_eq!(xs, ys);
    }
}
