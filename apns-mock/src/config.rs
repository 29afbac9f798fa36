//! Per-process settings shared by every connection.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::delay::DelaySampler;
use crate::error::ConfigError;
use crate::faults::FaultConfig;
use crate::frame::FrameDecoder;

/// Timing, fault and decoding settings handed to each [`crate::connection::Connection`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessConfig {
    /// Artificial delay before each reply is written.
    pub delay: DelaySampler,
    pub faults: FaultConfig,
    /// Seed for per-connection RNGs; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Apply format-2 length bounds to the legacy formats too.
    pub legacy_bounds: bool,
}

impl ProcessConfig {
    /// Immediate replies, no faults, bounded legacy formats.
    pub fn new() -> Self {
        Self {
            legacy_bounds: true,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.delay = DelaySampler { min, max };
        self
    }

    pub fn with_fixed_delay(mut self, delay: Duration) -> Self {
        self.delay = DelaySampler::fixed(delay);
        self
    }

    pub fn with_faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_legacy_bounds(mut self, enabled: bool) -> Self {
        self.legacy_bounds = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        DelaySampler::new(self.delay.min, self.delay.max)?;
        self.faults.validate()
    }

    pub fn decoder(&self) -> FrameDecoder {
        FrameDecoder::new().with_legacy_bounds(self.legacy_bounds)
    }

    /// RNG for the `index`-th accepted connection.
    pub fn rng_for(&self, index: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ index),
            None => StdRng::from_os_rng(),
        }
    }
}
