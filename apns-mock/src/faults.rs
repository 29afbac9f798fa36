//! Random fault injection applied after the reply policy.
//!
//! A real gateway does not answer every notification.  Successful sends are
//! usually acknowledged by silence, some are rejected, and now and then the
//! gateway drops the connection.  [`FaultConfig::apply`] reproduces that on top
//! of whatever the policy decided:
//!
//! | Fault      | Effect                                              |
//! |------------|-----------------------------------------------------|
//! | Disconnect | status becomes 255; connection closes after sending |
//! | Error      | status becomes a random rejection code in `1..=8`   |
//! | Withhold   | a status-0 reply is computed but never sent         |
//!
//! Faults are drawn from the connection's own RNG so a seeded run repeats.

use rand::Rng;

use crate::error::ConfigError;
use crate::reply::status;
use crate::simulator::Response;

/// Fault probabilities, each in `[0, 1]`.  All zero disables injection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaultConfig {
    /// Probability that a successful reply is withheld.
    pub withhold_rate: f64,
    /// Probability that the status is replaced by a random rejection.
    pub error_rate: f64,
    /// Probability that the reply terminates the connection.
    pub disconnect_rate: f64,
}

impl FaultConfig {
    /// Proportions of a misbehaving production gateway: most successes go
    /// unanswered, roughly two in five replies are rejections and one in
    /// twenty drops the connection.
    pub fn chaos() -> Self {
        Self {
            withhold_rate: 0.8,
            error_rate: 0.42,
            disconnect_rate: 0.05,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.withhold_rate == 0.0 && self.error_rate == 0.0 && self.disconnect_rate == 0.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("withhold rate", self.withhold_rate),
            ("error rate", self.error_rate),
            ("disconnect rate", self.disconnect_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Rate { name, value });
            }
        }
        Ok(())
    }

    /// Rewrite `response` according to the fault model.
    ///
    /// A response the policy already withheld passes through untouched.
    pub fn apply<R: Rng + ?Sized>(&self, mut response: Response, rng: &mut R) -> Response {
        if self.is_disabled() || response.drop_reply {
            return response;
        }

        if chance(rng, self.disconnect_rate) {
            response.ack.status = status::TERMINATE;
            return response;
        }
        if chance(rng, self.error_rate) {
            response.ack.status =
                rng.random_range(status::PROCESSING_ERROR..=status::INVALID_TOKEN);
        }
        if response.ack.status == status::NO_ERRORS && chance(rng, self.withhold_rate) {
            response.drop_reply = true;
        }
        response
    }
}

/// Total over all of `f64`: rates at or above 1 always fire, rates at or
/// below 0 (and NaN) never do.
fn chance<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    if p >= 1.0 {
        true
    } else if p > 0.0 {
        rng.random_bool(p)
    } else {
        false
    }
}
