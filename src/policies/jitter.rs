//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] randomizes backoff delays so that many subscribers
//! failing on the same cause do not retry in lockstep.
//!
//! - [`JitterPolicy::None`] — no randomization, predictable delays
//! - [`JitterPolicy::Full`] — random delay in `[0, base]` (most aggressive)
//! - [`JitterPolicy::Equal`] — `base/2 + random[0, base/2]` (balanced)
//! - [`JitterPolicy::Decorrelated`] — `random[floor, min(3 × base, cap)]`
//!
//! The base delay is always derived from the attempt number alone (see
//! [`BackoffPolicy::next`](crate::BackoffPolicy::next)); jitter output is
//! never fed back into later calculations, so delays cannot drift
//! downward over a long retry sequence.

use rand::Rng;
use std::time::Duration;

/// Randomization strategy applied on top of a computed backoff delay.
///
/// ## Trade-offs
/// - **None**: predictable, but synchronized retries can stampede
/// - **Full**: maximum spreading, may retry near-immediately
/// - **Equal**: keeps at least half the delay (recommended default choice
///   when enabling jitter at all)
/// - **Decorrelated**: widest spread that still grows with the attempt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the exact backoff delay.
    #[default]
    None,
    /// Random delay in `[0, base]`.
    Full,
    /// Half the base plus a random half: `base/2 + random[0, base/2]`.
    Equal,
    /// Random delay in `[floor, min(3 × base, cap)]`, never below `floor`.
    Decorrelated,
}

impl JitterPolicy {
    /// Applies this policy to a computed `base` delay.
    ///
    /// `floor` is the smallest delay the decorrelated variant may return
    /// (the policy's first delay) and `cap` its upper clamp (the policy's
    /// maximum delay); the other variants ignore both.
    pub fn apply(&self, base: Duration, floor: Duration, cap: Duration) -> Duration {
        match self {
            JitterPolicy::None => base,
            JitterPolicy::Full => random_up_to(base),
            JitterPolicy::Equal => {
                let half_ms = base.as_millis() as u64 / 2;
                Duration::from_millis(half_ms) + random_up_to(Duration::from_millis(half_ms))
            }
            JitterPolicy::Decorrelated => {
                let floor_ms = floor.as_millis() as u64;
                let upper_ms = (base.as_millis() as u64)
                    .saturating_mul(3)
                    .min(cap.as_millis() as u64)
                    .max(floor_ms);

                if floor_ms >= upper_ms {
                    return floor;
                }
                let mut rng = rand::rng();
                Duration::from_millis(rng.random_range(floor_ms..=upper_ms))
            }
        }
    }
}

/// Uniform random duration in `[0, upper]`, in millisecond resolution.
fn random_up_to(upper: Duration) -> Duration {
    let ms = upper.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let mut rng = rand::rng();
    Duration::from_millis(rng.random_range(0..=ms))
}
