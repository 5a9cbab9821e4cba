//! Retry and failure-tolerance policies

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::job::{JobState, Progress};

/// Decides whether a fully settled job is `Completed` or `Failed`.
///
/// A job in which nothing was delivered is always `Failed`, whatever the
/// configured tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureTolerance {
    /// Any permanent failure fails the job
    None,
    /// Fail when `failed / total` exceeds the ratio
    MaxRatio { ratio: f64 },
    /// Fail when more than `count` recipients failed
    MaxCount { count: u32 },
}

impl Default for FailureTolerance {
    fn default() -> Self {
        Self::MaxRatio { ratio: 0.5 }
    }
}

impl FailureTolerance {
    /// Terminal state for a job whose counters have reached `total`.
    pub fn verdict(&self, progress: Progress, total: u32) -> JobState {
        let exceeded = match *self {
            _ if progress.sent == 0 && total > 0 => true,
            Self::None => progress.failed > 0,
            Self::MaxRatio { ratio } => {
                total > 0 && f64::from(progress.failed) / f64::from(total) > ratio
            }
            Self::MaxCount { count } => progress.failed > count,
        };

        if exceeded {
            JobState::Failed(progress)
        } else {
            JobState::Completed(progress)
        }
    }
}

impl std::str::FromStr for FailureTolerance {
    type Err = String;

    /// Parses `none`, `ratio:<f>` or `count:<n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "none" {
            return Ok(Self::None);
        }
        match s.split_once(':') {
            Some(("ratio", v)) => {
                let ratio: f64 = v
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid ratio '{}'", v))?;
                if !(0.0..=1.0).contains(&ratio) {
                    return Err(format!("ratio {} outside 0.0..=1.0", ratio));
                }
                Ok(Self::MaxRatio { ratio })
            }
            Some(("count", v)) => v
                .trim()
                .parse()
                .map(|count| Self::MaxCount { count })
                .map_err(|_| format!("invalid count '{}'", v)),
            _ => Err(format!(
                "unknown failure tolerance '{}' (expected none, ratio:<f> or count:<n>)",
                s
            )),
        }
    }
}

/// Retry backoff strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    Constant { millis: u64 },
    Exponential { initial_millis: u64, multiplier: f64, max_millis: u64 },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Constant { millis } => Duration::from_millis(*millis),
            Self::Exponential {
                initial_millis,
                multiplier,
                max_millis,
            } => {
                let exp = attempt.min(30) as i32;
                let millis = (*initial_millis as f64 * multiplier.powi(exp)) as u64;
                Duration::from_millis(millis.min(*max_millis))
            }
        }
    }
}

/// Per-recipient retry policy for transient transport errors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per recipient, including the first one
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    /// Delay randomisation within `±jitter_factor`
    pub jitter_factor: f64,
    /// Upper bound on a single transport call
    pub send_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_millis: 500,
                multiplier: 2.0,
                max_millis: 30_000,
            },
            jitter_factor: 0.1,
            send_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, used by the synchronous send path.
    pub fn single_attempt(send_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            send_timeout,
            ..Default::default()
        }
    }

    /// Whether another attempt follows `attempts_made` failed ones.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Jittered delay before the retry following `attempts_made` failures.
    pub fn delay_after(&self, attempts_made: u32) -> Duration {
        let base = self.backoff.delay(attempts_made.saturating_sub(1));
        if self.jitter_factor <= 0.0 || base.is_zero() {
            return base;
        }
        let spread = self.jitter_factor.min(1.0);
        let factor = 1.0 + rand::rng().random_range(-spread..=spread);
        base.mul_f64(factor.max(0.0))
    }
}
