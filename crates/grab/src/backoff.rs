// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use backon::BackoffBuilder;

/// Default base delay between attempts.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(600);

/// Upper bound for a single backoff sleep.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Exponential backoff: `base * 2^attempt`, capped at `max_delay`.
///
/// Attempt indices start at 1 for the first retry, so the first sleep is
/// already twice the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base:      Duration,
    max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self { Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX) }
}

impl BackoffPolicy {
    #[must_use]
    pub const fn new(base: Duration, max_delay: Duration) -> Self { Self { base, max_delay } }

    #[must_use]
    pub const fn base(&self) -> Duration { self.base }

    #[must_use]
    pub const fn max_delay(&self) -> Duration { self.max_delay }

    /// Delay to wait before retry number `attempt`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt);
        self.base.saturating_mul(multiplier).min(self.max_delay)
    }

    /// Same as [`BackoffPolicy::delay`] for counters kept as `usize`.
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.delay(u32::try_from(attempt).unwrap_or(u32::MAX))
    }

    /// Schedule for an operation allowed `attempts` tries in total, i.e.
    /// `attempts - 1` sleeps.
    #[must_use]
    pub const fn schedule(self, attempts: usize) -> RetrySchedule {
        RetrySchedule {
            policy:  self,
            retries: attempts.saturating_sub(1),
        }
    }
}

/// [`BackoffBuilder`] handed to `backon` by the request executor.
#[derive(Debug, Clone, Copy)]
pub struct RetrySchedule {
    policy:  BackoffPolicy,
    retries: usize,
}

impl BackoffBuilder for RetrySchedule {
    type Backoff = RetryDelays;

    fn build(self) -> Self::Backoff {
        RetryDelays {
            policy:    self.policy,
            attempt:   0,
            remaining: self.retries,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryDelays {
    policy:    BackoffPolicy,
    attempt:   usize,
    remaining: usize,
}

impl Iterator for RetryDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.attempt += 1;
        Some(self.policy.delay_for(self.attempt))
    }
}
