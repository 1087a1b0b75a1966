// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cmp::min;
use std::time::Duration;

use crate::{Backoff, Options};

// Keeps a zero `retry_timeout` from turning acquisition into a busy loop.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// The attempt and delay budget of bounded lock acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    retries: u32,
    backoff: Backoff,
    base_delay: Duration,
    max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_options(options: &Options) -> Self {
        Self {
            retries: options.retries,
            backoff: options.backoff,
            base_delay: options.retry_timeout().max(MIN_DELAY),
            max_delay: options.max_retry_delay(),
        }
    }

    /// The total number of attempts, counting the first one.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// The delays to wait before each retry, one per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        DelaysIter {
            policy: self.clone(),
            retry: 0,
        }
        .take(usize::try_from(self.retries).unwrap_or(usize::MAX))
    }
}

#[derive(Debug)]
struct DelaysIter {
    policy: RetryPolicy,
    retry: u32,
}

impl Iterator for DelaysIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let base = self.policy.base_delay;
        let next_retry = self.retry.saturating_add(1);

        let delay = match self.policy.backoff {
            Backoff::Constant => base,
            Backoff::Linear => base.saturating_mul(next_retry),
            Backoff::Exponential => mul_pow2(base, self.retry),
        };

        self.retry = next_retry;
        Some(self.policy.max_delay.map_or(delay, |max| min(delay, max)))
    }
}

fn mul_pow2(base: Duration, exponent: u32) -> Duration {
    1_u32
        .checked_shl(exponent)
        .map_or(Duration::MAX, |factor| base.saturating_mul(factor))
}
