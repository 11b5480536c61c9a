// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::Duration;

use super::EndpointError;

/// Bounded exponential backoff for calls the endpoint rejects as busy.
///
/// Only [`EndpointError::Busy`] is retried; any other failure is returned on the spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(800),
            factor: 1.6,
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the `attempt`-th (0-based) busy rejection.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    pub async fn run<T, F>(&self, mut op: F) -> Result<T, EndpointError>
    where
        F: FnMut() -> Result<T, EndpointError>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_busy() && attempt + 1 < attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!(attempt, ?delay, "endpoint busy, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
