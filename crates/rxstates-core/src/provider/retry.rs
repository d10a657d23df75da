//! Retry utilities for provider failures.
//!
//! Provides classification of retryable errors and exponential backoff.

use crate::error::ProviderError;
use std::time::Duration;

/// Upper bound on any single backoff pause.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Determine whether a provider error is worth retrying.
///
/// Retryable: timeouts, rate limits, connection failures, server errors
/// (5xx), undecodable or empty replies. Not retryable: rejected credentials
/// and other 4xx responses.
pub fn is_retryable(error: &ProviderError) -> bool {
    match error {
        ProviderError::Timeout { .. }
        | ProviderError::RateLimited { .. }
        | ProviderError::Network { .. }
        | ProviderError::Decode { .. }
        | ProviderError::EmptyReply { .. } => true,
        ProviderError::Http { status, .. } => (500..=599).contains(status),
        ProviderError::Auth { .. } => false,
    }
}

/// Calculate exponential backoff duration for a given attempt.
///
/// Uses `base_delay * 2^attempt` with a cap at 60 seconds.
pub fn backoff_duration(attempt: u32, base_delay_ms: u64) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(MAX_BACKOFF_MS))
}

/// Pause before retrying after `error`.
///
/// Rate limits back off from the longer base and never undercut the
/// server's `Retry-After`.
pub fn delay_for(
    error: &ProviderError,
    attempt: u32,
    retry_delay_ms: u64,
    rate_limit_backoff_ms: u64,
) -> Duration {
    match error {
        ProviderError::RateLimited { retry_after, .. } => {
            let backoff = backoff_duration(attempt, rate_limit_backoff_ms);
            retry_after.map_or(backoff, |ra| ra.max(backoff))
        }
        _ => backoff_duration(attempt, retry_delay_ms),
    }
}
