//! Retry with exponential backoff for the blocking HTTP calls.
//!
//! Transcription and speech synthesis go through [`send_with_retry`]: a
//! request that fails to connect, times out, or comes back 502/503/504 is
//! rebuilt and re-sent after `base_delay * 2^attempt`.  Anything else is
//! returned to the caller on the first attempt.

use std::time::Duration;

/// Bounded retry schedule for transient transport failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles every attempt.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Gateway statuses that usually clear up on their own.
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Send the request produced by `build`, retrying transient failures.
///
/// `build` is called once per attempt because a blocking request (notably a
/// multipart body) cannot be cloned.  The final response is returned even if
/// its status is an error; callers decide what a non-success status means.
pub fn send_with_retry<F>(
    policy: &RetryPolicy,
    label: &str,
    mut build: F,
) -> reqwest::Result<reqwest::blocking::Response>
where
    F: FnMut() -> reqwest::Result<reqwest::blocking::RequestBuilder>,
{
    let mut attempt = 0;
    loop {
        let result = build().and_then(|req| req.send());
        let retry = match &result {
            Ok(resp) => is_retryable_status(resp.status()),
            Err(e) => is_retryable_error(e),
        };

        if !retry || attempt >= policy.max_retries {
            return result;
        }

        let delay = policy.delay_for_attempt(attempt);
        match &result {
            Ok(resp) => log::warn!("{label}: HTTP {}, retrying in {delay:?}", resp.status()),
            Err(e) => log::warn!("{label}: {e}, retrying in {delay:?}"),
        }
        std::thread::sleep(delay);
        attempt += 1;
    }
}

/// First `max` characters of `body`, for error messages.
pub fn snippet(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_and_cap() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(300));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(600));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(1200));
        assert_eq!(p.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn only_gateway_errors_are_retryable() {
        use reqwest::StatusCode;
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::OK));
    }

    #[test]
    fn connection_refused_is_retried_then_surfaced() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let client = reqwest::blocking::Client::new();
        let mut calls = 0;

        // Port 9 (discard) on localhost is closed on any sane test host.
        let result = send_with_retry(&policy, "test", || {
            calls += 1;
            Ok(client.get("http://127.0.0.1:9/"))
        });

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn snippet_counts_characters() {
        assert_eq!(snippet("héllo world", 5), "héllo");
        assert_eq!(snippet("ab", 300), "ab");
    }
}
