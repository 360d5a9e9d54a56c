//! Lightweight metrics helpers for restplate.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is bundled; the
//! embedding application installs whatever recorder it uses.
//!
//! Provided metrics:
//! * `restplate_requests_total` (counter; labels `method`, `outcome`)
//! * `restplate_send_attempts_total` (counter; label `method`)
//! * `restplate_retries_total` (counter; label `method`)
//! * `restplate_request_duration_seconds` (histogram; label `method`)
//!
//! [`RequestTimer`] records the duration on `Drop`, so aborted requests are
//! timed as well.
use std::time::{Duration, Instant};

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const RESTPLATE_REQUESTS_TOTAL: &str = "restplate_requests_total";
pub const RESTPLATE_SEND_ATTEMPTS_TOTAL: &str = "restplate_send_attempts_total";
pub const RESTPLATE_RETRIES_TOTAL: &str = "restplate_retries_total";
pub const RESTPLATE_REQUEST_DURATION_SECONDS: &str = "restplate_request_duration_seconds";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        RESTPLATE_REQUESTS_TOTAL,
        Unit::Count,
        "Requests that reached a terminal outcome, by method and outcome."
    );
    describe_counter!(
        RESTPLATE_SEND_ATTEMPTS_TOTAL,
        Unit::Count,
        "Transport send attempts, including retries."
    );
    describe_counter!(
        RESTPLATE_RETRIES_TOTAL,
        Unit::Count,
        "Attempts retried after a timeout."
    );
    describe_histogram!(
        RESTPLATE_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time from dispatch to terminal outcome."
    );
});

/// Count a request that finished with `outcome` (`success`, `aborted` or a
/// failure kind).
pub fn increment_request_total(method: &str, outcome: &str) {
    counter!(
        RESTPLATE_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn increment_send_attempts(method: &str) {
    counter!(RESTPLATE_SEND_ATTEMPTS_TOTAL, "method" => method.to_string()).increment(1);
}

pub fn increment_retries(method: &str) {
    counter!(RESTPLATE_RETRIES_TOTAL, "method" => method.to_string()).increment(1);
}

pub fn record_request_duration(method: &str, duration: Duration) {
    histogram!(RESTPLATE_REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(duration.as_secs_f64());
}

/// RAII helper measuring request duration.
pub struct RequestTimer {
    start: Instant,
    method: String,
}

impl RequestTimer {
    pub fn new(method: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.method, self.start.elapsed());
    }
}

/// Register metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    Lazy::force(&DESCRIBED);
    tracing::debug!("restplate metric descriptions registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timer() {
        let timer = RequestTimer::new("GET");
        assert!(timer.elapsed() <= Duration::from_secs(5));
        // Timer will record duration when dropped
        drop(timer);
    }

    #[test]
    fn test_counters_without_recorder() {
        increment_request_total("GET", "success");
        increment_send_attempts("GET");
        increment_retries("GET");
    }

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }
}
