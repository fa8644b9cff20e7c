//! Synthetic request traffic for the demo binary.
//!
//! Each simulated request logs a handful of lines into its own buffer, fails
//! with the service's error rate and is flushed at the end, so only failing
//! requests leave a trace in the sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::buffer::BufferKey;
use crate::config::ServiceConfig;
use crate::flush::{FlushOutcome, Flusher};
use crate::pool::BufferPool;

const COMPONENTS: &[&str] = &[
    "ConnectionPool",
    "QueryExecutor",
    "AuthManager",
    "CacheLayer",
    "RateLimiter",
    "SessionStore",
    "CircuitBreaker",
    "JobScheduler",
];

const ACTIONS: &[&str] = &[
    "completed successfully",
    "acquired resource handle",
    "evicted stale entry",
    "flushed pending writes",
    "resolved after backoff",
    "enqueued background task",
];

const TARGETS: &[&str] = &[
    "on orders table",
    "for payments-api",
    "from upstream host",
    "in write-ahead log",
    "for user session",
];

const FAILURES: &[&str] = &[
    "timed out waiting",
    "rejected invalid request",
    "failed after retries",
    "exceeded soft limit",
];

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SimulatedFailure(String);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimulationSummary {
    pub requests: usize,
    pub errors: usize,
    pub flushed: usize,
    pub flush_failures: usize,
}

fn pick<'a>(list: &[&'a str], rng: &mut impl Rng) -> &'a str {
    list[rng.gen_range(0..list.len())]
}

pub fn generate_message(rng: &mut impl Rng) -> String {
    format!(
        "{}: {} {}",
        pick(COMPONENTS, rng),
        pick(ACTIONS, rng),
        pick(TARGETS, rng)
    )
}

/// Run one request against `pool` and flush its buffer.
pub async fn run_request(
    service: &ServiceConfig,
    pool: &BufferPool,
    flusher: &Flusher,
    rng: &mut impl Rng,
    summary: &mut SimulationSummary,
) {
    let request_id = Uuid::new_v4().to_string();
    let (buffer, logger) = pool.get_or_create(
        BufferKey::new(service.name.clone(), request_id.clone()),
        service.sink.clone(),
    );
    let logger = logger.with_field("request_id", request_id);

    for _ in 0..service.lines_per_request {
        logger.info(&generate_message(rng));
    }
    summary.requests += 1;

    if rng.gen_bool(service.error_rate.clamp(0.0, 1.0)) {
        let failure = SimulatedFailure(format!(
            "{} {}",
            pick(COMPONENTS, rng),
            pick(FAILURES, rng)
        ));
        logger.report_error("request failed", &failure, None);
        summary.errors += 1;
    }

    match flusher.flush(&buffer).await {
        Ok(FlushOutcome::Flushed(_)) => summary.flushed += 1,
        Ok(FlushOutcome::Clean) => {}
        Err(e) => {
            warn!(service = %service.name, error = %e, "Could not ship request logs");
            summary.flush_failures += 1;
        }
    }
}

/// Generate requests with exponential inter-arrival times until `duration`
/// elapses (forever if zero).
pub async fn simulate_service(
    service: ServiceConfig,
    pool: Arc<BufferPool>,
    flusher: Arc<Flusher>,
    duration: Duration,
) -> SimulationSummary {
    let mut rng = StdRng::from_entropy();
    let mut summary = SimulationSummary::default();
    let start = Instant::now();
    let mean_interval_ms = 1000.0 / service.rate_per_sec.max(f64::EPSILON);

    while duration.is_zero() || start.elapsed() < duration {
        run_request(&service, &pool, &flusher, &mut rng, &mut summary).await;

        let u: f64 = rng.gen_range(f64::EPSILON..1.0);
        let delay_ms = (-mean_interval_ms * u.ln()) as u64;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    summary
}
