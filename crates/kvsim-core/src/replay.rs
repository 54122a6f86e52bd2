//! Concurrent workload replay.
//!
//! Requests are dealt round-robin to `threads` OS threads. Each thread routes
//! its share in order and keeps at most `in_flight` requests outstanding,
//! completing the oldest one whenever the window is full. With one thread
//! the replay is fully deterministic.

use crate::metrics::CacheMetricsSnapshot;
use crate::router::{RouteOutcome, SmartRouter};
use crate::workload::TokenizedRequest;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{error, info, warn};

/// Summary of one replay run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub requests_routed: u64,
    pub requests_rejected: u64,
    pub wall_time_ms: f64,
    pub routes_per_sec: f64,
    pub metrics: CacheMetricsSnapshot,
}

#[derive(Debug, Default, Clone, Copy)]
struct ThreadCounts {
    routed: u64,
    rejected: u64,
}

fn replay_share(
    router: &SmartRouter,
    requests: &[TokenizedRequest],
    thread: usize,
    threads: usize,
    in_flight: usize,
) -> ThreadCounts {
    let mut counts = ThreadCounts::default();
    let mut outstanding: VecDeque<RouteOutcome> = VecDeque::with_capacity(in_flight + 1);

    for req in requests.iter().skip(thread).step_by(threads) {
        match router.route(&req.token_ids) {
            Ok(outcome) => {
                counts.routed += 1;
                outstanding.push_back(outcome);
            }
            Err(e) => {
                counts.rejected += 1;
                warn!(request_id = req.id, error = %e, "request rejected");
            }
        }
        while outstanding.len() > in_flight {
            if let Some(done) = outstanding.pop_front() {
                finish(router, done);
            }
        }
    }
    for done in outstanding.drain(..) {
        finish(router, done);
    }
    counts
}

fn finish(router: &SmartRouter, outcome: RouteOutcome) {
    if let Err(e) = router.complete(outcome) {
        error!(error = %e, "failed to complete request");
    }
}

/// Route every request through `router` and return the final metrics.
pub fn replay(
    router: &SmartRouter,
    requests: &[TokenizedRequest],
    threads: usize,
    in_flight: usize,
) -> ReplayReport {
    let threads = threads.max(1);
    let started = Instant::now();

    let totals = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| scope.spawn(move || replay_share(router, requests, t, threads, in_flight)))
            .collect();

        handles
            .into_iter()
            .fold(ThreadCounts::default(), |acc, handle| match handle.join() {
                Ok(c) => ThreadCounts {
                    routed: acc.routed + c.routed,
                    rejected: acc.rejected + c.rejected,
                },
                Err(_) => {
                    error!("replay thread panicked");
                    acc
                }
            })
    });

    let elapsed = started.elapsed().as_secs_f64();
    info!(
        routed = totals.routed,
        rejected = totals.rejected,
        threads,
        elapsed_s = elapsed,
        "replay finished"
    );

    ReplayReport {
        requests_routed: totals.routed,
        requests_rejected: totals.rejected,
        wall_time_ms: elapsed * 1000.0,
        routes_per_sec: if elapsed > 0.0 {
            totals.routed as f64 / elapsed
        } else {
            0.0
        },
        metrics: router.snapshot(),
    }
}
