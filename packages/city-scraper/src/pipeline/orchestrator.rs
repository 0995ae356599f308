//! The orchestrator: drives targets through fetch, extract and ingest.
//!
//! Targets are grouped into lanes, one per host. A bounded pool of workers
//! claims whole lanes, so each host has at most one request in flight while
//! distinct hosts proceed in parallel. Within a lane, a target that failed
//! with a retryable error goes to the back so its siblings can run during
//! the backoff.

use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::extractors::ExtractorSet;
use crate::fetch::Fetcher;
use crate::stores::RecordStore;
use crate::traits::sink::SnapshotSink;
use crate::types::{
    summary::{FailureReason, RunSummary, TargetOutcome},
    target::{Target, TargetState},
};

/// Flush the store to a sink every `every` ingested targets.
#[derive(Clone)]
pub struct Checkpoint {
    pub every: usize,
    pub sink: Arc<dyn SnapshotSink>,
}

/// Runs a set of targets to completion.
pub struct Orchestrator {
    fetcher: Arc<Fetcher>,
    extractors: ExtractorSet,
    store: Arc<RecordStore>,
    concurrency: usize,
    checkpoint: Option<Checkpoint>,
}

impl Orchestrator {
    pub fn new(fetcher: Fetcher, extractors: ExtractorSet, store: Arc<RecordStore>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            extractors,
            store,
            concurrency: 4,
            checkpoint: None,
        }
    }

    /// Maximum number of hosts worked on at once. Clamped to at least 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_checkpoint(mut self, every: usize, sink: Arc<dyn SnapshotSink>) -> Self {
        self.checkpoint = Some(Checkpoint {
            every: every.max(1),
            sink,
        });
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Run every target and report the outcome of each.
    ///
    /// Never fails: fetch and parse errors are recorded against their
    /// target. Once `cancel` fires no new target is started, pending backoff
    /// waits are abandoned and targets never started are reported as
    /// `Skipped`. Requests already in flight finish or time out.
    pub async fn run(&self, targets: Vec<Target>, cancel: CancellationToken) -> RunSummary {
        let run_id = Uuid::now_v7();
        let started_at = chrono::Utc::now();
        let total = targets.len();

        let lanes = into_lanes(targets);
        let workers = self.concurrency.min(lanes.len());

        info!(
            run_id = %run_id,
            targets = total,
            hosts = lanes.len(),
            workers,
            "Run started"
        );

        let queue = Arc::new(Mutex::new(lanes));
        let ctx = Arc::new(Worker {
            fetcher: self.fetcher.clone(),
            extractors: self.extractors.clone(),
            store: self.store.clone(),
            checkpoint: self.checkpoint.clone(),
            checkpoint_lock: tokio::sync::Mutex::new(()),
            ingested: AtomicUsize::new(0),
        });

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let ctx = ctx.clone();
            let queue = queue.clone();
            let cancel = cancel.clone();
            set.spawn(async move { ctx.work(worker_id, &queue, &cancel).await });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(worker_outcomes) => outcomes.extend(worker_outcomes),
                Err(e) => error!(run_id = %run_id, error = %e, "Worker task failed"),
            }
        }

        // Lanes no worker claimed before cancellation
        let unclaimed = std::mem::take(&mut *queue.lock().unwrap_or_else(PoisonError::into_inner));
        for lane in unclaimed {
            outcomes.extend(lane.targets.into_iter().map(abandoned));
        }

        let summary = RunSummary::new(run_id, started_at, outcomes);

        info!(
            run_id = %run_id,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            records = summary.records(),
            "Run finished"
        );

        summary
    }
}

/// Targets sharing one host, in planning order.
#[derive(Debug)]
struct Lane {
    host: String,
    targets: VecDeque<Target>,
}

fn into_lanes(targets: Vec<Target>) -> VecDeque<Lane> {
    let mut by_host: IndexMap<String, VecDeque<Target>> = IndexMap::new();
    for target in targets {
        by_host.entry(target.host()).or_default().push_back(target);
    }

    by_host
        .into_iter()
        .map(|(host, targets)| Lane { host, targets })
        .collect()
}

/// Result of one pass over a target.
enum Step {
    Done(TargetOutcome),
    Retry(Target),
}

fn outcome(
    target: &Target,
    state: TargetState,
    records: usize,
    failure: Option<FailureReason>,
) -> TargetOutcome {
    TargetOutcome {
        id: target.id,
        url: target.display_url(),
        kind: target.kind,
        state,
        attempts: target.retry.attempts,
        records,
        failure,
    }
}

/// Outcome for a target the run gave up on because of cancellation.
///
/// Targets never attempted are `Skipped`. A target cancelled while waiting
/// out a backoff had already failed at least once and is `Failed`.
fn abandoned(target: Target) -> TargetOutcome {
    let state = if target.retry.attempts == 0 {
        TargetState::Skipped
    } else {
        TargetState::Failed
    };
    outcome(&target, state, 0, Some(FailureReason::Cancelled))
}

/// Shared per-run state handed to every worker task.
struct Worker {
    fetcher: Arc<Fetcher>,
    extractors: ExtractorSet,
    store: Arc<RecordStore>,
    checkpoint: Option<Checkpoint>,
    /// Held from flush to persist so checkpoints land in snapshot order
    checkpoint_lock: tokio::sync::Mutex<()>,
    ingested: AtomicUsize,
}

impl Worker {
    /// Claim lanes until the queue is empty or the run is cancelled.
    async fn work(
        &self,
        worker_id: usize,
        queue: &Mutex<VecDeque<Lane>>,
        cancel: &CancellationToken,
    ) -> Vec<TargetOutcome> {
        let mut outcomes = Vec::new();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let Some(lane) = claim(queue) else {
                break;
            };

            debug!(worker_id, host = %lane.host, targets = lane.targets.len(), "Lane claimed");
            outcomes.extend(self.run_lane(lane, cancel).await);
        }

        outcomes
    }

    async fn run_lane(&self, lane: Lane, cancel: &CancellationToken) -> Vec<TargetOutcome> {
        let mut pending = lane.targets;
        let mut outcomes = Vec::with_capacity(pending.len());

        while let Some(target) = next_target(&mut pending, Instant::now()) {
            if cancel.is_cancelled() {
                outcomes.push(abandoned(target));
                continue;
            }

            if let Some(at) = target.retry.next_allowed_at {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        outcomes.push(abandoned(target));
                        continue;
                    }
                    _ = tokio::time::sleep_until(at) => {}
                }
            }

            match self.process(target).await {
                Step::Done(done) => outcomes.push(done),
                Step::Retry(target) => pending.push_back(target),
            }
        }

        outcomes
    }

    /// One pass: fetch once, then extract and ingest on success.
    async fn process(&self, mut target: Target) -> Step {
        let Some(extractor) = self.extractors.get(target.kind) else {
            warn!(target_id = %target.id, kind = %target.kind, "No extractor registered");
            let reason = FailureReason::NoExtractor(target.kind);
            return Step::Done(outcome(&target, TargetState::Failed, 0, Some(reason)));
        };

        debug!(target_id = %target.id, state = %TargetState::Fetching, "Target state");
        let content = match self.fetcher.attempt(&mut target).await {
            Ok(content) => content,
            Err(e) if self.fetcher.can_retry(&target, &e) => {
                debug!(target_id = %target.id, state = %TargetState::Pending, "Target state");
                return Step::Retry(target);
            }
            Err(e) => {
                let reason = FailureReason::Fetch(e);
                return Step::Done(outcome(&target, TargetState::Failed, 0, Some(reason)));
            }
        };

        debug!(
            target_id = %target.id,
            state = %TargetState::Extracting,
            extractor = extractor.name(),
            "Target state"
        );
        let records = match extractor.extract(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    target_id = %target.id,
                    url = %target.display_url(),
                    error = %e,
                    "Extraction failed"
                );
                let reason = FailureReason::Parse(e);
                return Step::Done(outcome(&target, TargetState::Failed, 0, Some(reason)));
            }
        };

        let stats = self.store.ingest(records);
        info!(
            target_id = %target.id,
            url = %target.display_url(),
            inserted = stats.inserted,
            replaced = stats.replaced,
            "Target ingested"
        );

        self.maybe_checkpoint().await;

        Step::Done(outcome(&target, TargetState::Ingested, stats.total(), None))
    }

    async fn maybe_checkpoint(&self) {
        let Some(checkpoint) = &self.checkpoint else {
            return;
        };

        let ingested = self.ingested.fetch_add(1, Ordering::SeqCst) + 1;
        if ingested % checkpoint.every != 0 {
            return;
        }

        let _guard = self.checkpoint_lock.lock().await;
        let snapshot = self.store.flush();
        match checkpoint.sink.persist(&snapshot).await {
            Ok(report) => debug!(
                sink = checkpoint.sink.name(),
                records = report.records,
                ingested,
                "Checkpoint written"
            ),
            Err(e) => warn!(sink = checkpoint.sink.name(), error = %e, "Checkpoint failed"),
        }
    }
}

fn claim(queue: &Mutex<VecDeque<Lane>>) -> Option<Lane> {
    queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
}

/// Take the first target whose backoff has elapsed, or else the one that
/// becomes ready soonest.
fn next_target(pending: &mut VecDeque<Target>, now: Instant) -> Option<Target> {
    let index = pending
        .iter()
        .position(|t| t.retry.is_ready(now))
        .or_else(|| {
            pending
                .iter()
                .enumerate()
                .min_by_key(|(_, t)| t.retry.next_allowed_at)
                .map(|(i, _)| i)
        })?;

    pending.remove(index)
}
