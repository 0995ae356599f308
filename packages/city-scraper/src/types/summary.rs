//! Per-target outcomes and the run summary.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::error::{FetchError, ParseError};
use crate::types::target::{SourceKind, TargetId, TargetState};

/// Why a target did not reach `Ingested`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Fetch failed terminally or ran out of attempts
    Fetch(FetchError),

    /// Document shape was not recognized
    Parse(ParseError),

    /// No extractor registered for the target's source kind
    NoExtractor(SourceKind),

    /// Run was cancelled before the target finished
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Fetch(e) => write!(f, "{}: {}", e.kind(), e),
            FailureReason::Parse(e) => write!(f, "parse_error: {e}"),
            FailureReason::NoExtractor(kind) => write!(f, "no extractor for {kind}"),
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Final state of one target.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub id: TargetId,

    /// Redacted URL
    pub url: String,

    pub kind: SourceKind,
    pub state: TargetState,

    /// Fetch attempts made
    pub attempts: u32,

    /// Records ingested from this target
    pub records: usize,

    pub failure: Option<FailureReason>,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        self.state == TargetState::Ingested
    }
}

/// Result of a run; always produced, even when every target failed.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Outcomes ordered by target id
    pub outcomes: Vec<TargetOutcome>,
}

impl RunSummary {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>, mut outcomes: Vec<TargetOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.id);
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(TargetState::Ingested)
    }

    pub fn failed(&self) -> usize {
        self.count(TargetState::Failed)
    }

    /// Targets never dequeued because the run was cancelled.
    pub fn skipped(&self) -> usize {
        self.count(TargetState::Skipped)
    }

    pub fn records(&self) -> usize {
        self.outcomes.iter().map(|o| o.records).sum()
    }

    /// True when at least one target ran and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.succeeded() == 0 && self.failed() > 0
    }

    /// Failed targets with their reasons.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &FailureReason)> {
        self.outcomes
            .iter()
            .filter(|o| o.state == TargetState::Failed)
            .filter_map(|o| o.failure.as_ref().map(|r| (o.url.as_str(), r)))
    }

    fn count(&self, state: TargetState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.finished_at - self.started_at;
        let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
        writeln!(f, "Run {} finished in {seconds:.1}s", self.run_id)?;
        writeln!(
            f,
            "  targets: {} total, {} succeeded, {} failed, {} skipped",
            self.total(),
            self.succeeded(),
            self.failed(),
            self.skipped()
        )?;
        writeln!(f, "  records ingested: {}", self.records())?;

        if self.failed() > 0 {
            writeln!(f, "  failed targets:")?;
            for (url, reason) in self.failures() {
                writeln!(f, "    - {url} ({reason})")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: usize, state: TargetState, failure: Option<FailureReason>) -> TargetOutcome {
        TargetOutcome {
            id: TargetId(id),
            url: format!("https://x.test/{id}"),
            kind: SourceKind::Property,
            state,
            attempts: 1,
            records: usize::from(state == TargetState::Ingested),
            failure,
        }
    }

    #[test]
    fn test_counts_and_ordering() {
        let summary = RunSummary::new(
            Uuid::now_v7(),
            Utc::now(),
            vec![
                outcome(2, TargetState::Failed, Some(FailureReason::Cancelled)),
                outcome(0, TargetState::Ingested, None),
                outcome(1, TargetState::Skipped, None),
            ],
        );

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.outcomes[0].id, TargetId(0));
        assert!(!summary.all_failed());
    }

    #[test]
    fn test_all_failed_and_display() {
        let not_found = FetchError::Http {
            url: "https://x.test/0".into(),
            status: 404,
        };
        let summary = RunSummary::new(
            Uuid::now_v7(),
            Utc::now(),
            vec![outcome(0, TargetState::Failed, Some(FailureReason::Fetch(not_found)))],
        );

        assert!(summary.all_failed());
        let text = summary.to_string();
        assert!(text.contains("0 succeeded, 1 failed"));
        assert!(text.contains("https://x.test/0 (http_error: HTTP 404"));
    }
}
