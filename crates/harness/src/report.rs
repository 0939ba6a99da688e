//! Per-case results and the suite report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::comparator::Verdict;
use crate::corpus::{Bucket, TestCase};
use crate::error::{HarnessError, HarnessResult};

/// Why a case failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Captured output differs from the expected rendering
    Mismatch {
        expected: String,
        actual: String,
        first_difference: Option<usize>,
    },
    /// No output appeared before the synchronization ceiling
    Timeout { waited_ms: u64 },
    /// Nothing rendered while the partial input was being typed
    NoLiveOutput { partial_input: String },
    /// The output was not empty right after the reset
    ResidualOutput { residue: String },
    /// Typing and one-shot submission rendered different outputs
    ConvergenceMismatch { typed: String, submitted: String },
    /// The run was aborted before this case finished
    NotRun { fatal: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Mismatch {
                expected,
                actual,
                first_difference,
            } => {
                write!(f, "expected {:?}, got {:?}", expected, actual)?;
                if let Some(index) = first_difference {
                    write!(f, " (first difference at char {})", index)?;
                }
                Ok(())
            }
            FailureReason::Timeout { waited_ms } => {
                write!(f, "no output within {} ms", waited_ms)
            }
            FailureReason::NoLiveOutput { partial_input } => {
                write!(f, "no live output while typing {:?}", partial_input)
            }
            FailureReason::ResidualOutput { residue } => {
                write!(f, "output not empty after reset: {:?}", residue)
            }
            FailureReason::ConvergenceMismatch { typed, submitted } => {
                write!(f, "typed input rendered {:?} but one-shot input rendered {:?}", typed, submitted)
            }
            FailureReason::NotRun { fatal } => write!(f, "not run: {}", fatal),
        }
    }
}

/// Outcome of running a single case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub case_id: String,
    pub bucket: Bucket,
    pub actual_output: String,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn pass(case_id: &str, bucket: Bucket, actual_output: String, duration: Duration) -> Self {
        Self {
            case_id: case_id.to_string(),
            bucket,
            actual_output,
            verdict: Verdict::Pass,
            failure_reason: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn fail(
        case_id: &str,
        bucket: Bucket,
        actual_output: String,
        reason: FailureReason,
        duration: Duration,
    ) -> Self {
        Self {
            case_id: case_id.to_string(),
            bucket,
            actual_output,
            verdict: Verdict::Fail,
            failure_reason: Some(reason),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn not_run(case_id: &str, bucket: Bucket, fatal: &str) -> Self {
        Self::fail(
            case_id,
            bucket,
            String::new(),
            FailureReason::NotRun {
                fatal: fatal.to_string(),
            },
            Duration::ZERO,
        )
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn skipped(&self) -> bool {
        matches!(self.failure_reason, Some(FailureReason::NotRun { .. }))
    }

    /// The per-case error this failure corresponds to. Cases that never ran
    /// have none.
    pub fn error(&self) -> Option<HarnessError> {
        let reason = self.failure_reason.as_ref()?;
        Some(match reason {
            FailureReason::NotRun { .. } => return None,
            FailureReason::Timeout { waited_ms } => HarnessError::SynchronizationTimeout {
                case_id: self.case_id.clone(),
                elapsed: Duration::from_millis(*waited_ms),
            },
            other => HarnessError::AssertionMismatch {
                case_id: self.case_id.clone(),
                reason: other.to_string(),
            },
        })
    }
}

/// Result of running a corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub corpus_digest: String,
    pub strategy: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,

    /// Cases left unexecuted by a fatal abort
    #[serde(default)]
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<RunResult>,

    /// Infrastructure failure that aborted the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl SuiteReport {
    pub fn new(corpus_digest: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            corpus_digest: corpus_digest.into(),
            strategy: strategy.into(),
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            duration_ms: 0,
            results: Vec::new(),
            fatal: None,
        }
    }

    pub fn record(&mut self, result: RunResult) {
        self.total += 1;
        if result.passed() {
            self.passed += 1;
        } else if result.skipped() {
            self.skipped += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Mark the run as aborted by `error`; every case in `remaining` is
    /// recorded as not run.
    pub fn abort(&mut self, error: &HarnessError, remaining: &[(Bucket, &TestCase)]) {
        let fatal = error.to_string();
        for (bucket, case) in remaining {
            self.record(RunResult::not_run(&case.id, *bucket, &fatal));
        }
        self.fatal = Some(fatal);
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.duration_ms = elapsed.as_millis() as u64;
    }

    /// Fold reports from parallel sessions into this one, in the given order.
    ///
    /// The first fatal error wins. Durations are not combined: the caller
    /// sets the wall-clock time of the whole run with [`finish`](Self::finish).
    pub fn merge(&mut self, other: SuiteReport) {
        self.started_at = self.started_at.min(other.started_at);
        if self.fatal.is_none() {
            self.fatal = other.fatal;
        }
        for result in other.results {
            self.record(result);
        }
    }

    /// Pass iff every case passed and nothing fatal happened
    pub fn success(&self) -> bool {
        self.failed == 0 && self.fatal.is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| !r.passed())
    }

    /// Write the report as pretty JSON into `output_dir`.
    pub fn write_json(&self, output_dir: &Path) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("conformance-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
