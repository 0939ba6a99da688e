//! Scenario runner that drives the corpus through a page session
//!
//! Cases run strictly one after another on a session: reset, submit, wait for
//! settlement, capture, compare, cool down. Per-case problems become failed
//! [`RunResult`]s and the run carries on; infrastructure errors abort the
//! run, are recorded as the report's `fatal`, and leave the unfinished cases
//! in the report as not run.

use futures::future::join_all;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::comparator::compare;
use crate::config::HarnessConfig;
use crate::corpus::{Bucket, Corpus, TestCase};
use crate::driver::{PageDriver, SessionFactory};
use crate::error::{HarnessError, HarnessResult};
use crate::report::{FailureReason, RunResult, SuiteReport};
use crate::sync::SynchronizationEngine;

/// Protocol knobs that do not belong to synchronization
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Cool-down between consecutive cases
    pub between_cases: Duration,

    pub typing_delay: Duration,

    /// Wait after typing the partial input before looking for live output
    pub partial_settle: Duration,

    pub verify_reset: bool,
    pub check_convergence: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            between_cases: config.timing.between_cases(),
            typing_delay: config.timing.typing_delay(),
            partial_settle: config.timing.partial_settle(),
            verify_reset: config.run.verify_reset,
            check_convergence: config.run.check_convergence,
        }
    }
}

/// Per-case outcome before it is stamped with id, bucket and duration
type Outcome = Result<String, (String, FailureReason)>;

/// Runs cases against one page session it exclusively owns
pub struct ScenarioRunner<D: PageDriver> {
    page: D,
    engine: SynchronizationEngine,
    options: RunOptions,
}

impl<D: PageDriver> ScenarioRunner<D> {
    pub fn new(page: D, engine: SynchronizationEngine, options: RunOptions) -> Self {
        Self { page, engine, options }
    }

    pub fn page(&self) -> &D {
        &self.page
    }

    pub fn into_page(self) -> D {
        self.page
    }

    /// Resolve both regions once before any case runs.
    pub async fn check_regions(&self) -> HarnessResult<()> {
        let input = self.page.locate_input().await?;
        let output = self.page.locate_output().await?;
        debug!(
            "Input region <{}>, output region <{}> ({} candidates)",
            input.tag, output.tag, output.candidates
        );
        Ok(())
    }

    /// Run every case of every bucket, in bucket order.
    pub async fn run_corpus(&mut self, corpus: &Corpus) -> SuiteReport {
        self.run_buckets(corpus, &Bucket::ALL).await
    }

    /// Run the cases of `buckets` in the given order on this session.
    pub async fn run_buckets(&mut self, corpus: &Corpus, buckets: &[Bucket]) -> SuiteReport {
        let start = Instant::now();
        let mut report = SuiteReport::new(corpus.digest(), self.engine.strategy_name());

        let cases = cases_in(corpus, buckets);

        if let Err(e) = self.check_regions().await {
            error!("Page contract not met: {}", e);
            report.abort(&e, &cases);
            report.finish(start.elapsed());
            return report;
        }

        info!("Running {} case(s) ({} quiescence)...", cases.len(), self.engine.strategy_name());

        for (index, (bucket, case)) in cases.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.options.between_cases).await;
            }

            match self.run_case(*bucket, case).await {
                Ok(result) => {
                    if result.passed() {
                        info!("✓ {} ({} ms)", result.case_id, result.duration_ms);
                    } else if let Some(e) = result.error() {
                        error!("✗ {}", e);
                    }
                    report.record(result);
                }
                Err(e) => {
                    error!("✗ {} - {}", case.id, e);
                    warn!("Aborting run; {} remaining case(s) not run", cases.len() - index - 1);
                    report.abort(&e, &cases[index..]);
                    break;
                }
            }
        }

        report.finish(start.elapsed());

        info!("");
        info!(
            "Results: {} passed, {} failed, {} not run ({} ms)",
            report.passed, report.failed, report.skipped, report.duration_ms
        );

        report
    }

    /// Run one case. `Err` means the session is unusable.
    pub async fn run_case(&mut self, bucket: Bucket, case: &TestCase) -> HarnessResult<RunResult> {
        let start = Instant::now();
        debug!("Running case: {} ({})", case.id, bucket);

        let outcome = match (bucket, case.partial_input_text.as_deref()) {
            (Bucket::Interactive, Some(partial)) => self.run_interactive(case, partial).await?,
            _ => self.run_exact(case).await?,
        };

        Ok(match outcome {
            Ok(actual) => RunResult::pass(&case.id, bucket, actual, start.elapsed()),
            Err((actual, reason)) => RunResult::fail(&case.id, bucket, actual, reason, start.elapsed()),
        })
    }

    async fn run_exact(&mut self, case: &TestCase) -> HarnessResult<Outcome> {
        if let Err(failure) = self.reset().await? {
            return Ok(Err(failure));
        }

        self.page.set_text(&case.input_text).await?;
        let actual = match self.capture(&case.id).await? {
            Ok(actual) => actual,
            Err(reason) => return Ok(Err((String::new(), reason))),
        };

        Ok(judge(&case.expected_output, actual))
    }

    async fn run_interactive(&mut self, case: &TestCase, partial: &str) -> HarnessResult<Outcome> {
        if let Err(failure) = self.reset().await? {
            return Ok(Err(failure));
        }

        self.page.type_incrementally(partial, self.options.typing_delay).await?;
        tokio::time::sleep(self.options.partial_settle).await;

        let live = self.page.read_output_text().await?;
        if live.is_empty() {
            return Ok(Err((
                live,
                FailureReason::NoLiveOutput {
                    partial_input: partial.to_string(),
                },
            )));
        }
        debug!("[{}] live output after partial input: {:?}", case.id, live);

        let remainder = case.remainder().unwrap_or_default();
        self.page.type_incrementally(remainder, self.options.typing_delay).await?;

        let typed = match self.capture(&case.id).await? {
            Ok(typed) => typed,
            Err(reason) => return Ok(Err((live, reason))),
        };

        let outcome = judge(&case.expected_output, typed);
        match outcome {
            Ok(typed) if self.options.check_convergence => self.check_convergence(case, typed).await,
            other => Ok(other),
        }
    }

    /// Submit the full input in one shot and require the typed rendering.
    async fn check_convergence(&mut self, case: &TestCase, typed: String) -> HarnessResult<Outcome> {
        if let Err(failure) = self.reset().await? {
            return Ok(Err((typed, failure.1)));
        }

        self.page.set_text(&case.input_text).await?;
        let submitted = match self.capture(&case.id).await? {
            Ok(submitted) => submitted,
            Err(reason) => return Ok(Err((typed, reason))),
        };

        if compare(&typed, &submitted).passed() {
            Ok(Ok(typed))
        } else {
            Ok(Err((typed.clone(), FailureReason::ConvergenceMismatch { typed, submitted })))
        }
    }

    /// Clear the input and, if enabled, demand an empty output.
    async fn reset(&mut self) -> HarnessResult<Outcome> {
        self.page.clear().await?;

        if !self.options.verify_reset {
            return Ok(Ok(String::new()));
        }
        let residue = self.page.read_output_text().await?;
        if residue.is_empty() {
            Ok(Ok(residue))
        } else {
            Ok(Err((residue.clone(), FailureReason::ResidualOutput { residue })))
        }
    }

    /// Wait for settlement and read the final output.
    ///
    /// A synchronization timeout is a per-case failure, not an error.
    async fn capture(&self, case_id: &str) -> HarnessResult<Result<String, FailureReason>> {
        match self.engine.await_settled(&self.page, case_id).await {
            Ok(settlement) => {
                debug!(
                    "[{}] settled after {} ms ({} samples, {} rearms)",
                    case_id,
                    settlement.total.as_millis(),
                    settlement.samples,
                    settlement.rearms
                );
                Ok(Ok(self.page.read_output_text().await?))
            }
            Err(HarnessError::SynchronizationTimeout { elapsed, .. }) => Ok(Err(FailureReason::Timeout {
                waited_ms: elapsed.as_millis() as u64,
            })),
            Err(e) => Err(e),
        }
    }

    /// Release the session, logging rather than failing on errors.
    pub async fn close(&mut self) {
        if let Err(e) = self.page.close().await {
            warn!("Failed to close page session: {}", e);
        }
    }
}

fn judge(expected: &str, actual: String) -> Outcome {
    let comparison = compare(expected, &actual);
    if comparison.passed() {
        Ok(actual)
    } else {
        Err((
            actual.clone(),
            FailureReason::Mismatch {
                expected: expected.to_string(),
                actual,
                first_difference: comparison.first_difference,
            },
        ))
    }
}

/// Cases of `buckets`, in bucket order.
fn cases_in<'a>(corpus: &'a Corpus, buckets: &[Bucket]) -> Vec<(Bucket, &'a TestCase)> {
    buckets
        .iter()
        .flat_map(|&bucket| corpus.bucket(bucket).iter().map(move |case| (bucket, case)))
        .collect()
}

/// Opens sessions and runs a corpus through them
#[derive(Debug, Clone)]
pub struct Suite {
    engine: SynchronizationEngine,
    options: RunOptions,
}

impl Suite {
    pub fn new(engine: SynchronizationEngine, options: RunOptions) -> Self {
        Self { engine, options }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(SynchronizationEngine::from_config(config), RunOptions::from_config(config))
    }

    pub fn strategy_name(&self) -> &'static str {
        self.engine.strategy_name()
    }

    /// Run the whole corpus on a single session.
    pub async fn run<F: SessionFactory>(&self, factory: &F, corpus: &Corpus) -> SuiteReport {
        self.run_session(factory, corpus, &Bucket::ALL).await
    }

    /// Run each non-empty bucket on its own session, concurrently.
    ///
    /// Cases within a bucket stay sequential. Reports merge in bucket order and
    /// the merged duration is the wall-clock time of the whole fan-out.
    pub async fn run_parallel<F: SessionFactory>(&self, factory: &F, corpus: &Corpus) -> SuiteReport {
        let start = Instant::now();
        let buckets: Vec<[Bucket; 1]> = Bucket::ALL
            .iter()
            .filter(|&&bucket| !corpus.bucket(bucket).is_empty())
            .map(|&bucket| [bucket])
            .collect();
        info!("Running {} bucket(s) on parallel sessions", buckets.len());

        let reports = join_all(buckets.iter().map(|bucket| self.run_session(factory, corpus, bucket))).await;

        let mut merged = SuiteReport::new(corpus.digest(), self.engine.strategy_name());
        for report in reports {
            merged.merge(report);
        }
        merged.finish(start.elapsed());
        merged
    }

    async fn run_session<F: SessionFactory>(&self, factory: &F, corpus: &Corpus, buckets: &[Bucket]) -> SuiteReport {
        let start = Instant::now();
        let page = match factory.open_session().await {
            Ok(page) => page,
            Err(e) => {
                error!("Failed to open page session: {}", e);
                let mut report = SuiteReport::new(corpus.digest(), self.engine.strategy_name());
                report.abort(&e, &cases_in(corpus, buckets));
                report.finish(start.elapsed());
                return report;
            }
        };

        let mut runner = ScenarioRunner::new(page, self.engine.clone(), self.options.clone());
        let report = runner.run_buckets(corpus, buckets).await;
        runner.close().await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::LengthBucket;
    use crate::driver::FakePage;
    use crate::sync::FixedQuiescence;
    use std::sync::Arc;

    fn case(id: &str, input: &str, expected: &str) -> TestCase {
        TestCase {
            id: id.into(),
            description: String::new(),
            input_text: input.into(),
            expected_output: expected.into(),
            category: "Daily language usage".into(),
            grammar_tag: "Simple sentence".into(),
            length_bucket: LengthBucket::S,
            partial_input_text: None,
        }
    }

    fn engine() -> SynchronizationEngine {
        SynchronizationEngine::new(
            Duration::from_millis(100),
            Duration::from_secs(10),
            Arc::new(FixedQuiescence::new(Duration::from_secs(1))),
        )
    }

    async fn runner(page: FakePage) -> ScenarioRunner<FakePage> {
        let mut page = page;
        page.open().await.unwrap();
        ScenarioRunner::new(page, engine(), RunOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_case_passes_and_captures_output() {
        let mut runner = runner(FakePage::new(|s| s.to_uppercase())).await;
        let result = runner
            .run_case(Bucket::Baseline, &case("Pos_Fun_001", "suba", "SUBA"))
            .await
            .unwrap();
        assert!(result.passed());
        assert_eq!(result.actual_output, "SUBA");
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatch_is_a_case_failure() {
        let mut runner = runner(FakePage::new(|s| s.to_string())).await;
        let result = runner
            .run_case(Bucket::Adversarial, &case("Neg_Fun_001", "abc", "abd"))
            .await
            .unwrap();
        assert!(!result.passed());
        assert_eq!(
            result.failure_reason,
            Some(FailureReason::Mismatch {
                expected: "abd".into(),
                actual: "abc".into(),
                first_difference: Some(2),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_case_failure() {
        let mut runner = runner(FakePage::new(|_| String::new())).await;
        let result = runner
            .run_case(Bucket::Baseline, &case("Pos_Fun_002", "x", "y"))
            .await
            .unwrap();
        assert!(matches!(result.failure_reason, Some(FailureReason::Timeout { waited_ms }) if waited_ms >= 10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_input_is_fatal() {
        let mut runner = runner(FakePage::new(|s| s.to_string()).without_input()).await;
        let err = runner
            .run_case(Bucket::Baseline, &case("Pos_Fun_001", "x", "x"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_residual_output_fails_when_verified() {
        let page = FakePage::new(|s| s.to_string()).keep_output_on_clear();
        let mut runner = runner(page).await;
        runner.run_case(Bucket::Baseline, &case("a", "first", "first")).await.unwrap();

        let result = runner.run_case(Bucket::Baseline, &case("b", "second", "second")).await.unwrap();
        assert_eq!(
            result.failure_reason,
            Some(FailureReason::ResidualOutput { residue: "first".into() })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_residual_output_ignored_when_not_verified() {
        let mut page = FakePage::new(|s| s.to_string()).keep_output_on_clear();
        page.open().await.unwrap();
        let options = RunOptions {
            verify_reset: false,
            ..RunOptions::default()
        };
        let mut runner = ScenarioRunner::new(page, engine(), options);
        runner.run_case(Bucket::Baseline, &case("a", "first", "first")).await.unwrap();

        let result = runner.run_case(Bucket::Baseline, &case("b", "second", "second")).await.unwrap();
        assert!(result.passed());
    }
}
