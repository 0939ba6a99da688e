//! Settlement detection for asynchronous renders
//!
//! The target page has no "done" signal: output shows up after a debounce
//! whose length depends on the input, may pass through partial renders, and
//! shares markup with the input surface. The engine therefore polls the
//! output region until something non-empty appears (bounded by a ceiling)
//! and then hands over to a [`QuiescenceStrategy`] to absorb trailing
//! re-renders.
//!
//! ```text
//!   Idle ──submit──▶ Pending ──non-empty sample──▶ quiescence ──▶ Settled
//!                       │
//!                       └──ceiling elapsed──▶ TimedOut
//! ```

mod strategy;

pub use strategy::{FixedQuiescence, Quiesced, QuiescenceStrategy, RearmingQuiescence};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{HarnessConfig, StrategyKind};
use crate::driver::PageDriver;
use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Pending,
    Settled,
    TimedOut,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::Pending => "pending",
            SyncState::Settled => "settled",
            SyncState::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// What the engine observed on the way to settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Last output sample before settling
    pub text: String,

    /// Time from entering `Pending` to the first non-empty sample
    pub first_output_after: Duration,

    /// Time from entering `Pending` to `Settled`
    pub total: Duration,

    pub samples: u32,

    /// Quiescence windows restarted because the output kept changing
    pub rearms: u32,
}

/// Decides when the render triggered by the last input mutation is done.
///
/// Holds no per-call state: every [`await_settled`](Self::await_settled)
/// starts from `Idle`.
#[derive(Clone)]
pub struct SynchronizationEngine {
    poll_interval: Duration,
    ceiling: Duration,
    strategy: Arc<dyn QuiescenceStrategy>,
}

impl fmt::Debug for SynchronizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizationEngine")
            .field("poll_interval", &self.poll_interval)
            .field("ceiling", &self.ceiling)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl SynchronizationEngine {
    pub fn new(poll_interval: Duration, ceiling: Duration, strategy: Arc<dyn QuiescenceStrategy>) -> Self {
        Self {
            poll_interval,
            ceiling,
            strategy,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        let window = config.timing.quiescence();
        let strategy: Arc<dyn QuiescenceStrategy> = match config.sync.strategy {
            StrategyKind::Fixed => Arc::new(FixedQuiescence::new(window)),
            StrategyKind::Rearming => Arc::new(RearmingQuiescence::new(window, config.sync.rearm_ceiling())),
        };
        Self::new(config.timing.poll_interval(), config.timing.sync_ceiling(), strategy)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Wait until the output triggered by the latest submission has settled.
    ///
    /// Fails with [`HarnessError::SynchronizationTimeout`] when no non-empty
    /// output shows up within the ceiling. Driver errors propagate as-is.
    pub async fn await_settled(&self, page: &dyn PageDriver, case_id: &str) -> HarnessResult<Settlement> {
        let mut state = SyncState::Idle;
        transition(case_id, &mut state, SyncState::Pending);
        let started = Instant::now();

        let (first, first_samples) = match tokio::time::timeout(self.ceiling, self.first_output(page)).await {
            Ok(found) => found?,
            Err(_) => {
                transition(case_id, &mut state, SyncState::TimedOut);
                return Err(HarnessError::SynchronizationTimeout {
                    case_id: case_id.to_string(),
                    elapsed: started.elapsed(),
                });
            }
        };
        let first_output_after = started.elapsed();
        debug!(
            "[{}] first output after {} ms; quiescing ({})",
            case_id,
            first_output_after.as_millis(),
            self.strategy.name()
        );

        let quiesced = self.strategy.quiesce(page, first, self.poll_interval).await?;
        transition(case_id, &mut state, SyncState::Settled);

        Ok(Settlement {
            text: quiesced.text,
            first_output_after,
            total: started.elapsed(),
            samples: first_samples + quiesced.samples,
            rearms: quiesced.rearms,
        })
    }

    async fn first_output(&self, page: &dyn PageDriver) -> HarnessResult<(String, u32)> {
        let mut samples = 0;
        loop {
            let text = page.read_output_text().await?;
            samples += 1;
            if !text.is_empty() {
                return Ok((text, samples));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn transition(case_id: &str, state: &mut SyncState, next: SyncState) {
    debug!("[{}] sync {} -> {}", case_id, state, next);
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FakePage;

    const POLL: Duration = Duration::from_millis(100);
    const CEILING: Duration = Duration::from_secs(10);
    const WINDOW: Duration = Duration::from_secs(1);

    fn fixed() -> SynchronizationEngine {
        SynchronizationEngine::new(POLL, CEILING, Arc::new(FixedQuiescence::new(WINDOW)))
    }

    fn rearming(ceiling: Duration) -> SynchronizationEngine {
        SynchronizationEngine::new(POLL, CEILING, Arc::new(RearmingQuiescence::new(WINDOW, ceiling)))
    }

    async fn submitted(page: FakePage, text: &str) -> FakePage {
        let mut page = page;
        page.open().await.unwrap();
        page.set_text(text).await.unwrap();
        page
    }

    fn upper() -> FakePage {
        FakePage::new(|s| s.to_uppercase()).with_debounce(Duration::from_millis(300))
    }

    /// Virtual timers never fire early, and overshoot by less than a poll.
    fn within(actual: Duration, nominal: Duration) -> bool {
        actual >= nominal && actual < nominal + POLL
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_settles_one_window_after_first_output() {
        let page = submitted(upper(), "suba").await;

        let settlement = fixed().await_settled(&page, "Pos_Fun_001").await.unwrap();
        assert_eq!(settlement.text, "SUBA");
        assert!(within(settlement.first_output_after, Duration::from_millis(300)));
        assert!(within(settlement.total, Duration::from_millis(1300)));
        assert_eq!(settlement.samples, 4);
        assert_eq!(settlement.rearms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_output_times_out_at_ceiling() {
        let page = submitted(FakePage::new(|_| String::new()), "suba").await;
        let started = Instant::now();

        let err = fixed().await_settled(&page, "Neg_Fun_001").await.unwrap_err();
        match err {
            HarnessError::SynchronizationTimeout { case_id, elapsed } => {
                assert_eq!(case_id, "Neg_Fun_001");
                assert!(within(elapsed, CEILING));
            }
            other => panic!("expected timeout, got {}", other),
        }
        assert!(started.elapsed() <= CEILING + POLL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_waits_for_chained_renders() {
        let progressive = || upper().with_progressive_render(4, Duration::from_millis(800));
        let expected = "ABCDEFGH";

        let page = submitted(progressive(), "abcdefgh").await;
        fixed().await_settled(&page, "fixed").await.unwrap();
        let after_fixed = page.read_output_text().await.unwrap();
        assert_ne!(after_fixed, expected);

        let page = submitted(progressive(), "abcdefgh").await;
        let settlement = rearming(Duration::from_secs(15)).await_settled(&page, "rearming").await.unwrap();
        assert_eq!(settlement.text, expected);
        assert_eq!(page.read_output_text().await.unwrap(), expected);
        assert_eq!(settlement.rearms, 3);
        assert!(settlement.total >= Duration::from_millis(300 + 3 * 800) + WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_is_bounded_when_output_never_stops_changing() {
        let page = submitted(
            upper().with_progressive_render(10_000, Duration::from_millis(200)),
            &"x".repeat(10_000),
        )
        .await;
        let rearm_ceiling = Duration::from_secs(5);

        let settlement = rearming(rearm_ceiling).await_settled(&page, "busy").await.unwrap();
        assert!(settlement.total <= settlement.first_output_after + rearm_ceiling + POLL);
        assert!(settlement.text.len() < 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_output_settles_after_one_window_with_rearming() {
        let page = submitted(upper(), "hari").await;
        let settlement = rearming(Duration::from_secs(15)).await_settled(&page, "stable").await.unwrap();
        assert_eq!(settlement.text, "HARI");
        assert_eq!(settlement.rearms, 0);
        assert!(within(settlement.total, Duration::from_millis(300) + WINDOW));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_output_region_propagates() {
        let page = submitted(upper().without_output(), "suba").await;
        let err = fixed().await_settled(&page, "Pos_Fun_001").await.unwrap_err();
        assert!(matches!(err, HarnessError::ElementNotFound(_)));
    }

    #[test]
    fn test_from_config_picks_strategy() {
        let mut config = HarnessConfig::default();
        assert_eq!(SynchronizationEngine::from_config(&config).strategy_name(), "fixed");
        config.sync.strategy = StrategyKind::Rearming;
        let engine = SynchronizationEngine::from_config(&config);
        assert_eq!(engine.strategy_name(), "rearming");
        assert_eq!(engine.ceiling(), Duration::from_secs(10));
    }
}
