//! Quiescence strategies
//!
//! Once the first output is visible the page may still re-render as its
//! debounce timers fire. A strategy decides how long to keep waiting.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::driver::PageDriver;
use crate::error::HarnessResult;

/// Outcome of the quiescence phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiesced {
    /// Latest output sample observed
    pub text: String,

    /// Samples taken during the phase
    pub samples: u32,

    /// How often the window was restarted
    pub rearms: u32,
}

#[async_trait]
pub trait QuiescenceStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Wait out re-renders that follow the first visible output.
    async fn quiesce(&self, page: &dyn PageDriver, first: String, poll: Duration) -> HarnessResult<Quiesced>;
}

/// Sleeps one fixed window, whatever the page does meanwhile.
///
/// A render that lands after the window closes is missed; see
/// [`RearmingQuiescence`] for pages with long or chained debounces.
#[derive(Debug, Clone)]
pub struct FixedQuiescence {
    window: Duration,
}

impl FixedQuiescence {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

#[async_trait]
impl QuiescenceStrategy for FixedQuiescence {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn quiesce(&self, _page: &dyn PageDriver, first: String, _poll: Duration) -> HarnessResult<Quiesced> {
        tokio::time::sleep(self.window).await;
        Ok(Quiesced {
            text: first,
            samples: 0,
            rearms: 0,
        })
    }
}

/// Keeps sampling and restarts the window on every change.
///
/// Settles once a whole window passes without the output changing, or when
/// `ceiling` has elapsed since the phase began.
#[derive(Debug, Clone)]
pub struct RearmingQuiescence {
    window: Duration,
    ceiling: Duration,
}

impl RearmingQuiescence {
    pub fn new(window: Duration, ceiling: Duration) -> Self {
        Self { window, ceiling }
    }
}

#[async_trait]
impl QuiescenceStrategy for RearmingQuiescence {
    fn name(&self) -> &'static str {
        "rearming"
    }

    async fn quiesce(&self, page: &dyn PageDriver, first: String, poll: Duration) -> HarnessResult<Quiesced> {
        let started = Instant::now();
        let mut stable_since = started;
        let mut last = first;
        let mut samples = 0;
        let mut rearms = 0;

        loop {
            let now = Instant::now();
            let stable_for = now - stable_since;
            if stable_for >= self.window {
                break;
            }
            let spent = now - started;
            if spent >= self.ceiling {
                warn!(
                    "Output still changing after {} ms; settling on the latest sample",
                    spent.as_millis()
                );
                break;
            }

            let nap = poll.min(self.window - stable_for).min(self.ceiling - spent);
            tokio::time::sleep(nap).await;

            let sample = page.read_output_text().await?;
            samples += 1;
            if sample != last {
                debug!("Output changed during quiescence; restarting window");
                last = sample;
                stable_since = Instant::now();
                rearms += 1;
            }
        }

        Ok(Quiesced {
            text: last,
            samples,
            rearms,
        })
    }
}
