//! HTTP reachability probe for the target page

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone)]
pub struct Preflight {
    pub attempts: u32,
    pub interval: Duration,

    /// Per-request ceiling
    pub request_timeout: Duration,
}

impl Default for Preflight {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Preflight {
    /// Probe `url` until it answers with a success status.
    ///
    /// Exhausting the attempts is a navigation failure: no case can run
    /// against a page that does not load.
    pub async fn check(&self, url: &str) -> HarnessResult<()> {
        let client = reqwest::Client::builder().timeout(self.request_timeout).build()?;

        let mut last_problem = String::from("no attempt made");
        for attempt in 1..=self.attempts {
            debug!("Preflight attempt {} for {}", attempt, url);

            match client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!("Target is reachable at {}", url);
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Preflight returned {}", resp.status());
                    last_problem = format!("status {}", resp.status());
                }
                Err(e) => {
                    if !e.is_connect() {
                        warn!("Preflight error: {}", e);
                    }
                    last_problem = e.to_string();
                }
            }

            if attempt < self.attempts {
                sleep(self.interval).await;
            }
        }

        Err(HarnessError::Navigation(format!(
            "{} unreachable after {} attempt(s): {}",
            url, self.attempts, last_problem
        )))
    }
}
