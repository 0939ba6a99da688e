//! Harness configuration
//!
//! Defaults reproduce the timings the target page was tuned against; a TOML
//! file may override any subset of them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

/// Complete harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub target: TargetConfig,
    pub timing: TimingConfig,
    pub sync: SyncConfig,
    pub browser: BrowserConfig,
    pub run: RunConfig,
}

/// Where the page lives and how its regions are recognised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub url: String,

    /// Accessible name of the input textbox
    pub input_name: String,

    /// Structural fingerprint shared by the output candidates
    pub output_selector: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: "https://www.swifttranslator.com/".to_string(),
            input_name: "Input Your Singlish Text Here.".to_string(),
            output_selector:
                "div.w-full.h-80.p-3.rounded-lg.ring-1.ring-slate-300.whitespace-pre-wrap"
                    .to_string(),
        }
    }
}

/// Every bounded wait, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Grace period after the page reports network idle
    pub page_load_settle_ms: u64,

    /// Ceiling for navigation to reach a loaded state
    pub navigation_timeout_ms: u64,

    pub after_clear_ms: u64,

    /// Ceiling for the first output sample after a submission
    pub sync_ceiling_ms: u64,

    /// Quiescence window applied after the first output sample
    pub quiescence_ms: u64,

    pub poll_interval_ms: u64,

    pub between_cases_ms: u64,

    /// Delay between keystrokes when typing incrementally
    pub typing_delay_ms: u64,

    /// Wait after the partial input before checking live output
    pub partial_settle_ms: u64,

    /// Ceiling for a single bridge request
    pub command_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            page_load_settle_ms: 2000,
            navigation_timeout_ms: 30_000,
            after_clear_ms: 1000,
            sync_ceiling_ms: 10_000,
            quiescence_ms: 3000,
            poll_interval_ms: 100,
            between_cases_ms: 2000,
            typing_delay_ms: 150,
            partial_settle_ms: 1500,
            command_timeout_ms: 60_000,
        }
    }
}

impl TimingConfig {
    pub fn page_load_settle(&self) -> Duration {
        Duration::from_millis(self.page_load_settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn after_clear(&self) -> Duration {
        Duration::from_millis(self.after_clear_ms)
    }

    pub fn sync_ceiling(&self) -> Duration {
        Duration::from_millis(self.sync_ceiling_ms)
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn between_cases(&self) -> Duration {
        Duration::from_millis(self.between_cases_ms)
    }

    pub fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.typing_delay_ms)
    }

    pub fn partial_settle(&self) -> Duration {
        Duration::from_millis(self.partial_settle_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Which quiescence strategy decides settlement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One unconditional window after the first output
    #[default]
    Fixed,
    /// Restart the window whenever the output changes
    Rearming,
}

impl std::str::FromStr for StrategyKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(StrategyKind::Fixed),
            "rearming" => Ok(StrategyKind::Rearming),
            other => Err(HarnessError::InvalidConfig(format!(
                "unknown sync strategy '{}' (expected fixed or rearming)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub strategy: StrategyKind,

    /// Upper bound on the whole re-arming quiescence phase
    pub rearm_ceiling_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Fixed,
            rearm_ceiling_ms: 15_000,
        }
    }
}

impl SyncConfig {
    pub fn rearm_ceiling(&self) -> Duration {
        Duration::from_millis(self.rearm_ceiling_ms)
    }
}

/// Browser engine driven by the Playwright bridge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserEngine {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(BrowserEngine::Chromium),
            "firefox" => Ok(BrowserEngine::Firefox),
            "webkit" => Ok(BrowserEngine::Webkit),
            other => Err(HarnessError::InvalidConfig(format!("unknown browser '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub engine: BrowserEngine,
    pub headless: bool,

    /// Node.js executable hosting Playwright
    pub node_binary: PathBuf,

    /// Directory whose `node_modules` provides `playwright`
    pub workdir: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::Chromium,
            headless: true,
            node_binary: PathBuf::from("node"),
            workdir: PathBuf::from("."),
        }
    }
}

/// Optional protocol checks on top of the exact-match verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Fail a case whose output is not empty right after reset
    pub verify_reset: bool,

    /// Re-submit interactive input in one shot and require the same output
    pub check_convergence: bool,

    /// Probe the target over HTTP before launching a browser
    pub preflight: bool,

    pub corpus_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            verify_reset: true,
            check_convergence: true,
            preflight: true,
            corpus_dir: PathBuf::from("corpus"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> HarnessResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a wait unbounded or meaningless
    pub fn validate(&self) -> HarnessResult<()> {
        let t = &self.timing;

        if self.target.url.trim().is_empty() {
            return Err(HarnessError::InvalidConfig("target.url is empty".into()));
        }
        if self.target.input_name.trim().is_empty() || self.target.output_selector.trim().is_empty() {
            return Err(HarnessError::InvalidConfig(
                "target.input_name and target.output_selector are required".into(),
            ));
        }
        if t.poll_interval_ms == 0 {
            return Err(HarnessError::InvalidConfig("timing.poll_interval_ms must be > 0".into()));
        }
        if t.sync_ceiling_ms == 0 || t.navigation_timeout_ms == 0 || t.command_timeout_ms == 0 {
            return Err(HarnessError::InvalidConfig(
                "timing ceilings must be > 0".into(),
            ));
        }
        if t.poll_interval_ms > t.sync_ceiling_ms {
            return Err(HarnessError::InvalidConfig(format!(
                "timing.poll_interval_ms ({}) exceeds timing.sync_ceiling_ms ({})",
                t.poll_interval_ms, t.sync_ceiling_ms
            )));
        }
        if self.sync.strategy == StrategyKind::Rearming && self.sync.rearm_ceiling_ms < t.quiescence_ms {
            return Err(HarnessError::InvalidConfig(format!(
                "sync.rearm_ceiling_ms ({}) is shorter than timing.quiescence_ms ({})",
                self.sync.rearm_ceiling_ms, t.quiescence_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_page_tuning() {
        let config = HarnessConfig::default();
        assert_eq!(config.timing.sync_ceiling(), Duration::from_secs(10));
        assert_eq!(config.timing.quiescence(), Duration::from_secs(3));
        assert_eq!(config.timing.between_cases(), Duration::from_secs(2));
        assert_eq!(config.timing.typing_delay(), Duration::from_millis(150));
        assert_eq!(config.sync.strategy, StrategyKind::Fixed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
[timing]
quiescence_ms = 500

[sync]
strategy = "rearming"
rearm_ceiling_ms = 4000
"#,
        )
        .unwrap();

        assert_eq!(config.timing.quiescence_ms, 500);
        assert_eq!(config.timing.after_clear_ms, 1000);
        assert_eq!(config.sync.strategy, StrategyKind::Rearming);
        assert_eq!(config.target, TargetConfig::default());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = HarnessConfig::from_toml("[timing]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn test_rearm_ceiling_shorter_than_window_rejected() {
        let err = HarnessConfig::from_toml(
            "[sync]\nstrategy = \"rearming\"\nrearm_ceiling_ms = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("rearm_ceiling_ms"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_strategy_and_engine_from_str() {
        assert_eq!("rearming".parse::<StrategyKind>().unwrap(), StrategyKind::Rearming);
        assert_eq!("webkit".parse::<BrowserEngine>().unwrap(), BrowserEngine::Webkit);
        assert!("opera".parse::<BrowserEngine>().is_err());
    }
}
