//! Translit conformance harness
//!
//! This crate checks a live Singlish-to-Sinhala transliteration page against
//! a curated corpus:
//! - Loads baseline, adversarial and interactive cases from YAML
//! - Drives the page through a persistent Playwright bridge
//! - Decides when an asynchronous render has settled
//! - Compares the captured output exactly, after trimming only
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Conformance Harness (Rust)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suite                                                      │
//! │    ├── SessionFactory::open_session() -> PageDriver         │
//! │    └── ScenarioRunner::run_buckets(corpus) -> SuiteReport   │
//! │          ├── reset     clear + verify empty output          │
//! │          ├── submit    set_text | type_incrementally        │
//! │          ├── settle    SynchronizationEngine::await_settled  │
//! │          └── compare   exact match after trim               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver                                                 │
//! │    ├── PlaywrightDriver  (node bridge, JSON lines)          │
//! │    └── FakePage          (in-memory debounced transformer)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod comparator;
pub mod config;
pub mod corpus;
pub mod driver;
pub mod error;
pub mod preflight;
pub mod report;
pub mod runner;
pub mod sync;

pub use comparator::{compare, Comparison, Verdict};
pub use config::HarnessConfig;
pub use corpus::{Bucket, Corpus, Selection, TestCase};
pub use driver::{PageDriver, SessionFactory};
pub use error::{HarnessError, HarnessResult};
pub use preflight::Preflight;
pub use report::{FailureReason, RunResult, SuiteReport};
pub use runner::{RunOptions, ScenarioRunner, Suite};
pub use sync::SynchronizationEngine;
