//! Page capability interface
//!
//! Everything the harness knows about the target page goes through
//! [`PageDriver`]. The synchronization engine and the scenario runner never
//! see selectors or browser APIs, so they run unchanged against the
//! Playwright bridge or the in-memory [`fake::FakePage`].

pub mod fake;
pub mod playwright;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::HarnessResult;

pub use fake::{FakePage, FakeSessions};
pub use playwright::{PlaywrightDriver, PlaywrightLauncher};

/// Semantic role of a page region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionRole {
    Input,
    Output,
}

/// A resolved page region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub role: RegionRole,

    /// Lower-case tag name of the resolved element
    pub tag: String,

    /// How many candidates matched before disambiguation
    pub candidates: usize,
}

/// Semantic operations on one page session.
///
/// Mutating operations take `&mut self`: a session has exactly one writer,
/// the runner that owns it.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to the entry point and wait for load plus the settle grace.
    async fn open(&mut self) -> HarnessResult<()>;

    /// Resolve the input region by accessible role and name.
    async fn locate_input(&self) -> HarnessResult<Region>;

    /// Resolve the output region, never an input control.
    async fn locate_output(&self) -> HarnessResult<Region>;

    /// Empty the input and wait out the post-clear settle delay.
    async fn clear(&mut self) -> HarnessResult<()>;

    /// Replace the input content in a single operation.
    async fn set_text(&mut self, text: &str) -> HarnessResult<()>;

    /// Append `text` one character at a time.
    async fn type_incrementally(&mut self, text: &str, per_char_delay: Duration) -> HarnessResult<()>;

    /// Current trimmed text of the output region.
    async fn read_output_text(&self) -> HarnessResult<String>;

    /// Release the session.
    async fn close(&mut self) -> HarnessResult<()> {
        Ok(())
    }
}

/// Opens independent, ready-to-use page sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Driver: PageDriver;

    /// Launch a session and `open()` it.
    async fn open_session(&self) -> HarnessResult<Self::Driver>;
}
