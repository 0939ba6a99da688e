//! In-memory page that behaves like a debounced transformer
//!
//! Every input mutation restarts a debounce timer; once it expires the page
//! renders `transform(input)`, optionally revealing it in several steps the
//! way a streaming renderer would. All timing uses `tokio::time`, so tests
//! drive it with paused virtual time.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{PageDriver, Region, RegionRole, SessionFactory};
use crate::error::{HarnessError, HarnessResult};

type Transform = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
struct Behaviour {
    debounce: Duration,
    after_clear: Duration,
    render_steps: usize,
    step_interval: Duration,
    unreachable: bool,
    missing_input: bool,
    missing_output: bool,
    keep_output_on_clear: bool,
    lose_input_after: Option<usize>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            after_clear: Duration::from_millis(1000),
            render_steps: 1,
            step_interval: Duration::ZERO,
            unreachable: false,
            missing_input: false,
            missing_output: false,
            keep_output_on_clear: false,
            lose_input_after: None,
        }
    }
}

#[derive(Default)]
struct PageState {
    opened: bool,
    input: String,
    rendered: String,
    rendered_at: Option<Instant>,
    pending_since: Option<Instant>,
    cycles: usize,
    renders: usize,
    submissions: usize,
}

/// Simulated target page. Clones share the same page.
#[derive(Clone)]
pub struct FakePage {
    transform: Transform,
    behaviour: Behaviour,
    state: Arc<Mutex<PageState>>,
}

impl FakePage {
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
            behaviour: Behaviour::default(),
            state: Arc::new(Mutex::new(PageState::default())),
        }
    }

    /// Time the input must stay unchanged before a render happens.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.behaviour.debounce = debounce;
        self
    }

    pub fn with_after_clear(mut self, delay: Duration) -> Self {
        self.behaviour.after_clear = delay;
        self
    }

    /// Reveal each render in `steps` growing prefixes, `interval` apart.
    pub fn with_progressive_render(mut self, steps: usize, interval: Duration) -> Self {
        self.behaviour.render_steps = steps.max(1);
        self.behaviour.step_interval = interval;
        self
    }

    /// Navigation never reaches a loaded state.
    pub fn unreachable(mut self) -> Self {
        self.behaviour.unreachable = true;
        self
    }

    pub fn without_input(mut self) -> Self {
        self.behaviour.missing_input = true;
        self
    }

    pub fn without_output(mut self) -> Self {
        self.behaviour.missing_output = true;
        self
    }

    /// Clearing the input leaves the previous rendering on screen.
    pub fn keep_output_on_clear(mut self) -> Self {
        self.behaviour.keep_output_on_clear = true;
        self
    }

    /// The input region disappears after `submissions` calls to `set_text`.
    pub fn lose_input_after(mut self, submissions: usize) -> Self {
        self.behaviour.lose_input_after = Some(submissions);
        self
    }

    /// Input mutations seen so far (each keystroke counts).
    pub fn cycles(&self) -> usize {
        self.state.lock().cycles
    }

    /// Debounce cycles that completed and produced a render.
    pub fn renders(&self) -> usize {
        self.settle_due(Instant::now());
        self.state.lock().renders
    }

    pub fn input(&self) -> String {
        self.state.lock().input.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().opened
    }

    fn settle_due(&self, now: Instant) {
        let mut state = self.state.lock();
        let Some(since) = state.pending_since else {
            return;
        };
        let due = since + self.behaviour.debounce;
        if now < due {
            return;
        }

        state.pending_since = None;
        state.renders += 1;
        if state.input.is_empty() {
            if !self.behaviour.keep_output_on_clear {
                state.rendered.clear();
                state.rendered_at = Some(due);
            }
        } else {
            state.rendered = (self.transform)(&state.input);
            state.rendered_at = Some(due);
        }
    }

    fn visible_text(&self, now: Instant) -> String {
        self.settle_due(now);
        let state = self.state.lock();
        let steps = self.behaviour.render_steps;

        let text: String = match state.rendered_at {
            Some(at) if steps > 1 => {
                let elapsed = now.saturating_duration_since(at);
                let interval = self.behaviour.step_interval.as_millis().max(1);
                let shown_steps = (1 + elapsed.as_millis() / interval).min(steps as u128) as usize;
                let total = state.rendered.chars().count();
                let shown = (total * shown_steps).div_ceil(steps);
                state.rendered.chars().take(shown).collect()
            }
            _ => state.rendered.clone(),
        };
        text.trim().to_string()
    }

    fn mutate(&self, edit: impl FnOnce(&mut String)) {
        let now = Instant::now();
        self.settle_due(now);
        let mut state = self.state.lock();
        edit(&mut state.input);
        state.pending_since = Some(now);
        state.cycles += 1;
    }

    fn ensure_input(&self) -> HarnessResult<()> {
        let state = self.state.lock();
        if !state.opened {
            return Err(HarnessError::Navigation("page has not been opened".into()));
        }
        let lost = self
            .behaviour
            .lose_input_after
            .map_or(false, |limit| state.submissions >= limit);
        if self.behaviour.missing_input || lost {
            return Err(HarnessError::ElementNotFound(
                "textbox 'Input Your Singlish Text Here.'".into(),
            ));
        }
        Ok(())
    }

    fn ensure_output(&self) -> HarnessResult<()> {
        if !self.state.lock().opened {
            return Err(HarnessError::Navigation("page has not been opened".into()));
        }
        if self.behaviour.missing_output {
            return Err(HarnessError::ElementNotFound("output region".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn open(&mut self) -> HarnessResult<()> {
        if self.behaviour.unreachable {
            return Err(HarnessError::Navigation("fake page is unreachable".into()));
        }
        self.state.lock().opened = true;
        Ok(())
    }

    async fn locate_input(&self) -> HarnessResult<Region> {
        self.ensure_input()?;
        Ok(Region {
            role: RegionRole::Input,
            tag: "textarea".into(),
            candidates: 1,
        })
    }

    async fn locate_output(&self) -> HarnessResult<Region> {
        self.ensure_output()?;
        Ok(Region {
            role: RegionRole::Output,
            tag: "div".into(),
            candidates: 2,
        })
    }

    async fn clear(&mut self) -> HarnessResult<()> {
        self.ensure_input()?;
        self.mutate(|input| input.clear());
        tokio::time::sleep(self.behaviour.after_clear).await;
        Ok(())
    }

    async fn set_text(&mut self, text: &str) -> HarnessResult<()> {
        self.ensure_input()?;
        self.mutate(|input| {
            input.clear();
            input.push_str(text);
        });
        self.state.lock().submissions += 1;
        Ok(())
    }

    async fn type_incrementally(&mut self, text: &str, per_char_delay: Duration) -> HarnessResult<()> {
        self.ensure_input()?;
        for ch in text.chars() {
            self.mutate(|input| input.push(ch));
            tokio::time::sleep(per_char_delay).await;
        }
        Ok(())
    }

    async fn read_output_text(&self) -> HarnessResult<String> {
        self.ensure_output()?;
        Ok(self.visible_text(Instant::now()))
    }

    async fn close(&mut self) -> HarnessResult<()> {
        self.state.lock().opened = false;
        Ok(())
    }
}

/// Hands out a fresh [`FakePage`] per session.
#[derive(Clone)]
pub struct FakeSessions {
    make: Arc<dyn Fn() -> FakePage + Send + Sync>,
    opened: Arc<AtomicUsize>,
}

impl FakeSessions {
    pub fn new<F>(make: F) -> Self
    where
        F: Fn() -> FakePage + Send + Sync + 'static,
    {
        Self {
            make: Arc::new(make),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    type Driver = FakePage;

    async fn open_session(&self) -> HarnessResult<FakePage> {
        let mut page = (self.make)();
        page.open().await?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(page)
    }
}
