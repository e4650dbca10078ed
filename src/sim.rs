//! Deterministic in-memory browsing context.
//!
//! [`SimBrowser`] implements [`Environment`] with a model clock, a timer
//! queue, joint session history across the page and its hidden frames, and
//! native `hashchange` delivery on hosts that support it. Time only moves
//! when the caller advances it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{trace, warn};
use url::Url;

use crate::codec;
use crate::env::{Capabilities, Environment, FrameAttributes, FrameId, TimerId};
use crate::event::{ChangeEvent, Listener};
use crate::{Error, Result};

mod history;

use history::{HistoryTarget, SessionHistory};

/// URL a freshly created frame reports before anything is written to it.
pub const BLANK_FRAME_URL: &str = "about:blank";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// Full address assignment.
    Assign,
    /// Fragment-only assignment.
    Hash,
    /// Back or forward through session history.
    Traverse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub kind: NavigationKind,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimer {
    pub id: TimerId,
    pub due_at: i64,
    pub order: i64,
    pub kind: &'static str,
}

enum Job {
    Callback(Box<dyn FnOnce()>),
    FrameLoad(FrameId, Box<dyn FnOnce(FrameId)>),
    HashChange(ChangeEvent),
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Self::Callback(_) => "timeout",
            Self::FrameLoad(..) => "frame-load",
            Self::HashChange(_) => "hashchange",
        }
    }
}

struct ScheduledTask {
    id: TimerId,
    due_at: i64,
    order: i64,
    job: Job,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("due_at", &self.due_at)
            .field("order", &self.order)
            .field("kind", &self.job.kind())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct SimFrame {
    id: FrameId,
    attributes: FrameAttributes,
    url: String,
    loaded: bool,
    /// Document reopened since the last recorded entry; the next fragment
    /// assignment records a new one.
    reopened: bool,
}

struct SimState {
    capabilities: Capabilities,
    page_url: String,
    frames: Vec<SimFrame>,
    session: SessionHistory,
    native_listeners: Vec<Listener>,
    native_dispatches: usize,
    task_queue: Vec<ScheduledTask>,
    now_ms: i64,
    next_timer_id: u64,
    next_task_order: i64,
    next_frame_id: u64,
    timer_step_limit: usize,
    rng_state: u64,
    frame_failure: Option<String>,
    navigations: Vec<Navigation>,
    trace: bool,
    trace_logs: Vec<String>,
    trace_log_limit: usize,
    trace_to_stderr: bool,
}

impl SimState {
    fn native(&self) -> bool {
        self.capabilities.native_hashchange()
    }

    fn frame(&self, id: FrameId) -> Result<&SimFrame> {
        self.frames
            .iter()
            .find(|frame| frame.id == id)
            .ok_or_else(|| Error::FrameUnavailable(format!("no frame with id {}", id.0)))
    }

    fn frame_mut(&mut self, id: FrameId) -> Result<&mut SimFrame> {
        self.frames
            .iter_mut()
            .find(|frame| frame.id == id)
            .ok_or_else(|| Error::FrameUnavailable(format!("no frame with id {}", id.0)))
    }

    fn schedule(&mut self, delay_ms: i64, job: Job) -> TimerId {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;
        let order = self.next_task_order;
        self.next_task_order += 1;
        let due_at = self.now_ms.saturating_add(delay_ms.max(0));
        self.trace_line(format!(
            "[timer] schedule id={} kind={} due_at={} now_ms={}",
            id.0,
            job.kind(),
            due_at,
            self.now_ms
        ));
        self.task_queue.push(ScheduledTask {
            id,
            due_at,
            order,
            job,
        });
        id
    }

    fn next_task_index(&self, due_limit: Option<i64>) -> Option<usize> {
        self.task_queue
            .iter()
            .enumerate()
            .filter(|(_, task)| due_limit.is_none_or(|limit| task.due_at <= limit))
            .min_by_key(|(_, task)| (task.due_at, task.order))
            .map(|(idx, _)| idx)
    }

    fn timer_step_limit_error(&self, steps: usize, due_limit: Option<i64>) -> Error {
        let due_limit_desc = due_limit
            .map(|value| value.to_string())
            .unwrap_or_else(|| "none".into());
        Error::Environment(format!(
            "timer queue exceeded max task steps: limit={}, steps={steps}, now_ms={}, due_limit={due_limit_desc}, pending_tasks={}",
            self.timer_step_limit,
            self.now_ms,
            self.task_queue.len()
        ))
    }

    /// Moves the page to `to`. Returns the native event to queue, if any.
    fn commit_page_navigation(&mut self, to: String, kind: NavigationKind) -> Option<ChangeEvent> {
        let from = std::mem::replace(&mut self.page_url, to.clone());
        let hash_only = codec::without_fragment(&from) == codec::without_fragment(&to);
        match kind {
            NavigationKind::Traverse => {}
            // Legacy engines record no entry for fragment-only moves.
            _ if hash_only && !self.native() => {}
            _ => self.session.push(HistoryTarget::Page, &to),
        }
        self.trace_line(format!("[nav] {kind:?} from={from} to={to}"));
        self.navigations.push(Navigation {
            kind,
            from: from.clone(),
            to: to.clone(),
        });
        (hash_only && self.native()).then(|| ChangeEvent::with_urls(from, to))
    }

    fn next_random(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = if x == 0 { 0xA5A5_A5A5_A5A5_A5A5 } else { x };
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn trace_line(&mut self, line: String) {
        trace!(target: "fragment_history::sim", "{line}");
        if self.trace {
            if self.trace_to_stderr {
                eprintln!("{line}");
            }
            if self.trace_logs.len() >= self.trace_log_limit {
                self.trace_logs.remove(0);
            }
            self.trace_logs.push(line);
        }
    }
}

/// Serialized form the host reports for `href`; unparseable input is kept
/// as given.
fn normalize(href: &str) -> String {
    Url::parse(href)
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

/// Shared handle to a simulated browsing context. Clones observe and drive
/// the same state.
#[derive(Clone)]
pub struct SimBrowser {
    inner: Rc<RefCell<SimState>>,
}

impl fmt::Debug for SimBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("SimBrowser")
            .field("page_url", &state.page_url)
            .field("now_ms", &state.now_ms)
            .field("pending", &state.task_queue.len())
            .finish()
    }
}

impl SimBrowser {
    pub fn new(url: &str, capabilities: Capabilities) -> Self {
        let url = normalize(url);
        let state = SimState {
            capabilities,
            session: SessionHistory::new(&url),
            page_url: url,
            frames: Vec::new(),
            native_listeners: Vec::new(),
            native_dispatches: 0,
            task_queue: Vec::new(),
            now_ms: 0,
            next_timer_id: 1,
            next_task_order: 0,
            next_frame_id: 1,
            timer_step_limit: 10_000,
            rng_state: 0x9E37_79B9_7F4A_7C15,
            frame_failure: None,
            navigations: Vec::new(),
            trace: false,
            trace_logs: Vec::new(),
            trace_log_limit: 10_000,
            trace_to_stderr: true,
        };
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    pub fn modern(url: &str) -> Self {
        Self::new(url, Capabilities::modern())
    }

    pub fn legacy(url: &str) -> Self {
        Self::new(url, Capabilities::legacy())
    }

    /// This browser as the environment handle the engine takes.
    pub fn handle(&self) -> Rc<dyn Environment> {
        Rc::new(self.clone())
    }

    pub fn now_ms(&self) -> i64 {
        self.inner.borrow().now_ms
    }

    /// Page fragment as `location.hash` reports it.
    pub fn hash(&self) -> String {
        codec::hash_of(&self.inner.borrow().page_url)
    }

    pub fn navigations(&self) -> Vec<Navigation> {
        self.inner.borrow().navigations.clone()
    }

    pub fn native_dispatch_count(&self) -> usize {
        self.inner.borrow().native_dispatches
    }

    pub fn history_len(&self) -> usize {
        self.inner.borrow().session.len()
    }

    pub fn history_index(&self) -> usize {
        self.inner.borrow().session.index()
    }

    pub fn frames(&self) -> Vec<FrameId> {
        self.inner.borrow().frames.iter().map(|frame| frame.id).collect()
    }

    pub fn frame_url(&self, frame: FrameId) -> Option<String> {
        self.inner.borrow().frame(frame).ok().map(|frame| frame.url.clone())
    }

    pub fn frame_attributes(&self, frame: FrameId) -> Option<FrameAttributes> {
        self.inner
            .borrow()
            .frame(frame)
            .ok()
            .map(|frame| frame.attributes.clone())
    }

    pub fn frame_loaded(&self, frame: FrameId) -> bool {
        self.inner
            .borrow()
            .frame(frame)
            .is_ok_and(|frame| frame.loaded)
    }

    /// Makes every later frame creation fail with `reason`.
    pub fn fail_frame_creation(&self, reason: &str) {
        self.inner.borrow_mut().frame_failure = Some(reason.to_string());
    }

    pub fn set_random_seed(&self, seed: u64) {
        self.inner.borrow_mut().rng_state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
    }

    pub fn set_timer_step_limit(&self, max_steps: usize) -> Result<()> {
        if max_steps == 0 {
            return Err(Error::Environment(
                "set_timer_step_limit requires at least 1 step".into(),
            ));
        }
        self.inner.borrow_mut().timer_step_limit = max_steps;
        Ok(())
    }

    pub fn enable_trace(&self, enabled: bool) {
        self.inner.borrow_mut().trace = enabled;
    }

    pub fn take_trace_logs(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.borrow_mut().trace_logs)
    }

    pub fn set_trace_stderr(&self, enabled: bool) {
        self.inner.borrow_mut().trace_to_stderr = enabled;
    }

    pub fn set_trace_log_limit(&self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::Environment(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        let mut state = self.inner.borrow_mut();
        state.trace_log_limit = max_entries;
        while state.trace_logs.len() > max_entries {
            state.trace_logs.remove(0);
        }
        Ok(())
    }

    /// Session-history back, like the browser's back button.
    pub fn back(&self) -> bool {
        let event = {
            let mut state = self.inner.borrow_mut();
            let Some((target, url)) = state.session.back() else {
                state.trace_line("[nav] back none".into());
                return false;
            };
            Self::restore(&mut state, target, url)
        };
        self.queue_hashchange(event);
        true
    }

    pub fn forward(&self) -> bool {
        let event = {
            let mut state = self.inner.borrow_mut();
            let Some((target, url)) = state.session.forward() else {
                state.trace_line("[nav] forward none".into());
                return false;
            };
            Self::restore(&mut state, target, Some(url))
        };
        self.queue_hashchange(event);
        true
    }

    fn restore(
        state: &mut SimState,
        target: HistoryTarget,
        url: Option<String>,
    ) -> Option<ChangeEvent> {
        match target {
            HistoryTarget::Page => {
                let url = url.unwrap_or_else(|| state.page_url.clone());
                state.commit_page_navigation(url, NavigationKind::Traverse)
            }
            HistoryTarget::Frame(id) => {
                let url = url.unwrap_or_else(|| BLANK_FRAME_URL.to_string());
                if let Ok(frame) = state.frame_mut(id) {
                    frame.url = url.clone();
                }
                state.trace_line(format!("[frame] traverse id={} url={url}", id.0));
                None
            }
        }
    }

    fn queue_hashchange(&self, event: Option<ChangeEvent>) {
        if let Some(event) = event {
            self.inner.borrow_mut().schedule(0, Job::HashChange(event));
        }
    }

    fn resolve(&self, href: &str) -> String {
        let state = self.inner.borrow();
        match href.strip_prefix('#') {
            Some(fragment) => normalize(&format!(
                "{}#{fragment}",
                codec::without_fragment(&state.page_url)
            )),
            None => normalize(href),
        }
    }

    fn navigate_page(&self, href: &str, kind: NavigationKind) {
        let to = self.resolve(href);
        let event = {
            let mut state = self.inner.borrow_mut();
            if to == state.page_url {
                state.trace_line(format!("[nav] unchanged url={to}"));
                return;
            }
            state.commit_page_navigation(to, kind)
        };
        self.queue_hashchange(event);
    }

    fn invoke_native(&self, event: &ChangeEvent) {
        let listeners = {
            let mut state = self.inner.borrow_mut();
            state.native_dispatches += 1;
            let listeners = state.native_listeners.clone();
            state.trace_line(format!("[event] {event} listeners={}", listeners.len()));
            listeners
        };
        for (index, listener) in listeners.iter().enumerate() {
            if let Err(err) = listener(event) {
                warn!(listener = index, error = %err, "native hashchange listener failed");
                self.inner
                    .borrow_mut()
                    .trace_line(format!("[event] listener={index} error={err}"));
            }
        }
    }

    /// Moves the clock forward by `delta_ms`, running every task that comes
    /// due on the way at its own due time.
    pub fn advance_time(&self, delta_ms: i64) -> Result<()> {
        if delta_ms < 0 {
            return Err(Error::Environment(
                "advance_time requires non-negative milliseconds".into(),
            ));
        }
        let target = self.now_ms().saturating_add(delta_ms);
        self.advance_time_to(target)
    }

    pub fn advance_time_to(&self, target_ms: i64) -> Result<()> {
        let from = self.now_ms();
        if target_ms < from {
            return Err(Error::Environment(format!(
                "advance_time_to requires target >= now_ms (target={target_ms}, now_ms={from})"
            )));
        }
        let ran = self.run_timer_queue(Some(target_ms))?;
        let mut state = self.inner.borrow_mut();
        let to = state.now_ms.max(target_ms);
        state.now_ms = to;
        state.trace_line(format!("[timer] advance_to from={from} to={to} ran_due={ran}"));
        Ok(())
    }

    /// Runs tasks already due without moving the clock.
    pub fn run_due_timers(&self) -> Result<usize> {
        let now = self.now_ms();
        self.run_timer_queue(Some(now))
    }

    /// Runs the earliest pending task, jumping the clock to it.
    pub fn run_next_timer(&self) -> Result<bool> {
        let task = {
            let mut state = self.inner.borrow_mut();
            let Some(idx) = state.next_task_index(None) else {
                state.trace_line("[timer] run_next none".into());
                return Ok(false);
            };
            let task = state.task_queue.remove(idx);
            state.now_ms = state.now_ms.max(task.due_at);
            task
        };
        self.execute(task);
        Ok(true)
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        let mut timers = self
            .inner
            .borrow()
            .task_queue
            .iter()
            .map(|task| PendingTimer {
                id: task.id,
                due_at: task.due_at,
                order: task.order,
                kind: task.job.kind(),
            })
            .collect::<Vec<_>>();
        timers.sort_by_key(|timer| (timer.due_at, timer.order));
        timers
    }

    fn run_timer_queue(&self, due_limit: Option<i64>) -> Result<usize> {
        let mut steps = 0usize;
        loop {
            let task = {
                let mut state = self.inner.borrow_mut();
                let Some(idx) = state.next_task_index(due_limit) else {
                    break;
                };
                steps += 1;
                if steps > state.timer_step_limit {
                    return Err(state.timer_step_limit_error(steps, due_limit));
                }
                let task = state.task_queue.remove(idx);
                state.now_ms = state.now_ms.max(task.due_at);
                task
            };
            self.execute(task);
        }
        Ok(steps)
    }

    fn execute(&self, task: ScheduledTask) {
        self.inner.borrow_mut().trace_line(format!(
            "[timer] run id={} kind={} due_at={}",
            task.id.0,
            task.job.kind(),
            task.due_at
        ));
        match task.job {
            Job::Callback(callback) => callback(),
            Job::FrameLoad(id, on_load) => {
                if let Ok(frame) = self.inner.borrow_mut().frame_mut(id) {
                    frame.loaded = true;
                }
                on_load(id);
            }
            Job::HashChange(event) => self.invoke_native(&event),
        }
    }
}

impl Environment for SimBrowser {
    fn capabilities(&self) -> Capabilities {
        self.inner.borrow().capabilities
    }

    fn location(&self) -> String {
        self.inner.borrow().page_url.clone()
    }

    fn navigate(&self, href: &str) {
        self.navigate_page(href, NavigationKind::Assign);
    }

    fn set_hash(&self, hash: &str) {
        let fragment = hash.strip_prefix('#').unwrap_or(hash);
        self.navigate_page(&format!("#{fragment}"), NavigationKind::Hash);
    }

    fn add_native_listener(&self, listener: Listener) {
        self.inner.borrow_mut().native_listeners.push(listener);
    }

    fn dispatch_native(&self, event: &ChangeEvent) {
        self.invoke_native(event);
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        self.inner
            .borrow_mut()
            .schedule(delay_ms, Job::Callback(callback))
    }

    fn clear_timeout(&self, id: TimerId) {
        let mut state = self.inner.borrow_mut();
        let before = state.task_queue.len();
        state.task_queue.retain(|task| task.id != id);
        let cleared = before - state.task_queue.len();
        state.trace_line(format!("[timer] clear id={} cleared={cleared}", id.0));
    }

    fn create_frame(
        &self,
        attributes: &FrameAttributes,
        on_load: Box<dyn FnOnce(FrameId)>,
    ) -> Result<FrameId> {
        let mut state = self.inner.borrow_mut();
        if let Some(reason) = state.frame_failure.clone() {
            state.trace_line(format!("[frame] create failed reason={reason}"));
            return Err(Error::FrameUnavailable(reason));
        }
        let id = FrameId(state.next_frame_id);
        state.next_frame_id += 1;
        state.frames.push(SimFrame {
            id,
            attributes: attributes.clone(),
            url: BLANK_FRAME_URL.to_string(),
            loaded: false,
            reopened: false,
        });
        state.trace_line(format!(
            "[frame] create id={} attr_id={} src={}",
            id.0, attributes.id, attributes.src
        ));
        state.schedule(0, Job::FrameLoad(id, on_load));
        Ok(id)
    }

    fn frame_location(&self, frame: FrameId) -> Result<String> {
        Ok(self.inner.borrow().frame(frame)?.url.clone())
    }

    fn frame_open(&self, frame: FrameId) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        state.frame_mut(frame)?.reopened = true;
        state.trace_line(format!("[frame] open id={}", frame.0));
        Ok(())
    }

    fn frame_close(&self, frame: FrameId) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        state.frame(frame)?;
        state.trace_line(format!("[frame] close id={}", frame.0));
        Ok(())
    }

    fn frame_set_hash(&self, frame: FrameId, hash: &str) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        let target = state.frame_mut(frame)?;
        let fragment = hash.strip_prefix('#').unwrap_or(hash);
        let url = format!("{}#{fragment}", codec::without_fragment(&target.url));
        target.url = url.clone();
        let record = std::mem::take(&mut target.reopened);
        if record {
            state.session.push(HistoryTarget::Frame(frame), &url);
        }
        state.trace_line(format!(
            "[frame] hash id={} url={url} recorded={record}",
            frame.0
        ));
        Ok(())
    }

    fn random_digits(&self, len: usize) -> String {
        let mut state = self.inner.borrow_mut();
        (0..len)
            .map(|_| char::from(b'0' + (state.next_random() % 10) as u8))
            .collect()
    }
}
