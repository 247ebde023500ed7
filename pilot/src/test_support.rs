//! Scripted fakes for the session, oracle, repository, and runner capabilities.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::core::profile::ExecutionProfile;
use crate::core::strategy::Strategy;
use crate::core::types::{ExecutionPlan, PlannedSubGoal};
use crate::execution::{AttemptContext, AttemptReport, SubGoalRunner};
use crate::io::oracle::{OracleError, OracleRequest, ReasoningOracle};
use crate::io::repository::{DirectoryRepository, DocumentRepository, normalize_key};
use crate::io::session::{ElementState, Frame, Locator, Selector, Session};
use crate::navigation::diagnostics::{DiagnosticEvent, DiagnosticObserver};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Static description of a fake frame.
#[derive(Debug, Clone, Default)]
pub struct FakeFrame {
    name: Option<String>,
    url: String,
    elements: HashMap<Selector, usize>,
    failing: HashSet<Selector>,
    stalling: HashSet<Selector>,
}

impl FakeFrame {
    pub fn new(name: Option<&str>, url: &str) -> Self {
        Self {
            name: name.map(str::to_string),
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_element(mut self, selector: Selector, count: usize) -> Self {
        self.elements.insert(selector, count);
        self
    }

    /// Queries for `selector` return an error.
    pub fn failing(mut self, selector: Selector) -> Self {
        self.failing.insert(selector);
        self
    }

    /// Queries for `selector` never resolve.
    pub fn stalling(mut self, selector: Selector) -> Self {
        self.stalling.insert(selector);
        self
    }
}

#[derive(Default)]
struct SessionState {
    frames: Vec<Arc<FakeFrame>>,
    on_click: HashMap<String, Vec<FakeFrame>>,
    timed: Vec<(Instant, FakeFrame)>,
    clicks: Vec<String>,
    screenshots: Vec<PathBuf>,
    fail_screenshots: bool,
    stall_lookups: bool,
}

impl SessionState {
    fn promote_due(&mut self) {
        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.timed)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.timed = pending;
        self.frames
            .extend(due.into_iter().map(|(_, frame)| Arc::new(frame)));
    }
}

/// In-memory session whose frames change when scripted elements are clicked.
#[derive(Clone, Default)]
pub struct FakeSession {
    state: Arc<Mutex<SessionState>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_frame(&self, frame: FakeFrame) -> Arc<dyn Frame> {
        let frame = Arc::new(frame);
        lock(&self.state).frames.push(Arc::clone(&frame));
        self.bind(frame)
    }

    /// Add `frame` the first time an element matching `selector` is clicked.
    pub fn reveal_on_click(&self, selector: &Selector, frame: FakeFrame) {
        lock(&self.state)
            .on_click
            .entry(selector.to_string())
            .or_default()
            .push(frame);
    }

    /// Add `frame` once `delay` has elapsed on the tokio clock.
    pub fn reveal_after(&self, delay: Duration, frame: FakeFrame) {
        lock(&self.state).timed.push((Instant::now() + delay, frame));
    }

    pub fn fail_screenshots(&self) {
        lock(&self.state).fail_screenshots = true;
    }

    /// Frame lookups and listings never resolve from now on.
    pub fn stall_lookups(&self) {
        lock(&self.state).stall_lookups = true;
    }

    fn lookups_stalled(&self) -> bool {
        lock(&self.state).stall_lookups
    }

    /// Successful clicks, as selector display strings, in order.
    pub fn clicks(&self) -> Vec<String> {
        lock(&self.state).clicks.clone()
    }

    /// Paths of successful screenshot captures.
    pub fn screenshots(&self) -> Vec<PathBuf> {
        lock(&self.state).screenshots.clone()
    }

    fn bind(&self, frame: Arc<FakeFrame>) -> Arc<dyn Frame> {
        Arc::new(BoundFrame {
            frame,
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn named_frame(&self, name: &str) -> Result<Option<Arc<dyn Frame>>> {
        if self.lookups_stalled() {
            return std::future::pending().await;
        }
        let found = {
            let mut state = lock(&self.state);
            state.promote_due();
            state
                .frames
                .iter()
                .find(|frame| frame.name.as_deref() == Some(name))
                .cloned()
        };
        Ok(found.map(|frame| self.bind(frame)))
    }

    async fn frames(&self) -> Result<Vec<Arc<dyn Frame>>> {
        if self.lookups_stalled() {
            return std::future::pending().await;
        }
        let frames = {
            let mut state = lock(&self.state);
            state.promote_due();
            state.frames.clone()
        };
        Ok(frames.into_iter().map(|frame| self.bind(frame)).collect())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_screenshots {
            bail!("screenshot failed: page crashed");
        }
        state.screenshots.push(path.to_path_buf());
        Ok(())
    }
}

struct BoundFrame {
    frame: Arc<FakeFrame>,
    state: Arc<Mutex<SessionState>>,
}

impl Frame for BoundFrame {
    fn name(&self) -> Option<String> {
        self.frame.name.clone()
    }

    fn url(&self) -> String {
        self.frame.url.clone()
    }

    fn locator(&self, selector: &Selector) -> Box<dyn Locator> {
        Box::new(FakeLocator {
            selector: selector.clone(),
            count: self.frame.elements.get(selector).copied().unwrap_or(0),
            failing: self.frame.failing.contains(selector),
            stalling: self.frame.stalling.contains(selector),
            state: Arc::clone(&self.state),
        })
    }
}

struct FakeLocator {
    selector: Selector,
    count: usize,
    failing: bool,
    stalling: bool,
    state: Arc<Mutex<SessionState>>,
}

impl FakeLocator {
    async fn stall_if_scripted(&self) {
        if self.stalling {
            std::future::pending::<()>().await;
        }
    }

    fn checked_count(&self) -> Result<usize> {
        if self.failing {
            bail!("query for {} failed: frame detached", self.selector);
        }
        Ok(self.count)
    }
}

#[async_trait]
impl Locator for FakeLocator {
    async fn count(&self) -> Result<usize> {
        self.stall_if_scripted().await;
        self.checked_count()
    }

    async fn click(&self, _timeout: Duration) -> Result<()> {
        self.stall_if_scripted().await;
        if self.checked_count()? == 0 {
            bail!("{} is not clickable", self.selector);
        }
        let key = self.selector.to_string();
        let mut state = lock(&self.state);
        state.clicks.push(key.clone());
        if let Some(frames) = state.on_click.remove(&key) {
            state.frames.extend(frames.into_iter().map(Arc::new));
        }
        Ok(())
    }

    async fn wait_for(&self, element_state: ElementState, _timeout: Duration) -> Result<()> {
        let present = self.checked_count()? > 0;
        match (element_state, present) {
            (ElementState::Attached | ElementState::Visible, true)
            | (ElementState::Hidden, false) => Ok(()),
            _ => Err(anyhow!("{} never reached {element_state:?}", self.selector)),
        }
    }

    async fn is_visible(&self, _timeout: Duration) -> Result<bool> {
        Ok(self.checked_count()? > 0)
    }
}

/// One scripted oracle reply.
pub enum OracleReply {
    Respond(Value),
    Fail(OracleError),
    /// Never resolves; exercises the caller's timeout.
    Hang,
}

/// Oracle that replays scripted replies in order and records requests.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<OracleReply>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<OracleReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn responding(value: Value) -> Self {
        Self::new(vec![OracleReply::Respond(value)])
    }

    pub fn failing(error: OracleError) -> Self {
        Self::new(vec![OracleReply::Fail(error)])
    }

    pub fn hanging() -> Self {
        Self::new(vec![OracleReply::Hang])
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn complete(&self, request: &OracleRequest) -> Result<Value, OracleError> {
        lock(&self.requests).push(request.clone());
        let reply = lock(&self.replies).pop_front();
        match reply {
            Some(OracleReply::Respond(value)) => Ok(value),
            Some(OracleReply::Fail(err)) => Err(err),
            Some(OracleReply::Hang) => std::future::pending().await,
            None => Err(OracleError::Other("no scripted reply left".to_string())),
        }
    }
}

/// Repository backed by a map from normalised person key to stored entries.
///
/// Entries are returned verbatim (they may contain paths) so callers can be
/// checked for reducing them to bare names.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    files: HashMap<String, Vec<String>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, person: &str, entry: &str) -> Self {
        self.files
            .entry(normalize_key(person))
            .or_default()
            .push(entry.to_string());
        self
    }
}

impl DocumentRepository for InMemoryRepository {
    fn resolve_candidate_files(
        &self,
        person_key: &str,
        document_type_hint: Option<&str>,
    ) -> Vec<String> {
        let Some(entries) = self.files.get(&normalize_key(person_key)) else {
            return Vec::new();
        };
        let hint = document_type_hint.map(normalize_key);
        entries
            .iter()
            .filter(|entry| match &hint {
                Some(hint) => normalize_key(entry).contains(hint.as_str()),
                None => true,
            })
            .cloned()
            .collect()
    }
}

/// Scratch `<root>/<person_key>/<file>` tree and a repository over it.
///
/// Keep the returned `TempDir` alive for as long as the repository is used.
pub fn document_tree(files: &[(&str, &str)]) -> Result<(tempfile::TempDir, DirectoryRepository)> {
    let root = tempfile::tempdir()?;
    for (person, file) in files {
        let dir = root.path().join(normalize_key(person));
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(file), b"%PDF-1.4")?;
    }
    let repository = DirectoryRepository::new(root.path());
    Ok((root, repository))
}

/// One scripted runner attempt.
#[derive(Debug, Clone)]
pub enum ScriptedAttempt {
    Report(AttemptReport),
    Error(String),
}

/// Arguments the runner observed for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAttempt {
    pub sub_goal_index: u32,
    pub attempt: u32,
    pub max_steps: u32,
    pub reached_target: Option<String>,
}

/// Runner that replays per-sub-goal scripts; unscripted attempts fail.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<u32, VecDeque<ScriptedAttempt>>>,
    calls: Mutex<Vec<RecordedAttempt>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, sub_goal_index: u32, attempts: Vec<ScriptedAttempt>) -> Self {
        lock(&self.scripts).insert(sub_goal_index, attempts.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedAttempt> {
        lock(&self.calls).clone()
    }

    pub fn attempts_for(&self, sub_goal_index: u32) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.sub_goal_index == sub_goal_index)
            .count()
    }
}

#[async_trait]
impl SubGoalRunner for ScriptedRunner {
    async fn run_attempt(
        &self,
        sub_goal: &PlannedSubGoal,
        ctx: &AttemptContext<'_>,
    ) -> Result<AttemptReport> {
        lock(&self.calls).push(RecordedAttempt {
            sub_goal_index: sub_goal.index,
            attempt: ctx.attempt,
            max_steps: ctx.max_steps,
            reached_target: ctx.target.map(|reached| reached.target.clone()),
        });
        let next = lock(&self.scripts)
            .get_mut(&sub_goal.index)
            .and_then(VecDeque::pop_front);
        match next {
            Some(ScriptedAttempt::Report(report)) => Ok(report),
            Some(ScriptedAttempt::Error(message)) => Err(anyhow!(message)),
            None => Ok(AttemptReport::default()),
        }
    }
}

/// Observer that only counts decisions.
#[derive(Debug, Default)]
pub struct CountingObserver {
    successes: AtomicU32,
    failures: AtomicU32,
}

impl CountingObserver {
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiagnosticObserver for CountingObserver {
    async fn on_success(&self, _session: &dyn Session, _event: &DiagnosticEvent) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_failure(&self, _session: &dyn Session, _event: &DiagnosticEvent) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

/// Planned sub-goal with the strategy's default actions.
pub fn planned(index: u32, text: &str, strategy: Strategy) -> PlannedSubGoal {
    PlannedSubGoal {
        index,
        sub_goal: text.to_string(),
        strategy,
        expected_actions: strategy.default_actions(),
        documents_needed: Vec::new(),
        may_retry: true,
    }
}

/// Plan over `sub_goals` with the given profile and every strategy allowed.
pub fn plan_of(
    goal: &str,
    profile: ExecutionProfile,
    sub_goals: Vec<PlannedSubGoal>,
) -> ExecutionPlan {
    ExecutionPlan {
        goal: goal.to_string(),
        execution_profile: profile,
        context_strategies: Strategy::ALL.into_iter().collect::<BTreeSet<_>>(),
        sub_goals,
    }
}

/// Successful attempt report with an answer.
pub fn answered(answer: &str) -> AttemptReport {
    AttemptReport {
        success: true,
        answer: Some(answer.to_string()),
        ..AttemptReport::default()
    }
}
