//! Document load handshake.
//!
//! An open request either resolves on the spot or leaves a pending handle that
//! is polled on a timer until the engine reports ready or error, or until the
//! timeout passes. A newer request always supersedes the pending one: the old
//! handle is released and anything it later reports is ignored.
//!
//! [`transition`] is the whole state machine as a pure function;
//! [`LoadController`] applies its effects against a [`PdfEngine`].

use pdf_engine::{DocumentHandle, LoadStatus, PdfEngine};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { poll_interval: DEFAULT_POLL_INTERVAL, timeout: DEFAULT_LOAD_TIMEOUT }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLoad {
    pub handle: DocumentHandle,
    pub path: PathBuf,
    pub started: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub handle: DocumentHandle,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadFailure {
    #[error("Load call failed for {}: {}", .path.display(), .reason)]
    CallFailed { path: PathBuf, reason: String },
    #[error("PDF load timeout after {:?} (status={}). File: {}", .timeout, .status, .path.display())]
    Timeout { path: PathBuf, timeout: Duration, status: LoadStatus },
    #[error("PDF load failed (status=error). File: {}{}", .path.display(), reason_suffix(.reason))]
    Status { path: PathBuf, reason: Option<String> },
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|reason| format!(" ({reason})")).unwrap_or_default()
}

/// Outcome of the most recent open request.
///
/// The document currently on screen is tracked separately by
/// [`LoadController::current`], so `Pending` and `Error` never disturb it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Pending(PendingLoad),
    Ready(LoadedDocument),
    Error(LoadFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    Opened {
        handle: DocumentHandle,
        path: PathBuf,
        status: LoadStatus,
        detail: Option<String>,
        now: Instant,
    },
    OpenFailed {
        path: PathBuf,
        reason: String,
    },
    Tick {
        handle: DocumentHandle,
        status: LoadStatus,
        detail: Option<String>,
        now: Instant,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEffect {
    StartPolling,
    StopPolling,
    Release(DocumentHandle),
    Finalize(LoadedDocument),
    Report(LoadFailure),
}

pub fn transition(
    state: LoadState,
    event: LoadEvent,
    timeout: Duration,
) -> (LoadState, Vec<LoadEffect>) {
    let mut effects = Vec::new();

    match event {
        LoadEvent::Opened { handle, path, status, detail, now } => {
            supersede(&state, &mut effects);

            let next = match status {
                LoadStatus::Ready => {
                    let document = LoadedDocument { handle, path };
                    effects.push(LoadEffect::Finalize(document.clone()));
                    LoadState::Ready(document)
                }
                LoadStatus::Error => {
                    let failure = LoadFailure::Status { path, reason: detail };
                    effects.push(LoadEffect::Release(handle));
                    effects.push(LoadEffect::Report(failure.clone()));
                    LoadState::Error(failure)
                }
                LoadStatus::Loading => {
                    effects.push(LoadEffect::StartPolling);
                    LoadState::Pending(PendingLoad { handle, path, started: now })
                }
            };

            (next, effects)
        }
        LoadEvent::OpenFailed { path, reason } => {
            supersede(&state, &mut effects);

            let failure = LoadFailure::CallFailed { path, reason };
            effects.push(LoadEffect::Report(failure.clone()));
            (LoadState::Error(failure), effects)
        }
        LoadEvent::Tick { handle, status, detail, now } => {
            let pending = match state {
                LoadState::Pending(pending) if pending.handle == handle => pending,
                // Stale tick: either nothing is pending or the handle was superseded.
                other => return (other, effects),
            };

            match status {
                LoadStatus::Ready => {
                    let document = LoadedDocument { handle, path: pending.path };
                    effects.push(LoadEffect::StopPolling);
                    effects.push(LoadEffect::Finalize(document.clone()));
                    (LoadState::Ready(document), effects)
                }
                LoadStatus::Error => {
                    let failure = LoadFailure::Status { path: pending.path, reason: detail };
                    fail(handle, failure, effects)
                }
                LoadStatus::Loading if now.saturating_duration_since(pending.started) > timeout => {
                    let failure = LoadFailure::Timeout { path: pending.path, timeout, status };
                    fail(handle, failure, effects)
                }
                LoadStatus::Loading => (LoadState::Pending(pending), effects),
            }
        }
    }
}

fn supersede(state: &LoadState, effects: &mut Vec<LoadEffect>) {
    if let LoadState::Pending(previous) = state {
        effects.push(LoadEffect::StopPolling);
        effects.push(LoadEffect::Release(previous.handle));
    }
}

fn fail(
    handle: DocumentHandle,
    failure: LoadFailure,
    mut effects: Vec<LoadEffect>,
) -> (LoadState, Vec<LoadEffect>) {
    effects.push(LoadEffect::StopPolling);
    effects.push(LoadEffect::Release(handle));
    effects.push(LoadEffect::Report(failure.clone()));
    (LoadState::Error(failure), effects)
}

/// What a single open or poll call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Finalized(LoadedDocument),
    Pending,
    Failed(LoadFailure),
    Unchanged,
}

/// Owns the current and pending document handles and is the only place that
/// releases them.
#[derive(Debug, Default)]
pub struct LoadController {
    state: LoadState,
    current: Option<LoadedDocument>,
    options: LoadOptions,
    polling: bool,
}

impl LoadController {
    pub fn new(options: LoadOptions) -> Self {
        Self { options, ..Self::default() }
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn current(&self) -> Option<&LoadedDocument> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingLoad> {
        match &self.state {
            LoadState::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    /// Whether the front end should keep its poll timer running.
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn open<E: PdfEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        path: &Path,
        now: Instant,
    ) -> LoadOutcome {
        let event = match engine.load(path) {
            Ok((handle, status)) => LoadEvent::Opened {
                handle,
                path: path.to_path_buf(),
                status,
                detail: failure_detail(engine, handle, status),
                now,
            },
            Err(err) => LoadEvent::OpenFailed { path: path.to_path_buf(), reason: err.to_string() },
        };

        self.apply(engine, event)
    }

    /// One timer tick. Does nothing unless a load is pending.
    pub fn poll<E: PdfEngine + ?Sized>(&mut self, engine: &mut E, now: Instant) -> LoadOutcome {
        let Some(handle) = self.pending().map(|pending| pending.handle) else {
            self.polling = false;
            return LoadOutcome::Unchanged;
        };

        let status = engine.status(handle);
        let detail = failure_detail(engine, handle, status);
        self.apply(engine, LoadEvent::Tick { handle, status, detail, now })
    }

    /// Releases every handle the controller holds, returning to `Idle`.
    pub fn release_all<E: PdfEngine + ?Sized>(&mut self, engine: &mut E) {
        if let LoadState::Pending(pending) = std::mem::take(&mut self.state) {
            release(engine, pending.handle);
        }
        if let Some(current) = self.current.take() {
            release(engine, current.handle);
        }
        self.polling = false;
    }

    fn apply<E: PdfEngine + ?Sized>(&mut self, engine: &mut E, event: LoadEvent) -> LoadOutcome {
        let state = std::mem::take(&mut self.state);
        let (next, effects) = transition(state, event, self.options.timeout);
        self.state = next;

        let mut outcome = None;
        for effect in effects {
            match effect {
                LoadEffect::StartPolling => self.polling = true,
                LoadEffect::StopPolling => self.polling = false,
                LoadEffect::Release(handle) => release(engine, handle),
                LoadEffect::Finalize(document) => {
                    if let Some(previous) = self.current.replace(document.clone()) {
                        if previous.handle != document.handle {
                            release(engine, previous.handle);
                        }
                    }
                    log::debug!("finalized {}", document.path.display());
                    outcome = Some(LoadOutcome::Finalized(document));
                }
                LoadEffect::Report(failure) => {
                    log::warn!("{failure}");
                    outcome = Some(LoadOutcome::Failed(failure));
                }
            }
        }

        outcome.unwrap_or(match self.state {
            LoadState::Pending(_) => LoadOutcome::Pending,
            _ => LoadOutcome::Unchanged,
        })
    }
}

fn failure_detail<E: PdfEngine + ?Sized>(
    engine: &E,
    handle: DocumentHandle,
    status: LoadStatus,
) -> Option<String> {
    match status {
        LoadStatus::Error => engine.failure_reason(handle),
        _ => None,
    }
}

fn release<E: PdfEngine + ?Sized>(engine: &mut E, handle: DocumentHandle) {
    if let Err(err) = engine.release(handle) {
        log::warn!("failed to release document handle {}: {err}", handle.raw());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pdf_engine::{PageSize, PdfEngineError};
    use std::collections::HashMap;

    /// Engine whose per-path behaviour is scripted by the test.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedEngine {
        next: u64,
        pub(crate) initial: HashMap<PathBuf, LoadStatus>,
        pub(crate) pages: HashMap<PathBuf, u32>,
        pub(crate) rejected: Vec<PathBuf>,
        pub(crate) statuses: HashMap<DocumentHandle, LoadStatus>,
        pub(crate) paths: HashMap<DocumentHandle, PathBuf>,
        pub(crate) released: Vec<DocumentHandle>,
    }

    impl ScriptedEngine {
        pub(crate) fn with_doc(
            mut self,
            path: impl AsRef<Path>,
            initial: LoadStatus,
            pages: u32,
        ) -> Self {
            let path = path.as_ref().to_path_buf();
            self.initial.insert(path.clone(), initial);
            self.pages.insert(path, pages);
            self
        }

        pub(crate) fn set_status(&mut self, handle: DocumentHandle, status: LoadStatus) {
            self.statuses.insert(handle, status);
        }

        pub(crate) fn live(&self) -> usize {
            self.statuses.len()
        }
    }

    impl PdfEngine for ScriptedEngine {
        fn load(&mut self, path: &Path) -> Result<(DocumentHandle, LoadStatus), PdfEngineError> {
            if self.rejected.iter().any(|rejected| rejected == path) {
                return Err(PdfEngineError::NotAFile(path.to_path_buf()));
            }

            self.next += 1;
            let handle = DocumentHandle::from_raw(self.next);
            let status = self.initial.get(path).copied().unwrap_or(LoadStatus::Loading);
            self.statuses.insert(handle, status);
            self.paths.insert(handle, path.to_path_buf());
            Ok((handle, status))
        }

        fn status(&mut self, handle: DocumentHandle) -> LoadStatus {
            self.statuses.get(&handle).copied().unwrap_or(LoadStatus::Error)
        }

        fn failure_reason(&self, handle: DocumentHandle) -> Option<String> {
            match self.statuses.get(&handle) {
                Some(LoadStatus::Error) => Some("scripted failure".to_owned()),
                _ => None,
            }
        }

        fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
            let path = self.paths.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))?;
            Ok(self.pages.get(path).copied().unwrap_or(1))
        }

        fn page_size(
            &self,
            handle: DocumentHandle,
            _page_index: u32,
        ) -> Result<PageSize, PdfEngineError> {
            self.page_count(handle).map(|_| PageSize::default())
        }

        fn release(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
            self.statuses.remove(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))?;
            self.released.push(handle);
            Ok(())
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(10);
    const INTERVAL: Duration = Duration::from_millis(100);

    fn controller() -> LoadController {
        LoadController::new(LoadOptions { poll_interval: INTERVAL, timeout: TIMEOUT })
    }

    #[test]
    fn immediate_ready_finalizes_without_polling() {
        let mut engine = ScriptedEngine::default().with_doc("/a.pdf", LoadStatus::Ready, 3);
        let mut loader = controller();

        let outcome = loader.open(&mut engine, Path::new("/a.pdf"), Instant::now());

        assert!(matches!(outcome, LoadOutcome::Finalized(ref doc) if doc.path == Path::new("/a.pdf")));
        assert!(!loader.is_polling());
        assert!(matches!(loader.state(), LoadState::Ready(_)));
        assert_eq!(loader.current().map(|doc| doc.path.as_path()), Some(Path::new("/a.pdf")));
    }

    #[test]
    fn pending_load_finalizes_once_ready() {
        let mut engine = ScriptedEngine::default();
        let mut loader = controller();
        let start = Instant::now();

        assert_eq!(loader.open(&mut engine, Path::new("/slow.pdf"), start), LoadOutcome::Pending);
        assert!(loader.is_polling());
        assert_eq!(loader.poll(&mut engine, start + INTERVAL), LoadOutcome::Pending);

        let handle = loader.pending().expect("pending").handle;
        engine.set_status(handle, LoadStatus::Ready);

        let outcome = loader.poll(&mut engine, start + INTERVAL * 2);
        assert!(matches!(outcome, LoadOutcome::Finalized(ref doc) if doc.handle == handle));
        assert!(!loader.is_polling());
        assert_eq!(loader.current().map(|doc| doc.handle), Some(handle));
    }

    #[test]
    fn later_open_supersedes_pending_even_if_it_resolves_first() {
        let mut engine = ScriptedEngine::default();
        let mut loader = controller();
        let start = Instant::now();

        loader.open(&mut engine, Path::new("/a.pdf"), start);
        let first = loader.pending().expect("a pending").handle;

        loader.open(&mut engine, Path::new("/b.pdf"), start + INTERVAL);
        let second = loader.pending().expect("b pending").handle;

        assert!(engine.released.contains(&first));

        // The superseded handle flipping to ready must never be observed.
        engine.set_status(first, LoadStatus::Ready);
        let stale = transition(
            loader.state().clone(),
            LoadEvent::Tick { handle: first, status: LoadStatus::Ready, detail: None, now: start },
            TIMEOUT,
        );
        assert!(stale.1.is_empty());
        assert!(matches!(stale.0, LoadState::Pending(ref p) if p.handle == second));

        assert_eq!(loader.poll(&mut engine, start + INTERVAL * 2), LoadOutcome::Pending);
        engine.set_status(second, LoadStatus::Ready);
        let outcome = loader.poll(&mut engine, start + INTERVAL * 3);

        assert!(matches!(outcome, LoadOutcome::Finalized(ref doc) if doc.path == Path::new("/b.pdf")));
        assert_eq!(loader.current().map(|doc| doc.handle), Some(second));
    }

    #[test]
    fn supersession_holds_for_either_resolution_order() {
        for b_first in [false, true] {
            let mut engine = ScriptedEngine::default();
            let mut loader = controller();
            let start = Instant::now();

            loader.open(&mut engine, Path::new("/a.pdf"), start);
            let a = loader.pending().expect("a pending").handle;
            loader.open(&mut engine, Path::new("/b.pdf"), start);
            let b = loader.pending().expect("b pending").handle;

            let order = if b_first { [b, a] } else { [a, b] };
            let mut now = start;
            for handle in order {
                engine.statuses.insert(handle, LoadStatus::Ready);
                now += INTERVAL;
                loader.poll(&mut engine, now);
            }

            let current = loader.current().expect("b finalized");
            assert_eq!(current.handle, b);
            assert_eq!(current.path, Path::new("/b.pdf"));
        }
    }

    #[test]
    fn timeout_fires_within_one_interval_of_the_deadline() {
        let mut engine = ScriptedEngine::default();
        let mut loader = controller();
        let start = Instant::now();

        loader.open(&mut engine, Path::new("/never.pdf"), start);

        let mut elapsed = Duration::ZERO;
        let failure = loop {
            elapsed += INTERVAL;
            match loader.poll(&mut engine, start + elapsed) {
                LoadOutcome::Pending => assert!(elapsed <= TIMEOUT, "still pending past deadline"),
                LoadOutcome::Failed(failure) => break failure,
                other => panic!("unexpected outcome {other:?}"),
            }
        };

        assert!(elapsed > TIMEOUT);
        assert!(elapsed <= TIMEOUT + INTERVAL);
        assert!(matches!(failure, LoadFailure::Timeout { .. }));
        let message = failure.to_string();
        assert!(message.contains("10s"));
        assert!(message.contains("/never.pdf"));
        assert_eq!(engine.live(), 0);
        assert!(!loader.is_polling());
    }

    #[test]
    fn failures_leave_current_document_intact() {
        let mut engine = ScriptedEngine::default()
            .with_doc("/good.pdf", LoadStatus::Ready, 4)
            .with_doc("/bad.pdf", LoadStatus::Error, 0);
        engine.rejected.push(PathBuf::from("/missing.pdf"));
        let mut loader = controller();
        let now = Instant::now();

        loader.open(&mut engine, Path::new("/good.pdf"), now);
        let good = loader.current().expect("good loaded").handle;

        let outcome = loader.open(&mut engine, Path::new("/bad.pdf"), now);
        assert!(matches!(outcome, LoadOutcome::Failed(LoadFailure::Status { reason: Some(_), .. })));

        let outcome = loader.open(&mut engine, Path::new("/missing.pdf"), now);
        assert!(matches!(outcome, LoadOutcome::Failed(LoadFailure::CallFailed { .. })));

        loader.open(&mut engine, Path::new("/slow.pdf"), now);
        let slow = loader.pending().expect("slow pending").handle;
        engine.set_status(slow, LoadStatus::Error);
        let outcome = loader.poll(&mut engine, now + INTERVAL);
        assert!(matches!(outcome, LoadOutcome::Failed(LoadFailure::Status { .. })));

        assert_eq!(loader.current().map(|doc| doc.handle), Some(good));
        assert_eq!(engine.live(), 1);
    }

    #[test]
    fn finalize_releases_previous_current() {
        let mut engine = ScriptedEngine::default()
            .with_doc("/a.pdf", LoadStatus::Ready, 1)
            .with_doc("/b.pdf", LoadStatus::Ready, 1);
        let mut loader = controller();

        loader.open(&mut engine, Path::new("/a.pdf"), Instant::now());
        let a = loader.current().expect("a").handle;
        loader.open(&mut engine, Path::new("/b.pdf"), Instant::now());

        assert_eq!(engine.released, vec![a]);
        assert_eq!(engine.live(), 1);

        loader.release_all(&mut engine);
        assert_eq!(engine.live(), 0);
        assert!(loader.current().is_none());
    }

    #[test]
    fn poll_without_pending_is_a_no_op() {
        let mut engine = ScriptedEngine::default();
        let mut loader = controller();

        assert_eq!(loader.poll(&mut engine, Instant::now()), LoadOutcome::Unchanged);
        assert_eq!(loader.state(), &LoadState::Idle);
    }
}
