use crate::error::ViewerError;
use crate::load::{LoadController, LoadOptions, LoadOutcome, LoadState, LoadedDocument};
use crate::notes::NoteStore;
use crate::status::{current_page_index, scroll_for_page, Status};
use crate::surface::{self, RenderSurface, ZoomMode};
use doc_model::{breadcrumb, file_name, Note, PageNumber};
use pdf_engine::PdfEngine;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Result of an open request or poll tick that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProgress {
    /// The document is now current.
    Ready(PathBuf),
    /// Still loading; keep polling.
    Pending,
    /// Nothing was pending.
    Idle,
}

/// One viewer window's worth of state.
pub struct Session<E: PdfEngine, S: RenderSurface> {
    engine: E,
    surface: S,
    loader: LoadController,
    notes: NoteStore,
    page_count: Option<u32>,
    status: Status,
}

impl<E: PdfEngine, S: RenderSurface> Session<E, S> {
    pub fn new(engine: E, surface: S, notes: NoteStore, options: LoadOptions) -> Self {
        let mut session = Self {
            engine,
            surface,
            loader: LoadController::new(options),
            notes,
            page_count: None,
            status: Status::Ready,
        };
        session.refresh_status();
        session
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn note_store(&self) -> &NoteStore {
        &self.notes
    }

    pub fn poll_interval(&self) -> Duration {
        self.loader.options().poll_interval
    }

    /// Starts loading `path`, superseding any load still in flight.
    pub fn open_document(&mut self, path: &Path) -> Result<LoadProgress, ViewerError> {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        log::info!("opening {}", path.display());

        let outcome = self.loader.open(&mut self.engine, &path, Instant::now());
        self.settle(outcome)
    }

    /// Timer callback while [`Session::is_pending`] holds.
    pub fn poll(&mut self) -> Result<LoadProgress, ViewerError> {
        let outcome = self.loader.poll(&mut self.engine, Instant::now());
        self.settle(outcome)
    }

    pub fn is_pending(&self) -> bool {
        self.loader.is_polling()
    }

    fn settle(&mut self, outcome: LoadOutcome) -> Result<LoadProgress, ViewerError> {
        let progress = match outcome {
            LoadOutcome::Finalized(document) => {
                let path = document.path.clone();
                self.finalize(document);
                Ok(LoadProgress::Ready(path))
            }
            LoadOutcome::Pending => Ok(LoadProgress::Pending),
            LoadOutcome::Unchanged => Ok(LoadProgress::Idle),
            LoadOutcome::Failed(failure) => Err(ViewerError::Load(failure)),
        };

        self.refresh_status();
        progress
    }

    fn finalize(&mut self, document: LoadedDocument) {
        let page_count = match self.engine.page_count(document.handle) {
            Ok(count) => count,
            Err(err) => {
                log::warn!("page count unavailable for {}: {err}", document.path.display());
                0
            }
        };

        self.surface.set_document(document.handle, page_count);
        self.surface.set_zoom_mode(ZoomMode::FitWidth);
        self.surface.set_scroll_value(0);
        self.page_count = Some(page_count);
    }

    pub fn current_document(&self) -> Option<&Path> {
        self.loader.current().map(|document| document.path.as_path())
    }

    pub fn page_count(&self) -> Option<u32> {
        self.current_document().and(self.page_count)
    }

    pub fn root(&self) -> Option<&Path> {
        self.notes.root()
    }

    pub fn set_root(&mut self, dir: &Path) -> Result<(), ViewerError> {
        self.notes.set_root(dir)?;
        self.refresh_status();
        Ok(())
    }

    pub fn clear_root(&mut self) {
        self.notes.clear_root();
        self.refresh_status();
    }

    fn require_document(&self) -> Result<PathBuf, ViewerError> {
        self.current_document().map(Path::to_path_buf).ok_or(ViewerError::NoDocument)
    }

    pub fn notes(&self) -> Result<&[Note], ViewerError> {
        let path = self.current_document().ok_or(ViewerError::NoDocument)?;
        Ok(self.notes.list(path))
    }

    pub fn add_note(&mut self, page: u32, text: &str) -> Result<Note, ViewerError> {
        let path = self.require_document()?;
        Ok(self.notes.add(&path, page, text, self.page_count()))
    }

    pub fn edit_note(&mut self, index: usize, page: u32, text: &str) -> Result<Note, ViewerError> {
        let path = self.require_document()?;
        self.notes.edit(&path, index, page, text, self.page_count())
    }

    pub fn remove_note(&mut self, index: usize) -> Result<Note, ViewerError> {
        let path = self.require_document()?;
        self.notes.remove(&path, index)
    }

    /// Scrolls to the page of the note at `index` and returns that page.
    pub fn jump_to_note(&mut self, index: usize) -> Result<PageNumber, ViewerError> {
        let path = self.require_document()?;
        let page_count = self.page_count().unwrap_or(0);
        let page = PageNumber::clamped(self.notes.get(&path, index)?.page.get(), Some(page_count));

        if !self.surface.jump_to_page(page.index()) {
            let value = scroll_for_page(page, page_count, self.surface.scroll_maximum());
            self.surface.set_scroll_value(value);
        }

        self.refresh_status();
        Ok(page)
    }

    pub fn scroll_to(&mut self, value: u32) {
        self.surface.set_scroll_value(value);
        self.refresh_status();
    }

    /// Scrolls to `fraction` of the scroll range, clamped to `[0, 1]`.
    pub fn scroll_to_fraction(&mut self, fraction: f64) {
        let maximum = self.surface.scroll_maximum();
        let value = (fraction.clamp(0.0, 1.0) * f64::from(maximum)).floor() as u32;
        self.scroll_to(value);
    }

    pub fn zoom_in(&mut self) {
        if self.current_document().is_some() {
            surface::zoom_in(&mut self.surface);
            self.refresh_status();
        }
    }

    pub fn zoom_out(&mut self) {
        if self.current_document().is_some() {
            surface::zoom_out(&mut self.surface);
            self.refresh_status();
        }
    }

    /// 1-based page currently under the scroll position.
    pub fn current_page(&self) -> Option<u32> {
        let page_count = self.page_count()?;
        let index = current_page_index(
            self.surface.scroll_value(),
            self.surface.scroll_maximum(),
            page_count,
        );
        Some(index + 1)
    }

    pub fn refresh_status(&mut self) {
        self.status = if let Some(pending) = self.loader.pending() {
            Status::Opening(file_name(&pending.path))
        } else if let Some(path) = self.current_document() {
            Status::page(
                self.surface.scroll_value(),
                self.surface.scroll_maximum(),
                self.page_count.unwrap_or(0),
                breadcrumb(self.notes.root(), path),
            )
        } else if matches!(self.loader.state(), LoadState::Error(_)) {
            Status::LoadFailed
        } else if self.notes.root().is_none() {
            Status::Welcome
        } else {
            Status::Ready
        };
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn status_text(&self) -> String {
        self.status.to_string()
    }

    pub fn take_warning(&mut self) -> Option<ViewerError> {
        self.notes.take_warning()
    }

    /// Releases every document handle. The session stays usable.
    pub fn shutdown(&mut self) {
        self.loader.release_all(&mut self.engine);
        self.surface.clear_document();
        self.page_count = None;
        self.refresh_status();
    }
}
