use lopdf::Document;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Error,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl Default for PageSize {
    fn default() -> Self {
        Self { width_pt: 612.0, height_pt: 792.0 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("document {0} is not ready")]
    NotReady(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("backend error: {0}")]
    Backend(String),
}

/// The document engine behind the viewer.
///
/// `load` either finishes on the spot (`Ready` / `Error`) or hands back a
/// `Loading` handle whose progress is observed through `status`. Handles stay
/// valid until `release`; releasing a handle that is still loading abandons
/// the load.
pub trait PdfEngine {
    fn load(&mut self, path: &Path) -> Result<(DocumentHandle, LoadStatus), PdfEngineError>;
    fn status(&mut self, handle: DocumentHandle) -> LoadStatus;
    fn failure_reason(&self, _handle: DocumentHandle) -> Option<String> {
        None
    }
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    fn release(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

type ParseResult = Result<Vec<PageSize>, String>;

#[derive(Debug)]
enum Slot {
    Loading(Receiver<ParseResult>),
    Ready(Vec<PageSize>),
    Failed(String),
}

/// Engine that reads page geometry with `lopdf`.
///
/// Files up to `background_threshold` bytes are parsed inside `load`; bigger
/// files are parsed on a worker thread and surface through `status`.
#[derive(Debug)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, Slot>,
    background_threshold: u64,
}

impl Default for LopdfEngine {
    fn default() -> Self {
        Self::with_background_threshold(Self::DEFAULT_BACKGROUND_THRESHOLD)
    }
}

impl LopdfEngine {
    pub const DEFAULT_BACKGROUND_THRESHOLD: u64 = 512 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background_threshold(bytes: u64) -> Self {
        Self { next_handle: 0, docs: HashMap::new(), background_threshold: bytes }
    }

    pub fn open_documents(&self) -> usize {
        self.docs.len()
    }

    fn parse_sizes(bytes: &[u8]) -> ParseResult {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err("encrypted PDFs are not supported".to_owned());
        }

        let doc = Document::load_mem(bytes).map_err(|err| format!("PDF parse error: {err}"))?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id).map_err(|err| err.to_string())?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                .unwrap_or_default();

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err("document has no pages".to_owned());
        }

        Ok(sizes)
    }

    fn read_and_parse(path: &Path) -> ParseResult {
        let bytes = fs::read(path).map_err(|err| format!("I/O error: {err}"))?;
        Self::parse_sizes(&bytes)
    }

    fn next_handle(&mut self) -> DocumentHandle {
        self.next_handle += 1;
        DocumentHandle(self.next_handle)
    }

    fn sizes(&self, handle: DocumentHandle) -> Result<&[PageSize], PdfEngineError> {
        match self.docs.get(&handle) {
            Some(Slot::Ready(sizes)) => Ok(sizes),
            Some(_) => Err(PdfEngineError::NotReady(handle.raw())),
            None => Err(PdfEngineError::InvalidHandle(handle.raw())),
        }
    }
}

impl PdfEngine for LopdfEngine {
    fn load(&mut self, path: &Path) -> Result<(DocumentHandle, LoadStatus), PdfEngineError> {
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(PdfEngineError::NotAFile(path.to_path_buf()));
        }

        let handle = self.next_handle();

        if metadata.len() <= self.background_threshold {
            let (slot, status) = match Self::read_and_parse(path) {
                Ok(sizes) => (Slot::Ready(sizes), LoadStatus::Ready),
                Err(reason) => (Slot::Failed(reason), LoadStatus::Error),
            };
            self.docs.insert(handle, slot);
            return Ok((handle, status));
        }

        let (tx, rx) = mpsc::channel();
        let worker_path = path.to_path_buf();
        thread::Builder::new()
            .name(format!("pdf-load-{}", handle.raw()))
            .spawn(move || {
                // The receiver is gone when the load was abandoned.
                let _ = tx.send(Self::read_and_parse(&worker_path));
            })
            .map_err(|err| PdfEngineError::Backend(format!("failed to start load worker: {err}")))?;

        log::debug!("loading {} in background as handle {}", path.display(), handle.raw());
        self.docs.insert(handle, Slot::Loading(rx));
        Ok((handle, LoadStatus::Loading))
    }

    fn status(&mut self, handle: DocumentHandle) -> LoadStatus {
        let Some(slot) = self.docs.get_mut(&handle) else {
            return LoadStatus::Error;
        };

        let Slot::Loading(rx) = slot else {
            return match slot {
                Slot::Ready(_) => LoadStatus::Ready,
                _ => LoadStatus::Error,
            };
        };

        let (next, status) = match rx.try_recv() {
            Err(TryRecvError::Empty) => return LoadStatus::Loading,
            Ok(Ok(sizes)) => (Slot::Ready(sizes), LoadStatus::Ready),
            Ok(Err(reason)) => (Slot::Failed(reason), LoadStatus::Error),
            Err(TryRecvError::Disconnected) => {
                (Slot::Failed("load worker exited without a result".to_owned()), LoadStatus::Error)
            }
        };

        *slot = next;
        status
    }

    fn failure_reason(&self, handle: DocumentHandle) -> Option<String> {
        match self.docs.get(&handle) {
            Some(Slot::Failed(reason)) => Some(reason.clone()),
            _ => None,
        }
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.sizes(handle)?.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let sizes = self.sizes(handle)?;
        sizes
            .get(page_index as usize)
            .copied()
            .ok_or(PdfEngineError::PageOutOfRange { page: page_index, page_count: sizes.len() as u32 })
    }

    fn release(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl<E: PdfEngine + ?Sized> PdfEngine for Box<E> {
    fn load(&mut self, path: &Path) -> Result<(DocumentHandle, LoadStatus), PdfEngineError> {
        (**self).load(path)
    }

    fn status(&mut self, handle: DocumentHandle) -> LoadStatus {
        (**self).status(handle)
    }

    fn failure_reason(&self, handle: DocumentHandle) -> Option<String> {
        (**self).failure_reason(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        (**self).page_count(handle)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        (**self).page_size(handle, page_index)
    }

    fn release(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        (**self).release(handle)
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// Requires the system pdfium library; document handling is shared with
    /// [`LopdfEngine`].
    #[derive(Debug)]
    pub struct PdfiumEngine {
        inner: LopdfEngine,
    }

    impl PdfiumEngine {
        pub fn from_system_library() -> Result<Self, PdfEngineError> {
            let _ = Pdfium::bind_to_system_library().map_err(|err| {
                PdfEngineError::Backend(format!("failed to bind pdfium system library: {err}"))
            })?;

            Ok(Self { inner: LopdfEngine::default() })
        }
    }

    impl PdfEngine for PdfiumEngine {
        fn load(&mut self, path: &Path) -> Result<(DocumentHandle, LoadStatus), PdfEngineError> {
            self.inner.load(path)
        }

        fn status(&mut self, handle: DocumentHandle) -> LoadStatus {
            self.inner.status(handle)
        }

        fn failure_reason(&self, handle: DocumentHandle) -> Option<String> {
            self.inner.failure_reason(handle)
        }

        fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
            self.inner.page_count(handle)
        }

        fn page_size(
            &self,
            handle: DocumentHandle,
            page_index: u32,
        ) -> Result<PageSize, PdfEngineError> {
            self.inner.page_size(handle, page_index)
        }

        fn release(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
            self.inner.release(handle)
        }
    }
}

/// The engine the front end runs with. Fails only when a native backend was
/// compiled in and cannot be bound.
#[cfg(feature = "pdfium")]
pub fn default_engine() -> Result<Box<dyn PdfEngine>, PdfEngineError> {
    Ok(Box::new(pdfium_backend::PdfiumEngine::from_system_library()?))
}

#[cfg(not(feature = "pdfium"))]
pub fn default_engine() -> Result<Box<dyn PdfEngine>, PdfEngineError> {
    Ok(Box::new(LopdfEngine::new()))
}
