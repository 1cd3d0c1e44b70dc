//! Per-document notes, written through to the config file on every change.

use crate::error::ViewerError;
use doc_model::{Note, NoteKey, PageNumber, SessionConfig};
use std::path::{Path, PathBuf};
use storage::ConfigStore;

/// Directory adopted as root on startup when none is configured.
pub const DEFAULT_ROOT_DIR: &str = "data";

/// Owns the session config and keeps it in sync with its [`ConfigStore`].
///
/// Documents are identified by path. The store key is recomputed on every call
/// from the current root; keys written by older versions as absolute paths are
/// still found when the root-relative key has no entry.
#[derive(Debug)]
pub struct NoteStore {
    store: ConfigStore,
    config: SessionConfig,
    warned: bool,
    warning: Option<ViewerError>,
}

impl NoteStore {
    /// Reads the config once. An unreadable file yields an empty config and is
    /// overwritten by the next change.
    pub fn load(store: ConfigStore) -> Self {
        let config = match store.load() {
            Ok(config) => config,
            Err(err) => {
                let err = ViewerError::ConfigUnreadable(err);
                log::warn!("{err} ({}); starting with an empty config", store.path().display());
                SessionConfig::default()
            }
        };

        Self { store, config, warned: false, warning: None }
    }

    /// [`NoteStore::load`] followed by startup root resolution: a stored root
    /// that is not a directory is dropped, and `<cwd>/data` is adopted when no
    /// root remains.
    pub fn open(store: ConfigStore, cwd: &Path) -> Self {
        let mut notes = Self::load(store);
        notes.settle_root(cwd);
        notes
    }

    fn settle_root(&mut self, cwd: &Path) {
        if let Some(root) = self.config.root_folder.as_deref() {
            if root.is_dir() {
                return;
            }
            log::warn!("{}; ignoring it", ViewerError::RootInvalid(root.to_path_buf()));
            self.config.root_folder = None;
        }

        let candidate = cwd.join(DEFAULT_ROOT_DIR);
        if candidate.is_dir() {
            log::info!("using {} as root folder", candidate.display());
            self.config.root_folder = Some(absolute(&candidate));
            self.persist();
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn root(&self) -> Option<&Path> {
        self.config.root_folder.as_deref()
    }

    pub fn set_root(&mut self, dir: &Path) -> Result<(), ViewerError> {
        if !dir.is_dir() {
            return Err(ViewerError::RootInvalid(dir.to_path_buf()));
        }

        self.config.root_folder = Some(absolute(dir));
        self.persist();
        Ok(())
    }

    pub fn clear_root(&mut self) {
        self.config.root_folder = None;
        self.persist();
    }

    /// Key new notes for `path` are stored under.
    pub fn key_for(&self, path: &Path) -> NoteKey {
        NoteKey::for_document(self.root(), path)
    }

    fn resolve(&self, path: &Path) -> NoteKey {
        let primary = self.key_for(path);
        let legacy = NoteKey::absolute(path);
        let legacy = (legacy != primary).then_some(legacy);
        self.config.notes.resolve(primary, legacy)
    }

    pub fn list(&self, path: &Path) -> &[Note] {
        self.config.notes.get(&self.resolve(path))
    }

    pub fn get(&self, path: &Path, index: usize) -> Result<&Note, ViewerError> {
        let notes = self.list(path);
        notes.get(index).ok_or(ViewerError::NoteIndexInvalid { index, len: notes.len() })
    }

    pub fn add(&mut self, path: &Path, page: u32, text: &str, page_count: Option<u32>) -> Note {
        let note = Note::new(PageNumber::clamped(page, page_count), text);
        let key = self.resolve(path);
        log::debug!("adding note to {key}: {}", note.label());
        self.config.notes.push(key, note.clone());
        self.persist();
        note
    }

    /// Replaces the note at `index`, returning the previous one.
    pub fn edit(
        &mut self,
        path: &Path,
        index: usize,
        page: u32,
        text: &str,
        page_count: Option<u32>,
    ) -> Result<Note, ViewerError> {
        let note = Note::new(PageNumber::clamped(page, page_count), text);
        let key = self.resolve(path);
        let previous = self.config.notes.replace(&key, index, note)?;
        self.persist();
        Ok(previous)
    }

    pub fn remove(&mut self, path: &Path, index: usize) -> Result<Note, ViewerError> {
        let key = self.resolve(path);
        let removed = self.config.notes.remove(&key, index)?;
        self.persist();
        Ok(removed)
    }

    /// The first save failure of the session, handed out once.
    pub fn take_warning(&mut self) -> Option<ViewerError> {
        self.warning.take()
    }

    fn persist(&mut self) {
        let Err(err) = self.store.save(&self.config) else {
            return;
        };

        log::warn!("could not save {}: {err}", self.store.path().display());
        if !self.warned {
            self.warned = true;
            self.warning = Some(ViewerError::ConfigUnwritable(err));
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
