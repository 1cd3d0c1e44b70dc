use crate::load::LoadFailure;
use doc_model::NoteIndexError;
use std::path::PathBuf;
use storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("config file is unreadable: {0}")]
    ConfigUnreadable(#[source] StorageError),
    #[error("could not save config: {0}")]
    ConfigUnwritable(#[from] StorageError),
    #[error("root folder is not a directory: {}", .0.display())]
    RootInvalid(PathBuf),
    #[error(transparent)]
    Load(#[from] LoadFailure),
    #[error("select a note first ({len} notes, index {index} requested)")]
    NoteIndexInvalid { index: usize, len: usize },
    #[error("open a PDF first")]
    NoDocument,
    #[error("document engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl From<NoteIndexError> for ViewerError {
    fn from(err: NoteIndexError) -> Self {
        Self::NoteIndexInvalid { index: err.index, len: err.len }
    }
}
