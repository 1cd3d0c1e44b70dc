use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::ViewerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub kind: EntryKind,
    /// Nesting below the root; direct children are at depth 0.
    pub depth: usize,
    pub name: String,
    pub path: PathBuf,
}

/// Snapshot of the directories and PDF files under a root, in display order:
/// directories before files, names compared case-insensitively. Hidden entries
/// are skipped.
#[derive(Debug, Clone, Default)]
pub struct FileTree {
    root: PathBuf,
    entries: Vec<TreeEntry>,
}

impl FileTree {
    pub fn scan(root: &Path) -> Result<Self, ViewerError> {
        if !root.is_dir() {
            return Err(ViewerError::RootInvalid(root.to_path_buf()));
        }

        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        let mut entries = Vec::new();

        let walker = WalkDir::new(&root)
            .min_depth(1)
            .sort_by(display_order)
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("skipping unreadable entry under {}: {err}", root.display());
                    continue;
                }
            };

            let kind = if entry.file_type().is_dir() {
                EntryKind::Directory
            } else if is_pdf(entry.path()) {
                EntryKind::Document
            } else {
                continue;
            };

            entries.push(TreeEntry {
                kind,
                depth: entry.depth() - 1,
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.into_path(),
            });
        }

        log::debug!("scanned {} entries under {}", entries.len(), root.display());
        Ok(Self { root, entries })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn documents(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|entry| entry.kind == EntryKind::Document)
    }

    /// Absolute path of the document at `index`; `None` for directories.
    pub fn document_at(&self, index: usize) -> Option<&Path> {
        self.entries
            .get(index)
            .filter(|entry| entry.kind == EntryKind::Document)
            .map(|entry| entry.path.as_path())
    }

    pub fn find(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|entry| entry.path == path)
    }
}

fn display_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    let a_dir = a.file_type().is_dir();
    let b_dir = b.file_type().is_dir();

    b_dir.cmp(&a_dir).then_with(|| {
        let a_name = a.file_name().to_string_lossy().to_lowercase();
        let b_name = b.file_name().to_string_lossy().to_lowercase();
        a_name.cmp(&b_name).then_with(|| a.file_name().cmp(b.file_name()))
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_pdf(path: &Path) -> bool {
    path.extension().and_then(OsStr::to_str).is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
