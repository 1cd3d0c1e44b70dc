use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;
use std::path::{Component, Path, PathBuf};

/// A 1-based page number. Zero never survives construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct PageNumber(NonZeroU32);

impl PageNumber {
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    pub fn new(page: u32) -> Option<Self> {
        NonZeroU32::new(page).map(Self)
    }

    /// Clamps `page` into `[1, page_count]`, or `[1, ∞)` when the count is unknown.
    pub fn clamped(page: u32, page_count: Option<u32>) -> Self {
        let upper = match page_count {
            Some(count) if count > 0 => count,
            _ => u32::MAX,
        };

        Self::new(page.clamp(1, upper)).unwrap_or(Self::FIRST)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn index(self) -> u32 {
        self.get() - 1
    }
}

impl From<u32> for PageNumber {
    fn from(value: u32) -> Self {
        Self::clamped(value, None)
    }
}

impl From<PageNumber> for u32 {
    fn from(value: PageNumber) -> Self {
        value.get()
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub page: PageNumber,
    pub text: String,
}

impl Note {
    pub fn new(page: PageNumber, text: impl Into<String>) -> Self {
        Self { page, text: text.into().trim().to_owned() }
    }

    pub fn label(&self) -> String {
        format!("[p{}] {}", self.page, self.text)
    }
}

/// Storage key of a document in the notes map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteKey(String);

impl NoteKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key derived from the absolute path alone. Older stores used this form.
    pub fn absolute(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    /// Root-relative key when a root is configured and the relative path can be
    /// computed, otherwise the absolute path.
    pub fn for_document(root: Option<&Path>, path: &Path) -> Self {
        root.and_then(|root| relative_path(path, root))
            .map(|relative| Self(relative.to_string_lossy().into_owned()))
            .unwrap_or_else(|| Self::absolute(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("note index {index} out of range ({len} notes)")]
pub struct NoteIndexError {
    pub index: usize,
    pub len: usize,
}

/// Notes per document. No key ever maps to an empty list.
///
/// Reading is lenient: an entry that is not a valid note is dropped with a
/// warning instead of failing the whole config, and documents left without
/// notes get no key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Notes(BTreeMap<NoteKey, Vec<Note>>);

impl Notes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &NoteKey) -> &[Note] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &NoteKey) -> bool {
        self.0.contains_key(key)
    }

    /// Picks the key that actually holds notes for a document: `primary` when
    /// it has notes, else `legacy` when it has notes, else `primary`.
    pub fn resolve(&self, primary: NoteKey, legacy: Option<NoteKey>) -> NoteKey {
        if !self.get(&primary).is_empty() {
            return primary;
        }

        match legacy {
            Some(legacy) if !self.get(&legacy).is_empty() => legacy,
            _ => primary,
        }
    }

    pub fn push(&mut self, key: NoteKey, note: Note) {
        self.0.entry(key).or_default().push(note);
    }

    pub fn replace(
        &mut self,
        key: &NoteKey,
        index: usize,
        note: Note,
    ) -> Result<Note, NoteIndexError> {
        let len = self.get(key).len();
        let slot = self
            .0
            .get_mut(key)
            .and_then(|notes| notes.get_mut(index))
            .ok_or(NoteIndexError { index, len })?;

        Ok(std::mem::replace(slot, note))
    }

    pub fn remove(&mut self, key: &NoteKey, index: usize) -> Result<Note, NoteIndexError> {
        let len = self.get(key).len();
        if index >= len {
            return Err(NoteIndexError { index, len });
        }

        let Some(notes) = self.0.get_mut(key) else {
            return Err(NoteIndexError { index, len });
        };

        let removed = notes.remove(index);
        if notes.is_empty() {
            self.0.remove(key);
        }

        Ok(removed)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_value(raw: Value) -> Self {
        let documents = match raw {
            Value::Object(documents) => documents,
            Value::Null => return Self::default(),
            other => {
                log::warn!("ignoring notes: expected an object, found {other}");
                return Self::default();
            }
        };

        let mut notes = BTreeMap::new();
        for (key, entries) in documents {
            let Value::Array(entries) = entries else {
                log::warn!("ignoring notes for {key}: expected a list, found {entries}");
                continue;
            };

            let kept: Vec<Note> = entries
                .into_iter()
                .filter_map(|entry| match serde_json::from_value(entry.clone()) {
                    Ok(note) => Some(note),
                    Err(err) => {
                        log::warn!("dropping unreadable note {entry} for {key}: {err}");
                        None
                    }
                })
                .collect();

            if !kept.is_empty() {
                notes.insert(NoteKey(key), kept);
            }
        }

        Self(notes)
    }
}

impl<'de> Deserialize<'de> for Notes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default, with = "root_folder")]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub notes: Notes,
    /// Top-level keys this version does not understand; written back untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

mod root_folder {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::path::PathBuf;

    pub fn serialize<S: Serializer>(value: &Option<PathBuf>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(path) => serializer.serialize_str(&path.to_string_lossy()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PathBuf>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.filter(|value| !value.trim().is_empty()).map(PathBuf::from))
    }
}

/// Lexical equivalent of a `relpath`: `path` expressed relative to `root`.
///
/// Both paths must be absolute and share the same anchor (drive prefix and
/// root); otherwise there is no relative form and `None` is returned.
pub fn relative_path(path: &Path, root: &Path) -> Option<PathBuf> {
    if !path.is_absolute() || !root.is_absolute() {
        return None;
    }

    let path = normalize(path);
    let root = normalize(root);

    if anchor(&path) != anchor(&root) {
        return None;
    }

    let common = path.iter().zip(root.iter()).take_while(|(a, b)| a == b).count();

    let mut relative = PathBuf::new();
    for _ in common..root.len() {
        relative.push("..");
    }
    for component in &path[common..] {
        relative.push(component.as_os_str());
    }

    if relative.as_os_str().is_empty() {
        relative.push(".");
    }

    Some(relative)
}

/// Root-relative display path with ` / ` separators, or the file name.
pub fn breadcrumb(root: Option<&Path>, path: &Path) -> String {
    if let Some(relative) = root.and_then(|root| relative_path(path, root)) {
        let parts: Vec<_> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        return parts.join(" / ");
    }

    file_name(path)
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }

    out
}

fn anchor<'a>(components: &[Component<'a>]) -> Vec<Component<'a>> {
    components
        .iter()
        .take_while(|component| matches!(component, Component::Prefix(_) | Component::RootDir))
        .copied()
        .collect()
}
