//! Page tracking and the one-line status text.

use doc_model::PageNumber;
use std::fmt;
use std::time::Duration;

/// Period of the safety refresh a front end runs alongside scroll events.
pub const STATUS_REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// 0-based page under a scroll position: `floor(value / maximum * page_count)`
/// clamped into the document.
pub fn current_page_index(value: u32, maximum: u32, page_count: u32) -> u32 {
    if page_count == 0 || maximum == 0 {
        return 0;
    }

    let value = u64::from(value.min(maximum));
    let index = value * u64::from(page_count) / u64::from(maximum);
    (index as u32).min(page_count - 1)
}

/// Scroll position that puts `page` at the same fraction of the document:
/// `floor((page - 1) / max(1, page_count - 1) * maximum)`.
pub fn scroll_for_page(page: PageNumber, page_count: u32, maximum: u32) -> u32 {
    let steps = u64::from(page_count.saturating_sub(1).max(1));
    let offset = u64::from(page.index()).min(steps);
    (offset * u64::from(maximum) / steps) as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Welcome,
    Ready,
    Opening(String),
    LoadFailed,
    Page { current: u32, total: u32, label: String },
}

impl Status {
    pub fn page(value: u32, maximum: u32, page_count: u32, label: impl Into<String>) -> Self {
        Self::Page {
            current: current_page_index(value, maximum, page_count) + 1,
            total: page_count,
            label: label.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome => f.write_str("Welcome. Select a root folder."),
            Self::Ready => f.write_str("Ready"),
            Self::Opening(name) => write!(f, "Opening: {name}"),
            Self::LoadFailed => f.write_str("Error opening PDF"),
            Self::Page { current, total, label } => write!(f, "Page {current}/{total} — {label}"),
        }
    }
}
