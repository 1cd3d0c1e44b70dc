//! Viewer session logic: document loading, notes, navigation and the file tree.
//!
//! Everything here runs on the caller's thread. Front ends drive a [`Session`]
//! from their event loop and call [`Session::poll`] on a timer while a load is
//! pending.

mod error;
pub mod load;
pub mod notes;
pub mod session;
pub mod status;
pub mod surface;
pub mod tree;

pub use error::ViewerError;
pub use load::{LoadController, LoadFailure, LoadOptions, LoadState};
pub use notes::NoteStore;
pub use session::{LoadProgress, Session};
pub use status::Status;
pub use surface::{RenderSurface, Viewport, ZoomMode};
pub use tree::{EntryKind, FileTree, TreeEntry};
