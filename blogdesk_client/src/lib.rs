//! Headless client core for the blog CMS: post editor with draft autosave,
//! paste-to-upload images, and a server-synced comment tree.

pub mod api;
pub mod autosave;
pub mod comments;
pub mod config;
pub mod draft;
pub mod editor;
pub mod models;
pub mod notify;
pub mod paste;
pub mod publish;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use api::{BlogApiClient, CommentApi, FileUploadApi, PostApi, UploadFile};
pub use autosave::{AutosaveController, AutosaveState};
pub use comments::{CommentError, CommentNode, CommentReconciler, ResyncTarget};
pub use config::ClientConfig;
pub use draft::{Draft, DraftStore, DraftStoreError, MemoryDraftStore, SqliteDraftStore};
pub use editor::{EditMode, EditorState, SharedEditor};
pub use notify::{Notifier, TracingNotifier};
pub use paste::{ClipboardItem, PasteEvent, PasteInterceptor, PasteOutcome, UploadResolution};
pub use publish::{EditorSettings, PostEditor, PostEditorError};
