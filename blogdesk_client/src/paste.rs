//! Paste-to-upload: an image pasted into the markdown editor becomes an
//! uploaded, linked image without going through a file picker.
//!
//! A paste inserts `![Uploading <name>...](pending-<token>)` at the cursor
//! and starts the upload. On success the placeholder is swapped for
//! `![<name>](<url>)`; on failure it is removed and one error is reported.
//! Every paste gets its own token, so concurrent uploads only ever touch
//! their own placeholder, whatever order they finish in.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{FileUploadApi, UploadFile};
use crate::editor::SharedEditor;
use crate::notify::Notifier;

#[derive(Debug, Clone)]
pub struct ClipboardItem {
    pub mime: String,
    pub name: Option<String>,
    pub data: Bytes,
}

impl ClipboardItem {
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    /// Pasted screenshots usually carry no name; derive one from the mime type.
    fn file_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        let ext = self
            .mime
            .split('/')
            .nth(1)
            .and_then(|subtype| subtype.split('+').next())
            .filter(|ext| !ext.is_empty())
            .unwrap_or("png");
        format!("image.{ext}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasteEvent {
    pub items: Vec<ClipboardItem>,
}

impl PasteEvent {
    pub fn first_image(&self) -> Option<&ClipboardItem> {
        self.items.iter().find(|item| item.is_image())
    }
}

/// An upload in flight, identified by its placeholder token.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub placeholder_id: String,
    pub placeholder_text: String,
    pub file: UploadFile,
}

impl PendingUpload {
    fn new(file: UploadFile) -> Self {
        let placeholder_id = Uuid::new_v4().simple().to_string();
        let placeholder_text = format!("![Uploading {}...](pending-{placeholder_id})", file.name);
        Self {
            placeholder_id,
            placeholder_text,
            file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResolution {
    /// `placed` is false when the placeholder had already been edited away.
    Linked { url: String, placed: bool },
    Failed,
    /// The editor was unmounted before the upload finished.
    Discarded,
}

pub struct UploadHandle {
    pub token: String,
    pub placeholder: String,
    task: JoinHandle<UploadResolution>,
}

impl UploadHandle {
    pub async fn resolved(self) -> UploadResolution {
        self.task.await.unwrap_or(UploadResolution::Discarded)
    }
}

pub enum PasteOutcome {
    /// Not an image paste; the host should let the default paste through.
    Ignored,
    /// The default paste must be suppressed; the upload is running.
    Uploading(UploadHandle),
}

/// Paste listener bound to one mounted editor. Dropping it unmounts: any
/// upload still running is abandoned and will not touch the editor.
pub struct PasteInterceptor {
    editor: SharedEditor,
    uploader: Arc<dyn FileUploadApi>,
    notifier: Arc<dyn Notifier>,
    mounted: CancellationToken,
}

impl PasteInterceptor {
    pub fn mount(
        editor: SharedEditor,
        uploader: Arc<dyn FileUploadApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            editor,
            uploader,
            notifier,
            mounted: CancellationToken::new(),
        }
    }

    pub fn unmount(self) {}

    /// Must be called from within a Tokio runtime.
    pub fn handle_paste(&self, event: PasteEvent) -> PasteOutcome {
        let Some(item) = event.first_image() else {
            return PasteOutcome::Ignored;
        };
        let pending = PendingUpload::new(UploadFile {
            name: item.file_name(),
            mime: item.mime.clone(),
            data: item.data.clone(),
        });
        self.editor
            .with(|state| state.insert_at_cursor(&pending.placeholder_text));
        tracing::debug!(
            token = %pending.placeholder_id,
            file = %pending.file.name,
            bytes = pending.file.data.len(),
            "image pasted, uploading"
        );

        let token = pending.placeholder_id.clone();
        let placeholder = pending.placeholder_text.clone();
        let task = tokio::spawn(resolve_upload(
            pending,
            self.editor.clone(),
            self.uploader.clone(),
            self.notifier.clone(),
            self.mounted.clone(),
        ));
        PasteOutcome::Uploading(UploadHandle {
            token,
            placeholder,
            task,
        })
    }
}

impl Drop for PasteInterceptor {
    fn drop(&mut self) {
        self.mounted.cancel();
    }
}

async fn resolve_upload(
    pending: PendingUpload,
    editor: SharedEditor,
    uploader: Arc<dyn FileUploadApi>,
    notifier: Arc<dyn Notifier>,
    mounted: CancellationToken,
) -> UploadResolution {
    let PendingUpload {
        placeholder_id,
        placeholder_text,
        file,
    } = pending;
    let name = file.name.clone();

    let result = tokio::select! {
        biased;
        _ = mounted.cancelled() => None,
        result = uploader.upload_file(file) => Some(result),
    };
    let Some(result) = result.filter(|_| !mounted.is_cancelled()) else {
        tracing::debug!(token = %placeholder_id, "editor unmounted, dropping upload result");
        return UploadResolution::Discarded;
    };

    match result {
        Ok(uploaded) => {
            let link = format!("![{name}]({})", uploaded.url);
            let placed = editor.with(|state| state.replace_once(&placeholder_text, &link));
            if !placed {
                tracing::debug!(token = %placeholder_id, "placeholder no longer present");
            }
            UploadResolution::Linked {
                url: uploaded.url,
                placed,
            }
        }
        Err(err) => {
            editor.with(|state| state.replace_once(&placeholder_text, ""));
            tracing::warn!(token = %placeholder_id, error = %err, "image upload failed");
            notifier.error(&format!("Failed to upload {name}: {err}"));
            UploadResolution::Failed
        }
    }
}
