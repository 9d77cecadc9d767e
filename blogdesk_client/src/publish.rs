use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::api::PostApi;
use crate::autosave::{AutosaveController, Clock, DEFAULT_AUTOSAVE_INTERVAL};
use crate::config::ClientConfig;
use crate::draft::DraftStore;
use crate::editor::{EditMode, SharedEditor};
use crate::models::{PostRequest, PostStatus, PostView};
use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorSettings {
    pub autosave_interval: Duration,
    pub summary_chars: usize,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            summary_chars: 200,
        }
    }
}

impl From<&ClientConfig> for EditorSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            autosave_interval: config.autosave_interval(),
            summary_chars: config.summary_chars,
        }
    }
}

#[derive(Debug, Error)]
pub enum PostEditorError {
    #[error("post title may not be empty")]
    EmptyTitle,
    #[error("post content may not be empty")]
    EmptyContent,
    #[error("no post is open for editing")]
    NotOpen,
    #[error(transparent)]
    Api(#[from] anyhow::Error),
}

/// The post form: loads a draft or an existing post, autosaves new posts,
/// and publishes.
pub struct PostEditor {
    /// `None` until `open` succeeds, and again after a new post is published.
    mode: Option<EditMode>,
    editor: SharedEditor,
    store: Arc<dyn DraftStore>,
    posts: Arc<dyn PostApi>,
    notifier: Arc<dyn Notifier>,
    autosave: AutosaveController,
    summary_chars: usize,
}

impl PostEditor {
    pub fn new(
        posts: Arc<dyn PostApi>,
        store: Arc<dyn DraftStore>,
        notifier: Arc<dyn Notifier>,
        settings: EditorSettings,
    ) -> Self {
        let editor = SharedEditor::default();
        let autosave = AutosaveController::new(
            editor.clone(),
            store.clone(),
            notifier.clone(),
            settings.autosave_interval,
        );
        Self {
            mode: None,
            editor,
            store,
            posts,
            notifier,
            autosave,
            summary_chars: settings.summary_chars,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.autosave = self.autosave.with_clock(clock);
        self
    }

    pub fn mode(&self) -> Option<EditMode> {
        self.mode
    }

    pub fn editor(&self) -> &SharedEditor {
        &self.editor
    }

    pub fn autosave(&self) -> &AutosaveController {
        &self.autosave
    }

    /// Enters new-post or edit mode. A new post resumes the stored draft;
    /// an edit loads the post and never reads or writes the draft store.
    /// The mode only takes effect once loading succeeds.
    pub async fn open(&mut self, mode: EditMode) -> Result<(), PostEditorError> {
        self.mode = None;
        match mode {
            EditMode::New => {
                match self.store.load() {
                    Some(draft) => {
                        tracing::info!(last_saved = %draft.last_saved, "resuming saved draft");
                        self.editor.with(|state| state.apply_draft(&draft));
                    }
                    None => self.editor.with(|state| *state = Default::default()),
                }
                self.autosave.arm(mode);
                self.mode = Some(mode);
                Ok(())
            }
            EditMode::Edit(post_id) => {
                self.autosave.arm(mode);
                self.editor.with(|state| *state = Default::default());
                let post = match self.posts.get_post(post_id).await {
                    Ok(post) => post,
                    Err(err) => {
                        tracing::warn!(post_id, error = %err, "failed to load post");
                        self.notifier.error("Failed to load post");
                        return Err(err.into());
                    }
                };
                self.editor.with(|state| {
                    state.title = post.title;
                    state.category_id = post.categories.first().map(|c| c.id);
                    state.tags = post.tags.into_iter().map(|t| t.name).collect();
                    state.set_content(post.content);
                });
                self.mode = Some(mode);
                Ok(())
            }
        }
    }

    fn build_request(&self) -> Result<PostRequest, PostEditorError> {
        let summary_chars = self.summary_chars;
        self.editor.with(|state| {
            if state.title.trim().is_empty() {
                return Err(PostEditorError::EmptyTitle);
            }
            if state.content().trim().is_empty() {
                return Err(PostEditorError::EmptyContent);
            }
            Ok(PostRequest {
                title: state.title.clone(),
                content: state.content().to_string(),
                summary: state.content().chars().take(summary_chars).collect(),
                category_ids: state.category_id.into_iter().collect(),
                tags: state.tags.clone(),
                status: PostStatus::Published,
            })
        })
    }

    pub async fn publish(&mut self) -> Result<PostView, PostEditorError> {
        let Some(mode) = self.mode else {
            self.notifier.error("Open a post before publishing");
            return Err(PostEditorError::NotOpen);
        };
        let request = match self.build_request() {
            Ok(request) => request,
            Err(err) => {
                self.notifier.error(&err.to_string());
                return Err(err);
            }
        };

        let result = match mode {
            EditMode::New => self.posts.create_post(&request).await,
            EditMode::Edit(post_id) => self.posts.update_post(post_id, &request).await,
        };
        match result {
            Ok(post) => {
                self.autosave.on_published(mode);
                if mode.is_new() {
                    self.mode = None;
                    self.editor.with(|state| *state = Default::default());
                }
                let message = if mode.is_new() { "Post published" } else { "Post updated" };
                tracing::info!(post_id = post.id, "{message}");
                self.notifier.success(message);
                Ok(post)
            }
            Err(err) => {
                tracing::warn!(error = %err, "publish failed");
                self.notifier.error("Failed to publish post");
                Err(err.into())
            }
        }
    }
}
