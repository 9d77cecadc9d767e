use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::draft::Draft;

/// Whether the editor is authoring a new post or editing an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    New,
    Edit(i64),
}

impl EditMode {
    pub fn post_id(self) -> Option<i64> {
        match self {
            EditMode::New => None,
            EditMode::Edit(id) => Some(id),
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, EditMode::New)
    }
}

/// Editable fields of the post form. `cursor` is a byte offset into
/// `content` and always sits on a char boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorState {
    pub title: String,
    content: String,
    pub category_id: Option<i64>,
    pub tags: Vec<String>,
    cursor: usize,
}

impl EditorState {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Replaces the content and moves the cursor to its end.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.cursor = self.content.len();
    }

    pub fn set_cursor(&mut self, offset: usize) {
        let mut offset = offset.min(self.content.len());
        while !self.content.is_char_boundary(offset) {
            offset -= 1;
        }
        self.cursor = offset;
    }

    pub fn insert_at_cursor(&mut self, text: &str) {
        self.content.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    /// Replaces the first occurrence of `needle`. Returns false when the
    /// needle is gone, which callers treat as "the user edited it away".
    pub fn replace_once(&mut self, needle: &str, replacement: &str) -> bool {
        if needle.is_empty() {
            return false;
        }
        let Some(start) = self.content.find(needle) else {
            return false;
        };
        let end = start + needle.len();
        self.content.replace_range(start..end, replacement);
        if self.cursor >= end {
            self.cursor = self.cursor - needle.len() + replacement.len();
        } else if self.cursor > start {
            self.cursor = start + replacement.len();
        }
        true
    }

    /// True when neither title nor content carries any text.
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.content.trim().is_empty()
    }

    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> Draft {
        Draft {
            title: self.title.clone(),
            content: self.content.clone(),
            category_id: self.category_id,
            tags: self.tags.clone(),
            last_saved: saved_at,
        }
    }

    pub fn apply_draft(&mut self, draft: &Draft) {
        self.title = draft.title.clone();
        self.category_id = draft.category_id;
        self.tags = draft.tags.clone();
        self.set_content(draft.content.clone());
    }
}

/// Editor state shared between the form, the autosave timer and in-flight
/// uploads. Critical sections are short and never held across an await.
#[derive(Debug, Clone, Default)]
pub struct SharedEditor(Arc<Mutex<EditorState>>);

impl SharedEditor {
    pub fn new(state: EditorState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut EditorState) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn state(&self) -> EditorState {
        self.with(|state| state.clone())
    }
}
