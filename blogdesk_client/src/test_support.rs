//! In-memory stand-ins for the blog API and storage, shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::oneshot;

use crate::api::{CommentApi, FileUploadApi, PostApi, UploadFile};
use crate::autosave::Clock;
use crate::draft::{Draft, DraftStore, DraftStoreError, MemoryDraftStore};
use crate::models::{
    Category, CommentAuthor, CommentView, NewComment, PostRequest, PostView, Tag, UploadedFile,
};
use crate::notify::Notifier;

#[derive(Default)]
pub struct RecordingNotifier {
    successes: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn successes(&self) -> Vec<String> {
        self.successes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.successes.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

/// Memory store that counts writes and can be told to reject them.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryDraftStore,
    pub saves: AtomicUsize,
    pub clears: AtomicUsize,
    pub fail_saves: AtomicBool,
}

impl CountingStore {
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl DraftStore for CountingStore {
    fn save(&self, draft: &Draft) -> Result<(), DraftStoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DraftStoreError::QuotaExceeded { size: 1, quota: 0 });
        }
        self.inner.save(draft)
    }

    fn load(&self) -> Option<Draft> {
        self.inner.load()
    }

    fn clear(&self) -> Result<(), DraftStoreError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear()
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Wall clock that follows tokio's (pausable) clock from `base_time()`.
pub fn paused_clock() -> Clock {
    let base = base_time();
    let start = tokio::time::Instant::now();
    Arc::new(move || base + chrono::Duration::from_std(start.elapsed()).unwrap())
}

pub fn author(id: i64, name: &str) -> CommentAuthor {
    CommentAuthor {
        id,
        name: name.to_string(),
        avatar_url: None,
    }
}

/// A comment backend holding the authoritative comment set.
#[derive(Default)]
pub struct FakeCommentServer {
    comments: Mutex<Vec<CommentView>>,
    next_id: AtomicI64,
    pub failing: AtomicBool,
    pub reply_fetches: AtomicUsize,
}

impl FakeCommentServer {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Default::default()
        }
    }

    pub fn seed(&self, id: i64, post_id: i64, parent_id: Option<i64>, content: &str) {
        self.comments.lock().unwrap().push(CommentView {
            id,
            post_id,
            content: content.to_string(),
            parent_id,
            author: author(1, "Ann"),
            created_at: format!("2024-01-01T00:00:{:02}", id % 60),
            reply_count: None,
        });
    }

    /// Mutates the server behind the client's back, as another user would.
    pub fn remove(&self, id: i64) {
        self.comments.lock().unwrap().retain(|c| c.id != id);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow!("API returned 503 Service Unavailable: try later"))
        } else {
            Ok(())
        }
    }

    fn with_counts(all: &[CommentView], selected: Vec<CommentView>) -> Vec<CommentView> {
        selected
            .into_iter()
            .map(|mut c| {
                let count = all.iter().filter(|r| r.parent_id == Some(c.id)).count();
                c.reply_count = Some(count as u32);
                c
            })
            .collect()
    }
}

#[async_trait]
impl CommentApi for FakeCommentServer {
    async fn get_comments(&self, post_id: i64) -> Result<Vec<CommentView>> {
        self.check()?;
        let all = self.comments.lock().unwrap().clone();
        let top = all
            .iter()
            .filter(|c| c.post_id == post_id && c.parent_id.is_none())
            .cloned()
            .collect();
        Ok(Self::with_counts(&all, top))
    }

    async fn add_comment(&self, comment: &NewComment) -> Result<CommentView> {
        self.check()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let view = CommentView {
            id,
            post_id: comment.post_id,
            content: comment.content.clone(),
            parent_id: comment.parent_id,
            author: author(2, "Bo"),
            created_at: "2024-01-02T00:00:00".into(),
            reply_count: Some(0),
        };
        self.comments.lock().unwrap().push(view.clone());
        Ok(view)
    }

    async fn delete_comment(&self, id: i64) -> Result<()> {
        self.check()?;
        let mut comments = self.comments.lock().unwrap();
        let mut doomed = vec![id];
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i];
            doomed.extend(
                comments
                    .iter()
                    .filter(|c| c.parent_id == Some(parent))
                    .map(|c| c.id),
            );
            i += 1;
        }
        comments.retain(|c| !doomed.contains(&c.id));
        Ok(())
    }

    async fn get_comment_replies(&self, id: i64) -> Result<Vec<CommentView>> {
        self.reply_fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let all = self.comments.lock().unwrap().clone();
        let replies = all
            .iter()
            .filter(|c| c.parent_id == Some(id))
            .cloned()
            .collect();
        Ok(Self::with_counts(&all, replies))
    }

    async fn comment_count(&self, post_id: i64) -> Result<u64> {
        self.check()?;
        let comments = self.comments.lock().unwrap();
        Ok(comments.iter().filter(|c| c.post_id == post_id).count() as u64)
    }
}

#[derive(Default)]
pub struct FakePostApi {
    pub posts: Mutex<HashMap<i64, PostView>>,
    pub created: Mutex<Vec<PostRequest>>,
    pub updated: Mutex<Vec<(i64, PostRequest)>>,
    pub failing: AtomicBool,
}

impl FakePostApi {
    pub fn with_post(id: i64, title: &str, content: &str) -> Self {
        let api = Self::default();
        api.posts.lock().unwrap().insert(
            id,
            PostView {
                id,
                title: title.to_string(),
                content: content.to_string(),
                summary: String::new(),
                cover_image: None,
                author_id: Some(1),
                author: None,
                status: 1,
                view_count: 0,
                like_count: 0,
                comment_count: 0,
                categories: vec![Category {
                    id: 3,
                    name: "Rust".into(),
                    description: String::new(),
                    post_count: None,
                }],
                tags: vec![Tag {
                    id: 1,
                    name: "async".into(),
                }],
                created_at: None,
                updated_at: None,
            },
        );
        api
    }

    fn view_from(id: i64, data: &PostRequest) -> PostView {
        PostView {
            id,
            title: data.title.clone(),
            content: data.content.clone(),
            summary: data.summary.clone(),
            cover_image: None,
            author_id: Some(1),
            author: None,
            status: 1,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            categories: Vec::new(),
            tags: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow!("API returned 500 Internal Server Error: boom"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PostApi for FakePostApi {
    async fn get_post(&self, id: i64) -> Result<PostView> {
        self.check()?;
        self.posts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("API returned 404 Not Found: post {id}"))
    }

    async fn create_post(&self, data: &PostRequest) -> Result<PostView> {
        self.check()?;
        self.created.lock().unwrap().push(data.clone());
        Ok(Self::view_from(42, data))
    }

    async fn update_post(&self, id: i64, data: &PostRequest) -> Result<PostView> {
        self.check()?;
        self.updated.lock().unwrap().push((id, data.clone()));
        Ok(Self::view_from(id, data))
    }
}

/// Uploader whose calls block until the test releases them by file name.
/// Files without a gate resolve immediately under `https://cdn.test/`.
#[derive(Default)]
pub struct GatedUploader {
    gates: Mutex<HashMap<String, oneshot::Receiver<Result<String, String>>>>,
    pub calls: AtomicUsize,
}

impl GatedUploader {
    pub fn gate(&self, name: &str) -> oneshot::Sender<Result<String, String>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(name.to_string(), rx);
        tx
    }
}

#[async_trait]
impl FileUploadApi for GatedUploader {
    async fn upload_file(&self, file: UploadFile) -> Result<UploadedFile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().remove(&file.name);
        let outcome = match gate {
            Some(rx) => rx.await.map_err(|_| anyhow!("gate dropped"))?,
            None => Ok(format!("https://cdn.test/{}", file.name)),
        };
        outcome
            .map(|url| UploadedFile { url })
            .map_err(|msg| anyhow!(msg))
    }
}
