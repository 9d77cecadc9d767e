//! Nested comment thread for one post.
//!
//! The server is the only source of truth. Every mutation is followed by a
//! full re-fetch of the affected level instead of a local patch, so a loaded
//! subtree is never partially stale and never diverges from server-side
//! cascade deletes.

use std::sync::Arc;

use thiserror::Error;

use crate::api::CommentApi;
use crate::models::{CommentAuthor, CommentView, NewComment};
use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub id: i64,
    pub post_id: i64,
    pub content: String,
    pub parent_id: Option<i64>,
    pub author: CommentAuthor,
    pub created_at: String,
    pub reply_count: u32,
    /// Empty unless `replies_loaded`; then the server's full reply set.
    pub replies: Vec<CommentNode>,
    pub replies_loaded: bool,
}

impl CommentNode {
    fn from_view(view: CommentView) -> Self {
        Self {
            id: view.id,
            post_id: view.post_id,
            content: view.content,
            parent_id: view.parent_id,
            author: view.author,
            created_at: view.created_at,
            reply_count: view.reply_count.unwrap_or(0),
            replies: Vec::new(),
            replies_loaded: false,
        }
    }

    fn unload(&mut self) {
        self.replies.clear();
        self.replies_loaded = false;
    }
}

/// Which list must be re-fetched after a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncTarget {
    TopLevel(i64),
    Replies(i64),
}

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("comment {0} is not part of the loaded thread")]
    NotInTree(i64),
    #[error("no post's comments have been loaded")]
    NoPostLoaded,
    #[error("comment content may not be empty")]
    EmptyContent,
    #[error(transparent)]
    Api(#[from] anyhow::Error),
}

fn find_node(nodes: &[CommentNode], id: i64) -> Option<&CommentNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.replies, id) {
            return Some(found);
        }
    }
    None
}

fn find_node_mut(nodes: &mut [CommentNode], id: i64) -> Option<&mut CommentNode> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node_mut(&mut node.replies, id) {
            return Some(found);
        }
    }
    None
}

pub struct CommentReconciler {
    api: Arc<dyn CommentApi>,
    notifier: Arc<dyn Notifier>,
    post_id: Option<i64>,
    roots: Vec<CommentNode>,
}

impl CommentReconciler {
    pub fn new(api: Arc<dyn CommentApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            post_id: None,
            roots: Vec::new(),
        }
    }

    pub fn post_id(&self) -> Option<i64> {
        self.post_id
    }

    pub fn roots(&self) -> &[CommentNode] {
        &self.roots
    }

    pub fn find(&self, comment_id: i64) -> Option<&CommentNode> {
        find_node(&self.roots, comment_id)
    }

    /// Replaces the whole tree with the post's top-level comments, all of
    /// them collapsed regardless of their reply counts.
    pub async fn load_top_level(&mut self, post_id: i64) -> Result<&[CommentNode], CommentError> {
        let views = match self.api.get_comments(post_id).await {
            Ok(views) => views,
            Err(err) => {
                tracing::warn!(post_id, error = %err, "failed to load comments");
                self.notifier.error("Failed to load comments");
                return Err(err.into());
            }
        };
        tracing::debug!(post_id, count = views.len(), "top-level comments loaded");
        self.post_id = Some(post_id);
        self.roots = views.into_iter().map(CommentNode::from_view).collect();
        Ok(&self.roots)
    }

    /// Re-fetches one comment's replies and installs them wholesale. Never
    /// served from cache: each call hits the server.
    pub async fn load_replies(&mut self, comment_id: i64) -> Result<&[CommentNode], CommentError> {
        if self.find(comment_id).is_none() {
            return Err(CommentError::NotInTree(comment_id));
        }
        let views = match self.api.get_comment_replies(comment_id).await {
            Ok(views) => views,
            Err(err) => {
                tracing::warn!(comment_id, error = %err, "failed to load replies");
                self.notifier.error("Failed to load replies");
                return Err(err.into());
            }
        };
        let node = find_node_mut(&mut self.roots, comment_id)
            .ok_or(CommentError::NotInTree(comment_id))?;
        node.replies = views.into_iter().map(CommentNode::from_view).collect();
        node.reply_count = node.replies.len() as u32;
        node.replies_loaded = true;
        tracing::debug!(comment_id, count = node.replies.len(), "replies loaded");
        Ok(&node.replies)
    }

    /// Hides a subtree. The next expand re-fetches it.
    pub fn collapse(&mut self, comment_id: i64) -> bool {
        match find_node_mut(&mut self.roots, comment_id) {
            Some(node) => {
                node.unload();
                true
            }
            None => false,
        }
    }

    /// Posts a top-level comment on the loaded post, then reloads the list.
    pub async fn add_comment(&mut self, content: &str) -> Result<CommentNode, CommentError> {
        let post_id = self.post_id.ok_or(CommentError::NoPostLoaded)?;
        let created = self.submit(post_id, None, content).await?;
        if let Err(err) = self.load_top_level(post_id).await {
            tracing::warn!(post_id, error = %err, "comment posted but resync failed");
        }
        Ok(created)
    }

    /// Posts a reply, then reloads the parent's full reply set rather than
    /// appending locally.
    pub async fn add_reply(
        &mut self,
        parent_id: i64,
        content: &str,
    ) -> Result<CommentNode, CommentError> {
        let post_id = self
            .find(parent_id)
            .map(|parent| parent.post_id)
            .ok_or(CommentError::NotInTree(parent_id))?;
        let created = self.submit(post_id, Some(parent_id), content).await?;
        if let Err(err) = self.load_replies(parent_id).await {
            tracing::warn!(parent_id, error = %err, "reply posted but resync failed");
        }
        Ok(created)
    }

    async fn submit(
        &self,
        post_id: i64,
        parent_id: Option<i64>,
        content: &str,
    ) -> Result<CommentNode, CommentError> {
        if content.trim().is_empty() {
            return Err(CommentError::EmptyContent);
        }
        let request = NewComment {
            post_id,
            content: content.to_string(),
            parent_id,
        };
        match self.api.add_comment(&request).await {
            Ok(view) => {
                self.notifier.success("Comment posted");
                Ok(CommentNode::from_view(view))
            }
            Err(err) => {
                tracing::warn!(post_id, ?parent_id, error = %err, "failed to post comment");
                self.notifier.error("Failed to post comment");
                Err(err.into())
            }
        }
    }

    /// Deletes a comment server-side and says which list the caller must
    /// reload. The local tree is left untouched.
    pub async fn delete(&mut self, comment_id: i64) -> Result<ResyncTarget, CommentError> {
        let node = self
            .find(comment_id)
            .ok_or(CommentError::NotInTree(comment_id))?;
        let target = match node.parent_id {
            Some(parent_id) => ResyncTarget::Replies(parent_id),
            None => ResyncTarget::TopLevel(node.post_id),
        };
        if let Err(err) = self.api.delete_comment(comment_id).await {
            tracing::warn!(comment_id, error = %err, "failed to delete comment");
            self.notifier.error("Failed to delete comment");
            return Err(err.into());
        }
        self.notifier.success("Comment deleted");
        Ok(target)
    }

    pub async fn resync(&mut self, target: ResyncTarget) -> Result<(), CommentError> {
        match target {
            ResyncTarget::TopLevel(post_id) => self.load_top_level(post_id).await.map(|_| ()),
            ResyncTarget::Replies(parent_id) => self.load_replies(parent_id).await.map(|_| ()),
        }
    }

    pub async fn delete_and_resync(&mut self, comment_id: i64) -> Result<(), CommentError> {
        let target = self.delete(comment_id).await?;
        self.resync(target).await
    }

    pub async fn comment_count(&self, post_id: i64) -> Result<u64, CommentError> {
        Ok(self.api.comment_count(post_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeCommentServer, RecordingNotifier};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    const POST: i64 = 1;

    /// Post 1: comments 10 (three replies: 11, 12, 13; 12 has reply 14) and 20.
    fn seeded_server() -> Arc<FakeCommentServer> {
        let server = Arc::new(FakeCommentServer::new());
        server.seed(10, POST, None, "first");
        server.seed(11, POST, Some(10), "reply a");
        server.seed(12, POST, Some(10), "reply b");
        server.seed(13, POST, Some(10), "reply c");
        server.seed(14, POST, Some(12), "nested");
        server.seed(20, POST, None, "second");
        server.seed(30, 2, None, "other post");
        server
    }

    fn reconciler(server: &Arc<FakeCommentServer>) -> (CommentReconciler, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (
            CommentReconciler::new(server.clone(), notifier.clone()),
            notifier,
        )
    }

    fn ids(nodes: &[CommentNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.id).collect()
    }

    #[tokio::test]
    async fn top_level_nodes_start_collapsed() {
        let server = seeded_server();
        let (mut tree, _) = reconciler(&server);
        let roots = tree.load_top_level(POST).await.expect("load");
        assert_eq!(ids(roots), vec![10, 20]);
        assert_eq!(roots[0].reply_count, 3);
        assert!(roots.iter().all(|n| n.replies.is_empty() && !n.replies_loaded));
    }

    #[tokio::test]
    async fn loading_replies_installs_the_full_set() {
        let server = seeded_server();
        let (mut tree, _) = reconciler(&server);
        tree.load_top_level(POST).await.expect("load");
        assert!(!tree.find(10).unwrap().replies_loaded);

        tree.load_replies(10).await.expect("replies");
        let node = tree.find(10).expect("node");
        assert_eq!(node.replies.len(), 3);
        assert!(node.replies_loaded);
        assert_eq!(ids(&node.replies), vec![11, 12, 13]);
        assert!(node.replies.iter().all(|r| !r.replies_loaded));

        tree.load_replies(12).await.expect("nested replies");
        assert_eq!(ids(&tree.find(12).unwrap().replies), vec![14]);
    }

    #[tokio::test]
    async fn repeated_loads_always_refetch() {
        let server = seeded_server();
        let (mut tree, _) = reconciler(&server);
        tree.load_top_level(POST).await.expect("load");
        tree.load_replies(10).await.expect("first");

        server.remove(11);
        tree.load_replies(10).await.expect("second");
        assert_eq!(server.reply_fetches.load(Ordering::SeqCst), 2);
        let node = tree.find(10).unwrap();
        assert_eq!(ids(&node.replies), vec![12, 13]);
        assert_eq!(node.reply_count, 2);
    }

    #[tokio::test]
    async fn reply_resyncs_instead_of_appending() {
        let server = seeded_server();
        let (mut tree, notifier) = reconciler(&server);
        tree.load_top_level(POST).await.expect("load");
        tree.load_replies(10).await.expect("replies");

        // Another user's reply lands between our load and our submit.
        server.seed(15, POST, Some(10), "concurrent");
        let created = tree.add_reply(10, "mine").await.expect("reply");

        let node = tree.find(10).unwrap();
        assert_eq!(ids(&node.replies), vec![11, 12, 13, 15, created.id]);
        assert!(node.replies_loaded);
        assert_eq!(notifier.successes(), vec!["Comment posted".to_string()]);
    }

    #[tokio::test]
    async fn delete_reports_target_without_splicing() {
        let server = seeded_server();
        let (mut tree, _) = reconciler(&server);
        tree.load_top_level(POST).await.expect("load");
        tree.load_replies(10).await.expect("replies");
        tree.load_replies(12).await.expect("nested");

        let target = tree.delete(12).await.expect("delete");
        assert_eq!(target, ResyncTarget::Replies(10));
        assert!(tree.find(12).is_some());
        assert!(tree.find(14).is_some());

        tree.resync(target).await.expect("resync");
        assert!(tree.find(12).is_none());
        assert!(tree.find(14).is_none());
        assert_eq!(ids(&tree.find(10).unwrap().replies), vec![11, 13]);
    }

    #[tokio::test]
    async fn deleting_a_root_reloads_the_top_level() {
        let server = seeded_server();
        let (mut tree, _) = reconciler(&server);
        tree.load_top_level(POST).await.expect("load");
        tree.load_replies(10).await.expect("replies");

        tree.delete_and_resync(10).await.expect("delete");
        assert_eq!(ids(tree.roots()), vec![20]);
        assert_eq!(server.comment_count(POST).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn failures_keep_the_last_good_tree() {
        let server = seeded_server();
        let (mut tree, notifier) = reconciler(&server);
        tree.load_top_level(POST).await.expect("load");
        tree.load_replies(10).await.expect("replies");
        let before = tree.roots().to_vec();

        server.set_failing(true);
        assert!(tree.load_replies(10).await.is_err());
        assert!(tree.load_top_level(POST).await.is_err());
        assert!(tree.add_reply(10, "lost").await.is_err());
        assert!(tree.delete(11).await.is_err());

        assert_eq!(tree.roots(), before.as_slice());
        assert_eq!(notifier.errors().len(), 4);
    }

    #[tokio::test]
    async fn top_level_comment_reloads_the_list() {
        let server = seeded_server();
        let (mut tree, _) = reconciler(&server);
        assert!(matches!(
            tree.add_comment("too early").await,
            Err(CommentError::NoPostLoaded)
        ));

        tree.load_top_level(POST).await.expect("load");
        let created = tree.add_comment("hello").await.expect("comment");
        assert_eq!(ids(tree.roots()), vec![10, 20, created.id]);
        assert!(matches!(
            tree.add_comment("   ").await,
            Err(CommentError::EmptyContent)
        ));
    }

    #[tokio::test]
    async fn collapse_discards_the_loaded_subtree() {
        let server = seeded_server();
        let (mut tree, _) = reconciler(&server);
        tree.load_top_level(POST).await.expect("load");
        tree.load_replies(10).await.expect("replies");

        assert!(tree.collapse(10));
        let node = tree.find(10).unwrap();
        assert!(node.replies.is_empty());
        assert!(!node.replies_loaded);
        assert!(!tree.collapse(999));
        assert!(matches!(
            tree.load_replies(999).await,
            Err(CommentError::NotInTree(999))
        ));
    }
}
