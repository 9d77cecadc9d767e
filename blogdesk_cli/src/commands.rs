use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;

use blogdesk_client::comments::{CommentNode, CommentReconciler};
use blogdesk_client::config::ClientConfig;
use blogdesk_client::draft::{DraftStore, SqliteDraftStore};
use blogdesk_client::editor::{EditMode, SharedEditor};
use blogdesk_client::models::{CategoryRequest, PostQuery};
use blogdesk_client::notify::TracingNotifier;
use blogdesk_client::paste::{ClipboardItem, PasteEvent, PasteInterceptor, PasteOutcome, UploadResolution};
use blogdesk_client::publish::{EditorSettings, PostEditor};
use blogdesk_client::BlogApiClient;

fn open_store(config: &ClientConfig) -> Result<SqliteDraftStore> {
    SqliteDraftStore::open(&config.draft_db_path)
        .with_context(|| format!("failed to open {}", config.draft_db_path.display()))
}

pub fn show_draft(config: &ClientConfig) -> Result<()> {
    match open_store(config)?.load() {
        Some(draft) => {
            println!("Title:      {}", draft.title);
            println!("Last saved: {}", draft.last_saved.to_rfc3339());
            if let Some(category) = draft.category_id {
                println!("Category:   {category}");
            }
            if !draft.tags.is_empty() {
                println!("Tags:       {}", draft.tags.join(", "));
            }
            println!();
            println!("{}", draft.content);
        }
        None => println!("No draft stored."),
    }
    Ok(())
}

pub fn clear_draft(config: &ClientConfig) -> Result<()> {
    open_store(config)?.clear()?;
    println!("Draft cleared.");
    Ok(())
}

pub async fn publish(
    config: &ClientConfig,
    file: &Path,
    title: String,
    tags: Vec<String>,
    category: Option<i64>,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let client = BlogApiClient::from_config(config)?;
    let mut editor = PostEditor::new(
        Arc::new(client),
        Arc::new(open_store(config)?),
        Arc::new(TracingNotifier),
        EditorSettings::from(config),
    );
    editor.open(EditMode::New).await?;
    editor.editor().with(|state| {
        state.title = title;
        state.tags = tags;
        state.category_id = category;
        state.set_content(content);
    });
    let post = editor.publish().await?;
    println!("Published post {}: {}", post.id, post.title);
    Ok(())
}

fn print_nodes(nodes: &[CommentNode], depth: usize) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        println!(
            "{indent}#{} {} ({}): {}",
            node.id, node.author.name, node.created_at, node.content
        );
        if node.replies_loaded {
            print_nodes(&node.replies, depth + 1);
        } else if node.reply_count > 0 {
            println!("{indent}  [{} more replies]", node.reply_count);
        }
    }
}

/// Loads reply subtrees breadth-first, stopping early once `target` is in
/// the tree.
async fn expand(tree: &mut CommentReconciler, target: Option<i64>) -> Result<()> {
    let mut queue: Vec<i64> = tree
        .roots()
        .iter()
        .filter(|n| n.reply_count > 0)
        .map(|n| n.id)
        .collect();
    while !queue.is_empty() {
        if target.is_some_and(|id| tree.find(id).is_some()) {
            break;
        }
        let id = queue.remove(0);
        let replies = tree.load_replies(id).await?;
        queue.extend(replies.iter().filter(|n| n.reply_count > 0).map(|n| n.id));
    }
    Ok(())
}

fn reconciler(config: &ClientConfig) -> Result<CommentReconciler> {
    let client = BlogApiClient::from_config(config)?;
    Ok(CommentReconciler::new(
        Arc::new(client),
        Arc::new(TracingNotifier),
    ))
}

pub async fn print_comments(config: &ClientConfig, post_id: i64, expand_all: bool) -> Result<()> {
    let mut tree = reconciler(config)?;
    tree.load_top_level(post_id).await?;
    if expand_all {
        expand(&mut tree, None).await?;
    }
    let total = tree.comment_count(post_id).await?;
    println!("{total} comments on post {post_id}");
    print_nodes(tree.roots(), 0);
    Ok(())
}

pub async fn reply(config: &ClientConfig, post_id: i64, parent_id: i64, content: &str) -> Result<()> {
    let mut tree = reconciler(config)?;
    tree.load_top_level(post_id).await?;
    expand(&mut tree, Some(parent_id)).await?;
    let created = tree.add_reply(parent_id, content).await?;
    println!("Posted reply #{}", created.id);
    if let Some(parent) = tree.find(parent_id) {
        print_nodes(std::slice::from_ref(parent), 0);
    }
    Ok(())
}

pub async fn upload(config: &ClientConfig, path: &Path) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mime = infer::get(&data)
        .map(|kind| kind.mime_type().to_string())
        .filter(|mime| mime.starts_with("image/"))
        .with_context(|| format!("{} is not a recognised image", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());

    let editor = SharedEditor::default();
    let interceptor = PasteInterceptor::mount(
        editor.clone(),
        Arc::new(BlogApiClient::from_config(config)?),
        Arc::new(TracingNotifier),
    );
    let event = PasteEvent {
        items: vec![ClipboardItem {
            mime,
            name,
            data: Bytes::from(data),
        }],
    };
    let PasteOutcome::Uploading(handle) = interceptor.handle_paste(event) else {
        anyhow::bail!("clipboard item was not accepted as an image");
    };
    match handle.resolved().await {
        UploadResolution::Linked { .. } => {
            println!("{}", editor.state().content());
            Ok(())
        }
        _ => anyhow::bail!("upload of {} failed", path.display()),
    }
}

pub async fn list_posts(config: &ClientConfig, query: &PostQuery) -> Result<()> {
    let client = BlogApiClient::from_config(config)?;
    let page = client.list_posts(query).await?;
    println!("{} posts total", page.total_elements);
    for post in page.content {
        let tags: Vec<&str> = post.tags.iter().map(|t| t.name.as_str()).collect();
        println!(
            "#{} {} [{}] views={} comments={}",
            post.id,
            post.title,
            tags.join(", "),
            post.view_count,
            post.comment_count
        );
    }
    Ok(())
}

pub async fn delete_post(config: &ClientConfig, post_id: i64) -> Result<()> {
    BlogApiClient::from_config(config)?
        .delete_post(post_id)
        .await?;
    println!("Deleted post {post_id}.");
    Ok(())
}

pub async fn taxonomy(config: &ClientConfig) -> Result<()> {
    let client = BlogApiClient::from_config(config)?;
    println!("Categories:");
    for category in client.list_categories().await? {
        let count = category
            .post_count
            .map(|n| format!(" ({n} posts)"))
            .unwrap_or_default();
        println!("  #{} {}{count}", category.id, category.name);
    }
    let tags: Vec<String> = client
        .list_tags()
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect();
    println!("Tags: {}", tags.join(", "));
    Ok(())
}

pub async fn add_category(config: &ClientConfig, data: CategoryRequest) -> Result<()> {
    let category = BlogApiClient::from_config(config)?
        .create_category(&data)
        .await?;
    println!("Created category #{} {}", category.id, category.name);
    Ok(())
}

pub async fn edit_category(config: &ClientConfig, id: i64, data: CategoryRequest) -> Result<()> {
    let category = BlogApiClient::from_config(config)?
        .update_category(id, &data)
        .await?;
    println!("Updated category #{} {}", category.id, category.name);
    Ok(())
}

pub async fn delete_category(config: &ClientConfig, id: i64) -> Result<()> {
    BlogApiClient::from_config(config)?
        .delete_category(id)
        .await?;
    println!("Deleted category {id}.");
    Ok(())
}

pub async fn add_tag(config: &ClientConfig, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("tag name may not be empty");
    }
    let tag = BlogApiClient::from_config(config)?.create_tag(name).await?;
    println!("Created tag #{} {}", tag.id, tag.name);
    Ok(())
}
