mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use blogdesk_client::config::ClientConfig;
use blogdesk_client::models::{CategoryRequest, PostQuery};
use blogdesk_client::telemetry;

#[derive(Parser)]
#[command(author, version, about = "Command-line client for the blog CMS")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect or discard the stored new-post draft
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
    /// Publish a markdown file as a new post
    Publish {
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        category: Option<i64>,
    },
    /// Print a post's comment thread
    Comments {
        post_id: i64,
        /// Load every reply subtree
        #[arg(long)]
        expand: bool,
    },
    /// Reply to a comment and print the refreshed replies
    Reply {
        post_id: i64,
        parent_id: i64,
        content: String,
    },
    /// Upload an image and print its markdown link
    Upload { path: PathBuf },
    /// List posts, newest first
    Posts {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        size: u32,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Delete a post
    DeletePost { post_id: i64 },
    /// List or manage categories and tags
    Taxonomy {
        #[command(subcommand)]
        action: Option<TaxonomyAction>,
    },
}

#[derive(Subcommand)]
enum TaxonomyAction {
    /// List categories and tags (the default)
    List,
    AddCategory {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    EditCategory {
        id: i64,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    DeleteCategory { id: i64 },
    AddTag { name: String },
}

#[derive(Subcommand)]
enum DraftAction {
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let args = Args::parse();
    let config = ClientConfig::load()?;
    tracing::debug!(api = %config.api_base_url, "configuration loaded");

    match args.command {
        Command::Draft { action } => match action {
            DraftAction::Show => commands::show_draft(&config),
            DraftAction::Clear => commands::clear_draft(&config),
        },
        Command::Publish {
            file,
            title,
            tags,
            category,
        } => commands::publish(&config, &file, title, tags, category).await,
        Command::Comments { post_id, expand } => {
            commands::print_comments(&config, post_id, expand).await
        }
        Command::Reply {
            post_id,
            parent_id,
            content,
        } => commands::reply(&config, post_id, parent_id, &content).await,
        Command::Upload { path } => commands::upload(&config, &path).await,
        Command::Posts {
            page,
            size,
            tag,
            category,
            search,
        } => {
            let query = PostQuery {
                page,
                size,
                tag,
                category_id: category,
                search,
            };
            commands::list_posts(&config, &query).await
        }
        Command::DeletePost { post_id } => commands::delete_post(&config, post_id).await,
        Command::Taxonomy { action } => match action.unwrap_or(TaxonomyAction::List) {
            TaxonomyAction::List => commands::taxonomy(&config).await,
            TaxonomyAction::AddCategory { name, description } => {
                commands::add_category(&config, CategoryRequest { name, description }).await
            }
            TaxonomyAction::EditCategory {
                id,
                name,
                description,
            } => commands::edit_category(&config, id, CategoryRequest { name, description }).await,
            TaxonomyAction::DeleteCategory { id } => commands::delete_category(&config, id).await,
            TaxonomyAction::AddTag { name } => commands::add_tag(&config, &name).await,
        },
    }
}
