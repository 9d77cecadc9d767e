use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::models::{
    Category, CategoryRequest, CommentView, NewComment, PostPage, PostQuery, PostRequest,
    PostView, Tag, UploadedFile,
};

/// Post endpoints the editor depends on.
#[async_trait]
pub trait PostApi: Send + Sync {
    async fn get_post(&self, id: i64) -> Result<PostView>;
    async fn create_post(&self, data: &PostRequest) -> Result<PostView>;
    async fn update_post(&self, id: i64, data: &PostRequest) -> Result<PostView>;
}

/// Comment endpoints the reconciler depends on.
#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn get_comments(&self, post_id: i64) -> Result<Vec<CommentView>>;
    async fn add_comment(&self, comment: &NewComment) -> Result<CommentView>;
    async fn delete_comment(&self, id: i64) -> Result<()>;
    async fn get_comment_replies(&self, id: i64) -> Result<Vec<CommentView>>;
    async fn comment_count(&self, post_id: i64) -> Result<u64>;
}

#[async_trait]
pub trait FileUploadApi: Send + Sync {
    async fn upload_file(&self, file: UploadFile) -> Result<UploadedFile>;
}

/// A file handed to the upload endpoint.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    pub data: Bytes,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Clone)]
pub struct BlogApiClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl BlogApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = sanitize_base_url(base_url.into())?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base,
            token: None,
            client,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let client = Self::new(config.api_base_url.clone(), config.request_timeout())?;
        Ok(client.with_token(config.api_token.clone()))
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_posts(&self, query: &PostQuery) -> Result<PostPage> {
        let mut params: Vec<(&str, String)> = vec![
            ("page", query.page.to_string()),
            ("size", query.size.to_string()),
        ];
        if let Some(tag) = &query.tag {
            params.push(("tag", tag.clone()));
        }
        if let Some(category_id) = query.category_id {
            params.push(("categoryId", category_id.to_string()));
        }
        if let Some(search) = &query.search {
            params.push(("search", search.clone()));
        }
        let request = self.client.get(self.url("/posts")?).query(&params);
        self.send_json(request).await.context("failed to list posts")
    }

    pub async fn delete_post(&self, id: i64) -> Result<()> {
        let request = self.client.delete(self.url(&format!("/posts/{id}"))?);
        self.send(request)
            .await
            .with_context(|| format!("failed to delete post {id}"))?;
        Ok(())
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let request = self.client.get(self.url("/categories")?);
        self.send_json(request)
            .await
            .context("failed to list categories")
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let request = self.client.get(self.url("/tags")?);
        self.send_json(request).await.context("failed to list tags")
    }

    pub async fn create_category(&self, data: &CategoryRequest) -> Result<Category> {
        let request = self.create_category_request(data)?;
        self.send_json(request)
            .await
            .with_context(|| format!("failed to create category {}", data.name))
    }

    pub async fn update_category(&self, id: i64, data: &CategoryRequest) -> Result<Category> {
        let request = self.update_category_request(id, data)?;
        self.send_json(request)
            .await
            .with_context(|| format!("failed to update category {id}"))
    }

    pub async fn delete_category(&self, id: i64) -> Result<()> {
        let request = self.delete_category_request(id)?;
        self.send(request)
            .await
            .with_context(|| format!("failed to delete category {id}"))?;
        Ok(())
    }

    /// The tag name travels as a query parameter, not a JSON body.
    pub async fn create_tag(&self, name: &str) -> Result<Tag> {
        let request = self.create_tag_request(name)?;
        self.send_json(request)
            .await
            .with_context(|| format!("failed to create tag {name}"))
    }

    fn create_category_request(&self, data: &CategoryRequest) -> Result<RequestBuilder> {
        Ok(self.client.post(self.url("/categories")?).json(data))
    }

    fn update_category_request(&self, id: i64, data: &CategoryRequest) -> Result<RequestBuilder> {
        Ok(self
            .client
            .put(self.url(&format!("/categories/{id}"))?)
            .json(data))
    }

    fn delete_category_request(&self, id: i64) -> Result<RequestBuilder> {
        Ok(self.client.delete(self.url(&format!("/categories/{id}"))?))
    }

    fn create_tag_request(&self, name: &str) -> Result<RequestBuilder> {
        Ok(self
            .client
            .post(self.url("/tags")?)
            .query(&[("name", name)]))
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).with_context(|| format!("invalid request URL {raw}"))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);
        anyhow::bail!("API returned {status}: {message}")
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .context("failed to parse response body")
    }
}

#[async_trait]
impl PostApi for BlogApiClient {
    async fn get_post(&self, id: i64) -> Result<PostView> {
        let request = self.client.get(self.url(&format!("/posts/{id}"))?);
        self.send_json(request)
            .await
            .with_context(|| format!("failed to fetch post {id}"))
    }

    async fn create_post(&self, data: &PostRequest) -> Result<PostView> {
        let request = self.client.post(self.url("/posts")?).json(data);
        self.send_json(request).await.context("failed to create post")
    }

    async fn update_post(&self, id: i64, data: &PostRequest) -> Result<PostView> {
        let request = self.client.put(self.url(&format!("/posts/{id}"))?).json(data);
        self.send_json(request)
            .await
            .with_context(|| format!("failed to update post {id}"))
    }
}

#[async_trait]
impl CommentApi for BlogApiClient {
    async fn get_comments(&self, post_id: i64) -> Result<Vec<CommentView>> {
        let request = self
            .client
            .get(self.url(&format!("/comments/post/{post_id}"))?);
        self.send_json(request)
            .await
            .with_context(|| format!("failed to fetch comments for post {post_id}"))
    }

    async fn add_comment(&self, comment: &NewComment) -> Result<CommentView> {
        let request = self.client.post(self.url("/comments")?).json(comment);
        self.send_json(request).await.context("failed to add comment")
    }

    async fn delete_comment(&self, id: i64) -> Result<()> {
        let request = self.client.delete(self.url(&format!("/comments/{id}"))?);
        self.send(request)
            .await
            .with_context(|| format!("failed to delete comment {id}"))?;
        Ok(())
    }

    async fn get_comment_replies(&self, id: i64) -> Result<Vec<CommentView>> {
        let request = self
            .client
            .get(self.url(&format!("/comments/{id}/replies"))?);
        self.send_json(request)
            .await
            .with_context(|| format!("failed to fetch replies for comment {id}"))
    }

    async fn comment_count(&self, post_id: i64) -> Result<u64> {
        let request = self
            .client
            .get(self.url(&format!("/comments/post/{post_id}/count"))?);
        self.send_json(request)
            .await
            .with_context(|| format!("failed to count comments for post {post_id}"))
    }
}

#[async_trait]
impl FileUploadApi for BlogApiClient {
    async fn upload_file(&self, file: UploadFile) -> Result<UploadedFile> {
        let part = Part::bytes(file.data.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.mime)
            .with_context(|| format!("invalid mime type {}", file.mime))?;
        let form = Form::new()
            .part("file", part)
            .text("directory", "images");
        let request = self.client.post(self.url("/files/upload")?).multipart(form);
        self.send_json(request)
            .await
            .with_context(|| format!("failed to upload {}", file.name))
    }
}

fn sanitize_base_url(mut base: String) -> Result<String> {
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("http://{base}");
    }
    while base.ends_with('/') {
        base.pop();
    }
    let _ = Url::parse(&base).context("invalid base URL")?;
    Ok(base)
}
