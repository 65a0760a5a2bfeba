//! Application layer tying the article store to the AI subsystem.
//!
//! Owns the cache consistency rule: article mutations decide here whether
//! cached AI artifacts survive, get cleared, or get recomputed. The only
//! synchronous AI call on the write path is tag generation on create, so
//! tags show up in listings immediately. Embedding writes run as background
//! tasks whose failures are logged, never surfaced.

use crate::{
    ai::{
        encode_embedding, AiError, ChatApi, EmbeddingApi, EnrichmentService, HttpChatClient,
        HttpEmbeddingClient, ScoredArticle, SemanticSearch,
    },
    articles::{Article, ArticleCreate, ArticleDigest, ArticleStore, ArticleUpdate, BackendCsv},
    auth::{self, Sessions},
    config::Config,
    storage::BackendLocal,
    uploads::{self, UploadedFile},
};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("article not found")]
    NotFound,

    #[error("invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

/// Outcome of a search request: semantic when the query embedding was
/// obtainable, otherwise a plain keyword scan.
#[derive(Debug)]
pub enum SearchOutcome {
    Semantic(Vec<ScoredArticle>),
    Keyword(Vec<Article>),
}

pub struct App {
    config: Config,
    store: Arc<dyn ArticleStore>,
    chat: Arc<dyn ChatApi>,
    embedder: Arc<dyn EmbeddingApi>,
    enrich: EnrichmentService,
    search: SemanticSearch,
    sessions: Sessions,
    uploads: BackendLocal,
    completion_enabled: bool,
    embedding_enabled: bool,
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(BackendCsv::load(&format!(
            "{}/articles.csv",
            config.base_path()
        ))?);
        let uploads = BackendLocal::new(&format!("{}/uploads", config.base_path()))?;

        let chat_client = HttpChatClient::new(config.completion.clone());
        let completion_enabled = chat_client.is_configured();
        if !completion_enabled {
            log::warn!("no completion API key configured, AI features disabled");
        }

        let embed_client = HttpEmbeddingClient::new(config.embedding.clone());
        let embedding_enabled = embed_client.is_configured();
        if !embedding_enabled {
            log::warn!("no embedding API key configured, semantic search disabled");
        }

        let chat: Arc<dyn ChatApi> = Arc::new(chat_client);
        let embedder: Arc<dyn EmbeddingApi> = Arc::new(embed_client);

        Ok(Self {
            enrich: EnrichmentService::new(chat.clone()),
            search: SemanticSearch::new(embedder.clone()),
            sessions: Sessions::new(),
            store,
            chat,
            embedder,
            uploads,
            config,
            completion_enabled,
            embedding_enabled,
        })
    }

    /// Build an app around injected clients and store, for tests.
    #[cfg(test)]
    pub fn with_parts(
        config: Config,
        store: Arc<dyn ArticleStore>,
        chat: Arc<dyn ChatApi>,
        embedder: Arc<dyn EmbeddingApi>,
        uploads: BackendLocal,
    ) -> Self {
        Self {
            enrich: EnrichmentService::new(chat.clone()),
            search: SemanticSearch::new(embedder.clone()),
            sessions: Sessions::new(),
            store,
            chat,
            embedder,
            uploads,
            config,
            completion_enabled: true,
            embedding_enabled: true,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn ArticleStore> {
        self.store.clone()
    }

    pub fn chat(&self) -> Arc<dyn ChatApi> {
        self.chat.clone()
    }

    // --- articles ---

    pub fn list_articles(&self, keyword: Option<&str>) -> Result<Vec<ArticleDigest>, AppError> {
        let articles = self.store.list(keyword)?;
        Ok(articles.iter().map(Article::digest).collect())
    }

    pub fn get_article(&self, id: u64) -> Result<Article, AppError> {
        self.store.get(id)?.ok_or(AppError::NotFound)
    }

    /// Create an article. Empty tag fields are filled by best-effort tag
    /// extraction (a failure downgrades to no tags); the embedding is
    /// computed in the background after the row is persisted.
    pub async fn create_article(
        &self,
        mut create: ArticleCreate,
        author: &str,
    ) -> Result<Article, AppError> {
        if create.title.trim().is_empty() || create.content.trim().is_empty() {
            return Err(AppError::Validation(
                "title and content must not be empty".into(),
            ));
        }
        create.author = author.to_string();

        if create.tags.trim().is_empty() && self.completion_enabled {
            match self
                .enrich
                .extract_tags(Some(&create.title), &create.content)
                .await
            {
                Ok(tags) => create.tags = tags,
                Err(err) => log::warn!("auto-tagging failed: {err}"),
            }
        }

        let article = self.store.create(create)?;
        self.spawn_embedding_update(&article);

        Ok(article)
    }

    /// Update an article owned by `author`. A changed content body clears
    /// the cached summary in the same write and schedules an embedding
    /// recompute; the summary itself is regenerated lazily on the next
    /// streamed detail view.
    pub async fn update_article(
        &self,
        id: u64,
        update: ArticleUpdate,
        author: &str,
    ) -> Result<Article, AppError> {
        let existing = self.store.get(id)?.ok_or(AppError::NotFound)?;
        if existing.author != author {
            return Err(AppError::NotFound);
        }

        if update.title.as_deref().is_some_and(|t| t.trim().is_empty())
            || update
                .content
                .as_deref()
                .is_some_and(|c| c.trim().is_empty())
        {
            return Err(AppError::Validation(
                "title and content must not be empty".into(),
            ));
        }

        let outcome = self.store.update(id, update)?;
        if outcome.content_changed {
            self.spawn_embedding_update(&outcome.article);
        }

        Ok(outcome.article)
    }

    pub fn delete_article(&self, id: u64, author: &str) -> Result<(), AppError> {
        let existing = self.store.get(id)?.ok_or(AppError::NotFound)?;
        if existing.author != author {
            return Err(AppError::NotFound);
        }
        self.store.delete(id)?;
        Ok(())
    }

    /// Fire-and-forget embedding recompute. Readers may observe a stale or
    /// absent embedding until the task lands; that window is accepted.
    fn spawn_embedding_update(&self, article: &Article) {
        if !self.embedding_enabled {
            log::debug!("embedding disabled, skipping recompute for article {}", article.id);
            return;
        }

        let id = article.id;
        let text = format!("{}\n\n{}", article.title, article.content);
        let embedder = self.embedder.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            match embedder.embed(&text).await {
                Ok(vector) => {
                    if let Err(err) = store.save_embedding(id, &encode_embedding(&vector)) {
                        log::error!("failed to store embedding for article {id}: {err}");
                    }
                }
                Err(err) => {
                    log::warn!("embedding generation for article {id} failed: {err}");
                }
            }
        });
    }

    // --- search ---

    /// Semantic search over all articles, degrading to keyword search when
    /// the query embedding cannot be obtained.
    pub async fn search_articles(
        &self,
        query: &str,
        threshold: Option<f32>,
    ) -> Result<SearchOutcome, AppError> {
        let candidates = self.store.list(None)?;
        let threshold = threshold.unwrap_or(self.config.semantic_threshold);

        if self.embedding_enabled {
            match self.search.search(query, &candidates, threshold).await {
                Ok(results) => return Ok(SearchOutcome::Semantic(results)),
                Err(err) => {
                    log::warn!("semantic search failed, falling back to keyword: {err}");
                }
            }
        }

        Ok(SearchOutcome::Keyword(self.store.list(Some(query))?))
    }

    // --- enrichment passthroughs ---

    pub async fn summarize(&self, content: &str) -> Result<String, AppError> {
        Ok(self.enrich.summarize(content).await?)
    }

    pub async fn extract_tags(
        &self,
        title: Option<&str>,
        content: &str,
    ) -> Result<String, AppError> {
        Ok(self.enrich.extract_tags(title, content).await?)
    }

    pub async fn proofread(&self, content: &str) -> Result<String, AppError> {
        Ok(self.enrich.proofread(content).await?)
    }

    /// On-demand embedding for an article draft.
    pub async fn generate_embedding(
        &self,
        title: Option<&str>,
        content: &str,
    ) -> Result<Vec<f32>, AppError> {
        if content.trim().chars().count() < 20 {
            return Err(AppError::Validation(
                "content is too short to embed (minimum 20 characters)".into(),
            ));
        }
        let text = format!("{}\n\n{}", title.unwrap_or(""), content);
        Ok(self.embedder.embed(&text).await?)
    }

    // --- auth ---

    pub fn login(&self, username: &str, password: &str) -> Result<String, AppError> {
        let admin = &self.config.admin;
        if admin.username.is_empty() || admin.password_sha256.is_empty() {
            log::warn!("login attempt but no admin account is configured");
            return Err(AppError::Unauthorized);
        }

        let user_ok = auth::validate_token(username, &admin.username);
        let pass_ok = auth::validate_token(&auth::password_digest(password), &admin.password_sha256);

        if user_ok && pass_ok {
            Ok(self.sessions.issue())
        } else {
            Err(AppError::Unauthorized)
        }
    }

    pub fn logout(&self, token: &str) {
        self.sessions.revoke(token);
    }

    pub fn is_admin_token(&self, token: &str) -> bool {
        self.sessions.is_valid(token)
    }

    pub fn admin_username(&self) -> &str {
        &self.config.admin.username
    }

    // --- uploads ---

    pub fn store_upload(&self, original_name: &str, data: &[u8]) -> Result<UploadedFile, AppError> {
        Ok(uploads::store_upload(&self.uploads, original_name, data)?)
    }

    pub fn uploads_dir(&self) -> std::path::PathBuf {
        self.uploads.base_dir.clone()
    }
}
