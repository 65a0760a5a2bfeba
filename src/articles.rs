use anyhow::anyhow;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    io::ErrorKind,
    sync::{Arc, RwLock},
    time::Instant,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: u64,

    pub title: String,
    /// Markdown body
    pub content: String,
    /// Comma-separated, insertion order preserved, never deduplicated
    pub tags: String,
    pub author: String,
    pub created_at: DateTime<Utc>,

    /// Cached AI summary. Present only when derived from the current
    /// content; cleared on every content change.
    pub ai_summary: Option<String>,
    /// Cached embedding vector, JSON-encoded. Same freshness rule as the
    /// summary, but recomputed in the background instead of lazily.
    pub embedding: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArticleCreate {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArticleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

/// Result of an update, reporting whether the content bytes changed so the
/// caller can schedule an embedding recompute.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub article: Article,
    pub content_changed: bool,
}

pub trait ArticleStore: Send + Sync {
    /// Newest-first listing, optionally filtered by a case-insensitive
    /// keyword over title and content.
    fn list(&self, keyword: Option<&str>) -> anyhow::Result<Vec<Article>>;
    fn get(&self, id: u64) -> anyhow::Result<Option<Article>>;
    fn create(&self, create: ArticleCreate) -> anyhow::Result<Article>;
    /// Applies the cache consistency rule: identical content preserves the
    /// cached summary and embedding, changed content clears both in the
    /// same write.
    fn update(&self, id: u64, update: ArticleUpdate) -> anyhow::Result<UpdateOutcome>;
    fn delete(&self, id: u64) -> anyhow::Result<()>;
    fn save_summary(&self, id: u64, summary: &str) -> anyhow::Result<()>;
    fn save_embedding(&self, id: u64, embedding: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<Article>>>,
    path: String,
}

const CSV_HEADERS: [&str; 8] = [
    "id",
    "title",
    "content",
    "tags",
    "author",
    "created_at",
    "ai_summary",
    "embedding",
];

impl BackendCsv {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new article database at {path}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut articles = vec![];
        for record in csv_reader.records() {
            let record = record?;
            let field = |idx: usize, name: &str| -> anyhow::Result<String> {
                Ok(record
                    .get(idx)
                    .ok_or_else(|| anyhow!("couldnt get record {name}"))?
                    .to_string())
            };

            let id = field(0, "id")?.parse::<u64>()?;
            let created_at = DateTime::parse_from_rfc3339(&field(5, "created_at")?)
                .map_err(|err| anyhow!("bad created_at on article {id}: {err}"))?
                .with_timezone(&Utc);

            let ai_summary = field(6, "ai_summary")?;
            let embedding = field(7, "embedding")?;

            articles.push(Article {
                id,
                title: field(1, "title")?,
                content: field(2, "content")?,
                tags: field(3, "tags")?,
                author: field(4, "author")?,
                created_at,
                ai_summary: (!ai_summary.is_empty()).then_some(ai_summary),
                embedding: (!embedding.is_empty()).then_some(embedding),
            });
        }

        log::debug!(
            "took {}ms to read csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(articles)),
            path: path.to_string(),
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        let articles = self.list.write().unwrap();

        let temp_path = format!("{}-tmp", &self.path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for article in articles.iter() {
            csv_wrt.write_record([
                &article.id.to_string(),
                &article.title,
                &article.content,
                &article.tags,
                &article.author,
                &article.created_at.to_rfc3339(),
                &article.ai_summary.clone().unwrap_or_default(),
                &article.embedding.clone().unwrap_or_default(),
            ])?;
        }
        csv_wrt.flush()?;
        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

impl ArticleStore for BackendCsv {
    fn list(&self, keyword: Option<&str>) -> anyhow::Result<Vec<Article>> {
        let articles = self.list.read().unwrap();

        let mut output: Vec<Article> = match keyword.map(str::trim).filter(|k| !k.is_empty()) {
            Some(keyword) => {
                let keyword = keyword.to_lowercase();
                articles
                    .iter()
                    .filter(|a| {
                        a.title.to_lowercase().contains(&keyword)
                            || a.content.to_lowercase().contains(&keyword)
                    })
                    .cloned()
                    .collect()
            }
            None => articles.clone(),
        };

        output.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(output)
    }

    fn get(&self, id: u64) -> anyhow::Result<Option<Article>> {
        let articles = self.list.read().unwrap();
        Ok(articles.iter().find(|a| a.id == id).cloned())
    }

    fn create(&self, create: ArticleCreate) -> anyhow::Result<Article> {
        let id = self
            .list
            .read()
            .unwrap()
            .iter()
            .map(|a| a.id)
            .max()
            .map(|id| id + 1)
            .unwrap_or(1);

        let article = Article {
            id,
            title: create.title,
            content: create.content,
            tags: create.tags,
            author: create.author,
            created_at: Utc::now(),
            ai_summary: None,
            embedding: None,
        };

        self.list.write().unwrap().push(article.clone());
        self.save()?;

        Ok(article)
    }

    fn update(&self, id: u64, update: ArticleUpdate) -> anyhow::Result<UpdateOutcome> {
        let mut articles = self.list.write().unwrap();

        let article = articles
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow!("article with id {id} not found"))?;

        if let Some(title) = update.title {
            article.title = title;
        }
        if let Some(tags) = update.tags {
            article.tags = tags;
        }

        let mut content_changed = false;
        if let Some(content) = update.content {
            // byte-for-byte comparison: an unchanged body keeps the cached
            // summary and embedding valid
            if content != article.content {
                article.content = content;
                article.ai_summary = None;
                article.embedding = None;
                content_changed = true;
            }
        }

        let outcome = UpdateOutcome {
            article: article.clone(),
            content_changed,
        };
        drop(articles);

        self.save()?;

        Ok(outcome)
    }

    fn delete(&self, id: u64) -> anyhow::Result<()> {
        let mut articles = self.list.write().unwrap();
        let found = articles.iter().position(|a| a.id == id).map(|idx| {
            articles.remove(idx);
        });
        drop(articles);

        if found.is_some() {
            self.save()?;
        }

        Ok(())
    }

    fn save_summary(&self, id: u64, summary: &str) -> anyhow::Result<()> {
        let mut articles = self.list.write().unwrap();
        let article = articles
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow!("article with id {id} not found"))?;
        article.ai_summary = Some(summary.to_string());
        drop(articles);

        self.save()
    }

    fn save_embedding(&self, id: u64, embedding: &str) -> anyhow::Result<()> {
        let mut articles = self.list.write().unwrap();
        let article = articles
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow!("article with id {id} not found"))?;
        article.embedding = Some(embedding.to_string());
        drop(articles);

        self.save()
    }
}

/// Listing entry: article metadata plus content-derived previews, without
/// the full markdown body.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleDigest {
    pub id: u64,
    pub title: String,
    pub tags: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub excerpt: String,
    pub images: Vec<String>,
    pub files: Vec<FileLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileLink {
    pub name: String,
    pub url: String,
    pub is_pdf: bool,
}

/// Listings show at most this many inline images per article.
const MAX_DIGEST_IMAGES: usize = 4;
/// And at most this many attached file links.
const MAX_DIGEST_FILES: usize = 5;
/// Plain-text excerpt length in characters.
const MAX_EXCERPT_CHARS: usize = 200;

static IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(([^)]*)\)").expect("static regex"));
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").expect("static regex"));
static FILE_EXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(pdf|doc|docx|xls|xlsx|ppt|pptx|txt|md|zip|rar|7z)$").expect("static regex")
});

impl Article {
    pub fn digest(&self) -> ArticleDigest {
        ArticleDigest {
            id: self.id,
            title: self.title.clone(),
            tags: self.tags.clone(),
            author: self.author.clone(),
            created_at: self.created_at,
            excerpt: clean_excerpt(&self.content),
            images: extract_images(&self.content)
                .into_iter()
                .take(MAX_DIGEST_IMAGES)
                .collect(),
            files: extract_files(&self.content)
                .into_iter()
                .take(MAX_DIGEST_FILES)
                .collect(),
        }
    }
}

/// Image URLs referenced by markdown image syntax, in document order.
pub fn extract_images(content: &str) -> Vec<String> {
    IMAGE_RE
        .captures_iter(content)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Attached document links: markdown links that are not images and point at
/// a known document extension.
pub fn extract_files(content: &str) -> Vec<FileLink> {
    let image_urls: HashSet<String> = extract_images(content).into_iter().collect();

    LINK_RE
        .captures_iter(content)
        .filter_map(|cap| {
            let url = cap[2].to_string();
            if image_urls.contains(&url) || !FILE_EXT_RE.is_match(&url) {
                return None;
            }
            let name = cap[1]
                .trim_start_matches(['📄', '📎'])
                .trim()
                .to_string();
            let is_pdf = url.to_lowercase().ends_with(".pdf");
            Some(FileLink { name, url, is_pdf })
        })
        .collect()
}

/// Markdown-stripped plain-text preview of the content.
pub fn clean_excerpt(content: &str) -> String {
    let without_images = IMAGE_RE.replace_all(content, "");
    let without_links = LINK_RE.replace_all(&without_images, "");

    let stripped: String = without_links
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '`' | '_' | '~'))
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, BackendCsv) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        let store = BackendCsv::load(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn create_req(title: &str, content: &str) -> ArticleCreate {
        ArticleCreate {
            title: title.to_string(),
            content: content.to_string(),
            tags: "rust,notes".to_string(),
            author: "admin".to_string(),
        }
    }

    #[test]
    fn test_create_get_delete() {
        let (_dir, store) = temp_store();

        let article = store.create(create_req("hello", "body")).unwrap();
        assert_eq!(article.id, 1);
        assert!(article.ai_summary.is_none());
        assert!(article.embedding.is_none());

        let fetched = store.get(article.id).unwrap().unwrap();
        assert_eq!(fetched.title, "hello");

        store.delete(article.id).unwrap();
        assert!(store.get(article.id).unwrap().is_none());
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let (_dir, store) = temp_store();

        let first = store.create(create_req("a", "1")).unwrap();
        let second = store.create(create_req("b", "2")).unwrap();
        store.delete(first.id).unwrap();
        let third = store.create(create_req("c", "3")).unwrap();

        assert!(third.id > second.id);
    }

    #[test]
    fn test_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        let path = path.to_str().unwrap();

        {
            let store = BackendCsv::load(path).unwrap();
            let article = store
                .create(create_req("persisted", "line one\nline two, with commas"))
                .unwrap();
            store.save_summary(article.id, "a summary").unwrap();
            store.save_embedding(article.id, "[0.1,0.2]").unwrap();
        }

        let store = BackendCsv::load(path).unwrap();
        let article = store.get(1).unwrap().unwrap();
        assert_eq!(article.content, "line one\nline two, with commas");
        assert_eq!(article.ai_summary.as_deref(), Some("a summary"));
        assert_eq!(article.embedding.as_deref(), Some("[0.1,0.2]"));
    }

    #[test]
    fn test_update_with_changed_content_clears_caches() {
        let (_dir, store) = temp_store();

        let article = store.create(create_req("t", "original content")).unwrap();
        store.save_summary(article.id, "summary").unwrap();
        store.save_embedding(article.id, "[1.0]").unwrap();

        let outcome = store
            .update(
                article.id,
                ArticleUpdate {
                    content: Some("different content".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(outcome.content_changed);
        assert!(outcome.article.ai_summary.is_none());
        assert!(outcome.article.embedding.is_none());
    }

    #[test]
    fn test_update_with_identical_content_keeps_caches() {
        let (_dir, store) = temp_store();

        let article = store.create(create_req("t", "same content")).unwrap();
        store.save_summary(article.id, "summary").unwrap();
        store.save_embedding(article.id, "[1.0]").unwrap();

        let outcome = store
            .update(
                article.id,
                ArticleUpdate {
                    title: Some("new title".to_string()),
                    content: Some("same content".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(!outcome.content_changed);
        assert_eq!(outcome.article.title, "new title");
        assert_eq!(outcome.article.ai_summary.as_deref(), Some("summary"));
        assert_eq!(outcome.article.embedding.as_deref(), Some("[1.0]"));
    }

    #[test]
    fn test_update_missing_article_errors() {
        let (_dir, store) = temp_store();
        assert!(store.update(42, ArticleUpdate::default()).is_err());
    }

    #[test]
    fn test_list_newest_first_and_keyword_filter() {
        let (_dir, store) = temp_store();

        store.create(create_req("rust post", "about BORROWING")).unwrap();
        store.create(create_req("cooking", "pasta recipe")).unwrap();

        let all = store.list(None).unwrap();
        assert_eq!(all.len(), 2);

        let hits = store.list(Some("borrowing")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "rust post");

        let hits = store.list(Some("RUST")).unwrap();
        assert_eq!(hits.len(), 1);

        let hits = store.list(Some("nothing here")).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_extract_images() {
        let content = "intro ![alt](/img/a.png) middle ![](http://x/b.jpg) end";
        assert_eq!(extract_images(content), vec!["/img/a.png", "http://x/b.jpg"]);
    }

    #[test]
    fn test_extract_files_skips_images_and_plain_links() {
        let content = "\
![shot](/f/shot.png) \
[📄 report.pdf](/f/report.pdf) \
[notes](/f/notes.md) \
[homepage](https://example.com/) \
[archive](/f/data.zip)";

        let files = extract_files(content);
        assert_eq!(
            files,
            vec![
                FileLink {
                    name: "report.pdf".to_string(),
                    url: "/f/report.pdf".to_string(),
                    is_pdf: true
                },
                FileLink {
                    name: "notes".to_string(),
                    url: "/f/notes.md".to_string(),
                    is_pdf: false
                },
                FileLink {
                    name: "archive".to_string(),
                    url: "/f/data.zip".to_string(),
                    is_pdf: false
                },
            ]
        );
    }

    #[test]
    fn test_clean_excerpt_strips_markdown() {
        let content = "# Title\n\nSome **bold** text with ![img](/a.png) and [a link](/b.pdf).";
        let excerpt = clean_excerpt(content);
        assert_eq!(excerpt, "Title Some bold text with and .");
    }

    #[test]
    fn test_clean_excerpt_truncates() {
        let content = "word ".repeat(100);
        assert_eq!(clean_excerpt(&content).chars().count(), 200);
    }

    #[test]
    fn test_digest_limits() {
        let mut content = String::new();
        for i in 0..6 {
            content.push_str(&format!("![i](/img/{i}.png) "));
        }
        for i in 0..7 {
            content.push_str(&format!("[f](/f/{i}.pdf) "));
        }

        let article = Article {
            id: 1,
            title: "t".into(),
            content,
            tags: String::new(),
            author: "admin".into(),
            created_at: Utc::now(),
            ai_summary: None,
            embedding: None,
        };

        let digest = article.digest();
        assert_eq!(digest.images.len(), 4);
        assert_eq!(digest.files.len(), 5);
    }
}
