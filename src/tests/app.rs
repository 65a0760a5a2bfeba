use super::create_app;
use crate::app::{App, AppError, SearchOutcome};
use crate::articles::{Article, ArticleCreate, ArticleStore, ArticleUpdate};
use std::time::Duration;

const CONTENT: &str = "A long enough piece of article content to pass every minimum length check in the pipeline.";

fn create_req(tags: &str) -> ArticleCreate {
    ArticleCreate {
        title: "test article".to_string(),
        content: CONTENT.to_string(),
        tags: tags.to_string(),
        author: String::new(),
    }
}

async fn wait_for_embedding(app: &App, id: u64) -> Option<String> {
    // embedding writes are fire-and-forget, poll until the task lands
    for _ in 0..100 {
        let article = app.store().get(id).unwrap();
        if let Some(embedding) = article.and_then(|a| a.embedding) {
            return Some(embedding);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_autogenerates_tags_when_empty() {
    let (app, _tmp) = create_app("rust, web", vec![1.0, 0.0]);

    let article = app.create_article(create_req(""), "admin").await.unwrap();
    assert_eq!(article.tags, "rust,web");
    assert_eq!(article.author, "admin");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_keeps_explicit_tags() {
    let (app, _tmp) = create_app("rust, web", vec![1.0, 0.0]);

    let article = app
        .create_article(create_req("manual,tags"), "admin")
        .await
        .unwrap();
    assert_eq!(article.tags, "manual,tags");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_rejects_empty_title() {
    let (app, _tmp) = create_app("x", vec![1.0]);

    let result = app
        .create_article(
            ArticleCreate {
                title: "  ".to_string(),
                content: CONTENT.to_string(),
                ..Default::default()
            },
            "admin",
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_persists_embedding_in_background() {
    let (app, _tmp) = create_app("tags", vec![0.5, 0.5]);

    let article = app.create_article(create_req("t"), "admin").await.unwrap();
    assert!(article.embedding.is_none());

    let encoded = wait_for_embedding(&app, article.id).await.expect("no embedding written");
    let decoded: Vec<f32> = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, vec![0.5, 0.5]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_same_content_preserves_summary() {
    let (app, _tmp) = create_app("tags", vec![1.0, 0.0]);

    let article = app.create_article(create_req("t"), "admin").await.unwrap();
    app.store().save_summary(article.id, "a cached summary").unwrap();

    let updated = app
        .update_article(
            article.id,
            ArticleUpdate {
                title: Some("new title".to_string()),
                content: Some(CONTENT.to_string()),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "new title");
    assert_eq!(updated.ai_summary.as_deref(), Some("a cached summary"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_changed_content_clears_summary_and_reembeds() {
    let (app, _tmp) = create_app("tags", vec![1.0, 0.0]);

    let article = app.create_article(create_req("t"), "admin").await.unwrap();
    wait_for_embedding(&app, article.id).await.unwrap();
    app.store().save_summary(article.id, "stale summary").unwrap();

    let updated = app
        .update_article(
            article.id,
            ArticleUpdate {
                content: Some(format!("{CONTENT} now with fresh material")),
                ..Default::default()
            },
            "admin",
        )
        .await
        .unwrap();

    assert!(updated.ai_summary.is_none());
    // the clear and the recompute race, but the vector must come back
    assert!(wait_for_embedding(&app, article.id).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_foreign_article_is_not_found() {
    let (app, _tmp) = create_app("tags", vec![1.0]);

    let article = app.create_article(create_req("t"), "admin").await.unwrap();
    let result = app
        .update_article(
            article.id,
            ArticleUpdate {
                title: Some("hijacked".to_string()),
                ..Default::default()
            },
            "someone-else",
        )
        .await;

    assert!(matches!(result, Err(AppError::NotFound)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_article() {
    let (app, _tmp) = create_app("tags", vec![1.0]);

    let article = app.create_article(create_req("t"), "admin").await.unwrap();
    app.delete_article(article.id, "admin").unwrap();

    assert!(matches!(
        app.get_article(article.id),
        Err(AppError::NotFound)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_semantic_search_finds_embedded_article() {
    let (app, _tmp) = create_app("tags", vec![0.6, 0.8]);

    let article = app.create_article(create_req("t"), "admin").await.unwrap();
    wait_for_embedding(&app, article.id).await.unwrap();

    // stub returns the same vector for the query, similarity is 1.0
    let outcome = app.search_articles("anything", None).await.unwrap();
    match outcome {
        SearchOutcome::Semantic(results) => {
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].article.id, article.id);
            assert!(results[0].similarity > 0.99);
        }
        SearchOutcome::Keyword(_) => panic!("expected semantic results"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_semantic_search_skips_unembedded_articles() {
    let (app, _tmp) = create_app("tags", vec![0.0, 1.0]);

    let article = app.create_article(create_req("t"), "admin").await.unwrap();
    // orthogonal vector stored manually, below the 0.5 threshold
    app.store()
        .save_embedding(article.id, "[1.0, 0.0]")
        .unwrap();

    let outcome = app.search_articles("anything", None).await.unwrap();
    match outcome {
        SearchOutcome::Semantic(results) => assert!(results.is_empty()),
        SearchOutcome::Keyword(_) => panic!("expected semantic results"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_returns_digests_newest_first() {
    let (app, _tmp) = create_app("tags", vec![1.0]);

    let first = app.create_article(create_req("t"), "admin").await.unwrap();
    let second = app
        .create_article(
            ArticleCreate {
                title: "second".to_string(),
                content: CONTENT.to_string(),
                tags: "t".to_string(),
                author: String::new(),
            },
            "admin",
        )
        .await
        .unwrap();

    let digests = app.list_articles(None).unwrap();
    assert_eq!(
        digests.iter().map(|d| d.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
}

#[test]
fn test_login_and_sessions() {
    let (app, _tmp) = create_app("tags", vec![1.0]);

    assert!(matches!(
        app.login("admin", "wrong"),
        Err(AppError::Unauthorized)
    ));
    assert!(matches!(
        app.login("nobody", "hunter2"),
        Err(AppError::Unauthorized)
    ));

    let token = app.login("admin", "hunter2").unwrap();
    assert!(app.is_admin_token(&token));

    app.logout(&token);
    assert!(!app.is_admin_token(&token));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_article_roundtrips_fields() {
    let (app, _tmp) = create_app("tags", vec![1.0]);

    let created = app.create_article(create_req("a,b"), "admin").await.unwrap();
    let fetched: Article = app.get_article(created.id).unwrap();

    assert_eq!(fetched.title, created.title);
    assert_eq!(fetched.content, created.content);
    assert_eq!(fetched.tags, "a,b");
}
