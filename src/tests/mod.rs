mod app;

use crate::ai::chat::{ChatApi, ChatMessage, ChatOptions, FragmentStream};
use crate::ai::embeddings::EmbeddingApi;
use crate::ai::AiError;
use crate::app::App;
use crate::articles::BackendCsv;
use crate::config::Config;
use crate::storage::BackendLocal;
use async_trait::async_trait;
use std::sync::Arc;

/// Chat stub answering every buffered completion with a fixed reply and
/// streaming it back as a single fragment.
pub struct StubChat {
    pub reply: String,
}

#[async_trait]
impl ChatApi for StubChat {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _opts: ChatOptions,
    ) -> Result<String, AiError> {
        Ok(self.reply.clone())
    }

    async fn complete_stream(
        &self,
        _messages: Vec<ChatMessage>,
        _opts: ChatOptions,
    ) -> Result<FragmentStream, AiError> {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let reply = self.reply.clone();
        tokio::spawn(async move {
            let _ = tx.send(Ok(reply)).await;
        });
        Ok(rx)
    }
}

pub struct StubEmbedder {
    pub vector: Vec<f32>,
}

#[async_trait]
impl EmbeddingApi for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, AiError> {
        Ok(self.vector.clone())
    }
}

/// Creates an isolated App using a unique temp directory.
/// Each test gets its own directory so parallel tests never collide,
/// and no real data is touched.
pub fn create_app(chat_reply: &str, vector: Vec<f32>) -> (App, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let csv_path = tmp.path().join("articles.csv");

    let store = Arc::new(
        BackendCsv::load(csv_path.to_str().unwrap()).expect("failed to create article csv"),
    );
    let uploads = BackendLocal::new(tmp.path().join("uploads").to_str().unwrap())
        .expect("failed to create storage");

    let mut config = Config::default().with_base_path(tmp.path().to_str().unwrap());
    config.admin.username = "admin".to_string();
    config.admin.password_sha256 = crate::auth::password_digest("hunter2");

    let app = App::with_parts(
        config,
        store,
        Arc::new(StubChat {
            reply: chat_reply.to_string(),
        }),
        Arc::new(StubEmbedder { vector }),
        uploads,
    );
    (app, tmp)
}
