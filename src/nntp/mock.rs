//! In-memory NNTP responder used by pool and integration tests in place
//! of a real news server.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::connection::{NntpConnector, NntpSession};
use super::error::NntpError;

#[derive(Default)]
pub struct MockNntpConnector {
    articles: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    gone: Arc<Mutex<Vec<String>>>,
}

impl MockNntpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, message_id: impl Into<String>, raw_article: Vec<u8>) {
        self.articles.lock().await.insert(message_id.into(), raw_article);
    }

    pub async fn mark_gone(&self, message_id: impl Into<String>) {
        self.gone.lock().await.push(message_id.into());
    }
}

pub struct MockNntpSession {
    articles: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    gone: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl NntpSession for MockNntpSession {
    async fn fetch_body(&mut self, message_id: &str) -> Result<Vec<u8>, NntpError> {
        if self.gone.lock().await.iter().any(|id| id == message_id) {
            return Err(NntpError::ArticleGone(message_id.to_string()));
        }
        self.articles
            .lock()
            .await
            .get(message_id)
            .cloned()
            .ok_or_else(|| NntpError::Transient(format!("no such article: {message_id}")))
    }
}

#[async_trait]
impl NntpConnector for MockNntpConnector {
    type Session = MockNntpSession;

    async fn connect(&self) -> Result<Self::Session, NntpError> {
        Ok(MockNntpSession {
            articles: Arc::clone(&self.articles),
            gone: Arc::clone(&self.gone),
        })
    }
}
