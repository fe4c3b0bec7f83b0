use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::{GatewayError, Result};
use crate::message::Message;

/// Persistence contract for conversation histories, keyed by conversation id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Prior history, or an empty one when the id has not been seen.
    async fn get_or_create(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Replace the stored history in one step.
    async fn commit(&self, conversation_id: &str, history: Vec<Message>) -> Result<()>;
}

/// Process-local store; state lives as long as the process.
#[derive(Default, Clone)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_or_create(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .conversations
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn commit(&self, conversation_id: &str, history: Vec<Message>) -> Result<()> {
        self.conversations
            .write()
            .await
            .insert(conversation_id.to_string(), history);
        Ok(())
    }
}

/// One JSON document per conversation under a directory. Commits write a
/// sibling temp file and rename it over the old one.
#[derive(Clone, Debug)]
pub struct FileConversationStore {
    dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        let safe: String = conversation_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let tag = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, conversation_id.as_bytes());
        self.dir.join(format!("{safe}-{}.json", tag.simple()))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn get_or_create(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let path = self.path_for(conversation_id);
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(GatewayError::Storage(format!(
                "failed to read transcript `{}`: {err}",
                path.display()
            ))),
        }
    }

    async fn commit(&self, conversation_id: &str, history: Vec<Message>) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(|err| {
            GatewayError::Storage(format!("failed to create `{}`: {err}", self.dir.display()))
        })?;
        let path = self.path_for(conversation_id);
        let staging = path.with_extension("json.tmp");
        let serialized = serde_json::to_vec(&history)?;
        fs::write(&staging, serialized)
            .await
            .map_err(|err| GatewayError::Storage(format!("failed to persist history: {err}")))?;
        fs::rename(&staging, &path).await.map_err(|err| {
            GatewayError::Storage(format!("failed to replace `{}`: {err}", path.display()))
        })
    }
}

/// Per-conversation exclusion. Hold the guard from load until commit so that
/// overlapping turns on one id run one after another.
#[derive(Default, Clone)]
pub struct ConversationLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
