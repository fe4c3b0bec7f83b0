use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::agent::AgentLoop;
use crate::error::{GatewayError, Result};
use crate::llm::LanguageModel;
use crate::message::{Message, Role};
use crate::store::{ConversationLocks, ConversationStore};

/// Reply used when a finished turn holds no assistant answer.
pub const NO_REPLY_SENTINEL: &str = "(no reply)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub reply: String,
    /// Kind labels of the messages produced during this turn, oldest first.
    pub turn_messages: Vec<String>,
}

/// Entry point for one user turn: load, run the agent loop, commit.
pub struct Gateway<M: LanguageModel> {
    agent: AgentLoop<M>,
    store: Arc<dyn ConversationStore>,
    locks: ConversationLocks,
}

impl<M: LanguageModel> Gateway<M> {
    pub fn new(agent: AgentLoop<M>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            agent,
            store,
            locks: ConversationLocks::new(),
        }
    }

    pub fn model_id(&self) -> &str {
        self.agent.model().model_id()
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn chat(&self, conversation_id: &str, message: &str) -> Result<ChatOutcome> {
        if conversation_id.trim().is_empty() {
            return Err(GatewayError::Protocol("conversation_id must not be empty".into()));
        }
        if message.trim().is_empty() {
            return Err(GatewayError::Protocol("message must not be empty".into()));
        }

        let _guard = self.locks.acquire(conversation_id).await;

        let mut history = self.store.get_or_create(conversation_id).await?;
        let turn_start = history.len();
        history.push(Message::user(message));

        let outcome = self.agent.run(history).await?;

        let turn_messages: Vec<String> = outcome.history[turn_start..]
            .iter()
            .map(|m| m.label().to_string())
            .collect();
        let reply = outcome
            .history
            .last()
            .filter(|m| m.role == Role::Assistant && m.tool_calls.is_empty())
            .map(|m| m.content.clone())
            .unwrap_or_else(|| NO_REPLY_SENTINEL.to_string());

        self.store.commit(conversation_id, outcome.history).await?;

        info!(
            rounds = outcome.rounds,
            produced = turn_messages.len(),
            "turn committed"
        );
        Ok(ChatOutcome {
            reply,
            turn_messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TurnExecutor;
    use crate::llm::{ModelCompletion, StubModel, StubReply};
    use crate::message::ToolCall;
    use crate::retry::RetryPolicy;
    use crate::store::InMemoryConversationStore;
    use crate::tool::{ToolDescription, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Echoes the latest user message after a pause, so overlapping turns
    /// would both read the store before either commits.
    struct SlowEcho;

    #[async_trait]
    impl LanguageModel for SlowEcho {
        fn model_id(&self) -> &str {
            "slow-echo"
        }

        async fn complete_chat(
            &self,
            messages: &[Message],
            _tools: &[ToolDescription],
        ) -> Result<ModelCompletion> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let last_user = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(ModelCompletion::text(format!("re: {last_user}")))
        }
    }

    fn gateway(model: Arc<StubModel>) -> (Gateway<StubModel>, InMemoryConversationStore) {
        let store = InMemoryConversationStore::new();
        let agent = AgentLoop::new(model, TurnExecutor::new(Arc::new(ToolRegistry::new())))
            .with_retry(RetryPolicy::none());
        (Gateway::new(agent, Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn commits_history_and_reports_turn_trace() {
        let (gateway, store) = gateway(StubModel::new(vec![
            ModelCompletion::text("first answer"),
            ModelCompletion::text("second answer"),
        ]));

        let first = gateway.chat("c1", "hello").await.unwrap();
        assert_eq!(first.reply, "first answer");
        assert_eq!(first.turn_messages, vec!["user", "assistant"]);

        let second = gateway.chat("c1", "again").await.unwrap();
        assert_eq!(second.reply, "second answer");
        assert_eq!(second.turn_messages, vec!["user", "assistant"]);

        let stored = store.get_or_create("c1").await.unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[2], Message::user("again"));
    }

    #[tokio::test]
    async fn overlapping_turns_on_one_conversation_both_land() {
        let store = InMemoryConversationStore::new();
        let agent = AgentLoop::new(
            Arc::new(SlowEcho),
            TurnExecutor::new(Arc::new(ToolRegistry::new())),
        );
        let gateway = Gateway::new(agent, Arc::new(store.clone()));

        let (first, second) = tokio::join!(gateway.chat("c1", "one"), gateway.chat("c1", "two"));
        first.unwrap();
        second.unwrap();

        let stored = store.get_or_create("c1").await.unwrap();
        let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(stored[1].content, format!("re: {}", stored[0].content));
        assert_eq!(stored[3].content, format!("re: {}", stored[2].content));
        assert_ne!(stored[0].content, stored[2].content);
    }

    #[tokio::test]
    async fn unknown_tool_is_folded_into_transcript() {
        let (gateway, store) = gateway(StubModel::new(vec![
            ModelCompletion::tool_calls(vec![ToolCall::new("x1", "format_disk", json!({}))]),
            ModelCompletion::text("That tool does not exist."),
        ]));

        let outcome = gateway.chat("c9", "format my disk").await.unwrap();

        assert_eq!(outcome.reply, "That tool does not exist.");
        let stored = store.get_or_create("c9").await.unwrap();
        assert_eq!(stored[2].role, Role::Tool);
        assert!(stored[2].content.contains("format_disk"));
    }

    #[tokio::test]
    async fn model_failure_leaves_store_untouched() {
        let (gateway, store) = gateway(StubModel::from_replies(vec![StubReply::Failure(
            "quota".into(),
        )]));

        let err = gateway.chat("c1", "hello").await.unwrap_err();

        assert!(matches!(err, GatewayError::LanguageModel(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn rejects_empty_input() {
        let (gateway, _) = gateway(StubModel::new(vec![]));

        assert!(matches!(
            gateway.chat(" ", "hello").await,
            Err(GatewayError::Protocol(_))
        ));
        assert!(matches!(
            gateway.chat("c1", "").await,
            Err(GatewayError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn empty_final_content_is_still_the_reply() {
        let (gateway, _) = gateway(StubModel::new(vec![ModelCompletion {
            content: None,
            tool_calls: Vec::new(),
        }]));

        let outcome = gateway.chat("c1", "hello").await.unwrap();

        assert_eq!(outcome.reply, "");
    }
}
