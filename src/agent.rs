use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::{GatewayError, Result};
use crate::executor::TurnExecutor;
use crate::llm::LanguageModel;
use crate::message::{Message, Role};
use crate::retry::RetryPolicy;

/// Instruction placed ahead of the history on every consultation. It is never stored.
pub const SYSTEM_INSTRUCTION: &str = "You are an agentic assistant. When asked about files, \
use the tools list_files/read_file. Always cite which tool you used in the answer. Be concise.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Consult,
    ExecuteTools,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub history: Vec<Message>,
    pub rounds: usize,
    pub hit_round_limit: bool,
}

impl LoopOutcome {
    /// Content of the final assistant message, if the history ends with one.
    pub fn reply(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.tool_calls.is_empty())
            .map(|m| m.content.as_str())
    }
}

/// Alternates between consulting the model and executing the tools it asks for
/// until it answers without requesting any.
pub struct AgentLoop<M: LanguageModel> {
    model: Arc<M>,
    executor: TurnExecutor,
    system_prompt: String,
    max_rounds: usize,
    model_timeout: Duration,
    retry: RetryPolicy,
}

impl<M: LanguageModel> AgentLoop<M> {
    pub fn new(model: Arc<M>, executor: TurnExecutor) -> Self {
        Self {
            model,
            executor,
            system_prompt: SYSTEM_INSTRUCTION.to_string(),
            max_rounds: 10,
            model_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_config(self, cfg: &AgentConfig, model_timeout: Duration) -> Self {
        self.with_max_rounds(cfg.max_rounds)
            .with_model_timeout(model_timeout)
            .with_retry(RetryPolicy::new(
                cfg.model_retries,
                Duration::from_millis(cfg.retry_backoff_ms),
            ))
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_model_timeout(mut self, model_timeout: Duration) -> Self {
        self.model_timeout = model_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Drive `history` from `Consult` to `Done`. The returned history is the
    /// input followed by every message produced along the way.
    pub async fn run(&self, mut history: Vec<Message>) -> Result<LoopOutcome> {
        let mut state = AgentState::Consult;
        let mut rounds = 0;
        let mut hit_round_limit = false;

        while state != AgentState::Done {
            state = match state {
                AgentState::Consult => {
                    rounds += 1;
                    let reply = self.consult(&history, rounds).await?;
                    let next = if reply.has_pending_tool_calls() {
                        AgentState::ExecuteTools
                    } else {
                        AgentState::Done
                    };
                    history.push(reply);
                    next
                }
                AgentState::ExecuteTools => {
                    let request = history.last().cloned().ok_or_else(|| {
                        GatewayError::Protocol("no assistant message to execute".into())
                    })?;
                    let results = self.executor.execute(&request).await;
                    history.extend(TurnExecutor::observations(&results));

                    if rounds >= self.max_rounds {
                        warn!(rounds, "round limit reached without a final answer");
                        hit_round_limit = true;
                        history.push(Message::assistant(format!(
                            "Stopped after {rounds} rounds without a final answer."
                        )));
                        AgentState::Done
                    } else {
                        AgentState::Consult
                    }
                }
                AgentState::Done => AgentState::Done,
            };
        }

        info!(rounds, hit_round_limit, "agent loop finished");
        Ok(LoopOutcome {
            history,
            rounds,
            hit_round_limit,
        })
    }

    async fn consult(&self, history: &[Message], round: usize) -> Result<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend_from_slice(history);
        let tools = self.executor.tools().describe();

        let (model, messages, tools) = (&self.model, &messages, &tools);
        let limit = self.model_timeout;
        let completion = self
            .retry
            .retry("model consultation", move |_| async move {
                match timeout(limit, model.complete_chat(messages, tools)).await {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Timeout {
                        operation: "model consultation".into(),
                        seconds: limit.as_secs(),
                    }),
                }
            })
            .await?;

        let mut reply = completion.into_message();
        for (index, call) in reply.tool_calls.iter_mut().enumerate() {
            if call.id.is_empty() {
                call.id = format!("call_{round}_{index}");
            }
        }
        debug!(round, tool_calls = reply.tool_calls.len(), "model replied");
        Ok(reply)
    }
}
