use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::message::{Message, ToolCall, ToolResult};
use crate::tool::ToolRegistry;

/// Runs the tool calls of one assistant message, one at a time, in the order requested.
#[derive(Clone)]
pub struct TurnExecutor {
    tools: Arc<ToolRegistry>,
    call_timeout: Duration,
}

impl TurnExecutor {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            call_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// One result per requested call. A failing call never stops its siblings.
    pub async fn execute(&self, message: &Message) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(message.tool_calls.len());
        for call in &message.tool_calls {
            results.push(self.execute_call(call).await);
        }
        results
    }

    pub fn observations(results: &[ToolResult]) -> Vec<Message> {
        results.iter().map(Message::observation).collect()
    }

    async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        if let Err(err) = self.tools.resolve(&call.name) {
            warn!(tool = %call.name, id = %call.id, "model requested an unknown tool");
            return ToolResult::error(call, format!("cannot attribute call: {err}"));
        }

        debug!(tool = %call.name, id = %call.id, "invoking tool");
        match timeout(
            self.call_timeout,
            self.tools.try_invoke(&call.name, call.arguments.clone()),
        )
        .await
        {
            Ok(Ok(output)) => ToolResult::output(call, output),
            Ok(Err(err)) => {
                warn!(tool = %call.name, error = %err, "tool call failed");
                ToolResult::error(call, err.to_string())
            }
            Err(_) => {
                warn!(tool = %call.name, "tool call timed out");
                ToolResult::error(
                    call,
                    format!(
                        "tool `{}` timed out after {}s",
                        call.name,
                        self.call_timeout.as_secs()
                    ),
                )
            }
        }
    }
}
