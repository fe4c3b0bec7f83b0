//! Model consultation: the trait the agent loop talks to, an OpenAI-compatible
//! client, and a scripted stub for tests and demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::ModelConfig;
use crate::error::{GatewayError, Result};
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolDescription;

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelCompletion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    pub fn into_message(self) -> Message {
        Message::assistant_with_tools(self.content.unwrap_or_default(), self.tool_calls)
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str) -> GatewayError {
    let body = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        format!("openai rate limit exceeded: {body}")
    } else {
        body.to_string()
    };
    GatewayError::ModelStatus {
        status: status.as_u16(),
        body,
    }
}

fn serialize_tool_arguments(args: &Value) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| args.to_string())
}

#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
    temperature: f32,
    timeout_secs: u64,
}

impl OpenAIClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            GatewayError::Config("missing OpenAI API key (set OPENAI_API_KEY)".into())
        })?;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .build()
                .map_err(|err| GatewayError::LanguageModel(format!("http client error: {err}")))?,
            model: cfg.model.clone(),
            api_key,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            temperature: cfg.temperature,
            timeout_secs: cfg.timeout_secs,
        })
    }

    fn to_openai_messages(&self, messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                }
                .to_string();

                let tool_calls = if message.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| OpenAiToolCall {
                                id: Some(call.id.clone()),
                                r#type: "function".to_string(),
                                function: OpenAiFunctionCall {
                                    name: call.name.clone(),
                                    arguments: serialize_tool_arguments(&call.arguments),
                                },
                            })
                            .collect(),
                    )
                };

                let content = if tool_calls.is_some() && message.content.is_empty() {
                    None
                } else {
                    Some(message.content.clone())
                };

                OpenAiMessage {
                    role,
                    content,
                    tool_call_id: message.tool_call_id.clone(),
                    tool_calls,
                }
            })
            .collect()
    }

    fn to_openai_tools(&self, tools: &[ToolDescription]) -> Option<Vec<OpenAiTool>> {
        if tools.is_empty() {
            return None;
        }

        Some(
            tools
                .iter()
                .map(|tool| OpenAiTool {
                    r#type: "function".to_string(),
                    function: OpenAiFunction {
                        name: tool.name.clone(),
                        description: Some(tool.description.clone()),
                        parameters: Some(tool.parameters.clone()),
                    },
                })
                .collect(),
        )
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let mut payload = json!({
            "model": self.model,
            "messages": self.to_openai_messages(messages),
            "temperature": self.temperature,
        });
        if let Some(tools) = self.to_openai_tools(tools) {
            payload["tools"] = serde_json::to_value(tools)?;
            payload["tool_choice"] = Value::String("auto".to_string());
        }

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GatewayError::Timeout {
                        operation: "model consultation".into(),
                        seconds: self.timeout_secs,
                    }
                } else {
                    GatewayError::LanguageModel(format!("OpenAI request error: {err}"))
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body));
        }

        let body: OpenAiResponse = resp.json().await.map_err(|err| {
            GatewayError::MalformedResponse(format!("OpenAI response parse error: {err}"))
        })?;

        let first = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::MalformedResponse("OpenAI returned no choices".into()))?;

        Ok(parse_choice(first.message))
    }
}

/// Blank arguments mean "no arguments"; unparseable text is kept verbatim
/// so validation can report it.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_choice(message: OpenAiChoiceMessage) -> ModelCompletion {
    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = parse_arguments(&call.function.arguments);
            ToolCall {
                id: call.id.unwrap_or_default(),
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    ModelCompletion {
        content: message.content,
        tool_calls,
    }
}

/// One scripted answer for [`StubModel`].
#[derive(Debug, Clone)]
pub enum StubReply {
    Completion(ModelCompletion),
    Failure(String),
}

/// A deterministic model used for tests and demos. Replies are consumed in order.
pub struct StubModel {
    replies: Mutex<VecDeque<StubReply>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl StubModel {
    pub fn new(completions: Vec<ModelCompletion>) -> Arc<Self> {
        Self::from_replies(completions.into_iter().map(StubReply::Completion).collect())
    }

    pub fn from_replies(replies: Vec<StubReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// The message lists this model was consulted with, oldest first.
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    fn model_id(&self) -> &str {
        "stub-model"
    }

    async fn complete_chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| GatewayError::LanguageModel("stub model poisoned".into()))?
            .pop_front();
        match next {
            Some(StubReply::Completion(completion)) => Ok(completion),
            Some(StubReply::Failure(reason)) => Err(GatewayError::LanguageModel(reason)),
            None => Err(GatewayError::LanguageModel(
                "StubModel ran out of scripted responses".into(),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolResult;

    fn client() -> OpenAIClient {
        OpenAIClient::from_config(&ModelConfig {
            api_key: Some("test-key".into()),
            ..ModelConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn requires_api_key() {
        let err = OpenAIClient::from_config(&ModelConfig::default()).err().unwrap();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn encodes_tool_round_trip_messages() {
        let call = ToolCall::new("call_1", "read_file", json!({"path": "a.txt"}));
        let messages = vec![
            Message::user("read a.txt"),
            Message::assistant_with_tools("", vec![call.clone()]),
            Message::observation(&ToolResult::output(&call, "hello")),
        ];

        let encoded = serde_json::to_value(client().to_openai_messages(&messages)).unwrap();

        assert_eq!(encoded[1]["role"], "assistant");
        assert!(encoded[1].get("content").is_none());
        assert_eq!(encoded[1]["tool_calls"][0]["function"]["name"], "read_file");
        assert_eq!(
            encoded[1]["tool_calls"][0]["function"]["arguments"],
            r#"{"path":"a.txt"}"#
        );
        assert_eq!(encoded[2]["role"], "tool");
        assert_eq!(encoded[2]["tool_call_id"], "call_1");
    }

    #[test]
    fn parses_tool_call_choice() {
        let raw = r#"{"content":null,"tool_calls":[{"id":"call_9","type":"function","function":{"name":"list_files","arguments":"{}"}}]}"#;
        let message: OpenAiChoiceMessage = serde_json::from_str(raw).unwrap();

        let completion = parse_choice(message);

        assert_eq!(completion.content, None);
        assert_eq!(
            completion.tool_calls,
            vec![ToolCall::new("call_9", "list_files", json!({}))]
        );
    }

    #[test]
    fn blank_tool_arguments_become_empty_object() {
        let raw = r#"{"content":null,"tool_calls":[{"id":"call_3","type":"function","function":{"name":"list_files","arguments":"  "}}]}"#;
        let message: OpenAiChoiceMessage = serde_json::from_str(raw).unwrap();

        let completion = parse_choice(message);

        assert_eq!(
            completion.tool_calls,
            vec![ToolCall::new("call_3", "list_files", json!({}))]
        );
    }

    #[test]
    fn malformed_tool_arguments_are_kept_verbatim() {
        assert_eq!(parse_arguments("{path:"), json!("{path:"));
    }

    #[test]
    fn non_success_statuses_carry_the_code() {
        let err = coalesce_error(reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, GatewayError::ModelStatus { status: 401, .. }));
        assert!(!err.is_retryable());

        let err = coalesce_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("rate limit"));
    }

    #[tokio::test]
    async fn stub_replays_script_then_fails() {
        let model = StubModel::from_replies(vec![
            StubReply::Completion(ModelCompletion::text("hi")),
            StubReply::Failure("quota exceeded".into()),
        ]);

        let first = model.complete_chat(&[], &[]).await.unwrap();
        assert_eq!(first.content.as_deref(), Some("hi"));
        assert!(model.complete_chat(&[], &[]).await.is_err());
        assert!(model.complete_chat(&[], &[]).await.is_err());
        assert_eq!(model.seen().len(), 3);
    }
}
