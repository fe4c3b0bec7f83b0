use std::sync::Arc;
use std::time::Duration;

use agent_gateway::telemetry::{init_tracing, LogFormat};
use agent_gateway::{
    filesystem_toolkit, server, AgentLoop, BridgeClient, Gateway, GatewayConfig,
    InMemoryConversationStore, OpenAIClient, Result, TurnExecutor,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("agent_gateway=info", LogFormat::from_env())?;

    let config = match std::env::var("GATEWAY_CONFIG") {
        Ok(path) => GatewayConfig::from_env_or_file(path)?,
        Err(_) => GatewayConfig::from_env()?,
    };
    info!(model = %config.model.model, bridge = %config.bridge.base_url, "loaded configuration");

    let bridge = BridgeClient::from_config(&config.bridge);
    match bridge.health().await {
        Ok(health) => info!(root = %health.root, "filesystem bridge reachable"),
        Err(err) => warn!(error = %err, "filesystem bridge not reachable yet"),
    }

    let tools = Arc::new(filesystem_toolkit(bridge)?);
    let executor = TurnExecutor::new(tools)
        .with_call_timeout(Duration::from_secs(config.agent.tool_timeout_secs));
    let model = Arc::new(OpenAIClient::from_config(&config.model)?);
    let agent = AgentLoop::new(model, executor)
        .with_config(&config.agent, Duration::from_secs(config.model.timeout_secs));

    let gateway = Arc::new(Gateway::new(
        agent,
        Arc::new(InMemoryConversationStore::new()),
    ));
    server::serve(gateway, config.server.socket_addr()?).await
}
