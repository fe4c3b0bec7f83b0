use agent_gateway::telemetry::{init_tracing, LogFormat};
use agent_gateway::{FsBridge, FsBridgeConfig, Result};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("agent_gateway=info", LogFormat::from_env())?;

    let config = FsBridgeConfig::from_env()?;
    if !std::path::Path::new(&config.root).is_dir() {
        warn!(root = %config.root, "bridge root is not a directory; listings will be empty");
    }
    info!(root = %config.root, "starting filesystem bridge");

    FsBridge::new(&config.root)
        .serve(config.server.socket_addr()?)
        .await
}
