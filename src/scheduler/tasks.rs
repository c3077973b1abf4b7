use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use super::Scheduler;
use crate::config::SchedulerConfig;
use crate::platform::{ConnectionState, WaClient};

/// Register the bot's periodic jobs.
pub async fn register_builtin_tasks(
    scheduler: &mut Scheduler,
    config: &SchedulerConfig,
    client: Arc<dyn WaClient>,
) -> Result<()> {
    scheduler
        .every(&config.heartbeat_cron, "heartbeat", move || {
            let client = client.clone();
            Box::pin(async move { heartbeat(client.as_ref()).await })
        })
        .await
}

/// Log the bridge connection state.
pub async fn heartbeat(client: &dyn WaClient) {
    match client.connection_state().await {
        Ok(ConnectionState::Open) => info!("Heartbeat: connected"),
        Ok(state) => warn!("Heartbeat: connection is {}", state),
        Err(e) => warn!("Heartbeat: could not query connection state: {}", e),
    }
}
