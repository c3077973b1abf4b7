use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandContext, Services};
use crate::message::{Message, Normalizer};
use crate::platform::{MessageEvent, WaClient};

/// Why a message did not reach a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// No prefix, or the body does not start with it
    NotCommand,
    /// Newsletter, status broadcast or another ignored server
    DisallowedSource,
    /// Self mode is on and the sender is not an owner
    NotOwner,
    UnknownCommand,
}

/// Result of dispatching one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped(Skip),
    Handled,
    /// The handler returned an error or panicked; already logged
    Failed,
}

/// Routes normalized messages to registered commands.
pub struct Dispatcher {
    client: Arc<dyn WaClient>,
    normalizer: Normalizer,
    services: Arc<Services>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn WaClient>, services: Arc<Services>) -> Self {
        Self {
            client,
            normalizer: Normalizer::new(&services.bot),
            services,
        }
    }

    /// Process one inbound message event. Never fails: handler errors and
    /// panics are logged and reported as [`Outcome::Failed`].
    pub async fn handle_event(&self, event: MessageEvent) -> Outcome {
        let message = self.normalizer.normalize(&event);

        if message.is_status_broadcast && !message.is_from_me && self.services.bot.read_status {
            self.mark_status_read(&message).await;
        }

        if let Err(skip) = self.check(&message) {
            return Outcome::Skipped(skip);
        }

        let command = message.command.to_lowercase();
        let Some(handler) = self.services.registry.lookup(&command) else {
            debug!("Unknown command from {}: {}", message.sender, command);
            return Outcome::Skipped(Skip::UnknownCommand);
        };

        info!(
            "Command {} from {} ({}) in {}",
            command, message.push_name, message.sender, message.chat
        );

        let ctx = CommandContext::new(
            self.client.clone(),
            message,
            Arc::new(event),
            self.services.clone(),
        );

        match AssertUnwindSafe(handler.handle(&ctx)).catch_unwind().await {
            Ok(Ok(())) => Outcome::Handled,
            Ok(Err(e)) => {
                error!("Command {} failed: {:#}", command, e);
                Outcome::Failed
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Command {} panicked: {}", command, reason);
                Outcome::Failed
            }
        }
    }

    /// Filters applied before lookup, in order
    fn check(&self, message: &Message) -> Result<(), Skip> {
        if !message.is_command() {
            return Err(Skip::NotCommand);
        }

        let bot = &self.services.bot;
        if message.is_status_broadcast
            || bot
                .ignored_servers
                .iter()
                .any(|server| *server == message.chat.server)
        {
            return Err(Skip::DisallowedSource);
        }

        if bot.self_mode && !message.is_owner {
            return Err(Skip::NotOwner);
        }

        Ok(())
    }

    async fn mark_status_read(&self, message: &Message) {
        let mut key = message.key();
        key.participant = Some(message.sender.clone());
        match self.client.mark_read(&[key]).await {
            Ok(()) => debug!("Marked status {} from {} as read", message.id, message.sender),
            Err(e) => warn!("Failed to mark status as read: {}", e),
        }
    }
}
