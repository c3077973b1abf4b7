use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatcher, Outcome};
use crate::pairing::Pairing;
use crate::platform::{ConnectionState, Event};

/// Consume bridge events until `shutdown` resolves or the channel closes.
/// Every message is dispatched on its own task so a slow command never holds
/// up the ones behind it.
pub async fn run(
    dispatcher: Arc<Dispatcher>,
    mut events: mpsc::Receiver<Event>,
    mut pairing: Pairing,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    info!("Bot is listening for events");

    loop {
        let deadline = pairing.deadline();
        tokio::select! {
            _ = &mut shutdown => break,
            _ = wait_until(deadline) => {
                if let Err(e) = pairing.timed_out().await {
                    error!("{:#}", e);
                }
            }
            event = events.recv() => match event {
                Some(event) => handle_event(&dispatcher, &mut pairing, event).await,
                None => {
                    warn!("Event channel closed");
                    break;
                }
            },
        }
    }
}

async fn handle_event(dispatcher: &Arc<Dispatcher>, pairing: &mut Pairing, event: Event) {
    match event {
        Event::Message(message) => {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let id = message.info.id.clone();
                if dispatcher.handle_event(*message).await == Outcome::Failed {
                    debug!("Message {} finished with a failed command", id);
                }
            });
        }
        Event::QrCode(qr) => {
            if let Err(e) = pairing.show_qr(&qr).await {
                error!("{:#}", e);
            }
        }
        Event::Connection(state) => {
            info!("Connection state: {}", state);
            if state == ConnectionState::Open {
                if let Err(e) = pairing.connected().await {
                    error!("{:#}", e);
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
