//! In-memory `WaClient` that records every outbound action.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use super::*;

#[derive(Default)]
pub struct RecordingClient {
    pub sent: Mutex<Vec<(Jid, OutgoingMessage)>>,
    pub read: Mutex<Vec<MessageKey>>,
    /// Make every media send fail
    pub fail_media: AtomicBool,
    pub fail_mark_read: AtomicBool,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(_, msg)| match msg {
                OutgoingMessage::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn media(&self) -> Vec<(MediaKind, MediaSource, String)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(_, msg)| match msg {
                OutgoingMessage::Media {
                    kind,
                    source,
                    caption,
                    ..
                } => Some((*kind, source.clone(), caption.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl WaClient for RecordingClient {
    async fn connect(&self) -> Result<ConnectOutcome, ClientError> {
        Ok(ConnectOutcome::Paired)
    }

    async fn send_message(
        &self,
        to: &Jid,
        message: OutgoingMessage,
    ) -> Result<SentMessage, ClientError> {
        let is_media = matches!(message, OutgoingMessage::Media { .. });
        self.sent.lock().push((to.clone(), message));
        if is_media && self.fail_media.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 500,
                body: "upload failed".to_string(),
            });
        }
        Ok(SentMessage {
            id: format!("SENT{}", self.sent_count()),
        })
    }

    async fn mark_read(&self, keys: &[MessageKey]) -> Result<(), ClientError> {
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(ClientError::Decode("mark read refused".to_string()));
        }
        self.read.lock().extend_from_slice(keys);
        Ok(())
    }

    async fn connection_state(&self) -> Result<ConnectionState, ClientError> {
        Ok(ConnectionState::Open)
    }
}

/// Build a plain-text message event in a private chat with `sender`.
pub fn text_event(sender: &str, body: &str) -> MessageEvent {
    let sender = Jid::new(sender, "s.whatsapp.net");
    MessageEvent {
        info: MessageInfo {
            chat: sender.clone(),
            sender,
            id: "3EB0TEST".to_string(),
            is_from_me: false,
            is_group: false,
            push_name: "Tester".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        },
        content: MessageContent::text(body),
        raw: serde_json::json!({ "conversation": body }),
    }
}
