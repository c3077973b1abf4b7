pub mod evolution;
#[cfg(test)]
pub mod testing;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const GROUP_SERVER: &str = "g.us";
pub const BROADCAST_SERVER: &str = "broadcast";
pub const NEWSLETTER_SERVER: &str = "newsletter";

/// Errors surfaced by a protocol client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bridge returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected bridge response: {0}")]
    Decode(String),
}

/// A WhatsApp address: `user[:device]@server`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Jid {
    pub user: String,
    pub device: Option<u16>,
    pub server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: None,
            server: server.into(),
        }
    }

    pub fn status_broadcast() -> Self {
        Self::new("status", BROADCAST_SERVER)
    }

    /// Parse a JID string. Never fails: malformed input keeps whatever parts
    /// could be recovered.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (user_part, server) = match raw.split_once('@') {
            Some((user, server)) => (user, server),
            None => (raw, ""),
        };
        let (user, device) = match user_part.split_once(':') {
            Some((user, device)) => (user, device.parse().ok()),
            None => (user_part, None),
        };
        Self {
            user: user.to_string(),
            device,
            server: server.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.server.is_empty()
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.user == "status" && self.server == BROADCAST_SERVER
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server.is_empty() {
            return write!(f, "{}", self.user);
        }
        match self.device {
            Some(device) => write!(f, "{}:{}@{}", self.user, device, self.server),
            None => write!(f, "{}@{}", self.user, self.server),
        }
    }
}

impl From<String> for Jid {
    fn from(raw: String) -> Self {
        Jid::parse(&raw)
    }
}

impl From<&str> for Jid {
    fn from(raw: &str) -> Self {
        Jid::parse(raw)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

/// Envelope metadata of an inbound message
#[derive(Debug, Clone)]
pub struct MessageInfo {
    pub chat: Jid,
    pub sender: Jid,
    pub id: String,
    pub is_from_me: bool,
    pub is_group: bool,
    pub push_name: String,
    pub timestamp: DateTime<Utc>,
}

/// The subset of the WhatsApp message union the bot reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    pub conversation: Option<String>,
    #[serde(rename = "imageMessage")]
    pub image: Option<MediaPart>,
    #[serde(rename = "videoMessage")]
    pub video: Option<MediaPart>,
    #[serde(rename = "documentMessage")]
    pub document: Option<MediaPart>,
    #[serde(rename = "extendedTextMessage")]
    pub extended_text: Option<ExtendedText>,
}

impl MessageContent {
    #[cfg(test)]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            conversation: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn context_info(&self) -> Option<&ContextInfo> {
        self.extended_text
            .as_ref()
            .and_then(|ext| ext.context_info.as_ref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPart {
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedText {
    pub text: Option<String>,
    pub context_info: Option<ContextInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    pub stanza_id: Option<String>,
    pub participant: Option<Jid>,
    pub quoted_message: Option<Box<MessageContent>>,
    #[serde(default)]
    pub mentioned_jid: Vec<Jid>,
}

/// A "message received" event as delivered by the protocol client
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub info: MessageInfo,
    pub content: MessageContent,
    /// Untouched protocol payload, used to quote the original message
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Connecting,
    Closed,
    Other(String),
}

impl ConnectionState {
    pub fn from_bridge(state: &str) -> Self {
        match state {
            "open" | "connected" => ConnectionState::Open,
            "connecting" => ConnectionState::Connecting,
            "close" | "closed" => ConnectionState::Closed,
            other => ConnectionState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Other(state) => write!(f, "{}", state),
        }
    }
}

/// Inbound events the bot cares about
#[derive(Debug, Clone)]
pub enum Event {
    Message(Box<MessageEvent>),
    /// A fresh pairing QR code (base64 PNG, optionally a data URI)
    QrCode(String),
    Connection(ConnectionState),
}

/// Identifies a message for reactions, quoting and read receipts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: Jid,
    pub from_me: bool,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant: Option<Jid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Url(String),
}

/// The message a reply quotes
#[derive(Debug, Clone)]
pub struct QuotedRef {
    pub key: MessageKey,
    pub message: serde_json::Value,
}

/// Link preview card attached to a reply
#[derive(Debug, Clone, Default)]
pub struct ExternalAdReply {
    pub title: String,
    pub body: String,
    pub thumbnail: Option<Vec<u8>>,
    pub source_url: String,
    pub render_larger_thumbnail: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReplyContext {
    pub quoted: Option<QuotedRef>,
    pub mentions: Vec<Jid>,
    pub external_ad: Option<ExternalAdReply>,
}

#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    Text {
        text: String,
        context: Option<ReplyContext>,
    },
    Media {
        kind: MediaKind,
        source: MediaSource,
        caption: String,
        context: Option<ReplyContext>,
    },
    #[allow(dead_code)]
    Reaction {
        key: MessageKey,
        emoji: String,
    },
}

#[derive(Debug, Clone, Default)]
#[allow(dead_code)]
pub struct SentMessage {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A stored session was resumed
    Paired,
    /// No session yet; the QR code must be scanned
    PairingRequired { qr: String },
    /// No session and no QR code yet; one follows as a `qrcode.updated` event
    AwaitingQr,
}

/// Outbound half of the WhatsApp protocol client. Inbound events arrive on
/// a channel fed by the client implementation.
#[async_trait]
pub trait WaClient: Send + Sync {
    async fn connect(&self) -> Result<ConnectOutcome, ClientError>;

    /// Send a message. Media is uploaded by the client as part of the send.
    async fn send_message(
        &self,
        to: &Jid,
        message: OutgoingMessage,
    ) -> Result<SentMessage, ClientError>;

    async fn mark_read(&self, keys: &[MessageKey]) -> Result<(), ClientError>;

    async fn connection_state(&self) -> Result<ConnectionState, ClientError>;
}
