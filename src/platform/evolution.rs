//! WhatsApp client backed by an Evolution-API-compatible WhatsApp Web bridge.
//!
//! The bridge owns the multi-device session, encryption and media upload.
//! Outbound actions go through its REST API; inbound events arrive on a
//! local webhook listener and are forwarded to an mpsc channel.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use base64::Engine as _;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::*;
use crate::config::WhatsAppConfig;

pub const WEBHOOK_PATH: &str = "/webhook/whatsapp";

const WEBHOOK_EVENTS: [&str; 3] = ["MESSAGES_UPSERT", "QRCODE_UPDATED", "CONNECTION_UPDATE"];

/// Wrappers whose `message` field carries the actual content
const CONTAINER_KEYS: [&str; 5] = [
    "ephemeralMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
    "documentWithCaptionMessage",
];

const MAX_CONTAINER_DEPTH: usize = 4;

pub struct EvolutionClient {
    http: reqwest::Client,
    config: WhatsAppConfig,
}

impl EvolutionClient {
    pub fn new(config: WhatsAppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build bridge HTTP client")?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            path,
            self.config.instance_name
        )
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(self.url(path))
            .header("apikey", &self.config.api_key)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        debug!("Bridge request: POST {}", path);
        let response = self
            .http
            .post(self.url(path))
            .header("apikey", &self.config.api_key)
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Point the bridge's webhook at our listener, when a callback URL is configured.
    async fn register_webhook(&self) -> Result<(), ClientError> {
        let Some(url) = &self.config.webhook_url else {
            return Ok(());
        };
        let body = json!({
            "webhook": {
                "enabled": true,
                "url": url,
                "webhookByEvents": false,
                "events": WEBHOOK_EVENTS,
            }
        });
        self.post("webhook/set", &body).await?;
        info!("Registered bridge webhook: {}", url);
        Ok(())
    }
}

fn key_json(key: &MessageKey) -> Value {
    serde_json::to_value(key).unwrap_or(Value::Null)
}

/// Merge reply context fields into an outbound request body.
fn apply_context(body: &mut Value, context: Option<&ReplyContext>) {
    let Some(context) = context else {
        return;
    };
    if let Some(quoted) = &context.quoted {
        body["quoted"] = json!({
            "key": key_json(&quoted.key),
            "message": quoted.message,
        });
    }
    if !context.mentions.is_empty() {
        body["mentioned"] = json!(context
            .mentions
            .iter()
            .map(|jid| jid.to_string())
            .collect::<Vec<_>>());
    }
    if let Some(ad) = &context.external_ad {
        let thumbnail = ad
            .thumbnail
            .as_ref()
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));
        body["contextInfo"] = json!({
            "externalAdReply": {
                "title": ad.title,
                "body": ad.body,
                "mediaType": 1,
                "thumbnail": thumbnail,
                "sourceUrl": ad.source_url,
                "renderLargerThumbnail": ad.render_larger_thumbnail,
            }
        });
    }
}

/// Build the REST path and body for an outbound message.
pub(crate) fn outgoing_request(to: &Jid, message: &OutgoingMessage) -> (&'static str, Value) {
    match message {
        OutgoingMessage::Text { text, context } => {
            let mut body = json!({ "number": to.to_string(), "text": text });
            apply_context(&mut body, context.as_ref());
            ("message/sendText", body)
        }
        OutgoingMessage::Media {
            kind,
            source,
            caption,
            context,
        } => {
            let MediaSource::Url(media) = source;
            let mut body = json!({
                "number": to.to_string(),
                "mediatype": kind.as_str(),
                "media": media,
                "caption": caption,
            });
            apply_context(&mut body, context.as_ref());
            ("message/sendMedia", body)
        }
        OutgoingMessage::Reaction { key, emoji } => (
            "message/sendReaction",
            json!({ "key": key_json(key), "reaction": emoji }),
        ),
    }
}

/// Pull a QR payload out of the various shapes the bridge answers with.
fn extract_qr(value: &Value) -> Option<String> {
    value["base64"]
        .as_str()
        .or_else(|| value["qrcode"]["base64"].as_str())
        .or_else(|| value["qrcode"].as_str())
        .filter(|qr| !qr.is_empty())
        .map(str::to_string)
}

fn extract_state(value: &Value) -> Option<&str> {
    value["instance"]["state"]
        .as_str()
        .or_else(|| value["state"].as_str())
}

#[async_trait]
impl WaClient for EvolutionClient {
    async fn connect(&self) -> Result<ConnectOutcome, ClientError> {
        self.register_webhook().await?;

        let response = self.get("instance/connect").await?;
        if let Some(qr) = extract_qr(&response) {
            return Ok(ConnectOutcome::PairingRequired { qr });
        }

        match extract_state(&response).map(ConnectionState::from_bridge) {
            Some(ConnectionState::Open) => Ok(ConnectOutcome::Paired),
            Some(ConnectionState::Connecting) | None => Ok(ConnectOutcome::AwaitingQr),
            Some(state) => Err(ClientError::Decode(format!(
                "bridge returned no QR code while {}",
                state
            ))),
        }
    }

    async fn send_message(
        &self,
        to: &Jid,
        message: OutgoingMessage,
    ) -> Result<SentMessage, ClientError> {
        let (path, body) = outgoing_request(to, &message);
        let response = self.post(path, &body).await?;
        let id = response["key"]["id"].as_str().unwrap_or_default().to_string();
        Ok(SentMessage { id })
    }

    async fn mark_read(&self, keys: &[MessageKey]) -> Result<(), ClientError> {
        let read: Vec<Value> = keys.iter().map(key_json).collect();
        self.post("chat/markMessageAsRead", &json!({ "readMessages": read }))
            .await?;
        Ok(())
    }

    async fn connection_state(&self) -> Result<ConnectionState, ClientError> {
        let response = self.get("instance/connectionState").await?;
        let state = extract_state(&response)
            .ok_or_else(|| ClientError::Decode("missing connection state".to_string()))?;
        Ok(ConnectionState::from_bridge(state))
    }
}

// ── Webhook ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookKey {
    remote_jid: Jid,
    #[serde(default)]
    from_me: bool,
    id: String,
    participant: Option<Jid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookMessage {
    key: WebhookKey,
    push_name: Option<String>,
    participant: Option<Jid>,
    message: Option<Value>,
    message_timestamp: Option<Value>,
}

fn parse_timestamp(value: Option<&Value>) -> chrono::DateTime<Utc> {
    let seconds = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    seconds
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or_else(Utc::now)
}

/// Strip disappearing, view-once and captioned-document wrappers, which
/// may nest.
fn unwrap_containers(mut message: Value) -> Value {
    for _ in 0..MAX_CONTAINER_DEPTH {
        let Some(key) = CONTAINER_KEYS
            .into_iter()
            .find(|key| message[*key]["message"].is_object())
        else {
            break;
        };
        message = match message.get_mut(key).and_then(|c| c.get_mut("message")) {
            Some(inner) => inner.take(),
            None => break,
        };
    }
    message
}

/// Decode one `messages.upsert` entry. `own` is the bridge account's JID,
/// used as the sender of messages the bot itself sent.
fn decode_message(entry: &Value, own: Option<&Jid>) -> Option<MessageEvent> {
    let message: WebhookMessage = match serde_json::from_value(entry.clone()) {
        Ok(m) => m,
        Err(e) => {
            warn!("Skipping undecodable message: {}", e);
            return None;
        }
    };

    let chat = message.key.remote_jid;
    let is_group = chat.is_group();
    let sender = if message.key.from_me {
        own.cloned().unwrap_or_else(|| chat.clone())
    } else {
        message
            .key
            .participant
            .or(message.participant)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| chat.clone())
    };

    let raw = unwrap_containers(message.message.unwrap_or(Value::Null));
    let content: MessageContent = serde_json::from_value(raw.clone()).unwrap_or_default();

    Some(MessageEvent {
        info: MessageInfo {
            chat,
            sender,
            id: message.key.id,
            is_from_me: message.key.from_me,
            is_group,
            push_name: message.push_name.unwrap_or_default(),
            timestamp: parse_timestamp(message.message_timestamp.as_ref()),
        },
        content,
        raw,
    })
}

/// Translate a webhook payload into zero or more events.
pub fn parse_webhook(payload: &Value) -> Vec<Event> {
    let event = payload["event"].as_str().unwrap_or("");
    let data = &payload["data"];

    match event {
        "messages.upsert" => {
            let own = payload["sender"].as_str().map(Jid::parse);
            let entries = match data.as_array() {
                Some(entries) => entries.iter().collect::<Vec<_>>(),
                None => vec![data],
            };
            entries
                .into_iter()
                .filter_map(|entry| decode_message(entry, own.as_ref()))
                .map(|m| Event::Message(Box::new(m)))
                .collect()
        }
        "qrcode.updated" => extract_qr(data)
            .map(Event::QrCode)
            .into_iter()
            .collect(),
        "connection.update" => extract_state(data)
            .map(|state| Event::Connection(ConnectionState::from_bridge(state)))
            .into_iter()
            .collect(),
        other => {
            debug!("Ignoring webhook event: {}", other);
            Vec::new()
        }
    }
}

async fn handle_webhook(
    State(tx): State<mpsc::Sender<Event>>,
    Json(payload): Json<Value>,
) -> StatusCode {
    for event in parse_webhook(&payload) {
        if tx.send(event).await.is_err() {
            warn!("Event channel closed, dropping webhook event");
            break;
        }
    }
    StatusCode::OK
}

pub fn webhook_router(tx: mpsc::Sender<Event>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(handle_webhook))
        .with_state(tx)
}

/// Bind the webhook listener. Failing to bind is fatal at startup.
pub async fn bind_webhook(listen: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind webhook listener on {}", listen))?;
    info!("Webhook listener bound on {}{}", listen, WEBHOOK_PATH);
    Ok(listener)
}

pub async fn serve_webhook(listener: TcpListener, tx: mpsc::Sender<Event>) -> Result<()> {
    axum::serve(listener, webhook_router(tx))
        .await
        .context("Webhook server error")
}
