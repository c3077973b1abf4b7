use std::sync::Arc;

use crate::message::Message;
use crate::platform::{
    ClientError, Jid, MediaKind, MediaSource, OutgoingMessage, QuotedRef,
    ReplyContext, SentMessage, WaClient,
};

/// Long replies are split into chunks of at most this many bytes
const MAX_REPLY_LEN: usize = 4000;

/// Per-send options for media
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub caption: String,
    /// Overrides the default context (quoting the triggering message)
    pub context: Option<ReplyContext>,
}

impl Options {
    pub fn caption(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            context: None,
        }
    }
}

/// Outbound capabilities bound to one inbound message: its chat, its key
/// and its payload for quoting. Each call performs exactly one send (or one
/// per chunk for long texts) and never retries.
#[derive(Clone)]
pub struct Responder {
    client: Arc<dyn WaClient>,
    chat: Jid,
    quoted: QuotedRef,
}

impl Responder {
    pub fn new(client: Arc<dyn WaClient>, message: &Message) -> Self {
        Self {
            client,
            chat: message.chat.clone(),
            quoted: QuotedRef {
                key: message.key(),
                message: message.raw.clone(),
            },
        }
    }

    /// Context that quotes the triggering message
    pub fn quote_context(&self) -> ReplyContext {
        ReplyContext {
            quoted: Some(self.quoted.clone()),
            ..Default::default()
        }
    }

    /// Reply with text, quoting the triggering message.
    pub async fn reply(&self, text: &str) -> Result<SentMessage, ClientError> {
        self.reply_with_context(text, self.quote_context()).await
    }

    /// Reply with text under an explicit context. Long texts go out in
    /// several messages; only the first carries the context.
    pub async fn reply_with_context(
        &self,
        text: &str,
        context: ReplyContext,
    ) -> Result<SentMessage, ClientError> {
        let mut context = Some(context);
        let mut last = SentMessage::default();
        for chunk in split_message(text, MAX_REPLY_LEN) {
            last = self
                .client
                .send_message(
                    &self.chat,
                    OutgoingMessage::Text {
                        text: chunk,
                        context: context.take(),
                    },
                )
                .await?;
        }
        Ok(last)
    }

    #[allow(dead_code)]
    pub async fn react(&self, emoji: &str) -> Result<SentMessage, ClientError> {
        self.client
            .send_message(
                &self.chat,
                OutgoingMessage::Reaction {
                    key: self.quoted.key.clone(),
                    emoji: emoji.to_string(),
                },
            )
            .await
    }

    pub async fn send_image(&self, url: &str, options: Options) -> Result<SentMessage, ClientError> {
        self.send(MediaKind::Image, MediaSource::Url(url.to_string()), options)
            .await
    }

    pub async fn send_video(&self, url: &str, options: Options) -> Result<SentMessage, ClientError> {
        self.send(MediaKind::Video, MediaSource::Url(url.to_string()), options)
            .await
    }

    #[allow(dead_code)]
    pub async fn send_media(
        &self,
        kind: MediaKind,
        url: &str,
        caption: &str,
    ) -> Result<SentMessage, ClientError> {
        self.send(kind, MediaSource::Url(url.to_string()), Options::caption(caption))
            .await
    }

    async fn send(
        &self,
        kind: MediaKind,
        source: MediaSource,
        options: Options,
    ) -> Result<SentMessage, ClientError> {
        let context = options.context.unwrap_or_else(|| self.quote_context());
        self.client
            .send_message(
                &self.chat,
                OutgoingMessage::Media {
                    kind,
                    source,
                    caption: options.caption,
                    context: Some(context),
                },
            )
            .await
    }
}

/// Split long text into chunks, preferring newline then space boundaries.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}
