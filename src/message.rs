use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::Value;

use crate::config::BotConfig;
use crate::platform::{ContextInfo, Jid, MessageContent, MessageEvent, MessageKey};

/// Canonical, immutable view of an inbound message
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Message {
    pub chat: Jid,
    pub sender: Jid,
    pub id: String,
    pub push_name: String,
    pub timestamp: DateTime<FixedOffset>,

    pub is_group: bool,
    pub is_from_me: bool,
    /// Sender is in the owner list, or the message came from the bot's own number
    pub is_owner: bool,
    pub is_status_broadcast: bool,

    /// Matched command prefix, empty when the body is not a command
    pub prefix: String,
    /// Lowercased first token with the prefix stripped
    pub command: String,
    pub args: Vec<String>,
    /// `args` joined by single spaces; the whole body for plain messages
    pub text: String,
    /// Full extracted text
    pub body: String,

    pub mentions: Vec<Jid>,
    pub quoted: Option<Box<Message>>,
    /// Protocol payload, kept for quoting and reacting against the original
    pub raw: Value,
}

impl Message {
    pub fn key(&self) -> MessageKey {
        MessageKey {
            remote_jid: self.chat.clone(),
            from_me: self.is_from_me,
            id: self.id.clone(),
            participant: self.is_group.then(|| self.sender.clone()),
        }
    }

    pub fn is_command(&self) -> bool {
        !self.prefix.is_empty() && self.body.starts_with(&self.prefix)
    }
}

/// Extract the message text: image caption, video caption, extended text,
/// document caption, then plain conversation. First non-empty wins.
pub fn extract_text(content: &MessageContent) -> &str {
    let candidates = [
        content.image.as_ref().and_then(|m| m.caption.as_deref()),
        content.video.as_ref().and_then(|m| m.caption.as_deref()),
        content
            .extended_text
            .as_ref()
            .and_then(|e| e.text.as_deref()),
        content.document.as_ref().and_then(|m| m.caption.as_deref()),
        content.conversation.as_deref(),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|text| !text.is_empty())
        .unwrap_or("")
}

/// First configured prefix the text starts with, in configuration order.
pub fn detect_prefix<'a>(text: &str, prefixes: &'a [String]) -> &'a str {
    prefixes
        .iter()
        .find(|prefix| !prefix.is_empty() && text.starts_with(prefix.as_str()))
        .map(String::as_str)
        .unwrap_or("")
}

/// Split a prefixed body into `(command, args)`.
pub fn split_command(body: &str, prefix: &str) -> (String, Vec<String>) {
    if prefix.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut words = body.split_whitespace();
    let command = match words.next().and_then(|first| first.strip_prefix(prefix)) {
        Some(command) => command.to_lowercase(),
        None => return (String::new(), Vec::new()),
    };
    (command, words.map(str::to_string).collect())
}

/// Turns raw message events into [`Message`]s. Never fails: missing content
/// yields empty fields.
#[derive(Debug, Clone)]
pub struct Normalizer {
    prefixes: Vec<String>,
    owners: Vec<String>,
    offset: FixedOffset,
}

impl Normalizer {
    pub fn new(config: &BotConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        Self {
            prefixes: config.prefixes.clone(),
            owners: config.owners.clone(),
            offset,
        }
    }

    pub fn is_owner(&self, sender: &Jid) -> bool {
        self.owners.iter().any(|owner| owner == &sender.user)
    }

    pub fn normalize(&self, event: &MessageEvent) -> Message {
        let info = &event.info;
        let context = event.content.context_info();

        let quoted = context.and_then(|ctx| {
            let raw = event.raw["extendedTextMessage"]["contextInfo"]["quotedMessage"].clone();
            self.normalize_quoted(&info.chat, ctx, raw, info.timestamp.with_timezone(&self.offset))
        });

        let mut message = self.build(
            info.chat.clone(),
            info.sender.clone(),
            info.id.clone(),
            extract_text(&event.content),
            info.is_from_me,
            info.timestamp.with_timezone(&self.offset),
            event.raw.clone(),
        );
        message.is_group = info.is_group;
        message.push_name = info.push_name.clone();
        message.mentions = context
            .map(|ctx| ctx.mentioned_jid.clone())
            .unwrap_or_default();
        message.quoted = quoted.map(Box::new);
        message
    }

    fn normalize_quoted(
        &self,
        chat: &Jid,
        context: &ContextInfo,
        raw: Value,
        timestamp: DateTime<FixedOffset>,
    ) -> Option<Message> {
        let content = context.quoted_message.as_deref()?;
        let sender = context.participant.clone().unwrap_or_else(|| chat.clone());
        let mut quoted = self.build(
            chat.clone(),
            sender,
            context.stanza_id.clone().unwrap_or_default(),
            extract_text(content),
            false,
            timestamp,
            raw,
        );
        quoted.is_group = chat.is_group();
        Some(quoted)
    }

    fn build(
        &self,
        chat: Jid,
        sender: Jid,
        id: String,
        body: &str,
        is_from_me: bool,
        timestamp: DateTime<FixedOffset>,
        raw: Value,
    ) -> Message {
        let prefix = detect_prefix(body, &self.prefixes).to_string();
        let (command, args) = split_command(body, &prefix);
        let text = if prefix.is_empty() {
            body.to_string()
        } else {
            args.join(" ")
        };

        Message {
            is_owner: is_from_me || self.is_owner(&sender),
            is_status_broadcast: chat.is_status_broadcast(),
            is_group: false,
            chat,
            sender,
            id,
            push_name: String::new(),
            timestamp,
            is_from_me,
            prefix,
            command,
            args,
            text,
            body: body.to_string(),
            mentions: Vec::new(),
            quoted: None,
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::text_event;
    use crate::platform::{ExtendedText, MediaPart};
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::new(&BotConfig {
            owners: vec!["628999".to_string()],
            prefixes: vec!["!".to_string(), ".".to_string(), "🔥".to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_extract_text_priority() {
        let mut content = MessageContent::text("plain");
        assert_eq!(extract_text(&content), "plain");

        content.document = Some(MediaPart {
            caption: Some("doc".to_string()),
        });
        assert_eq!(extract_text(&content), "doc");

        content.extended_text = Some(ExtendedText {
            text: Some("extended".to_string()),
            context_info: None,
        });
        assert_eq!(extract_text(&content), "extended");

        content.video = Some(MediaPart {
            caption: Some("video".to_string()),
        });
        assert_eq!(extract_text(&content), "video");

        content.image = Some(MediaPart {
            caption: Some("image".to_string()),
        });
        assert_eq!(extract_text(&content), "image");
    }

    #[test]
    fn test_extract_text_skips_empty_captions() {
        let content = MessageContent {
            image: Some(MediaPart {
                caption: Some(String::new()),
            }),
            conversation: Some("fallback".to_string()),
            ..Default::default()
        };
        assert_eq!(extract_text(&content), "fallback");
        assert_eq!(extract_text(&MessageContent::default()), "");
    }

    #[test]
    fn test_detect_prefix_in_config_order() {
        let prefixes = vec!["!".to_string(), "!!".to_string()];
        assert_eq!(detect_prefix("!!ping", &prefixes), "!");
        assert_eq!(detect_prefix("ping", &prefixes), "");
        assert_eq!(detect_prefix("", &prefixes), "");
        assert_eq!(detect_prefix("🔥menu", &["🔥".to_string()]), "🔥");
    }

    #[test]
    fn test_split_command() {
        let (cmd, args) = split_command("!TikTok  https://vt.tiktok.com/abc  extra", "!");
        assert_eq!(cmd, "tiktok");
        assert_eq!(args, vec!["https://vt.tiktok.com/abc", "extra"]);

        let (cmd, args) = split_command("! ping now", "!");
        assert_eq!(cmd, "");
        assert_eq!(args, vec!["ping", "now"]);

        let (cmd, args) = split_command("hello world", "");
        assert!(cmd.is_empty());
        assert!(args.is_empty());
    }

    #[test]
    fn test_normalize_command_message() {
        let msg = normalizer().normalize(&text_event("628111", "!TIKTOK https://vt.tiktok.com/abc"));
        assert_eq!(msg.prefix, "!");
        assert_eq!(msg.command, "tiktok");
        assert_eq!(msg.args, vec!["https://vt.tiktok.com/abc"]);
        assert_eq!(msg.text, "https://vt.tiktok.com/abc");
        assert_eq!(msg.body, "!TIKTOK https://vt.tiktok.com/abc");
        assert!(msg.is_command());
        assert!(!msg.is_owner);
        assert_eq!(msg.timestamp.offset().local_minus_utc(), 7 * 3600);
    }

    #[test]
    fn test_normalize_plain_message() {
        let msg = normalizer().normalize(&text_event("628111", "good morning all"));
        assert_eq!(msg.prefix, "");
        assert_eq!(msg.command, "");
        assert!(msg.args.is_empty());
        assert_eq!(msg.text, "good morning all");
        assert!(!msg.is_command());
    }

    #[test]
    fn test_normalize_empty_content() {
        let mut event = text_event("628111", "");
        event.content = MessageContent::default();
        event.raw = serde_json::Value::Null;

        let msg = normalizer().normalize(&event);
        assert_eq!(msg.body, "");
        assert_eq!(msg.text, "");
        assert_eq!(msg.prefix, "");
        assert_eq!(msg.command, "");
        assert!(msg.args.is_empty());
        assert!(msg.quoted.is_none());
    }

    #[test]
    fn test_owner_by_list_ignores_server_and_device() {
        let mut event = text_event("628999", "!exec ls");
        event.info.sender = Jid::parse("628999:4@lid");
        assert!(normalizer().normalize(&event).is_owner);
    }

    #[test]
    fn test_owner_when_from_self() {
        let mut event = text_event("628111", "!exec ls");
        event.info.is_from_me = true;
        assert!(normalizer().normalize(&event).is_owner);
    }

    #[test]
    fn test_status_broadcast_flag() {
        let mut event = text_event("628111", "look at this");
        event.info.chat = Jid::status_broadcast();
        assert!(normalizer().normalize(&event).is_status_broadcast);
    }

    #[test]
    fn test_quoted_and_mentions() {
        let raw = json!({
            "extendedTextMessage": {
                "text": ".tiktok",
                "contextInfo": {
                    "stanzaId": "QUOTED1",
                    "participant": "628999@s.whatsapp.net",
                    "quotedMessage": { "conversation": "https://vt.tiktok.com/xyz" },
                    "mentionedJid": ["628222@s.whatsapp.net"]
                }
            }
        });
        let mut event = text_event("628111", "");
        event.content = serde_json::from_value(raw.clone()).unwrap();
        event.raw = raw;

        let msg = normalizer().normalize(&event);
        assert_eq!(msg.command, "tiktok");
        assert_eq!(msg.mentions, vec![Jid::parse("628222@s.whatsapp.net")]);

        let quoted = msg.quoted.as_ref().unwrap();
        assert_eq!(quoted.id, "QUOTED1");
        assert_eq!(quoted.body, "https://vt.tiktok.com/xyz");
        assert!(quoted.is_owner);
        assert_eq!(quoted.raw["conversation"], "https://vt.tiktok.com/xyz");
    }

    #[test]
    fn test_message_key_participant_only_in_groups() {
        let msg = normalizer().normalize(&text_event("628111", "!ping"));
        assert_eq!(msg.key().participant, None);

        let mut event = text_event("628111", "!ping");
        event.info.chat = Jid::parse("1203@g.us");
        event.info.is_group = true;
        let msg = normalizer().normalize(&event);
        assert_eq!(msg.key().participant, Some(Jid::parse("628111@s.whatsapp.net")));
    }
}
