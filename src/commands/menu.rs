use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use tracing::debug;

use super::stats::{format_duration, host_name};
use super::{CommandContext, CommandHandler, CommandRegistry};
use crate::platform::ExternalAdReply;

/// Lists every command grouped by category, under a server info header
pub struct MenuCommand;

#[async_trait]
impl CommandHandler for MenuCommand {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        let services = &ctx.services;
        let offset = FixedOffset::east_opt(services.bot.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        let now = Utc::now().with_timezone(&offset);

        let mut text = format!(
            "*Server Info*\n\
             • Hostname: {}\n\
             • Time: {}\n\
             • Uptime: {}\n\n",
            host_name(),
            now.format("%d-%b-%Y %H:%M:%S"),
            format_duration(services.started_at.elapsed()),
        );
        text.push_str(&render_command_list(&services.registry));

        let mut context = ctx.responder.quote_context();
        context.external_ad = Some(ExternalAdReply {
            title: format!("Hello, {}", greeting(&now)),
            body: format!("Hello Everyone, I Am {} Bot", services.bot.name),
            thumbnail: load_thumbnail(ctx).await,
            source_url: services.menu.source_url.clone(),
            render_larger_thumbnail: true,
        });

        ctx.responder.reply_with_context(&text, context).await?;
        Ok(())
    }
}

/// Categories sorted by name, commands sorted within each category
pub fn render_command_list(registry: &CommandRegistry) -> String {
    let mut text = String::new();
    for (category, commands) in registry.by_category() {
        text.push_str(&format!("*{}:*\n", title_case(&category)));
        for name in commands.keys() {
            text.push_str(&format!("  • *{}*\n", name));
        }
        text.push('\n');
    }
    text
}

/// Greeting for the hour of day
pub fn greeting(now: &DateTime<FixedOffset>) -> &'static str {
    match now.hour() {
        5..=10 => "Good Morning 🌅",
        11..=14 => "Good Afternoon 🌞",
        15..=17 => "Good Evening 🌇",
        _ => "Good Night 🌙",
    }
}

pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Local thumbnail file, falling back to the configured URL
async fn load_thumbnail(ctx: &CommandContext) -> Option<Vec<u8>> {
    let menu = &ctx.services.menu;
    match tokio::fs::read(&menu.thumbnail_path).await {
        Ok(bytes) => return Some(bytes),
        Err(e) => debug!(
            "Thumbnail {} unavailable ({}), fetching {}",
            menu.thumbnail_path.display(),
            e,
            menu.thumbnail_url
        ),
    }

    match ctx
        .services
        .api
        .fetch_buffer(&menu.thumbnail_url, &HashMap::new())
        .await
    {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            debug!("Thumbnail fetch failed: {}", e);
            None
        }
    }
}
