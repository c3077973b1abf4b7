use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use super::{CommandContext, CommandHandler};
use crate::downloader::TiktokResponse;
use crate::responder::Options;

static TIKTOK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://([a-z0-9]+\.)?tiktok\.com/[^\s]+").expect("valid TikTok URL pattern")
});

pub fn is_tiktok_url(text: &str) -> bool {
    TIKTOK_URL.is_match(text)
}

/// Downloads a TikTok video, or every image of a slideshow
pub struct TiktokCommand;

#[async_trait]
impl CommandHandler for TiktokCommand {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        let m = &ctx.responder;
        let url = ctx.message.text.trim();
        if url.is_empty() {
            m.reply("Please send a TikTok link first.").await?;
            return Ok(());
        }
        if !is_tiktok_url(url) {
            m.reply("Invalid link or not a TikTok link.").await?;
            return Ok(());
        }

        info!("Fetching TikTok media: {}", url);
        let response = match ctx
            .services
            .api
            .get("downloader/tiktok", &HashMap::from([("url", url)]))
            .await
        {
            Ok(response) if !response.body.is_empty() => response,
            Ok(response) => {
                m.reply("Feature error or server is down.").await?;
                anyhow::bail!("TikTok API returned an empty body (HTTP {})", response.status);
            }
            Err(e) => {
                m.reply("Feature error or server is down.").await?;
                return Err(e).context("TikTok API request failed");
            }
        };

        let data = match response.envelope::<TiktokResponse>() {
            Ok(parsed) => parsed.data,
            Err(e) => {
                m.reply("Failed to get data from server.").await?;
                return Err(e).context("Invalid TikTok API response");
            }
        };

        if !data.images.is_empty() {
            for (i, image) in data.images.iter().enumerate() {
                let caption = if i == 0 { data.title.as_str() } else { "" };
                if let Err(e) = m.send_image(&image.url, Options::caption(caption)).await {
                    warn!("Failed to send TikTok image {}: {}", image.url, e);
                    m.reply(&format!("Failed to send image: {}", e)).await?;
                }
            }
            return Ok(());
        }

        match data.video.as_ref().map(|v| v.no_watermark.as_str()) {
            Some(video_url) if !video_url.is_empty() => {
                if let Err(e) = m.send_video(video_url, Options::caption(&data.title)).await {
                    m.reply("Failed to send video.").await?;
                    return Err(e).context("Failed to send TikTok video");
                }
            }
            _ => {
                m.reply("No media to send.").await?;
            }
        }
        Ok(())
    }
}
