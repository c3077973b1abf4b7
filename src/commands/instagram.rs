use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{CommandContext, CommandHandler};
use crate::downloader::InstagramResponse;
use crate::responder::Options;

static INSTAGRAM_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://(www\.)?instagram\.com/(p|reel|reels|tv|stories)/[^\s]+")
        .expect("valid Instagram URL pattern")
});

pub fn is_instagram_url(text: &str) -> bool {
    INSTAGRAM_URL.is_match(text)
}

/// Downloads the media of an Instagram post. The API returns bare URLs, so
/// each one is probed for its content type before sending.
pub struct InstagramCommand;

#[async_trait]
impl CommandHandler for InstagramCommand {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        let m = &ctx.responder;
        let url = ctx.message.text.trim();
        if url.is_empty() {
            m.reply("Please send an Instagram link first.").await?;
            return Ok(());
        }
        if !is_instagram_url(url) {
            m.reply("Invalid link or not an Instagram link.").await?;
            return Ok(());
        }

        m.reply("Please wait...").await?;

        info!("Fetching Instagram media: {}", url);
        let response = match ctx
            .services
            .api
            .get("downloader/instagram", &HashMap::from([("url", url)]))
            .await
        {
            Ok(response) if !response.body.is_empty() => response,
            Ok(response) => {
                m.reply("Feature error or server is down.").await?;
                anyhow::bail!(
                    "Instagram API returned an empty body (HTTP {})",
                    response.status
                );
            }
            Err(e) => {
                m.reply("Feature error or server is down.").await?;
                return Err(e).context("Instagram API request failed");
            }
        };

        let media_urls = match response.envelope::<InstagramResponse>() {
            Ok(parsed) => parsed.data,
            Err(e) => {
                m.reply("Failed to get data from server.").await?;
                return Err(e).context("Invalid Instagram API response");
            }
        };

        if media_urls.is_empty() {
            m.reply("No media to send.").await?;
            return Ok(());
        }

        for media_url in &media_urls {
            let content_type = match ctx.services.api.content_type(media_url).await {
                Ok(content_type) => content_type,
                Err(e) => {
                    debug!("Content type probe failed for {}: {}", media_url, e);
                    m.reply(&format!(
                        "Failed to determine content type for URL: {}",
                        media_url
                    ))
                    .await?;
                    continue;
                }
            };

            if content_type.starts_with("video") {
                if let Err(e) = m.send_video(media_url, Options::default()).await {
                    warn!("Failed to send Instagram video {}: {}", media_url, e);
                    m.reply(&format!("Failed to send video: {}", e)).await?;
                }
            } else if content_type.starts_with("image") {
                if let Err(e) = m.send_image(media_url, Options::default()).await {
                    warn!("Failed to send Instagram image {}: {}", media_url, e);
                    m.reply(&format!("Failed to send image: {}", e)).await?;
                }
            } else {
                m.reply(&format!("Unsupported content type: {}", content_type))
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{context, services, OWNER};
    use crate::platform::testing::RecordingClient;
    use crate::platform::{MediaKind, MediaSource};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_instagram_url_pattern() {
        assert!(is_instagram_url("https://www.instagram.com/p/Cabc123/"));
        assert!(is_instagram_url("https://instagram.com/reel/xyz"));
        assert!(!is_instagram_url("https://www.instagram.com/someuser"));
        assert!(!is_instagram_url("https://vt.tiktok.com/abc"));
    }

    #[tokio::test]
    async fn test_missing_and_invalid_links() {
        let client = Arc::new(RecordingClient::new());
        let services = services("http://127.0.0.1:9");

        let ctx = context(client.clone(), services.clone(), OWNER, "!ig");
        InstagramCommand.handle(&ctx).await.unwrap();
        let ctx = context(client.clone(), services, OWNER, "!ig https://example.com/x");
        InstagramCommand.handle(&ctx).await.unwrap();

        assert_eq!(
            client.texts(),
            vec![
                "Please send an Instagram link first.",
                "Invalid link or not an Instagram link."
            ]
        );
    }

    #[tokio::test]
    async fn test_media_routed_by_content_type() {
        let mock_server = MockServer::start().await;
        let base = mock_server.uri();

        Mock::given(method("GET"))
            .and(path("/downloader/instagram"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "creator": "seaavey",
                "status": 200,
                "data": [
                    format!("{}/media/video", base),
                    format!("{}/media/image", base),
                    format!("{}/media/doc", base),
                    format!("{}/media/gone", base),
                ]
            })))
            .mount(&mock_server)
            .await;
        for (name, content_type) in [
            ("video", "video/mp4"),
            ("image", "image/jpeg"),
            ("doc", "application/pdf"),
        ] {
            Mock::given(method("HEAD"))
                .and(path(format!("/media/{}", name)))
                .respond_with(ResponseTemplate::new(200).insert_header("content-type", content_type))
                .mount(&mock_server)
                .await;
        }

        let client = Arc::new(RecordingClient::new());
        let ctx = context(
            client.clone(),
            services(&base),
            OWNER,
            "!instagram https://www.instagram.com/p/Cabc123/",
        );
        InstagramCommand.handle(&ctx).await.unwrap();

        assert_eq!(
            client.media(),
            vec![
                (
                    MediaKind::Video,
                    MediaSource::Url(format!("{}/media/video", base)),
                    String::new()
                ),
                (
                    MediaKind::Image,
                    MediaSource::Url(format!("{}/media/image", base)),
                    String::new()
                ),
            ]
        );
        assert_eq!(
            client.texts(),
            vec![
                "Please wait...".to_string(),
                "Unsupported content type: application/pdf".to_string(),
                format!("Failed to determine content type for URL: {}/media/gone", base),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_result_set() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/downloader/instagram"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "data": []
            })))
            .mount(&mock_server)
            .await;

        let client = Arc::new(RecordingClient::new());
        let ctx = context(
            client.clone(),
            services(&mock_server.uri()),
            OWNER,
            "!igdl https://www.instagram.com/reel/xyz",
        );
        InstagramCommand.handle(&ctx).await.unwrap();
        assert_eq!(client.texts(), vec!["Please wait...", "No media to send."]);
    }
}
