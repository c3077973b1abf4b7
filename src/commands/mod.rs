pub mod exec;
pub mod instagram;
pub mod menu;
pub mod ping;
pub mod registry;
pub mod stats;
pub mod tiktok;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::config::{BotConfig, ExecConfig, MenuConfig};
use crate::downloader::DownloaderApi;
use crate::message::Message;
use crate::platform::{MessageEvent, WaClient};
use crate::responder::Responder;

pub use registry::{CommandRegistry, RegistryError};

/// One command's behavior. Invalid user input is answered with a reply and
/// `Ok(())`; downstream failures are answered and returned as errors.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<()>;
}

/// Long-lived collaborators shared by every command invocation
pub struct Services {
    pub registry: Arc<CommandRegistry>,
    pub api: DownloaderApi,
    pub bot: BotConfig,
    pub exec: ExecConfig,
    pub menu: MenuConfig,
    pub started_at: Instant,
}

/// Everything a handler gets for one invocation
pub struct CommandContext {
    #[allow(dead_code)]
    pub client: Arc<dyn WaClient>,
    pub message: Message,
    #[allow(dead_code)]
    pub event: Arc<MessageEvent>,
    pub responder: Responder,
    pub services: Arc<Services>,
}

impl CommandContext {
    pub fn new(
        client: Arc<dyn WaClient>,
        message: Message,
        event: Arc<MessageEvent>,
        services: Arc<Services>,
    ) -> Self {
        let responder = Responder::new(client.clone(), &message);
        Self {
            client,
            message,
            event,
            responder,
            services,
        }
    }
}

/// Registry holding every built-in command, in menu order of registration.
pub fn builtin_registry() -> Result<CommandRegistry, RegistryError> {
    let registry = CommandRegistry::new();
    registry.register(&["menu", "help"], Arc::new(menu::MenuCommand), "main")?;
    registry.register(
        &["tiktok", "ttdl", "tiktokdl", "tiktokslide"],
        Arc::new(tiktok::TiktokCommand),
        "downloader",
    )?;
    registry.register(
        &["instagram", "igdl", "ig"],
        Arc::new(instagram::InstagramCommand),
        "downloader",
    )?;
    registry.register(&["exec"], Arc::new(exec::ExecCommand), "owner")?;
    registry.register(&["stats"], Arc::new(stats::StatsCommand), "utility")?;
    registry.register(&["ping"], Arc::new(ping::PingCommand), "utility")?;
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::DownloaderConfig;
    use crate::message::Normalizer;
    use crate::platform::testing::text_event;

    pub const OWNER: &str = "628999";

    /// Services with the built-in registry and a downloader pointed at `api_base`
    pub fn services(api_base: &str) -> Arc<Services> {
        services_with(api_base, ExecConfig::default(), MenuConfig::default())
    }

    pub fn services_with(api_base: &str, exec: ExecConfig, menu: MenuConfig) -> Arc<Services> {
        let bot = BotConfig {
            owners: vec![OWNER.to_string()],
            ..BotConfig::default()
        };
        build(api_base, bot, exec, menu)
    }

    pub fn build(api_base: &str, bot: BotConfig, exec: ExecConfig, menu: MenuConfig) -> Arc<Services> {
        let api = DownloaderApi::new(&DownloaderConfig {
            base_url: api_base.to_string(),
            timeout_secs: 5,
            probe_timeout_secs: 2,
        })
        .unwrap();
        Arc::new(Services {
            registry: Arc::new(builtin_registry().unwrap()),
            api,
            bot,
            exec,
            menu,
            started_at: Instant::now(),
        })
    }

    /// Context for `body` sent by `sender` in a private chat
    pub fn context(
        client: Arc<dyn WaClient>,
        services: Arc<Services>,
        sender: &str,
        body: &str,
    ) -> CommandContext {
        let event = Arc::new(text_event(sender, body));
        let message = Normalizer::new(&services.bot).normalize(&event);
        CommandContext::new(client, message, event, services)
    }
}
