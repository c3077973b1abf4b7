use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::platform::NEWSLETTER_SERVER;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub menu: MenuConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    /// Recognized command prefixes, checked in order.
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,
    /// Bare user parts (phone numbers) allowed to run privileged commands.
    #[serde(default)]
    pub owners: Vec<String>,
    /// Only process commands from owners (and from the bot's own number).
    #[serde(default)]
    pub self_mode: bool,
    /// Automatically mark status updates as read.
    #[serde(default = "default_true")]
    pub read_status: bool,
    /// Offset used when rendering message timestamps (default WIB, UTC+7).
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// JID servers whose messages are never dispatched.
    #[serde(default = "default_ignored_servers")]
    pub ignored_servers: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            prefixes: default_prefixes(),
            owners: Vec::new(),
            self_mode: false,
            read_status: true,
            utc_offset_hours: default_utc_offset_hours(),
            ignored_servers: default_ignored_servers(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WhatsAppConfig {
    /// Base URL of the WhatsApp Web bridge (Evolution API compatible)
    pub api_url: String,
    pub api_key: String,
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// Local address the webhook listener binds to
    #[serde(default = "default_webhook_listen")]
    pub webhook_listen: String,
    /// Callback URL registered with the bridge; when unset the bridge is
    /// expected to be configured out of band.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_qr_path")]
    pub qr_path: PathBuf,
    #[serde(default = "default_pairing_timeout_secs")]
    pub pairing_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloaderConfig {
    #[serde(default = "default_downloader_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
    /// Timeout for HEAD probes used to sniff media content types
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            base_url: default_downloader_base_url(),
            timeout_secs: default_request_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecConfig {
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_exec_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            timeout_secs: default_exec_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MenuConfig {
    #[serde(default = "default_thumbnail_path")]
    pub thumbnail_path: PathBuf,
    /// Fallback when `thumbnail_path` cannot be read
    #[serde(default = "default_thumbnail_url")]
    pub thumbnail_url: String,
    #[serde(default = "default_source_url")]
    pub source_url: String,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            thumbnail_path: default_thumbnail_path(),
            thumbnail_url: default_thumbnail_url(),
            source_url: default_source_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_heartbeat_cron")]
    pub heartbeat_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_cron: default_heartbeat_cron(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bot_name() -> String {
    "Aemy".to_string()
}

fn default_prefixes() -> Vec<String> {
    vec!["!".to_string(), ".".to_string()]
}

fn default_utc_offset_hours() -> i32 {
    7
}

fn default_ignored_servers() -> Vec<String> {
    vec![NEWSLETTER_SERVER.to_string()]
}

fn default_instance_name() -> String {
    "aemy".to_string()
}

fn default_webhook_listen() -> String {
    "127.0.0.1:8086".to_string()
}

fn default_qr_path() -> PathBuf {
    PathBuf::from("qrcode.png")
}

fn default_pairing_timeout_secs() -> u64 {
    120
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_downloader_base_url() -> String {
    "https://api.seaavey.my.id/api".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_exec_timeout_secs() -> u64 {
    60
}

fn default_thumbnail_path() -> PathBuf {
    PathBuf::from("config/thumbnail.png")
}

fn default_thumbnail_url() -> String {
    "https://raw.githubusercontent.com/seaavey/Aemy-go/refs/heads/main/config/thumbnail.png"
        .to_string()
}

fn default_source_url() -> String {
    "https://github.com/seaavey/Aemy-go".to_string()
}

fn default_heartbeat_cron() -> String {
    "0 0 * * * *".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if config.bot.prefixes.is_empty() {
            anyhow::bail!("[bot] prefixes must contain at least one prefix");
        }
        if config.bot.prefixes.iter().any(|p| p.is_empty()) {
            anyhow::bail!("[bot] prefixes must not contain an empty string");
        }
        if !(-12..=14).contains(&config.bot.utc_offset_hours) {
            anyhow::bail!(
                "[bot] utc_offset_hours out of range: {}",
                config.bot.utc_offset_hours
            );
        }

        Ok(config)
    }
}
