use std::time::Duration;

use async_trait::async_trait;

use super::{CommandContext, CommandHandler};

/// Host and runtime diagnostics
pub struct StatsCommand;

#[async_trait]
impl CommandHandler for StatsCommand {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        let report = render_stats(ctx.services.started_at.elapsed()).await;
        ctx.responder.reply(&report).await?;
        Ok(())
    }
}

async fn render_stats(uptime: Duration) -> String {
    let cpuinfo = tokio::fs::read_to_string("/proc/cpuinfo")
        .await
        .unwrap_or_default();
    let status = tokio::fs::read_to_string("/proc/self/status")
        .await
        .unwrap_or_default();
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let metrics = tokio::runtime::Handle::current().metrics();

    format!(
        "*Server Info*\n\n\
         • Hostname: {}\n\
         • OS: {}\n\
         • Arch: {}\n\
         • CPU: {}\n\
         • CPU Core: {}\n\
         • Uptime: {}\n\n\
         *Memory Usage*\n\n\
         • Resident: {}\n\
         • Peak Resident: {}\n\
         • Virtual: {}\n\n\
         *Runtime*\n\n\
         • Workers: {}\n\
         • Alive Tasks: {}\n\
         • Threads: {}",
        host_name(),
        std::env::consts::OS,
        std::env::consts::ARCH,
        cpu_model(&cpuinfo).unwrap_or("N/A"),
        cores,
        format_duration(uptime),
        status_field(&status, "VmRSS").unwrap_or("N/A"),
        status_field(&status, "VmHWM").unwrap_or("N/A"),
        status_field(&status, "VmSize").unwrap_or("N/A"),
        metrics.num_workers(),
        metrics.num_alive_tasks(),
        status_field(&status, "Threads").unwrap_or("N/A"),
    )
}

pub fn host_name() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// `model name` from `/proc/cpuinfo` contents
fn cpu_model(cpuinfo: &str) -> Option<&str> {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim())
}

/// A `Key:   value` field from `/proc/self/status` contents
fn status_field<'a>(status: &'a str, key: &str) -> Option<&'a str> {
    status.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name == key).then(|| value.trim())
    })
}

/// `1d 2h 3m 4s`, omitting leading zero units
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        secs % 86_400 / 3600,
        secs % 3600 / 60,
        secs % 60,
    );

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if days > 0 || hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if days > 0 || hours > 0 || minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    parts.push(format!("{}s", seconds));
    parts.join(" ")
}
