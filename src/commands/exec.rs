use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use super::{CommandContext, CommandHandler};
use crate::config::ExecConfig;

/// Runs a shell command on the host. Owners only; everyone else is ignored
/// without a reply.
pub struct ExecCommand;

#[async_trait]
impl CommandHandler for ExecCommand {
    async fn handle(&self, ctx: &CommandContext) -> Result<()> {
        if !ctx.message.is_owner {
            return Ok(());
        }

        let command = ctx.message.text.trim();
        if command.is_empty() {
            ctx.responder.reply("Please provide a command to run.").await?;
            return Ok(());
        }

        match execute_shell(&ctx.services.exec, command).await {
            Ok(output) => {
                ctx.responder.reply(&output).await?;
                Ok(())
            }
            Err(e) => {
                ctx.responder.reply(&format!("Error: {:#}", e)).await?;
                Err(e)
            }
        }
    }
}

/// Run `command` through the configured shell and collect its output.
/// A non-zero exit is reported in the output, not as an error.
pub async fn execute_shell(config: &ExecConfig, command: &str) -> Result<String> {
    info!("Executing shell command: {}", command);

    let child = tokio::process::Command::new(&config.shell)
        .arg("-c")
        .arg(command)
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(Duration::from_secs(config.timeout_secs), child)
        .await
        .map_err(|_| {
            warn!("Shell command timed out: {}", command);
            anyhow::anyhow!("command timed out after {}s", config.timeout_secs)
        })?
        .with_context(|| format!("Failed to execute command: {}", command))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut result = String::new();
    if !stdout.trim().is_empty() {
        result.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(stderr.trim_end());
    }
    if !output.status.success() {
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&format!(
            "Exit code: {}",
            output.status.code().unwrap_or(-1)
        ));
    }
    if result.is_empty() {
        result.push_str("(no output)");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{context, services, services_with, OWNER};
    use crate::config::MenuConfig;
    use crate::platform::testing::RecordingClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_non_owner_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("touched");

        let client = Arc::new(RecordingClient::new());
        let ctx = context(
            client.clone(),
            services("http://127.0.0.1:9"),
            "628111",
            &format!("!exec touch {}", marker.display()),
        );
        assert!(!ctx.message.is_owner);
        ExecCommand.handle(&ctx).await.unwrap();

        assert_eq!(client.sent_count(), 0);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_owner_gets_output() {
        let client = Arc::new(RecordingClient::new());
        let ctx = context(
            client.clone(),
            services("http://127.0.0.1:9"),
            OWNER,
            "!exec echo hello",
        );
        ExecCommand.handle(&ctx).await.unwrap();

        assert_eq!(client.texts(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported() {
        let output = execute_shell(&ExecConfig::default(), "echo oops >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(output, "oops\nExit code: 3");

        let silent = execute_shell(&ExecConfig::default(), "true").await.unwrap();
        assert_eq!(silent, "(no output)");
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let exec = ExecConfig {
            shell: "sh".to_string(),
            timeout_secs: 1,
        };
        let client = Arc::new(RecordingClient::new());
        let ctx = context(
            client.clone(),
            services_with("http://127.0.0.1:9", exec, MenuConfig::default()),
            OWNER,
            "!exec sleep 5",
        );
        assert!(ExecCommand.handle(&ctx).await.is_err());

        let texts = client.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Error: command timed out"));
    }
}
