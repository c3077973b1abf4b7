use async_trait::async_trait;

use super::{CommandContext, CommandHandler};

pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    async fn handle(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        ctx.responder.reply("Pong 🏓").await?;
        Ok(())
    }
}
