use poise::{CreateReply, serenity_prelude as serenity};
use ::serenity::all::CreateEmbed;
use std::time::Duration;

use crate::{CommandResult, Context};

/// Ping the bot to check its latency
#[poise::command(slash_command, category = "General")]
pub async fn ping(ctx: Context<'_>) -> CommandResult {
    let latency = get_shard_latency(&ctx)
        .await
        .map(|latency| format!("{} ms", latency.as_millis()))
        .unwrap_or_else(|| "unknown".to_string());

    let players = ctx.data().music.sessions().len();

    let embed = CreateEmbed::new()
        .title("🏓 Pong!")
        .field("Gateway Latency", latency, true)
        .field("Active Players", players.to_string(), true);

    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}

async fn get_shard_latency(ctx: &Context<'_>) -> Option<Duration> {
    let shard_manager = ctx.framework().shard_manager();
    let runners = shard_manager.runners.lock().await;

    // Latency is tracked by the runner of the shard this command came in on
    let runner = runners.get(&serenity::ShardId(ctx.serenity_context().shard_id.0))?;

    runner.latency
}
