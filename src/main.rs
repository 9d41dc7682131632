use ::serenity::all::ClientBuilder;
use poise::serenity_prelude as serenity;
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pibot::commands::{
    general::ping::*,
    music::{pause::*, play::*, queue::*, remove::*, seek::*, skip::*, stop::*, volume::*},
};
use pibot::commands::music::utils::{
    event_handlers::dispatch_node_events, lavalink::LavalinkNode, music_manager::MusicManager,
};
use pibot::config::Config;
use pibot::utils::database::{SettingsStore, SqliteSettings};
use pibot::{CommandResult, Context, Data, Error, events};

#[poise::command(slash_command, category = "General")]
async fn help(
    ctx: Context<'_>,
    #[description = "Specific command to show help about"]
    #[autocomplete = "poise::builtins::autocomplete_command"]
    command: Option<String>,
) -> CommandResult {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration {
            show_context_menu_commands: true,
            ..Default::default()
        },
    )
    .await
    .map_err(|e| e.into())
}

#[poise::command(prefix_command, hide_in_help)]
async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx)
        .await
        .map_err(|e| e.into())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize logging with debug level for our crate
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pibot=debug,warn")),
        )
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true)
        .with_ansi(true)
        .pretty()
        .init();

    let config = Arc::new(Config::from_env()?);

    let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettings::open(&config.database_path)?);
    info!("Using settings database at {}", config.database_path.display());

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let commands = vec![
        // Default commands
        register(),
        help(),
        // General commands
        ping(),
        // Music commands
        play(),
        add(),
        playnext(),
        playlist(),
        skip(),
        pause(),
        resume(),
        stop(),
        queue(),
        now(),
        seek(),
        volume(),
        remove(),
    ];

    let setup_config = Arc::clone(&config);
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            event_handler: |ctx, event, framework, data| {
                Box::pin(events::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let voice = songbird::get(ctx)
                    .await
                    .ok_or("Songbird voice client was not registered")?;
                let (node, node_events) =
                    LavalinkNode::new(&setup_config.lavalink, ready.user.id, voice)?;
                node.run();

                let music = Arc::new(MusicManager::new(
                    node.clone(),
                    node,
                    settings,
                    setup_config.player_options(),
                ));
                dispatch_node_events(Arc::clone(&music), Arc::clone(&ctx.http), node_events);

                info!("Logged in as {}", ready.user.name);
                Ok(Data {
                    music,
                    config: setup_config,
                })
            })
        });

    let mut client = ClientBuilder::new(&config.discord_token, intents)
        .framework(framework.build())
        .register_songbird()
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, closing shards");
            shard_manager.shutdown_all().await;
        }
    });

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
