use anyhow::Result;
use serenity::{
    all::Colour,
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{application::CommandInteraction, id::GuildId},
    prelude::Context,
};
use std::{future::Future, sync::Arc};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{error::MusicError, lock::LockError, player::PlaybackService},
    bot::MusicBot,
    ui::{
        embeds::{self, colors},
        messages,
    },
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: &CommandInteraction, bot: &MusicBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply_text(ctx, command, &messages::guild_only(), true).await;
    };

    if !bot.config.is_allowed_guild(guild_id) {
        info!("🚫 Comando /{} rechazado en guild {}", command.data.name, guild_id);
        return reply_text(ctx, command, &messages::guild_not_allowed(), true).await;
    }

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );
    bot.core.record_text_channel(guild_id, command.channel_id);

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, command, bot, guild_id).await?,
        "loop-queue" => handle_loop_queue(ctx, command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, command, bot, guild_id).await?,
        _ => reply_text(ctx, command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

/// Ejecuta `task` en la cadena de la guild con el timeout configurado
async fn exclusive<F, Fut, T>(bot: &MusicBot, guild_id: GuildId, task: F) -> Result<T, LockError>
where
    F: FnOnce(Arc<PlaybackService>) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let playback = bot.core.playback.clone();
    bot.core
        .locks
        .run_exclusive(guild_id, bot.config.command_timeout(), task(playback))
        .await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|o| o.name == "query")
        .and_then(|o| o.value.as_str())
        .unwrap_or_default()
        .to_string();

    let channel_id = match bot
        .core
        .playback
        .check_play_location(guild_id, command.user.id)
        .await
    {
        Ok(channel_id) => channel_id,
        Err(e) => return reply_music_error(ctx, command, &e).await,
    };

    command.defer(&ctx.http).await?;

    let result = exclusive(bot, guild_id, move |playback| async move {
        playback.play(guild_id, channel_id, &query).await
    })
    .await;

    let embed = match result {
        Ok(Ok(outcome)) => embeds::create_play_embed(&outcome),
        Ok(Err(e)) => {
            log_music_error(guild_id, "play", &e);
            embeds::create_error_embed(&messages::error_reply(&e))
        }
        Err(e) => embeds::create_error_embed(&messages::lock_error(&e)),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = exclusive(bot, guild_id, move |playback| async move {
        playback.skip(guild_id).await
    })
    .await;

    match result {
        Ok(Ok(track)) => reply_notice(ctx, command, &messages::skipped(&track), colors::INFO_BLUE).await,
        Ok(Err(e)) => reply_music_error(ctx, command, &e).await,
        Err(e) => reply_lock_error(ctx, command, &e).await,
    }
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = exclusive(bot, guild_id, move |playback| async move {
        playback.leave(guild_id).await
    })
    .await;

    match result {
        Ok(Ok(())) => reply_notice(ctx, command, &messages::left(), colors::INFO_BLUE).await,
        Ok(Err(e)) => reply_music_error(ctx, command, &e).await,
        Err(e) => reply_lock_error(ctx, command, &e).await,
    }
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = exclusive(bot, guild_id, move |playback| async move {
        playback.snapshot(guild_id, embeds::QUEUE_PREVIEW)
    })
    .await;

    match result {
        Ok(snapshot) if snapshot.current.is_none() && snapshot.total == 0 => {
            reply_text(ctx, command, &messages::queue_empty(), true).await
        }
        Ok(snapshot) => reply_embed(ctx, command, embeds::create_queue_embed(&snapshot), false).await,
        Err(e) => reply_lock_error(ctx, command, &e).await,
    }
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = exclusive(bot, guild_id, move |playback| async move {
        playback.toggle_loop(guild_id)
    })
    .await;

    match result {
        Ok(mode) => reply_notice(ctx, command, &messages::loop_track(mode), colors::MUSIC_PURPLE).await,
        Err(e) => reply_lock_error(ctx, command, &e).await,
    }
}

async fn handle_loop_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = exclusive(bot, guild_id, move |playback| async move {
        playback.toggle_loop_queue(guild_id)
    })
    .await;

    match result {
        Ok(mode) => reply_notice(ctx, command, &messages::loop_queue(mode), colors::MUSIC_PURPLE).await,
        Err(e) => reply_lock_error(ctx, command, &e).await,
    }
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = exclusive(bot, guild_id, move |playback| async move {
        playback.shuffle(guild_id)
    })
    .await;

    match result {
        Ok(Ok(count)) => reply_notice(ctx, command, &messages::shuffled(count), colors::SUCCESS_GREEN).await,
        Ok(Err(e)) => reply_music_error(ctx, command, &e).await,
        Err(e) => reply_lock_error(ctx, command, &e).await,
    }
}

fn log_music_error(guild_id: GuildId, command: &str, error: &MusicError) {
    if error.is_user_error() {
        debug!("/{} rechazado en guild {}: {}", command, guild_id, error);
    } else {
        error!("❌ /{} falló en guild {}: {:?}", command, guild_id, error);
    }
}

async fn reply_music_error(
    ctx: &Context,
    command: &CommandInteraction,
    error: &MusicError,
) -> Result<()> {
    if let Some(guild_id) = command.guild_id {
        log_music_error(guild_id, &command.data.name, error);
    }
    let embed = embeds::create_error_embed(&messages::error_reply(error));
    reply_embed(ctx, command, embed, error.is_user_error()).await
}

async fn reply_lock_error(ctx: &Context, command: &CommandInteraction, error: &LockError) -> Result<()> {
    let embed = embeds::create_error_embed(&messages::lock_error(error));
    reply_embed(ctx, command, embed, true).await
}

async fn reply_notice(
    ctx: &Context,
    command: &CommandInteraction,
    text: &str,
    colour: Colour,
) -> Result<()> {
    reply_embed(ctx, command, embeds::create_notice_embed(text, colour), false).await
}

async fn reply_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_text(
    ctx: &Context,
    command: &CommandInteraction,
    text: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

/// Respuesta de último recurso tras fallar un handler
pub async fn send_fallback_apology(ctx: &Context, command: &CommandInteraction) {
    let text = messages::fallback_apology();
    if reply_text(ctx, command, &text, true).await.is_ok() {
        return;
    }
    if let Err(e) = command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await
    {
        warn!("⚠️ No se pudo enviar la disculpa de respaldo: {:?}", e);
    }
}
