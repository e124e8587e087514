use anyhow::Result;
use futures::future::join_all;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};
use tracing::{error, info};

/// Todos los comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        leave_command(),
        queue_command(),
        loop_command(),
        loop_queue_command(),
        shuffle_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

/// Registra por guild si hay guilds configuradas, si no globalmente
pub async fn register(ctx: &Context, guilds: &[GuildId]) -> Result<()> {
    if guilds.is_empty() {
        register_global_commands(ctx).await?;
        info!("✅ Comandos registrados globalmente");
        return Ok(());
    }

    let results = join_all(
        guilds
            .iter()
            .map(|&guild_id| async move { (guild_id, register_guild_commands(ctx, guild_id).await) }),
    )
    .await;

    for (guild_id, result) in results {
        match result {
            Ok(()) => info!("✅ Comandos registrados en guild {}", guild_id),
            Err(e) => error!("❌ Error registrando comandos en guild {}: {:?}", guild_id, e),
        }
    }

    Ok(())
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot y limpia la cola")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Activa o desactiva la repetición de la canción actual")
}

fn loop_queue_command() -> CreateCommand {
    CreateCommand::new("loop-queue").description("Activa o desactiva la repetición de la cola")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla las canciones de la cola")
}
