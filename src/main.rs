use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{voice::SongbirdTransport, MusicCore};
use crate::bot::{
    gateway::{DiscordHandles, SerenityGateway, SerenityNotifier},
    MusicBot,
};
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guildtunes=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando GuildTunes v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    let config = Arc::new(config);
    let handles = DiscordHandles::new();
    let songbird = Songbird::serenity();

    let transport = Arc::new(SongbirdTransport::new(songbird.clone(), reqwest::Client::new()));
    let gateway = Arc::new(SerenityGateway::new(handles.clone()));
    let notifier = Arc::new(SerenityNotifier::new(handles.clone()));
    let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_path.clone()));

    let (core, reactor, receiver) = MusicCore::new(
        config.playback_settings(),
        config.connection_timings(),
        transport,
        gateway,
        resolver,
        notifier,
    );
    let core = Arc::new(core);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES;

    // Construir cliente
    let handler = MusicBot::new(config.clone(), core.clone());
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    handles.attach(client.cache.clone(), client.http.clone());

    tokio::spawn(reactor.run(receiver));
    info!("📡 Reactor de eventos iniciado");

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ No se pudo registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: {}", config.ytdlp_path);
    }
}
