//! # Bot Module
//!
//! Serenity side of GuildTunes.
//!
//! - [`commands`]: slash command definitions and registration
//! - [`handlers`]: interaction handling on top of the playback core
//! - [`events`]: conversion of gateway voice-state updates
//! - [`gateway`]: cache-backed presence lookups and channel notices
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`] and forwards
//! everything voice related to the core's event reactor.

use serenity::{
    all::{Context, EventHandler, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod commands;
pub mod events;
pub mod gateway;
pub mod handlers;

use crate::{
    audio::{events::ReactorEvent, MusicCore},
    config::Config,
};

/// Manejador de eventos de Discord
pub struct MusicBot {
    pub config: Arc<Config>,
    pub core: Arc<MusicCore>,
}

impl MusicBot {
    pub fn new(config: Arc<Config>, core: Arc<MusicCore>) -> Self {
        Self { config, core }
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let guilds = self.config.registration_guilds();
        if let Err(e) = commands::register(&ctx, &guilds).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, &command, self).await {
                error!("Error manejando comando /{}: {:?}", command.data.name, e);
                handlers::send_fallback_apology(&ctx, &command).await;
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;

        let Some(change) = events::voice_state_change(old.as_ref(), &new, bot_id) else {
            return;
        };
        debug!(
            "🔊 Voice state en guild {}: {} {:?} -> {:?}",
            change.guild_id, change.user_id, change.old_channel, change.new_channel
        );

        if change.is_self {
            if let Some(channel_id) = change.new_channel {
                self.core.record_voice_channel(change.guild_id, channel_id);
            }
        }

        self.core.forward(ReactorEvent::VoiceState(change));
    }
}
