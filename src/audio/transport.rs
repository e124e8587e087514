//! Boundaries between the playback core and the outside world.
//!
//! The core only talks to Discord and to the audio node through these traits.
//! Production implementations live in [`crate::audio::voice`] (songbird),
//! [`crate::bot::gateway`] (serenity) and [`crate::sources::ytdlp`].

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;

use super::{
    error::TransportError,
    events::{ConnectionId, EventSender, Subscription},
    queue::Track,
};

/// Una sesión de voz viva
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Canal al que está unida la sesión
    async fn channel_id(&self) -> Option<ChannelId>;

    /// Reproduce la pista de `encoded`, reemplazando lo que suene
    async fn play(&self, encoded: &str) -> Result<(), TransportError>;

    /// Detiene la pista actual; el fin llega como evento `End`
    async fn stop(&self) -> Result<(), TransportError>;

    /// Solo auto-silencio; nunca toca el silencio del servidor
    async fn set_self_mute(&self, muted: bool) -> Result<(), TransportError>;

    async fn leave(&self) -> Result<(), TransportError>;

    /// Reenvía los eventos de la conexión hasta soltar el token
    async fn subscribe(&self, guild_id: GuildId, events: EventSender) -> Subscription;
}

pub type Connection = Arc<dyn VoiceConnection>;

/// Gestor del nodo de voz: uniones, salidas y registro de sesiones vivas
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId)
        -> Result<Connection, TransportError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), TransportError>;

    /// Reproductor vivo del transporte para la guild
    async fn live_connection(&self, guild_id: GuildId) -> Option<Connection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadType {
    Track,
    Search,
    Playlist,
    Empty,
    Error,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub load_type: LoadType,
    pub tracks: Vec<Track>,
    pub message: Option<String>,
}

impl LoadResult {
    pub fn empty() -> Self {
        Self {
            load_type: LoadType::Empty,
            tracks: Vec::new(),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            load_type: LoadType::Error,
            tracks: Vec::new(),
            message: Some(message.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resuelve un identificador (`ytsearch:<texto>` o URL)
    async fn resolve(&self, identifier: &str) -> Result<LoadResult, TransportError>;
}

/// Lectura del gateway de Discord; lo desconocido es `None`
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Canal donde está realmente el bot según Discord
    async fn bot_voice_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    async fn member_voice_channel(&self, guild_id: GuildId, user_id: UserId)
        -> Option<ChannelId>;

    /// Miembros no-bot en `channel_id`
    async fn humans_in_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> usize;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Envía a exactamente este canal si el bot puede publicar ahí
    async fn send_to_channel(&self, guild_id: GuildId, channel_id: ChannelId, content: &str)
        -> bool;
}
