//! # Audio Module
//!
//! Per-guild music playback core of GuildTunes.
//!
//! ## Architecture
//!
//! ### [`state`] - Per-guild state
//! - Connection handle, queue, current track, loop mode
//! - Idle timer and self-leave grace window
//!
//! ### [`lock`] - Guild serialization
//! - One FIFO chain per guild for every mutating command
//! - A failing or panicking command never blocks the next one
//!
//! ### [`connection`] - Voice connection manager
//! - Ghost/orphan detection against the bot's real voice presence
//! - Join, adopt, rejoin and retry logic
//!
//! ### [`player`] - Playback service
//! - Resolution, queue admission, advancement, idle lifecycle
//!
//! ### [`reactor`] - Event reactor
//! - Track end/stuck/error handling
//! - Forced disconnects, forced moves and emptied channels
//!
//! The core only talks to the outside world through the traits in
//! [`transport`]. [`voice`] holds the songbird implementation.

pub mod connection;
pub mod error;
pub mod events;
pub mod lock;
pub mod player;
pub mod queue;
pub mod reactor;
pub mod state;
pub mod transport;
pub mod voice;

#[cfg(test)]
pub mod testing;

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::warn;

use self::{
    connection::{ConnectionManager, ConnectionTimings},
    events::{EventReceiver, EventSender, ReactorEvent},
    lock::GuildLocks,
    player::{PlaybackService, PlaybackSettings},
    reactor::EventReactor,
    state::StateStore,
    transport::{Gateway, Notifier, TrackResolver, VoiceTransport},
};

/// Registro del núcleo, dueño de todos los mapas por guild
pub struct MusicCore {
    pub store: Arc<StateStore>,
    pub locks: Arc<GuildLocks>,
    pub connections: Arc<ConnectionManager>,
    pub playback: Arc<PlaybackService>,
    events: EventSender,
}

impl MusicCore {
    /// Arma el núcleo; el reactor devuelto debe correr sobre el receptor devuelto
    pub fn new(
        settings: PlaybackSettings,
        timings: ConnectionTimings,
        transport: Arc<dyn VoiceTransport>,
        gateway: Arc<dyn Gateway>,
        resolver: Arc<dyn TrackResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, EventReactor, EventReceiver) {
        let (events, receiver) = events::channel();
        let store = Arc::new(StateStore::new(settings.max_queue));
        let connections = Arc::new(ConnectionManager::new(
            store.clone(),
            transport,
            gateway.clone(),
            events.clone(),
            timings,
        ));
        let playback = Arc::new(PlaybackService::new(
            store.clone(),
            connections.clone(),
            resolver,
            gateway.clone(),
            notifier.clone(),
            settings,
        ));
        let reactor = EventReactor::new(playback.clone(), gateway, notifier, events.clone());

        let core = Self {
            store,
            locks: Arc::new(GuildLocks::new()),
            connections,
            playback,
            events,
        };
        (core, reactor, receiver)
    }

    pub fn forward(&self, event: ReactorEvent) {
        if self.events.send(event).is_err() {
            warn!("⚠️ Reactor de eventos detenido, evento descartado");
        }
    }

    pub fn record_text_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.store.get(guild_id).lock().last_text_channel_id = Some(channel_id);
    }

    pub fn record_voice_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.store.get(guild_id).lock().last_voice_channel_id = Some(channel_id);
    }
}
