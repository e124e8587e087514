//! Songbird implementation of the voice transport.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError, input::YoutubeDl, tracks::TrackHandle, Call, Event, EventContext,
    EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use super::{
    error::TransportError,
    events::{ConnectionId, EventSender, PlayerEvent, PlayerEventKind, ReactorEvent, Subscription},
    transport::{Connection, VoiceConnection, VoiceTransport},
};

/// Handles recientes con el handle codificado con que arrancó cada uno
const TRACK_LOG_SIZE: usize = 8;

type TrackLog = Arc<Mutex<Vec<(TrackHandle, String)>>>;

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    connections: DashMap<GuildId, Arc<SongbirdConnection>>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self {
            manager,
            http,
            connections: DashMap::new(),
        }
    }

    fn wrap(&self, guild_id: GuildId, call: Arc<tokio::sync::Mutex<Call>>) -> Arc<SongbirdConnection> {
        let conn = Arc::new(SongbirdConnection {
            id: ConnectionId::next(),
            guild_id,
            call,
            http: self.http.clone(),
            tracks: Arc::new(Mutex::new(Vec::new())),
        });
        self.connections.insert(guild_id, conn.clone());
        conn
    }
}

fn map_join_error(error: JoinError) -> TransportError {
    // A newer join for the same guild superseded this one: the previous
    // session is still being torn down.
    if matches!(error, JoinError::Dropped) {
        return TransportError::AlreadyConnected;
    }
    TransportError::Join(error.to_string())
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Connection, TransportError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(map_join_error)?;

        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                debug!("No se pudo ensordecer al bot en guild {}: {:?}", guild_id, e);
            }
        }

        info!("🔊 Sesión de voz creada en guild {} canal {}", guild_id, channel_id);
        Ok(self.wrap(guild_id, call))
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), TransportError> {
        self.connections.remove(&guild_id);
        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| TransportError::Leave(e.to_string()))
    }

    async fn live_connection(&self, guild_id: GuildId) -> Option<Connection> {
        let call = self.manager.get(guild_id)?;
        if call.lock().await.current_channel().is_none() {
            return None;
        }

        let known = self
            .connections
            .get(&guild_id)
            .filter(|conn| Arc::ptr_eq(&conn.call, &call))
            .map(|conn| conn.clone());
        let conn = match known {
            Some(conn) => conn,
            None => self.wrap(guild_id, call),
        };
        Some(conn)
    }
}

/// Un `Call` de songbird visto por el núcleo, con identidad propia por envoltura
pub struct SongbirdConnection {
    id: ConnectionId,
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    tracks: TrackLog,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn channel_id(&self) -> Option<ChannelId> {
        self.call
            .lock()
            .await
            .current_channel()
            .map(|channel| ChannelId::from(channel.0))
    }

    async fn play(&self, encoded: &str) -> Result<(), TransportError> {
        let input = YoutubeDl::new(self.http.clone(), encoded.to_string());
        let handle = {
            let mut handler = self.call.lock().await;
            if handler.current_channel().is_none() {
                return Err(TransportError::NotConnected);
            }
            handler.play_only_input(input.into())
        };

        let mut tracks = self.tracks.lock();
        tracks.push((handle, encoded.to_string()));
        if tracks.len() > TRACK_LOG_SIZE {
            let excess = tracks.len() - TRACK_LOG_SIZE;
            tracks.drain(..excess);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.call.lock().await.stop();
        Ok(())
    }

    async fn set_self_mute(&self, muted: bool) -> Result<(), TransportError> {
        self.call
            .lock()
            .await
            .mute(muted)
            .await
            .map_err(|e| TransportError::Playback(e.to_string()))
    }

    async fn leave(&self) -> Result<(), TransportError> {
        self.call
            .lock()
            .await
            .leave()
            .await
            .map_err(|e| TransportError::Leave(e.to_string()))
    }

    async fn subscribe(&self, guild_id: GuildId, events: EventSender) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        {
            let mut handler = self.call.lock().await;
            for event in [TrackEvent::End, TrackEvent::Error] {
                handler.add_global_event(
                    Event::Track(event),
                    TrackEventForwarder {
                        guild_id,
                        connection: self.id,
                        event,
                        tracks: self.tracks.clone(),
                        events: events.clone(),
                        active: active.clone(),
                    },
                );
            }
        }
        debug!("🎧 Eventos de pista registrados para guild {}", self.guild_id);

        Subscription::new(self.id, move || active.store(false, Ordering::SeqCst))
    }
}

/// Reenvía eventos de pista al reactor mientras viva su suscripción
struct TrackEventForwarder {
    guild_id: GuildId,
    connection: ConnectionId,
    event: TrackEvent,
    tracks: TrackLog,
    events: EventSender,
    active: Arc<AtomicBool>,
}

impl TrackEventForwarder {
    fn encoded_for(&self, handle: &TrackHandle) -> Option<String> {
        let mut tracks = self.tracks.lock();
        let index = tracks.iter().position(|(h, _)| h.uuid() == handle.uuid())?;
        let (_, encoded) = tracks.remove(index);
        Some(encoded)
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEventForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if !self.active.load(Ordering::SeqCst) {
            return Some(Event::Cancel);
        }

        let EventContext::Track(track_list) = ctx else {
            return None;
        };
        for (state, handle) in *track_list {
            let kind = match self.event {
                TrackEvent::End => PlayerEventKind::End,
                _ => PlayerEventKind::Exception(format!("{:?}", state.playing)),
            };
            let event = PlayerEvent {
                guild_id: self.guild_id,
                connection: self.connection,
                track: self.encoded_for(handle),
                kind,
            };
            if self.events.send(ReactorEvent::Player(event)).is_err() {
                warn!("⚠️ Reactor detenido, evento de pista descartado");
                return Some(Event::Cancel);
            }
        }

        None
    }
}
