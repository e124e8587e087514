use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::{
    connection::ConnectionManager,
    error::{MusicError, TransportError},
    queue::{LoopMode, Track},
    state::{Playback, StateStore, Transition},
    transport::{Gateway, LoadType, Notifier, TrackResolver},
};
use crate::{sources, ui::messages};

/// Tiempos y límites del núcleo de reproducción
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub max_queue: usize,
    /// Inactividad tolerada antes de salir
    pub auto_leave: Duration,
    /// Ventana que silencia avisos de salidas propias
    pub self_leave_grace: Duration,
    pub empty_channel_debounce: Duration,
    pub debug_resolve: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            max_queue: 100,
            auto_leave: Duration::from_secs(180),
            self_leave_grace: Duration::from_secs(10),
            empty_channel_debounce: Duration::from_secs(3),
            debug_resolve: false,
        }
    }
}

/// Respuesta clasificada del resolver
#[derive(Debug, Clone)]
pub struct Resolved {
    pub tracks: Vec<Track>,
    pub is_playlist: bool,
    pub load_type: LoadType,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Queued {
        track: Track,
        /// Si la pista arrancó de inmediato
        started: bool,
    },
    PlaylistQueued {
        added: usize,
        /// Pistas descartadas por falta de espacio
        skipped: usize,
        started: Option<Track>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub playing: bool,
    pub upcoming: Vec<Track>,
    pub total: usize,
    pub max: usize,
    pub loop_mode: LoopMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    QueueFinished,
    PlaybackFailed,
}

/// Admisión a la cola, avance de la reproducción y ciclo de inactividad
pub struct PlaybackService {
    store: Arc<StateStore>,
    connections: Arc<ConnectionManager>,
    resolver: Arc<dyn TrackResolver>,
    gateway: Arc<dyn Gateway>,
    notifier: Arc<dyn Notifier>,
    settings: PlaybackSettings,
}

impl PlaybackService {
    pub fn new(
        store: Arc<StateStore>,
        connections: Arc<ConnectionManager>,
        resolver: Arc<dyn TrackResolver>,
        gateway: Arc<dyn Gateway>,
        notifier: Arc<dyn Notifier>,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            store,
            connections,
            resolver,
            gateway,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Resuelve una búsqueda o URL; las fallas vuelven como carga `Error`
    pub async fn resolve(&self, query: &str) -> Resolved {
        let identifier = sources::build_identifier(query);
        self.resolve_identifier(&identifier).await
    }

    async fn resolve_identifier(&self, identifier: &str) -> Resolved {
        let result = match self.resolver.resolve(identifier).await {
            Ok(result) => result,
            Err(e) => {
                error!("❌ Error resolviendo '{}': {}", identifier, e);
                return Resolved {
                    tracks: Vec::new(),
                    is_playlist: false,
                    load_type: LoadType::Error,
                    message: Some(e.to_string()),
                };
            }
        };

        if self.settings.debug_resolve {
            debug!(
                "[resolve] {:?} x{} ({})",
                result.load_type,
                result.tracks.len(),
                identifier
            );
        }

        let mut tracks = result.tracks;
        let is_playlist = result.load_type == LoadType::Playlist;
        match result.load_type {
            LoadType::Playlist => {}
            LoadType::Track | LoadType::Search => tracks.truncate(1),
            LoadType::Empty | LoadType::Error => tracks.clear(),
        }

        Resolved {
            tracks,
            is_playlist,
            load_type: result.load_type,
            message: result.message,
        }
    }

    /// Canal al que conectaría un `play` del usuario
    pub async fn check_play_location(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<ChannelId, MusicError> {
        let user_channel = self
            .gateway
            .member_voice_channel(guild_id, user_id)
            .await
            .ok_or(MusicError::UserNotInVoice)?;
        self.check_not_busy(guild_id, user_channel).await?;
        Ok(user_channel)
    }

    async fn check_not_busy(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(), MusicError> {
        match self.gateway.bot_voice_channel(guild_id).await {
            Some(bot_channel) if bot_channel != channel_id => Err(MusicError::BusyElsewhere),
            _ => Ok(()),
        }
    }

    /// Resuelve, conecta y encola; nunca entra a voz si no hay nada reproducible
    pub async fn play(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
        query: &str,
    ) -> Result<PlayOutcome, MusicError> {
        self.check_not_busy(guild_id, channel_id).await?;

        let identifier = sources::build_identifier(query);
        if identifier == sources::SEARCH_PREFIX {
            return Err(MusicError::EmptyQuery);
        }

        let resolved = self.resolve_identifier(&identifier).await;
        if resolved.load_type == LoadType::Error {
            return Err(MusicError::ResolveFailed(
                resolved.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let total = resolved.tracks.len();
        let tracks: Vec<Track> = resolved
            .tracks
            .into_iter()
            .filter(Track::is_playable)
            .collect();
        if tracks.len() < total {
            warn!(
                "⚠️ {} resultados sin handle descartados en guild {}",
                total - tracks.len(),
                guild_id
            );
        }
        if tracks.is_empty() {
            return Err(MusicError::NoResults);
        }

        let state = self.store.get(guild_id);
        {
            let s = state.lock();
            if s.queue.room() == 0 {
                debug!("Cola llena en guild {}", guild_id);
                return Err(MusicError::QueueFull {
                    max: s.queue.max_size(),
                });
            }
        }

        self.connections
            .ensure_connection(guild_id, channel_id, false)
            .await
            .map_err(MusicError::Connect)?;

        if resolved.is_playlist {
            self.admit_playlist(guild_id, tracks).await
        } else {
            let track = tracks.into_iter().next().ok_or(MusicError::NoResults)?;
            self.admit_track(guild_id, track).await
        }
    }

    async fn admit_track(
        self: &Arc<Self>,
        guild_id: GuildId,
        track: Track,
    ) -> Result<PlayOutcome, MusicError> {
        {
            let state = self.store.get(guild_id);
            let mut s = state.lock();
            let max = s.queue.max_size();
            s.queue
                .push_back(track.clone())
                .map_err(|_| MusicError::QueueFull { max })?;
            s.cancel_idle();
        }
        info!("➕ Agregado a la cola en guild {}: {}", guild_id, track.display_title());

        let started = self.start_admitted(guild_id).await?;
        Ok(PlayOutcome::Queued {
            started: started.as_ref() == Some(&track),
            track,
        })
    }

    async fn admit_playlist(
        self: &Arc<Self>,
        guild_id: GuildId,
        tracks: Vec<Track>,
    ) -> Result<PlayOutcome, MusicError> {
        let total = tracks.len();
        let (added, play_now) = {
            let state = self.store.get(guild_id);
            let mut s = state.lock();
            let play_now = *s.playback() == Playback::Idle;
            let mut tracks = tracks.into_iter();

            let mut added = 0;
            if play_now {
                if let Some(first) = tracks.next() {
                    if s.queue.push_front(first).is_ok() {
                        added += 1;
                    }
                }
            }
            added += s.queue.extend_bounded(tracks);

            if added == 0 {
                return Err(MusicError::QueueFull {
                    max: s.queue.max_size(),
                });
            }
            s.cancel_idle();
            (added, play_now)
        };
        info!(
            "📋 Playlist en guild {}: {} agregadas, {} omitidas",
            guild_id,
            added,
            total - added
        );

        let started = if play_now {
            self.start_admitted(guild_id).await?
        } else {
            None
        };
        Ok(PlayOutcome::PlaylistQueued {
            added,
            skipped: total - added,
            started,
        })
    }

    /// Arranca lo recién admitido; si nada arrancó y la guild quedó vacía, arma la inactividad
    async fn start_admitted(self: &Arc<Self>, guild_id: GuildId) -> Result<Option<Track>, MusicError> {
        let started = self.play_next(guild_id).await;
        if !matches!(started, Ok(Some(_))) && self.is_drained(guild_id) {
            debug!("Nada que reproducir tras admitir en guild {}", guild_id);
            self.schedule_idle(guild_id, IdleReason::PlaybackFailed);
        }
        started
    }

    fn is_drained(&self, guild_id: GuildId) -> bool {
        let state = self.store.get(guild_id);
        let s = state.lock();
        s.current().is_none() && s.queue.is_empty()
    }

    /// Reproduce la siguiente pista si el reproductor está libre
    pub async fn play_next(&self, guild_id: GuildId) -> Result<Option<Track>, MusicError> {
        self.advance(guild_id, None).await
    }

    /// Como `play_next`, pero antes re-encola `requeue` al final
    pub async fn advance(
        &self,
        guild_id: GuildId,
        requeue: Option<Track>,
    ) -> Result<Option<Track>, MusicError> {
        let state = self.store.get(guild_id);
        let (track, conn) = {
            let mut s = state.lock();
            if *s.playback() != Playback::Idle {
                if let Some(track) = requeue {
                    if s.queue.push_back(track).is_err() {
                        warn!("⚠️ Cola llena, no se pudo re-encolar en guild {}", guild_id);
                    }
                }
                return Ok(None);
            }

            let mut next = s.queue.pop_playable();
            if let Some(track) = requeue {
                if s.queue.push_back(track).is_err() {
                    warn!("⚠️ Cola llena, no se pudo re-encolar en guild {}", guild_id);
                }
            }
            if next.is_none() {
                next = s.queue.pop_playable();
            }
            let Some(track) = next else {
                return Ok(None);
            };

            let Some(conn) = s.connection.clone() else {
                warn!("Sin conexión de voz para reproducir en guild {}", guild_id);
                let _ = s.queue.push_front(track);
                return Err(MusicError::Playback(TransportError::NotConnected));
            };

            s.transition(Transition::Start(track.clone()));
            s.cancel_idle();
            (track, conn)
        };

        info!("🎵 Reproduciendo en guild {}: {}", guild_id, track.display_title());
        self.notify_current_voice(guild_id, &messages::now_playing(&track))
            .await;

        let encoded = track.encoded().unwrap_or_default();
        if let Err(e) = conn.play(encoded).await {
            error!("❌ Error al reproducir en guild {}: {}", guild_id, e);
            let mut s = state.lock();
            if s.current() == Some(&track) {
                s.transition(Transition::Finish);
            }
            return Err(MusicError::Playback(e));
        }

        Ok(Some(track))
    }

    /// Detiene la pista actual; el evento `End` avanza la cola
    pub async fn skip(&self, guild_id: GuildId) -> Result<Track, MusicError> {
        let state = self.store.get(guild_id);
        let (skipped, conn) = {
            let mut s = state.lock();
            if s.current().is_none() {
                return Err(MusicError::NothingPlaying);
            }
            if s.loop_mode == LoopMode::Track {
                s.loop_mode = LoopMode::Off;
            }
            let skipped = s.transition(Transition::Halt);
            (skipped, s.connection.clone())
        };
        let skipped = skipped.ok_or(MusicError::NothingPlaying)?;

        match conn {
            Some(conn) => {
                if let Err(e) = conn.stop().await {
                    error!("❌ Error al detener en guild {}: {}", guild_id, e);
                    let mut s = state.lock();
                    if s.current() == Some(&skipped) {
                        s.transition(Transition::Finish);
                    }
                    return Err(MusicError::Playback(e));
                }
            }
            None => {
                state.lock().transition(Transition::Finish);
            }
        }

        info!("⏭️ Saltada en guild {}: {}", guild_id, skipped.display_title());
        Ok(skipped)
    }

    /// Salida pedida por el usuario; abre la ventana de salida propia primero
    pub async fn leave(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let has_connection = self.store.get(guild_id).lock().connection.is_some();
        if !has_connection && self.gateway.bot_voice_channel(guild_id).await.is_none() {
            return Err(MusicError::BotNotInVoice);
        }

        {
            let state = self.store.get(guild_id);
            let mut s = state.lock();
            s.open_self_leave_window(self.settings.self_leave_grace);
            s.cancel_idle();
        }
        self.hard_leave_and_clear(guild_id).await;
        info!("👋 Desconectado de voz en guild {}", guild_id);
        Ok(())
    }

    /// Sale de voz y reinicia el estado de la guild
    pub async fn hard_leave_and_clear(&self, guild_id: GuildId) {
        self.store.cancel_idle(guild_id);
        self.connections.leave_voice_hard(guild_id).await;
        self.store.reset(guild_id);
    }

    pub fn toggle_loop(&self, guild_id: GuildId) -> LoopMode {
        self.toggle(guild_id, LoopMode::Track)
    }

    pub fn toggle_loop_queue(&self, guild_id: GuildId) -> LoopMode {
        self.toggle(guild_id, LoopMode::Queue)
    }

    fn toggle(&self, guild_id: GuildId, target: LoopMode) -> LoopMode {
        let state = self.store.get(guild_id);
        let mut s = state.lock();
        s.loop_mode = s.loop_mode.toggled(target);
        debug!("🔁 Modo de repetición en guild {}: {:?}", guild_id, s.loop_mode);
        s.loop_mode
    }

    /// Mezcla las próximas pistas y devuelve cuántas son
    pub fn shuffle(&self, guild_id: GuildId) -> Result<usize, MusicError> {
        let state = self.store.get(guild_id);
        let mut s = state.lock();
        if s.queue.is_empty() {
            return Err(MusicError::NothingToShuffle);
        }
        s.queue.shuffle();
        Ok(s.queue.len())
    }

    pub fn snapshot(&self, guild_id: GuildId, limit: usize) -> QueueSnapshot {
        let state = self.store.get(guild_id);
        let s = state.lock();
        QueueSnapshot {
            current: s.current().cloned(),
            playing: s.is_playing(),
            upcoming: s.queue.iter().take(limit).cloned().collect(),
            total: s.queue.len(),
            max: s.queue.max_size(),
            loop_mode: s.loop_mode,
        }
    }

    /// Arma el temporizador de inactividad
    pub fn schedule_idle(self: &Arc<Self>, guild_id: GuildId, reason: IdleReason) {
        let service = Arc::clone(self);
        self.store
            .schedule_idle(guild_id, self.settings.auto_leave, async move {
                service.idle_timeout(guild_id, reason).await;
            });
    }

    async fn idle_timeout(&self, guild_id: GuildId, reason: IdleReason) {
        {
            let state = self.store.get(guild_id);
            let s = state.lock();
            if s.in_self_leave_window() {
                debug!("Inactividad ignorada en guild {}: salida propia reciente", guild_id);
                return;
            }
            if s.current().is_some() || !s.queue.is_empty() {
                debug!("Inactividad ignorada en guild {}: hay música", guild_id);
                return;
            }
        }

        let Some(channel_id) = self.gateway.bot_voice_channel(guild_id).await else {
            debug!("Inactividad ignorada en guild {}: no conectado", guild_id);
            return;
        };

        info!("💤 Saliendo por inactividad de guild {} ({:?})", guild_id, reason);
        self.store
            .get(guild_id)
            .lock()
            .open_self_leave_window(self.settings.self_leave_grace);
        self.notifier
            .send_to_channel(guild_id, channel_id, &messages::idle_leave())
            .await;
        self.hard_leave_and_clear(guild_id).await;
    }

    /// Aviso al chat del canal de voz actual del bot
    pub async fn notify_current_voice(&self, guild_id: GuildId, content: &str) -> bool {
        let conn = self.store.get(guild_id).lock().connection.clone();
        let channel = match conn {
            Some(conn) => conn.channel_id().await,
            None => None,
        };
        let channel = match channel {
            Some(channel) => Some(channel),
            None => self.gateway.bot_voice_channel(guild_id).await,
        };

        match channel {
            Some(channel_id) => {
                self.notifier
                    .send_to_channel(guild_id, channel_id, content)
                    .await
            }
            None => false,
        }
    }
}
