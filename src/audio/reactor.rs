//! Reacts to player lifecycle events and to the bot's voice presence.
//!
//! Events are handled one at a time by a single task. Nothing here goes
//! through the guild locks, so every handler re-reads live state (actual
//! presence, self-leave window) before acting.

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::{
    error::MusicError,
    events::{EventReceiver, EventSender, PlayerEvent, PlayerEventKind, ReactorEvent, VoiceStateChange},
    player::{IdleReason, PlaybackService},
    queue::{LoopMode, Track},
    state::{Playback, StateStore, Transition},
    transport::{Connection, Gateway, Notifier},
};
use crate::ui::messages;

enum AfterEnd {
    Ignore,
    Replay(Track, Connection),
    Advance(Option<Track>),
}

pub struct EventReactor {
    playback: Arc<PlaybackService>,
    gateway: Arc<dyn Gateway>,
    notifier: Arc<dyn Notifier>,
    events: EventSender,
    rechecks: DashMap<GuildId, AbortHandle>,
}

impl EventReactor {
    pub fn new(
        playback: Arc<PlaybackService>,
        gateway: Arc<dyn Gateway>,
        notifier: Arc<dyn Notifier>,
        events: EventSender,
    ) -> Self {
        Self {
            playback,
            gateway,
            notifier,
            events,
            rechecks: DashMap::new(),
        }
    }

    /// Emisor que alimenta este reactor
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    fn store(&self) -> &Arc<StateStore> {
        self.playback.store()
    }

    pub async fn run(self, mut events: EventReceiver) {
        info!("📡 Reactor de eventos de voz iniciado");
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        info!("📡 Reactor de eventos de voz detenido");
    }

    pub async fn dispatch(&self, event: ReactorEvent) {
        match event {
            ReactorEvent::Player(event) => self.on_player_event(event).await,
            ReactorEvent::VoiceState(change) if change.is_self => self.on_own_voice_state(change).await,
            ReactorEvent::VoiceState(change) => self.on_member_voice_state(change),
            ReactorEvent::EmptyRecheck(guild_id) => self.on_empty_recheck(guild_id).await,
        }
    }

    async fn on_player_event(&self, event: PlayerEvent) {
        let guild_id = event.guild_id;
        {
            let state = self.store().get(guild_id);
            let s = state.lock();
            if s.connection_id() != Some(event.connection) {
                debug!("Evento de una conexión anterior ignorado en guild {}", guild_id);
                return;
            }
            if let (Some(encoded), Some(current)) = (&event.track, s.current()) {
                if current.encoded() != Some(encoded.as_str()) {
                    debug!("Evento de una pista anterior ignorado en guild {}", guild_id);
                    return;
                }
            }
        }

        match event.kind {
            PlayerEventKind::End => self.on_track_end(guild_id).await,
            kind => self.on_track_failure(guild_id, kind).await,
        }
    }

    async fn on_track_end(&self, guild_id: GuildId) {
        let state = self.store().get(guild_id);
        let next = {
            let mut s = state.lock();
            match s.playback().clone() {
                Playback::Idle => AfterEnd::Ignore,
                Playback::Playing(track) if s.loop_mode == LoopMode::Track => {
                    match s.connection.clone() {
                        Some(conn) => AfterEnd::Replay(track, conn),
                        None => {
                            s.transition(Transition::Finish);
                            AfterEnd::Advance(None)
                        }
                    }
                }
                _ => {
                    let finished = s.transition(Transition::Finish);
                    let requeue = if s.loop_mode == LoopMode::Queue {
                        finished
                    } else {
                        None
                    };
                    AfterEnd::Advance(requeue)
                }
            }
        };

        match next {
            AfterEnd::Ignore => debug!("Fin de pista sin pista actual en guild {}", guild_id),
            AfterEnd::Replay(track, conn) => {
                debug!("🔂 Repitiendo en guild {}: {}", guild_id, track.display_title());
                let encoded = track.encoded().unwrap_or_default();
                if let Err(e) = conn.play(encoded).await {
                    error!("❌ Error al repetir pista en guild {}: {}", guild_id, e);
                    state.lock().transition(Transition::Finish);
                    let started = self.playback.play_next(guild_id).await;
                    self.after_advance(guild_id, started, IdleReason::PlaybackFailed)
                        .await;
                }
            }
            AfterEnd::Advance(requeue) => {
                let started = self.playback.advance(guild_id, requeue).await;
                self.after_advance(guild_id, started, IdleReason::QueueFinished)
                    .await;
            }
        }
    }

    /// Pista trabada, excepción o error; el modo de repetición no cambia
    async fn on_track_failure(&self, guild_id: GuildId, kind: PlayerEventKind) {
        warn!("⚠️ Problema de reproducción en guild {}: {:?}", guild_id, kind);
        let state = self.store().get(guild_id);
        state.lock().transition(Transition::Halt);

        if self.gateway.bot_voice_channel(guild_id).await.is_none() {
            debug!("Fallo ignorado en guild {}: no conectado", guild_id);
            return;
        }
        if state.lock().in_self_leave_window() {
            debug!("Fallo ignorado en guild {}: salida propia reciente", guild_id);
            return;
        }

        state.lock().transition(Transition::Finish);
        let started = self.playback.play_next(guild_id).await;
        self.after_advance(guild_id, started, IdleReason::PlaybackFailed)
            .await;
    }

    async fn after_advance(
        &self,
        guild_id: GuildId,
        started: Result<Option<Track>, MusicError>,
        reason: IdleReason,
    ) {
        match started {
            Ok(Some(_)) => {}
            Ok(None) => self.queue_drained(guild_id, reason).await,
            Err(e) => {
                error!("❌ No se pudo avanzar la cola en guild {}: {}", guild_id, e);
                self.queue_drained(guild_id, IdleReason::PlaybackFailed).await;
            }
        }
    }

    /// No queda nada: avisa al canal y arma la inactividad una vez
    async fn queue_drained(&self, guild_id: GuildId, reason: IdleReason) {
        let should_schedule = {
            let state = self.store().get(guild_id);
            let s = state.lock();
            s.current().is_none() && s.queue.is_empty() && !s.has_idle_timer()
        };
        if !should_schedule {
            return;
        }

        let auto_leave = self.playback.settings().auto_leave;
        self.playback
            .notify_current_voice(guild_id, &messages::queue_finished(auto_leave))
            .await;
        self.playback.schedule_idle(guild_id, reason);
    }

    async fn on_own_voice_state(&self, change: VoiceStateChange) {
        let guild_id = change.guild_id;
        match (change.old_channel, change.new_channel) {
            (Some(old), None) => self.on_disconnected(guild_id, old).await,
            (Some(old), Some(new)) if old != new => self.on_moved(guild_id, old, new).await,
            (None, Some(new)) => {
                debug!("🔊 Bot en canal {} de guild {}", new, guild_id);
                self.schedule_recheck(guild_id);
            }
            _ => {}
        }
    }

    async fn on_disconnected(&self, guild_id: GuildId, from: ChannelId) {
        if self.store().get(guild_id).lock().in_self_leave_window() {
            debug!("Desconexión propia en guild {}, sin aviso", guild_id);
            return;
        }

        warn!("🔌 Desconexión forzada del canal {} en guild {}", from, guild_id);
        self.cancel_recheck(guild_id);
        self.playback.hard_leave_and_clear(guild_id).await;
        self.notifier
            .send_to_channel(guild_id, from, &messages::forced_disconnect())
            .await;
    }

    /// El bot nunca se mueve solo; cualquier movimiento es ajeno
    async fn on_moved(&self, guild_id: GuildId, from: ChannelId, to: ChannelId) {
        warn!("🔀 Bot movido de {} a {} en guild {}", from, to, guild_id);
        self.cancel_recheck(guild_id);
        {
            let state = self.store().get(guild_id);
            state
                .lock()
                .open_self_leave_window(self.playback.settings().self_leave_grace);
        }
        self.playback.hard_leave_and_clear(guild_id).await;
        self.notifier
            .send_to_channel(guild_id, from, &messages::forced_move())
            .await;
    }

    /// Otro miembro cambió de canal; si pudo vaciar el del bot, revisa tras el debounce
    fn on_member_voice_state(&self, change: VoiceStateChange) {
        let guild_id = change.guild_id;
        let Some(bot_channel) = self.store().get(guild_id).lock().last_voice_channel_id else {
            return;
        };

        if change.new_channel == Some(bot_channel) {
            self.cancel_recheck(guild_id);
            return;
        }
        if change.old_channel == Some(bot_channel) {
            self.schedule_recheck(guild_id);
        }
    }

    fn schedule_recheck(&self, guild_id: GuildId) {
        if self.rechecks.contains_key(&guild_id) {
            return;
        }

        let delay = self.playback.settings().empty_channel_debounce;
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ReactorEvent::EmptyRecheck(guild_id));
        });
        self.rechecks.insert(guild_id, handle.abort_handle());
        debug!("⏳ Revisión de canal vacío programada en guild {}", guild_id);
    }

    fn cancel_recheck(&self, guild_id: GuildId) {
        if let Some((_, handle)) = self.rechecks.remove(&guild_id) {
            handle.abort();
        }
    }

    async fn on_empty_recheck(&self, guild_id: GuildId) {
        self.rechecks.remove(&guild_id);

        let Some(channel_id) = self.gateway.bot_voice_channel(guild_id).await else {
            return;
        };
        let humans = self.gateway.humans_in_channel(guild_id, channel_id).await;
        if humans > 0 {
            debug!("Canal {} con {} personas, me quedo", channel_id, humans);
            return;
        }

        info!("👋 Canal {} vacío en guild {}, saliendo", channel_id, guild_id);
        {
            let state = self.store().get(guild_id);
            state
                .lock()
                .open_self_leave_window(self.playback.settings().self_leave_grace);
        }
        self.playback.hard_leave_and_clear(guild_id).await;
        self.notifier
            .send_to_channel(guild_id, channel_id, &messages::nobody_left())
            .await;
    }
}
