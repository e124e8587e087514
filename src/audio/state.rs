//! Per-guild playback state.
//!
//! One [`GuildPlaybackState`] exists per guild, created on first access and
//! kept for the life of the process. It sits behind a `parking_lot::Mutex`
//! that is never held across an `.await`.

use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{task::AbortHandle, time::Instant};
use tracing::debug;

use super::{
    events::{ConnectionId, Subscription},
    queue::{LoopMode, PlayQueue, Track},
    transport::Connection,
};

/// Lo que hace el reproductor ahora mismo
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Playback {
    #[default]
    Idle,
    Playing(Track),
    /// Hay pista actual pero ya no suena (saltada, trabada o fallida)
    Transitioning(Track),
}

#[derive(Debug, Clone)]
pub enum Transition {
    Start(Track),
    /// Detiene el audio pero conserva la pista actual
    Halt,
    /// Descarta la pista actual
    Finish,
}

impl Playback {
    pub fn current(&self) -> Option<&Track> {
        match self {
            Playback::Idle => None,
            Playback::Playing(track) | Playback::Transitioning(track) => Some(track),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Playback::Playing(_))
    }

    /// Aplica la transición y devuelve la pista que era actual
    fn apply(&mut self, transition: Transition) -> Option<Track> {
        let previous = std::mem::take(self);
        match (transition, previous) {
            (Transition::Start(track), previous) => {
                *self = Playback::Playing(track);
                previous.into_track()
            }
            (Transition::Halt, Playback::Playing(track) | Playback::Transitioning(track)) => {
                *self = Playback::Transitioning(track.clone());
                Some(track)
            }
            (Transition::Halt, Playback::Idle) => None,
            (Transition::Finish, previous) => previous.into_track(),
        }
    }

    fn into_track(self) -> Option<Track> {
        match self {
            Playback::Idle => None,
            Playback::Playing(track) | Playback::Transitioning(track) => Some(track),
        }
    }
}

/// Handle único del temporizador de inactividad; soltarlo lo cancela
#[derive(Debug)]
pub struct IdleTimer {
    id: u64,
    abort: AbortHandle,
    fired: Arc<AtomicBool>,
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        if !self.fired.load(Ordering::SeqCst) {
            self.abort.abort();
        }
    }
}

#[derive(Debug, Default)]
enum Binding {
    #[default]
    Unbound,
    /// Suscripción pedida, token aún no instalado
    Pending(ConnectionId),
    Bound(Subscription),
}

pub struct GuildPlaybackState {
    pub connection: Option<Connection>,
    binding: Binding,
    pub queue: PlayQueue,
    playback: Playback,
    pub loop_mode: LoopMode,
    idle_timer: Option<IdleTimer>,
    pub last_voice_channel_id: Option<ChannelId>,
    pub last_text_channel_id: Option<ChannelId>,
    self_leave_until: Option<Instant>,
}

impl GuildPlaybackState {
    pub fn new(max_queue: usize) -> Self {
        Self {
            connection: None,
            binding: Binding::Unbound,
            queue: PlayQueue::new(max_queue),
            playback: Playback::Idle,
            loop_mode: LoopMode::Off,
            idle_timer: None,
            last_voice_channel_id: None,
            last_text_channel_id: None,
            self_leave_until: None,
        }
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn current(&self) -> Option<&Track> {
        self.playback.current()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn transition(&mut self, transition: Transition) -> Option<Track> {
        self.playback.apply(transition)
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id())
    }

    /// Suelta la conexión lógica y su suscripción de eventos
    pub fn take_connection(&mut self) -> Option<Connection> {
        self.binding = Binding::Unbound;
        self.connection.take()
    }

    pub fn has_idle_timer(&self) -> bool {
        self.idle_timer.is_some()
    }

    pub fn cancel_idle(&mut self) {
        if self.idle_timer.take().is_some() {
            debug!("⏱️ Temporizador de inactividad cancelado");
        }
    }

    pub fn open_self_leave_window(&mut self, grace: Duration) {
        self.self_leave_until = Some(Instant::now() + grace);
    }

    pub fn in_self_leave_window(&self) -> bool {
        self.self_leave_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Si los eventos de `connection` están enlazados o enlazándose
    pub fn is_bound_to(&self, connection: ConnectionId) -> bool {
        match &self.binding {
            Binding::Unbound => false,
            Binding::Pending(id) => *id == connection,
            Binding::Bound(sub) => sub.connection() == connection,
        }
    }

    /// Reserva el enlace para `connection` y libera la suscripción anterior
    pub fn reserve_binding(&mut self, connection: ConnectionId) {
        self.binding = Binding::Pending(connection);
    }

    /// Instala la suscripción si su reserva sigue vigente
    pub fn attach_subscription(&mut self, subscription: Subscription) -> bool {
        match self.binding {
            Binding::Pending(id) if id == subscription.connection() => {
                self.binding = Binding::Bound(subscription);
                true
            }
            _ => false,
        }
    }

    /// Limpia todo lo transitorio salvo la ventana de salida propia
    pub fn reset(&mut self) {
        self.connection = None;
        self.binding = Binding::Unbound;
        self.queue.clear();
        self.playback = Playback::Idle;
        self.loop_mode = LoopMode::Off;
        self.idle_timer = None;
        self.last_voice_channel_id = None;
    }
}

pub type SharedState = Arc<Mutex<GuildPlaybackState>>;

/// Registro del estado de reproducción de cada guild
pub struct StateStore {
    guilds: DashMap<GuildId, SharedState>,
    max_queue: usize,
    next_timer: AtomicU64,
}

impl StateStore {
    pub fn new(max_queue: usize) -> Self {
        Self {
            guilds: DashMap::new(),
            max_queue,
            next_timer: AtomicU64::new(1),
        }
    }

    /// Obtiene el estado de la guild, creándolo en el primer acceso
    pub fn get(&self, guild_id: GuildId) -> SharedState {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildPlaybackState::new(self.max_queue))))
            .clone()
    }

    pub fn reset(&self, guild_id: GuildId) {
        self.get(guild_id).lock().reset();
    }

    pub fn cancel_idle(&self, guild_id: GuildId) {
        self.get(guild_id).lock().cancel_idle();
    }

    /// Reemplaza la tarea de inactividad pendiente por `task` tras `delay`
    pub fn schedule_idle<F>(&self, guild_id: GuildId, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = self.get(guild_id);
        let id = self.next_timer.fetch_add(1, Ordering::Relaxed);
        let fired = Arc::new(AtomicBool::new(false));

        let mut guard = state.lock();
        guard.cancel_idle();

        let slot = Arc::clone(&state);
        let flag = Arc::clone(&fired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            flag.store(true, Ordering::SeqCst);
            {
                let mut s = slot.lock();
                if s.idle_timer.as_ref().is_some_and(|t| t.id == id) {
                    s.idle_timer = None;
                }
            }
            task.await;
        });

        guard.idle_timer = Some(IdleTimer {
            id,
            abort: handle.abort_handle(),
            fired,
        });
        debug!("⏱️ Inactividad programada en guild {} ({:?})", guild_id, delay);
    }
}
