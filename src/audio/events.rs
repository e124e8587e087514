//! Events consumed by the [`EventReactor`](super::reactor::EventReactor).
//!
//! Everything the reactor reacts to arrives through one unbounded channel and
//! is processed one event at a time.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::mpsc;

/// Identidad de un objeto de conexión de voz; cada reconexión trae una nueva
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEventKind {
    /// La pista terminó, sola o porque se detuvo
    End,
    /// El transporte dejó de recibir audio de la pista
    Stuck,
    /// La pista falló mientras sonaba
    Exception(String),
    /// El reproductor reportó un error
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEvent {
    pub guild_id: GuildId,
    pub connection: ConnectionId,
    /// Handle codificado de la pista del evento, si el transporte lo conoce
    pub track: Option<String>,
    pub kind: PlayerEventKind,
}

/// Cambio de estado de voz reducido a lo que usa el reactor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStateChange {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Si el cambio es del propio bot
    pub is_self: bool,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactorEvent {
    Player(PlayerEvent),
    VoiceState(VoiceStateChange),
    /// Revisión diferida de un canal que parecía vacío
    EmptyRecheck(GuildId),
}

pub type EventSender = mpsc::UnboundedSender<ReactorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ReactorEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Token del enlace de eventos; se desengancha una sola vez al soltarse
pub struct Subscription {
    connection: ConnectionId,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(connection: ConnectionId, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            connection,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{atomic::AtomicUsize, Arc};

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn subscription_cancels_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(ConnectionId(7), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(sub.connection(), ConnectionId(7));
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
