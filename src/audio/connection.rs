//! Voice connection management.
//!
//! Compares what the state store believes (the logical connection) with what
//! Discord reports (the bot's actual voice channel) and repairs the
//! difference: ghost connections are dropped, orphaned transport players are
//! adopted, and joins are retried once when the transport still holds a
//! stale session.

use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::{
    error::TransportError,
    events::EventSender,
    state::StateStore,
    transport::{Connection, Gateway, VoiceTransport},
};

#[derive(Debug, Clone, Copy)]
pub struct ConnectionTimings {
    /// Pausa tras desmontar una sesión antes de volver a unirse
    pub settle_delay: Duration,
    /// Pausa antes de reintentar una unión rechazada por "ya conectado"
    pub retry_delay: Duration,
}

impl Default for ConnectionTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(150),
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// Resultado de comparar la presencia lógica con la real
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Conexión lógica sin presencia real; se descartó
    GhostCleared,
    /// En voz sin conexión lógica; se adoptó la del transporte si había
    Resynced { adopted: bool },
    /// Ambas existen pero no coinciden
    Mismatch {
        logical: ChannelId,
        actual: ChannelId,
    },
    Consistent { connected: bool },
}

pub struct ConnectionManager {
    store: Arc<StateStore>,
    transport: Arc<dyn VoiceTransport>,
    gateway: Arc<dyn Gateway>,
    events: EventSender,
    timings: ConnectionTimings,
}

impl ConnectionManager {
    pub fn new(
        store: Arc<StateStore>,
        transport: Arc<dyn VoiceTransport>,
        gateway: Arc<dyn Gateway>,
        events: EventSender,
        timings: ConnectionTimings,
    ) -> Self {
        Self {
            store,
            transport,
            gateway,
            events,
            timings,
        }
    }

    /// Apunta la conexión lógica al reproductor vivo del transporte
    pub async fn sync_player(&self, guild_id: GuildId) -> Option<Connection> {
        let live = self.transport.live_connection(guild_id).await;
        let state = self.store.get(guild_id);
        let mut s = state.lock();
        if let Some(live) = live {
            if s.connection_id() != Some(live.id()) {
                debug!("🔄 Player sincronizado con el transporte en guild {}", guild_id);
                s.connection = Some(live);
            }
        }
        s.connection.clone()
    }

    /// Clasifica la presencia lógica contra la real y repara fantasmas y huérfanas
    pub async fn validate(&self, guild_id: GuildId) -> Validation {
        self.sync_player(guild_id).await;

        let actual = self.gateway.bot_voice_channel(guild_id).await;
        let logical_conn = self.store.get(guild_id).lock().connection.clone();
        let logical = match &logical_conn {
            Some(conn) => conn.channel_id().await,
            None => None,
        };

        match (actual, logical_conn.is_some(), logical) {
            (None, true, _) => {
                warn!("👻 Conexión fantasma en guild {}, limpiando", guild_id);
                self.leave_voice_hard(guild_id).await;
                self.store.get(guild_id).lock().take_connection();
                Validation::GhostCleared
            }
            (Some(_), false, _) => {
                let adopted = self.sync_player(guild_id).await.is_some();
                info!("🔄 Estado resincronizado en guild {} (adoptado={})", guild_id, adopted);
                Validation::Resynced { adopted }
            }
            (Some(actual), true, Some(logical)) if actual != logical => {
                warn!(
                    "🔀 Canal lógico {} distinto del real {} en guild {}",
                    logical, actual, guild_id
                );
                Validation::Mismatch { logical, actual }
            }
            (actual, _, _) => Validation::Consistent {
                connected: actual.is_some(),
            },
        }
    }

    /// Asegura una conexión usable a `channel_id`
    pub async fn ensure_connection(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        force_rejoin: bool,
    ) -> Result<Connection, TransportError> {
        let validation = self.validate(guild_id).await;
        debug!("🔎 Validación de voz en guild {}: {:?}", guild_id, validation);

        let state = self.store.get(guild_id);
        let logical = state.lock().connection.clone();

        if !force_rejoin {
            // Already in the channel for real but the state lost track of it:
            // adopt the live player instead of rejoining.
            if logical.is_none()
                && self.gateway.bot_voice_channel(guild_id).await == Some(channel_id)
            {
                if let Some(live) = self.transport.live_connection(guild_id).await {
                    info!("🔗 Adoptando conexión existente en guild {}", guild_id);
                    {
                        let mut s = state.lock();
                        s.connection = Some(live.clone());
                        s.last_voice_channel_id = Some(channel_id);
                        s.cancel_idle();
                    }
                    self.bind_events(guild_id, &live).await;
                    return Ok(live);
                }
            }

            if let Some(conn) = &logical {
                if conn.channel_id().await == Some(channel_id) {
                    {
                        let mut s = state.lock();
                        s.cancel_idle();
                        s.last_voice_channel_id = Some(channel_id);
                    }
                    self.bind_events(guild_id, conn).await;
                    return Ok(conn.clone());
                }
            }
        }

        // Different channel, forced rejoin, or nothing usable.
        let existing = state.lock().take_connection();
        if let Some(conn) = existing {
            if let Err(e) = conn.leave().await {
                debug!("Error al abandonar conexión previa: {}", e);
            }
            tokio::time::sleep(self.timings.settle_delay).await;
        } else if let Some(ghost) = self.transport.live_connection(guild_id).await {
            if let Err(e) = ghost.leave().await {
                debug!("Error al abandonar conexión fantasma: {}", e);
            }
            tokio::time::sleep(self.timings.settle_delay).await;
        }

        let conn = match self.transport.join(guild_id, channel_id).await {
            Ok(conn) => conn,
            Err(TransportError::AlreadyConnected) => {
                warn!(
                    "⚠️ Conexión existente en guild {}, forzando salida y reintentando",
                    guild_id
                );
                if let Some(stale) = self.transport.live_connection(guild_id).await {
                    let _ = stale.leave().await;
                }
                tokio::time::sleep(self.timings.retry_delay).await;
                self.transport.join(guild_id, channel_id).await?
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = conn.set_self_mute(false).await {
            debug!("No se pudo quitar el mute propio: {}", e);
        }

        {
            let mut s = state.lock();
            s.connection = Some(conn.clone());
            s.last_voice_channel_id = Some(channel_id);
            s.cancel_idle();
        }
        self.bind_events(guild_id, &conn).await;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(conn)
    }

    /// Sale de voz por el transporte, o por la conexión si aquel falla
    pub async fn leave_voice_hard(&self, guild_id: GuildId) {
        if let Err(e) = self.transport.leave(guild_id).await {
            debug!("Salida por transporte falló en guild {}: {}", guild_id, e);
            let conn = self.store.get(guild_id).lock().connection.clone();
            if let Some(conn) = conn {
                if let Err(e) = conn.leave().await {
                    debug!("Salida directa falló en guild {}: {}", guild_id, e);
                }
            }
        }
    }

    /// Enlaza los eventos de `conn` una vez por conexión
    pub async fn bind_events(&self, guild_id: GuildId, conn: &Connection) {
        let state = self.store.get(guild_id);
        {
            let mut s = state.lock();
            if s.is_bound_to(conn.id()) {
                return;
            }
            s.reserve_binding(conn.id());
        }

        let subscription = conn.subscribe(guild_id, self.events.clone()).await;
        if state.lock().attach_subscription(subscription) {
            debug!("🎧 Eventos del player vinculados en guild {}", guild_id);
        }
    }
}
