//! In-memory stand-ins for Discord and the voice node, shared by the audio
//! tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use super::{
    connection::{ConnectionManager, ConnectionTimings},
    error::TransportError,
    events::{
        self, ConnectionId, EventReceiver, EventSender, PlayerEvent, PlayerEventKind, Subscription,
    },
    player::{PlaybackService, PlaybackSettings},
    queue::Track,
    reactor::EventReactor,
    state::{StateStore, Transition},
    transport::{
        Connection, Gateway, LoadResult, Notifier, TrackResolver, VoiceConnection, VoiceTransport,
    },
};

pub fn guild() -> GuildId {
    GuildId::new(1)
}

pub fn channel(id: u64) -> ChannelId {
    ChannelId::new(id)
}

pub fn user(id: u64) -> UserId {
    UserId::new(id)
}

pub fn track(title: &str) -> Track {
    Track::new(format!("https://example.com/watch/{}", title), title).with_author("Tester")
}

#[derive(Default)]
pub struct FakeGateway {
    bot: Mutex<HashMap<GuildId, ChannelId>>,
    members: Mutex<HashMap<(GuildId, UserId), ChannelId>>,
    humans: Mutex<HashMap<ChannelId, usize>>,
}

impl FakeGateway {
    pub fn set_bot_channel(&self, guild_id: GuildId, channel_id: Option<ChannelId>) {
        let mut bot = self.bot.lock();
        match channel_id {
            Some(channel_id) => bot.insert(guild_id, channel_id),
            None => bot.remove(&guild_id),
        };
    }

    pub fn bot_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.bot.lock().get(&guild_id).copied()
    }

    pub fn set_member_channel(&self, guild_id: GuildId, user_id: UserId, channel_id: Option<ChannelId>) {
        let mut members = self.members.lock();
        match channel_id {
            Some(channel_id) => members.insert((guild_id, user_id), channel_id),
            None => members.remove(&(guild_id, user_id)),
        };
    }

    pub fn set_humans(&self, channel_id: ChannelId, count: usize) {
        self.humans.lock().insert(channel_id, count);
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn bot_voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.bot_channel(guild_id)
    }

    async fn member_voice_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.members.lock().get(&(guild_id, user_id)).copied()
    }

    async fn humans_in_channel(&self, _guild_id: GuildId, channel_id: ChannelId) -> usize {
        self.humans.lock().get(&channel_id).copied().unwrap_or(0)
    }
}

pub struct FakeConnection {
    id: ConnectionId,
    guild_id: GuildId,
    gateway: Arc<FakeGateway>,
    channel: Mutex<Option<ChannelId>>,
    plays: Mutex<Vec<String>>,
    stops: AtomicUsize,
    muted: Mutex<Option<bool>>,
    left: AtomicBool,
    fail_plays: AtomicBool,
    subscribers: Arc<AtomicUsize>,
    sink: Mutex<Option<EventSender>>,
}

impl FakeConnection {
    fn new(guild_id: GuildId, channel_id: ChannelId, gateway: Arc<FakeGateway>) -> Self {
        Self {
            id: ConnectionId::next(),
            guild_id,
            gateway,
            channel: Mutex::new(Some(channel_id)),
            plays: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            muted: Mutex::new(None),
            left: AtomicBool::new(false),
            fail_plays: AtomicBool::new(false),
            subscribers: Arc::new(AtomicUsize::new(0)),
            sink: Mutex::new(None),
        }
    }

    pub fn plays(&self) -> Vec<String> {
        self.plays.lock().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn muted(&self) -> Option<bool> {
        *self.muted.lock()
    }

    pub fn has_left(&self) -> bool {
        self.left.load(Ordering::SeqCst)
    }

    pub fn channel(&self) -> Option<ChannelId> {
        *self.channel.lock()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    pub fn fail_plays(&self, fail: bool) {
        self.fail_plays.store(fail, Ordering::SeqCst);
    }

    /// Emite un evento para la última pista reproducida, como lo haría el transporte
    pub fn emit(&self, kind: PlayerEventKind) -> bool {
        if self.active_subscriptions() == 0 {
            return false;
        }
        let sink = self.sink.lock().clone();
        let Some(sink) = sink else {
            return false;
        };
        sink.send(events::ReactorEvent::Player(PlayerEvent {
            guild_id: self.guild_id,
            connection: self.id,
            track: self.plays.lock().last().cloned(),
            kind,
        }))
        .is_ok()
    }

    fn mark_left(&self) {
        self.left.store(true, Ordering::SeqCst);
        *self.channel.lock() = None;
    }

    fn record_play(&self, encoded: &str) {
        self.plays.lock().push(encoded.to_string());
    }

    fn subscription(&self, events: EventSender) -> Subscription {
        self.subscribers.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(events);
        let subscribers = Arc::clone(&self.subscribers);
        Subscription::new(self.id, move || {
            subscribers.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn channel_id(&self) -> Option<ChannelId> {
        self.channel()
    }

    async fn play(&self, encoded: &str) -> Result<(), TransportError> {
        if self.fail_plays.load(Ordering::SeqCst) {
            return Err(TransportError::Playback("decoder exploded".into()));
        }
        self.record_play(encoded);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.emit(PlayerEventKind::End);
        Ok(())
    }

    async fn set_self_mute(&self, muted: bool) -> Result<(), TransportError> {
        *self.muted.lock() = Some(muted);
        Ok(())
    }

    async fn leave(&self) -> Result<(), TransportError> {
        self.mark_left();
        self.gateway.set_bot_channel(self.guild_id, None);
        Ok(())
    }

    async fn subscribe(&self, _guild_id: GuildId, events: EventSender) -> Subscription {
        self.subscription(events)
    }
}

pub struct FakeTransport {
    gateway: Arc<FakeGateway>,
    live: Mutex<HashMap<GuildId, Arc<FakeConnection>>>,
    created: Mutex<Vec<Arc<FakeConnection>>>,
    joins: Mutex<Vec<(GuildId, ChannelId)>>,
    attempts: AtomicUsize,
    join_failures: Mutex<VecDeque<TransportError>>,
    fail_leaves: AtomicBool,
}

impl FakeTransport {
    pub fn new(gateway: Arc<FakeGateway>) -> Self {
        Self {
            gateway,
            live: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            joins: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            join_failures: Mutex::new(VecDeque::new()),
            fail_leaves: AtomicBool::new(false),
        }
    }

    /// Uniones exitosas, en orden
    pub fn joins(&self) -> Vec<(GuildId, ChannelId)> {
        self.joins.lock().clone()
    }

    pub fn join_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<FakeConnection>> {
        self.created.lock().iter().find(|c| c.id == id).cloned()
    }

    /// Registra una sesión viva sin pasar por `join`
    pub fn install_live(&self, guild_id: GuildId, channel_id: ChannelId) -> Arc<FakeConnection> {
        let conn = Arc::new(FakeConnection::new(guild_id, channel_id, self.gateway.clone()));
        self.created.lock().push(conn.clone());
        self.live.lock().insert(guild_id, conn.clone());
        conn
    }

    pub fn forget_live(&self, guild_id: GuildId) {
        self.live.lock().remove(&guild_id);
    }

    pub fn fail_next_join(&self, error: TransportError) {
        self.join_failures.lock().push_back(error);
    }

    pub fn fail_leaves(&self, fail: bool) {
        self.fail_leaves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Connection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.join_failures.lock().pop_front() {
            return Err(error);
        }
        let conn = self.install_live(guild_id, channel_id);
        self.joins.lock().push((guild_id, channel_id));
        self.gateway.set_bot_channel(guild_id, Some(channel_id));
        Ok(conn)
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), TransportError> {
        if self.fail_leaves.load(Ordering::SeqCst) {
            return Err(TransportError::Leave("gateway unavailable".into()));
        }
        let conn = self.live.lock().remove(&guild_id);
        match conn {
            Some(conn) => {
                conn.mark_left();
                self.gateway.set_bot_channel(guild_id, None);
                Ok(())
            }
            None => Err(TransportError::NotConnected),
        }
    }

    async fn live_connection(&self, guild_id: GuildId) -> Option<Connection> {
        let conn = self.live.lock().get(&guild_id).cloned()?;
        if conn.channel().is_none() {
            return None;
        }
        Some(conn)
    }
}

#[derive(Default)]
pub struct FakeResolver {
    results: Mutex<HashMap<String, LoadResult>>,
}

impl FakeResolver {
    pub fn set(&self, identifier: &str, result: LoadResult) {
        self.results.lock().insert(identifier.to_string(), result);
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, identifier: &str) -> Result<LoadResult, TransportError> {
        Ok(self
            .results
            .lock()
            .get(identifier)
            .cloned()
            .unwrap_or_else(LoadResult::empty))
    }
}

/// Guarda cada aviso en vez de publicarlo
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(ChannelId, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_to_channel(&self, _guild_id: GuildId, channel_id: ChannelId, content: &str) -> bool {
        self.sent.lock().push((channel_id, content.to_string()));
        true
    }
}

/// Núcleo completo armado sobre los dobles
pub struct Harness {
    pub store: Arc<StateStore>,
    pub gateway: Arc<FakeGateway>,
    pub transport: Arc<FakeTransport>,
    pub notifier: Arc<RecordingNotifier>,
    pub resolver: Arc<FakeResolver>,
    pub connections: Arc<ConnectionManager>,
    pub playback: Arc<PlaybackService>,
    pub reactor: EventReactor,
    events: Mutex<EventReceiver>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(PlaybackSettings::default(), None)
    }

    pub fn with_max_queue(max_queue: usize) -> Self {
        Self::build(
            PlaybackSettings {
                max_queue,
                ..PlaybackSettings::default()
            },
            None,
        )
    }

    pub fn with_resolver(resolver: Arc<dyn TrackResolver>) -> Self {
        Self::build(PlaybackSettings::default(), Some(resolver))
    }

    /// Conectado al canal 10 sin reproducir nada
    pub fn connected() -> Self {
        let h = Self::new();
        h.attach(channel(10));
        h
    }

    /// Conectado al canal 10, reproduciendo el primer título y el resto en cola
    pub fn playing(titles: &[&str]) -> Self {
        let h = Self::connected();
        let conn = h.current_connection();
        let state = h.store.get(guild());
        let mut s = state.lock();
        if let Some((first, rest)) = titles.split_first() {
            let first = track(first);
            if let (Some(conn), Some(encoded)) = (&conn, first.encoded()) {
                conn.record_play(encoded);
            }
            s.transition(Transition::Start(first));
            for title in rest {
                let _ = s.queue.push_back(track(title));
            }
        }
        drop(s);
        h
    }

    fn build(settings: PlaybackSettings, resolver: Option<Arc<dyn TrackResolver>>) -> Self {
        let (tx, rx) = events::channel();
        let store = Arc::new(StateStore::new(settings.max_queue));
        let gateway = Arc::new(FakeGateway::default());
        let transport = Arc::new(FakeTransport::new(gateway.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let fake_resolver = Arc::new(FakeResolver::default());
        let resolver: Arc<dyn TrackResolver> = match resolver {
            Some(resolver) => resolver,
            None => fake_resolver.clone(),
        };

        let connections = Arc::new(ConnectionManager::new(
            store.clone(),
            transport.clone(),
            gateway.clone(),
            tx.clone(),
            ConnectionTimings::default(),
        ));
        let playback = Arc::new(PlaybackService::new(
            store.clone(),
            connections.clone(),
            resolver,
            gateway.clone(),
            notifier.clone(),
            settings,
        ));
        let reactor = EventReactor::new(playback.clone(), gateway.clone(), notifier.clone(), tx);

        Self {
            store,
            gateway,
            transport,
            notifier,
            resolver: fake_resolver,
            connections,
            playback,
            reactor,
            events: Mutex::new(rx),
        }
    }

    /// Instala una conexión viva ya enlazada sin esperar nada
    fn attach(&self, channel_id: ChannelId) {
        let conn = self.transport.install_live(guild(), channel_id);
        self.gateway.set_bot_channel(guild(), Some(channel_id));
        let subscription = conn.subscription(self.reactor_sender());

        let state = self.store.get(guild());
        let mut s = state.lock();
        s.connection = Some(conn.clone());
        s.last_voice_channel_id = Some(channel_id);
        s.reserve_binding(conn.id);
        s.attach_subscription(subscription);
    }

    fn reactor_sender(&self) -> EventSender {
        self.reactor.sender()
    }

    pub fn current_connection(&self) -> Option<Arc<FakeConnection>> {
        let id = self.store.get(guild()).lock().connection_id()?;
        self.transport.connection(id)
    }

    pub fn queued_titles(&self) -> Vec<String> {
        let state = self.store.get(guild());
        let s = state.lock();
        s.queue.iter().map(|t| t.display_title().to_string()).collect()
    }

    pub fn current_title(&self) -> Option<String> {
        let state = self.store.get(guild());
        let s = state.lock();
        s.current().map(|t| t.display_title().to_string())
    }

    /// Entrega al reactor todos los eventos pendientes y devuelve cuántos corrió
    pub async fn pump(&self) -> usize {
        let mut handled = 0;
        loop {
            let next = self.events.lock().try_recv();
            match next {
                Ok(event) => {
                    self.reactor.dispatch(event).await;
                    handled += 1;
                }
                Err(_) => return handled,
            }
        }
    }
}
