//! Per-guild serialization of mutating commands.
//!
//! Every guild owns a FIFO gate (`tokio::sync::Mutex` is fair). A task runs
//! once everything queued before it has settled, whatever the outcome of those
//! tasks was. Different guilds never wait on each other.

use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    /// Venció el límite; la tarea sigue corriendo y sus efectos pueden llegar después
    #[error("guild task timed out after {0:?}")]
    TimedOut(Duration),

    #[error("guild task panicked")]
    Panicked,
}

#[derive(Default)]
struct Tail {
    gate: tokio::sync::Mutex<()>,
    pending: AtomicUsize,
}

#[derive(Default)]
pub struct GuildLocks {
    tails: DashMap<GuildId, Arc<Tail>>,
}

/// Registro de un llamador en la cadena de la guild; al soltarse limpia la cadena vacía
struct Ticket<'a> {
    locks: &'a GuildLocks,
    guild_id: GuildId,
    tail: Arc<Tail>,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.tail.pending.fetch_sub(1, Ordering::SeqCst);
        self.locks.tails.remove_if(&self.guild_id, |_, tail| {
            Arc::ptr_eq(tail, &self.tail) && tail.pending.load(Ordering::SeqCst) == 0
        });
    }
}

impl GuildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self, guild_id: GuildId) -> Ticket<'_> {
        let entry = self.tails.entry(guild_id).or_default();
        entry.pending.fetch_add(1, Ordering::SeqCst);
        let tail = Arc::clone(entry.value());
        drop(entry);
        Ticket {
            locks: self,
            guild_id,
            tail,
        }
    }

    /// Ejecuta `task` cuando terminó todo lo encolado antes para la guild
    pub async fn run_exclusive<F, T>(
        &self,
        guild_id: GuildId,
        timeout: Option<Duration>,
        task: F,
    ) -> Result<T, LockError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let ticket = self.enter(guild_id);
        let _turn = ticket.tail.gate.lock().await;

        let handle = tokio::spawn(task);
        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("⏳ [lock-timeout] guild {} tras {:?}", guild_id, limit);
                    return Err(LockError::TimedOut(limit));
                }
            },
            None => handle.await,
        };

        joined.map_err(|e| {
            error!("💥 Tarea de guild {} falló: {:?}", guild_id, e);
            LockError::Panicked
        })
    }

    pub fn is_locked(&self, guild_id: GuildId) -> bool {
        self.tails
            .get(&guild_id)
            .is_some_and(|tail| tail.pending.load(Ordering::SeqCst) > 0)
    }

    /// Espera a que termine todo lo encolado hasta ahora
    pub async fn wait_for_idle(&self, guild_id: GuildId) {
        let tail = self.tails.get(&guild_id).map(|t| Arc::clone(t.value()));
        if let Some(tail) = tail {
            drop(tail.gate.lock().await);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn guild(id: u64) -> GuildId {
        GuildId::new(id)
    }

    #[tokio::test]
    async fn tasks_run_in_submission_order_without_overlap() {
        let locks = Arc::new(GuildLocks::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let locks = locks.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                locks
                    .run_exclusive(guild(1), None, async move {
                        log.lock().push(format!("start {}", i));
                        tokio::time::sleep(Duration::from_millis(5 * (5 - i))).await;
                        log.lock().push(format!("end {}", i));
                    })
                    .await
            }));
            // Make submission order deterministic.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start {}", i), format!("end {}", i)])
            .collect();
        assert_eq!(*log.lock(), expected);
        assert!(!locks.is_locked(guild(1)));
    }

    #[tokio::test]
    async fn a_panicking_task_does_not_poison_the_chain() {
        let locks = GuildLocks::new();

        let failed = locks
            .run_exclusive(guild(1), None, async {
                if true {
                    panic!("boom");
                }
            })
            .await;
        assert_eq!(failed.unwrap_err(), LockError::Panicked);

        let value = locks.run_exclusive(guild(1), None, async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn an_erroring_task_does_not_block_the_next() {
        let locks = GuildLocks::new();
        let first: Result<Result<(), &str>, _> =
            locks.run_exclusive(guild(1), None, async { Err("nope") }).await;
        assert_eq!(first, Ok(Err("nope")));
        let second = locks.run_exclusive(guild(1), None, async { "ok" }).await;
        assert_eq!(second, Ok("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_releases_the_chain_but_task_keeps_running() {
        let locks = Arc::new(GuildLocks::new());
        let landed = Arc::new(Mutex::new(false));

        let flag = landed.clone();
        let result = locks
            .run_exclusive(guild(1), Some(Duration::from_secs(1)), async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                *flag.lock() = true;
            })
            .await;
        assert_eq!(result, Err(LockError::TimedOut(Duration::from_secs(1))));

        let next = locks.run_exclusive(guild(1), None, async { 1 }).await;
        assert_eq!(next, Ok(1));
        assert!(!*landed.lock());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(*landed.lock());
    }

    #[tokio::test]
    async fn guilds_are_independent() {
        let locks = Arc::new(GuildLocks::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let blocked = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .run_exclusive(guild(1), None, async move {
                        let _ = release_rx.await;
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(locks.is_locked(guild(1)));

        let other = locks.run_exclusive(guild(2), None, async { "free" }).await;
        assert_eq!(other, Ok("free"));
        assert!(!locks.is_locked(guild(2)));

        release_tx.send(()).unwrap();
        blocked.await.unwrap().unwrap();
        assert!(!locks.is_locked(guild(1)));
    }

    #[tokio::test]
    async fn wait_for_idle_waits_for_the_current_tail() {
        let locks = Arc::new(GuildLocks::new());
        let done = Arc::new(Mutex::new(false));

        let worker = {
            let locks = locks.clone();
            let done = done.clone();
            tokio::spawn(async move {
                locks
                    .run_exclusive(guild(1), None, async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        *done.lock() = true;
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        locks.wait_for_idle(guild(1)).await;
        assert!(*done.lock());
        worker.await.unwrap().unwrap();

        // Nothing queued: resolves immediately.
        locks.wait_for_idle(guild(3)).await;
    }
}
