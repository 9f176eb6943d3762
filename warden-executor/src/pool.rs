//! Per-language pools of warm interpreter workers.
//!
//! Each pool pre-warms `min_size` children, caps itself at
//! `max_processes`, binds workers to execution sessions (affinity), and
//! reclaims idle workers above the minimum. All pool bookkeeping is
//! serialized under one lock per manager; the lock is never held across
//! the ready handshake or an execution.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinSet;

use warden_core::{Language, WorkerId};

use crate::backend::ExecutorBackend;
use crate::protocol::ExecutionResult;
use crate::worker::InterpreterWorker;
use crate::ExecutorError;

/// Fallback polling interval while waiting for a worker to free up.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Deadline for the optional pre-warm script.
const PRE_WARM_SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of one language pool.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Workers kept warm and available.
    pub min_size: usize,
    /// Hard cap on live workers.
    pub max_processes: usize,
    /// Idle age beyond which a surplus worker is reclaimed.
    pub idle_timeout: Duration,
    /// Deadline for the ready handshake of a fresh child.
    pub ready_timeout: Duration,
    /// Code executed once in every pre-warmed worker, best-effort.
    pub pre_warm_script: Option<String>,
}

impl PoolConfig {
    /// Built-in defaults per language.
    #[must_use]
    pub fn defaults_for(language: Language) -> Self {
        let min_size = match language {
            Language::Python => 2,
            Language::JavaScript | Language::TypeScript => 1,
        };
        Self {
            min_size,
            max_processes: 10,
            idle_timeout: Duration::from_secs(300),
            ready_timeout: Duration::from_secs(5),
            pre_warm_script: None,
        }
    }

    /// Defaults with `<LANG>_POOL_MIN_SIZE` / `<LANG>_POOL_MAX_SIZE`
    /// environment overrides applied.
    #[must_use]
    pub fn from_env(language: Language) -> Self {
        let mut config = Self::defaults_for(language);
        let read = |suffix: &str| {
            std::env::var(format!("{}_POOL_{suffix}", language.env_prefix()))
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
        };
        if let Some(min) = read("MIN_SIZE") {
            config.min_size = min;
        }
        if let Some(max) = read("MAX_SIZE") {
            config.max_processes = max.max(1);
        }
        config
    }
}

/// Live counters for one pool, for status endpoints and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub spawning: usize,
}

struct WorkerSlot {
    handle: Arc<tokio::sync::Mutex<InterpreterWorker>>,
    affinity: Option<String>,
    available: bool,
    last_used: Instant,
}

struct LanguagePool {
    config: PoolConfig,
    slots: HashMap<WorkerId, WorkerSlot>,
    /// Available worker ids in release order.
    available: VecDeque<WorkerId>,
    /// Session id to the worker currently bound to it.
    by_affinity: HashMap<String, WorkerId>,
    /// Spawns in flight, counted against `max_processes`.
    spawning: usize,
}

impl LanguagePool {
    fn new(config: PoolConfig) -> Self {
        Self {
            config,
            slots: HashMap::new(),
            available: VecDeque::new(),
            by_affinity: HashMap::new(),
            spawning: 0,
        }
    }

    fn available_count(&self) -> usize {
        self.available.len()
    }

    fn remove_slot(&mut self, id: WorkerId) -> Option<WorkerSlot> {
        self.available.retain(|&w| w != id);
        let slot = self.slots.remove(&id)?;
        if let Some(session) = &slot.affinity {
            if self.by_affinity.get(session) == Some(&id) {
                self.by_affinity.remove(session);
            }
        }
        Some(slot)
    }
}

/// What the lease does with its worker when dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaseFate {
    Release,
    Evict,
}

/// Manages one pool per language over a spawning backend.
pub struct PoolManager<B: ExecutorBackend> {
    backend: B,
    pools: std::sync::Mutex<HashMap<Language, LanguagePool>>,
    notifies: HashMap<Language, Arc<Notify>>,
    next_worker: AtomicU64,
    shut_down: AtomicBool,
    reclaimer: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<B: ExecutorBackend> PoolManager<B> {
    /// Creates the manager and starts the idle-reclamation task.
    ///
    /// The reclamation interval is half the shortest configured idle
    /// timeout.
    #[must_use]
    pub fn new(backend: B, configs: HashMap<Language, PoolConfig>) -> Arc<Self> {
        let interval = configs
            .values()
            .map(|c| c.idle_timeout / 2)
            .min()
            .unwrap_or(Duration::from_secs(150));
        let mut pools = HashMap::new();
        let mut notifies = HashMap::new();
        for language in Language::ALL {
            let config = configs
                .get(&language)
                .cloned()
                .unwrap_or_else(|| PoolConfig::defaults_for(language));
            pools.insert(language, LanguagePool::new(config));
            notifies.insert(language, Arc::new(Notify::new()));
        }
        let manager = Arc::new(Self {
            backend,
            pools: std::sync::Mutex::new(pools),
            notifies,
            next_worker: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
            reclaimer: std::sync::Mutex::new(None),
        });
        let weak = Arc::downgrade(&manager);
        let handle = tokio::spawn(Self::reclaim_loop(weak, interval));
        *lock_sync(&manager.reclaimer) = Some(handle);
        manager
    }

    /// Creates the manager with per-language environment overrides.
    #[must_use]
    pub fn with_env_config(backend: B) -> Arc<Self> {
        let configs =
            Language::ALL.iter().map(|&l| (l, PoolConfig::from_env(l))).collect();
        Self::new(backend, configs)
    }

    /// Spawns `min_size` workers per language in parallel.
    ///
    /// Pre-warm failures are logged and skipped; the control plane still
    /// starts with whatever capacity came up.
    pub async fn pre_warm(self: &Arc<Self>) {
        let mut tasks = JoinSet::new();
        for language in Language::ALL {
            let min = {
                let pools = lock_sync(&self.pools);
                pools.get(&language).map_or(0, |p| p.config.min_size)
            };
            for _ in 0..min {
                let manager = Arc::clone(self);
                tasks.spawn(async move {
                    manager.spawn_into_pool(language).await;
                });
            }
        }
        while tasks.join_next().await.is_some() {}
        tracing::info!("interpreter pools pre-warmed");
    }

    /// Acquires a worker for `language`, preferring the worker bound to
    /// `session`, then any unbound available worker, then a fresh spawn
    /// below the cap, then waiting for a release.
    ///
    /// The returned lease releases the worker on drop.
    ///
    /// # Errors
    /// Returns [`ExecutorError::SpawnFailed`] / [`ExecutorError::ReadyTimeout`]
    /// when a needed spawn fails, and [`ExecutorError::ShutDown`] after
    /// [`PoolManager::shutdown`].
    pub async fn acquire(
        self: &Arc<Self>,
        language: Language,
        session: Option<&str>,
    ) -> Result<WorkerLease<B>, ExecutorError> {
        enum Plan {
            Take(WorkerId, Arc<tokio::sync::Mutex<InterpreterWorker>>),
            Spawn,
            Wait,
        }
        loop {
            if self.shut_down.load(Ordering::SeqCst) {
                return Err(ExecutorError::ShutDown);
            }
            let plan = {
                let mut pools = lock_sync(&self.pools);
                let pool = pools.get_mut(&language).ok_or(ExecutorError::ShutDown)?;
                let mut plan = None;
                if let Some(session) = session {
                    if let Some(&id) = pool.by_affinity.get(session) {
                        if pool.slots.get(&id).is_some_and(|s| s.available) {
                            plan = Some(take_slot(pool, id, None));
                        }
                    }
                }
                if plan.is_none() {
                    let unbound = pool
                        .available
                        .iter()
                        .copied()
                        .find(|id| pool.slots.get(id).is_some_and(|s| s.affinity.is_none()));
                    if let Some(id) = unbound {
                        plan = Some(take_slot(pool, id, session));
                    }
                }
                match plan {
                    Some((id, handle)) => Plan::Take(id, handle),
                    None => {
                        if pool.slots.len() + pool.spawning < pool.config.max_processes {
                            pool.spawning += 1;
                            Plan::Spawn
                        } else {
                            Plan::Wait
                        }
                    }
                }
            };
            match plan {
                Plan::Take(id, handle) => {
                    // A worker that died while idle is dropped silently and
                    // the scan restarts.
                    let exited = handle.try_lock().map(|mut w| w.has_exited()).unwrap_or(false);
                    if exited {
                        tracing::debug!(%language, worker = %id, "dropping exited idle worker");
                        self.discard_slot(language, id);
                        continue;
                    }
                    return Ok(WorkerLease {
                        pool: Arc::clone(self),
                        language,
                        id,
                        handle,
                        session_provided: session.is_some(),
                        fate: LeaseFate::Release,
                    });
                }
                Plan::Spawn => {
                    let spawned = self.spawn_worker(language).await;
                    let mut pools = lock_sync(&self.pools);
                    let Some(pool) = pools.get_mut(&language) else {
                        return Err(ExecutorError::ShutDown);
                    };
                    pool.spawning -= 1;
                    match spawned {
                        Ok(worker) => {
                            let id = worker.id;
                            let handle = Arc::new(tokio::sync::Mutex::new(worker));
                            pool.slots.insert(
                                id,
                                WorkerSlot {
                                    handle: Arc::clone(&handle),
                                    affinity: session.map(str::to_owned),
                                    available: false,
                                    last_used: Instant::now(),
                                },
                            );
                            if let Some(session) = session {
                                pool.by_affinity.insert(session.to_owned(), id);
                            }
                            return Ok(WorkerLease {
                                pool: Arc::clone(self),
                                language,
                                id,
                                handle,
                                session_provided: session.is_some(),
                                fate: LeaseFate::Release,
                            });
                        }
                        Err(e) => {
                            drop(pools);
                            // The reserved capacity is free again.
                            self.notify(language);
                            return Err(e);
                        }
                    }
                }
                Plan::Wait => {
                    let notified = self.notifies[&language].notified();
                    // Bounded poll so a lost wakeup cannot strand a caller.
                    let _ = tokio::time::timeout(ACQUIRE_POLL_INTERVAL, notified).await;
                }
            }
        }
    }

    /// Acquire, execute once, release. Timeout `None` means unlimited.
    ///
    /// # Errors
    /// Propagates acquisition and execution failures; timed-out and
    /// protocol-violating workers are evicted before this returns.
    pub async fn execute_code(
        self: &Arc<Self>,
        language: Language,
        session: Option<&str>,
        code: &str,
        execution_id: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecutorError> {
        let mut lease = self.acquire(language, session).await?;
        lease.execute(code, execution_id, timeout).await
    }

    /// Counters for one language pool.
    #[must_use]
    pub fn stats(&self, language: Language) -> PoolStats {
        let pools = lock_sync(&self.pools);
        pools.get(&language).map_or(
            PoolStats { total: 0, available: 0, spawning: 0 },
            |pool| PoolStats {
                total: pool.slots.len(),
                available: pool.available_count(),
                spawning: pool.spawning,
            },
        )
    }

    /// Terminates every worker and refuses further acquisitions.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        if let Some(handle) = lock_sync(&self.reclaimer).take() {
            handle.abort();
        }
        let handles: Vec<_> = {
            let mut pools = lock_sync(&self.pools);
            pools
                .values_mut()
                .flat_map(|pool| {
                    pool.available.clear();
                    pool.by_affinity.clear();
                    pool.slots.drain().map(|(_, slot)| slot.handle).collect::<Vec<_>>()
                })
                .collect()
        };
        for handle in handles {
            if let Ok(mut worker) = handle.try_lock() {
                worker.start_kill();
            }
        }
        for notify in self.notifies.values() {
            notify.notify_waiters();
        }
        tracing::info!("interpreter pools shut down");
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn notify(&self, language: Language) {
        if let Some(notify) = self.notifies.get(&language) {
            notify.notify_waiters();
        }
    }

    async fn spawn_worker(&self, language: Language) -> Result<InterpreterWorker, ExecutorError> {
        let ready_timeout = {
            let pools = lock_sync(&self.pools);
            pools.get(&language).map_or(Duration::from_secs(5), |p| p.config.ready_timeout)
        };
        let id = WorkerId::new(self.next_worker.fetch_add(1, Ordering::Relaxed));
        let child = self.backend.spawn(language).await?;
        let mut worker = InterpreterWorker::from_child(id, language, child)?;
        if let Err(e) = worker.wait_ready(ready_timeout).await {
            worker.terminate().await;
            return Err(e);
        }
        tracing::debug!(%language, worker = %id, "executor ready");
        Ok(worker)
    }

    /// Spawns one worker and parks it in the available queue, running the
    /// pre-warm script first if configured. Used by pre-warm and respawn.
    async fn spawn_into_pool(self: &Arc<Self>, language: Language) {
        let script = {
            let pools = lock_sync(&self.pools);
            pools.get(&language).and_then(|p| p.config.pre_warm_script.clone())
        };
        let mut worker = match self.spawn_worker(language).await {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(%language, "pre-warm spawn failed: {e}");
                return;
            }
        };
        if let Some(script) = script {
            let execution_id = format!("prewarm-{}", worker.id.0);
            match worker.execute(&script, &execution_id, Some(PRE_WARM_SCRIPT_TIMEOUT)).await {
                Ok((result, false)) if result.success => {}
                Ok((_, _)) => {
                    tracing::warn!(%language, worker = %worker.id, "pre-warm script failed");
                }
                Err(e) => {
                    tracing::warn!(%language, worker = %worker.id, "pre-warm script error: {e}");
                    worker.terminate().await;
                    return;
                }
            }
        }
        let id = worker.id;
        let mut pools = lock_sync(&self.pools);
        let Some(pool) = pools.get_mut(&language) else { return };
        if self.shut_down.load(Ordering::SeqCst)
            || pool.slots.len() + pool.spawning >= pool.config.max_processes
        {
            drop(pools);
            worker.start_kill();
            return;
        }
        pool.slots.insert(
            id,
            WorkerSlot {
                handle: Arc::new(tokio::sync::Mutex::new(worker)),
                affinity: None,
                available: true,
                last_used: Instant::now(),
            },
        );
        pool.available.push_back(id);
        drop(pools);
        self.notify(language);
    }

    /// Returns a leased worker to the available queue.
    fn release_slot(&self, language: Language, id: WorkerId, session_provided: bool) {
        let mut pools = lock_sync(&self.pools);
        let Some(pool) = pools.get_mut(&language) else { return };
        let Some(slot) = pool.slots.get_mut(&id) else { return };
        slot.available = true;
        slot.last_used = Instant::now();
        if session_provided {
            // A later bind may have moved the session to another worker;
            // a stale binding returns this worker to the common pool.
            let stale = slot
                .affinity
                .as_ref()
                .is_some_and(|s| pool.by_affinity.get(s) != Some(&id));
            if stale {
                slot.affinity = None;
            }
        } else if let Some(session) = slot.affinity.take() {
            if pool.by_affinity.get(&session) == Some(&id) {
                pool.by_affinity.remove(&session);
            }
        }
        pool.available.push_back(id);
        drop(pools);
        self.notify(language);
    }

    /// Removes a worker that must not be reused and kills its child.
    fn discard_slot(&self, language: Language, id: WorkerId) {
        let slot = {
            let mut pools = lock_sync(&self.pools);
            pools.get_mut(&language).and_then(|pool| pool.remove_slot(id))
        };
        if let Some(slot) = slot {
            if let Ok(mut worker) = slot.handle.try_lock() {
                worker.start_kill();
            }
        }
        self.notify(language);
    }

    /// Eviction after a failed execution: discard, then restore the
    /// minimum asynchronously.
    fn evict_slot(self: &Arc<Self>, language: Language, id: WorkerId) {
        self.discard_slot(language, id);
        let below_min = {
            let pools = lock_sync(&self.pools);
            pools
                .get(&language)
                .is_some_and(|p| p.slots.len() + p.spawning < p.config.min_size)
        };
        if below_min {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let manager = Arc::clone(self);
                runtime.spawn(async move {
                    manager.spawn_into_pool(language).await;
                });
            }
        }
    }

    async fn reclaim_loop(manager: Weak<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            let Some(manager) = manager.upgrade() else { return };
            if manager.shut_down.load(Ordering::SeqCst) {
                return;
            }
            manager.reclaim_idle();
        }
    }

    /// One reclamation sweep: kill available workers idle past the
    /// timeout while more than `min_size` remain available.
    fn reclaim_idle(&self) {
        let mut victims = Vec::new();
        {
            let mut pools = lock_sync(&self.pools);
            for (&language, pool) in pools.iter_mut() {
                let idle_timeout = pool.config.idle_timeout;
                let min_size = pool.config.min_size;
                loop {
                    if pool.available_count() <= min_size {
                        break;
                    }
                    let candidate = pool.available.iter().copied().find(|id| {
                        pool.slots
                            .get(id)
                            .is_some_and(|s| s.last_used.elapsed() > idle_timeout)
                    });
                    let Some(id) = candidate else { break };
                    if let Some(slot) = pool.remove_slot(id) {
                        tracing::debug!(%language, worker = %id, "reclaiming idle worker");
                        victims.push(slot.handle);
                    }
                }
            }
        }
        for handle in victims {
            if let Ok(mut worker) = handle.try_lock() {
                worker.start_kill();
            }
        }
    }
}

/// Marks a slot taken and returns its id and handle. Caller holds the
/// pool lock and has verified availability.
fn take_slot(
    pool: &mut LanguagePool,
    id: WorkerId,
    bind_session: Option<&str>,
) -> (WorkerId, Arc<tokio::sync::Mutex<InterpreterWorker>>) {
    pool.available.retain(|&w| w != id);
    #[expect(clippy::expect_used, reason = "caller verified the slot exists")]
    let slot = pool.slots.get_mut(&id).expect("taken slot must exist");
    slot.available = false;
    slot.last_used = Instant::now();
    if let Some(session) = bind_session {
        slot.affinity = Some(session.to_owned());
        pool.by_affinity.insert(session.to_owned(), id);
    }
    (id, Arc::clone(&slot.handle))
}

#[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
fn lock_sync<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().expect("pool lock poisoned")
}

/// Scoped acquisition of one worker.
///
/// Dropping the lease returns the worker to its pool, or kills it when an
/// execution left it suspect.
pub struct WorkerLease<B: ExecutorBackend> {
    pool: Arc<PoolManager<B>>,
    language: Language,
    id: WorkerId,
    handle: Arc<tokio::sync::Mutex<InterpreterWorker>>,
    session_provided: bool,
    fate: LeaseFate,
}

impl<B: ExecutorBackend> std::fmt::Debug for WorkerLease<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLease")
            .field("language", &self.language)
            .field("id", &self.id)
            .field("session_provided", &self.session_provided)
            .field("fate", &self.fate)
            .finish()
    }
}

impl<B: ExecutorBackend> WorkerLease<B> {
    /// Pool index of the leased worker.
    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.id
    }

    /// Runs one execution on the leased worker.
    ///
    /// Any failure (timeout, protocol violation, surplus output, child
    /// exit) marks the worker for eviction; it will be killed rather
    /// than pooled when the lease drops.
    ///
    /// # Errors
    /// See [`InterpreterWorker::execute`].
    pub async fn execute(
        &mut self,
        code: &str,
        execution_id: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecutorError> {
        let mut worker = self.handle.lock().await;
        match worker.execute(code, execution_id, timeout).await {
            Ok((result, false)) => Ok(result),
            Ok((result, true)) => {
                self.fate = LeaseFate::Evict;
                Ok(result)
            }
            Err(e) => {
                self.fate = LeaseFate::Evict;
                Err(e)
            }
        }
    }
}

impl<B: ExecutorBackend> Drop for WorkerLease<B> {
    fn drop(&mut self) {
        match self.fate {
            LeaseFate::Release => {
                self.pool.release_slot(self.language, self.id, self.session_provided);
            }
            LeaseFate::Evict => {
                self.pool.evict_slot(self.language, self.id);
            }
        }
    }
}
