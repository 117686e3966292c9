use crate::error::DbError;
use crate::models::db_config::PoolOptions;
use crate::udbc::connection::Connection;
use crate::udbc::driver::Driver;
use serde::Serialize;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

struct IdleConnection {
    conn: Box<dyn Connection>,
    last_used: Instant,
}

/// Everything guarded by the pool lock. `active` counts every connection the
/// pool owns, idle or checked out, plus slots reserved for one being opened.
struct PoolState {
    idle: VecDeque<IdleConnection>,
    active: usize,
    closed: bool,
}

struct PoolInner {
    driver: Arc<dyn Driver>,
    options: PoolOptions,
    state: Mutex<PoolState>,
    notify: Notify,
}

/// Read-only snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub active_connections: usize,
    pub idle_connections: usize,
    pub min_connections: usize,
    pub max_connections: usize,
}

/// Bounded pool of database connections shared by concurrent tasks.
///
/// At most `max_connections` sessions exist at any time. Idle connections are
/// reused before new ones are opened and are pinged before being handed out.
/// Callers that find the pool exhausted wait until a connection is released
/// or their timeout elapses.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates the pool and eagerly opens `min_connections` sessions.
    pub async fn connect(driver: Arc<dyn Driver>, options: PoolOptions) -> Result<Self, DbError> {
        options.validate()?;

        let mut idle = VecDeque::with_capacity(options.max_connections);
        for _ in 0..options.min_connections {
            match driver.connect().await {
                Ok(conn) => idle.push_back(IdleConnection {
                    conn,
                    last_used: Instant::now(),
                }),
                Err(e) => {
                    error!("failed to initialize connection pool: db={}, error={}", driver.name(), e);
                    for opened in idle {
                        let _ = opened.conn.close().await;
                    }
                    return Err(e);
                }
            }
        }

        info!(
            "connection pool initialized: db={}, min_connections={}, max_connections={}",
            driver.name(),
            options.min_connections,
            options.max_connections
        );

        let active = idle.len();
        Ok(Self {
            inner: Arc::new(PoolInner {
                driver,
                options,
                state: Mutex::new(PoolState {
                    idle,
                    active,
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        })
    }

    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.inner.driver
    }

    /// Checks out a live connection, waiting up to `timeout` for one to free up.
    pub async fn acquire(&self, timeout: Duration) -> Result<PooledConnection, DbError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register for wakeups before inspecting the state so a release
            // between the check and the wait is not missed.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let checkout = {
                let mut state = self.inner.state();
                if state.closed {
                    return Err(DbError::PoolClosed);
                }
                if let Some(idle) = state.idle.pop_front() {
                    Checkout::Idle(idle)
                } else if state.active < self.inner.options.max_connections {
                    state.active += 1;
                    Checkout::Open
                } else {
                    Checkout::Wait
                }
            };

            match checkout {
                Checkout::Idle(idle) => {
                    let slot = Slot::new(&self.inner);
                    let conn = self.inner.revalidate(idle).await?;
                    slot.disarm();
                    return Ok(self.wrap(conn));
                }
                Checkout::Open => {
                    let slot = Slot::new(&self.inner);
                    let conn = self.inner.driver.connect().await?;
                    slot.disarm();
                    debug!("created new connection: db={}", self.inner.driver.name());
                    return Ok(self.wrap(conn));
                }
                Checkout::Wait => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        warn!(
                            "timed out waiting for a connection: db={}, timeout={:?}",
                            self.inner.driver.name(),
                            timeout
                        );
                        return Err(DbError::Timeout(timeout));
                    }
                }
            }
        }
    }

    /// Returns a connection for reuse. Equivalent to [`PooledConnection::release`].
    pub async fn release(&self, conn: PooledConnection) {
        conn.release().await;
    }

    /// Marks the pool closed and closes every idle connection. Checked-out
    /// connections are closed as they come back.
    pub async fn close(&self) {
        let drained: Vec<IdleConnection> = {
            let mut state = self.inner.state();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<IdleConnection> = state.idle.drain(..).collect();
            state.active -= drained.len();
            drained
        };
        self.inner.notify.notify_waiters();

        for idle in drained {
            if let Err(e) = idle.conn.close().await {
                debug!("error closing idle connection: {}", e);
            }
        }
        info!("connection pool closed: db={}", self.inner.driver.name());
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state().closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state();
        PoolStats {
            active_connections: state.active,
            idle_connections: state.idle.len(),
            min_connections: self.inner.options.min_connections,
            max_connections: self.inner.options.max_connections,
        }
    }

    /// Closes idle connections unused for longer than `max_idle_time`, never
    /// dropping below `min_connections`. Returns how many were closed.
    pub async fn evict_idle(&self) -> usize {
        let max_idle_time = self.inner.options.max_idle_time;
        let min = self.inner.options.min_connections;

        let expired: Vec<IdleConnection> = {
            let mut state = self.inner.state();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            let mut expired = Vec::new();
            while let Some(idle) = state.idle.pop_front() {
                if state.active > min && idle.last_used.elapsed() > max_idle_time {
                    state.active -= 1;
                    expired.push(idle);
                } else {
                    kept.push_back(idle);
                }
            }
            state.idle = kept;
            expired
        };

        let count = expired.len();
        for idle in expired {
            let _ = idle.conn.close().await;
        }
        if count > 0 {
            debug!("evicted idle connections: db={}, count={}", self.inner.driver.name(), count);
            self.inner.notify.notify_waiters();
        }
        count
    }

    fn wrap(&self, conn: Box<dyn Connection>) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
        }
    }
}

enum Checkout {
    Idle(IdleConnection),
    Open,
    Wait,
}

/// A counted slot whose connection is in transit between the idle queue and a
/// caller. Dropping it armed (error or cancelled future) gives the slot back.
struct Slot<'a> {
    inner: &'a PoolInner,
    armed: bool,
}

impl<'a> Slot<'a> {
    fn new(inner: &'a PoolInner) -> Self {
        Self { inner, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.release_slot();
        }
    }
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_slot(&self) {
        {
            let mut state = self.state();
            state.active = state.active.saturating_sub(1);
        }
        self.notify.notify_one();
    }

    /// Pings an idle connection; a dead or expired one is replaced by a fresh
    /// session occupying the same slot.
    async fn revalidate(&self, mut idle: IdleConnection) -> Result<Box<dyn Connection>, DbError> {
        let idle_for = idle.last_used.elapsed();
        if idle_for > self.options.max_idle_time {
            debug!("replacing connection idle for {:?}", idle_for);
            let _ = idle.conn.close().await;
        } else if idle.conn.ping().await.is_ok() {
            debug!("reusing idle connection: db={}", self.driver.name());
            return Ok(idle.conn);
        } else {
            warn!("discarding dead idle connection: db={}", self.driver.name());
            drop(idle);
        }
        let conn = self.driver.connect().await?;
        debug!("created replacement connection: db={}", self.driver.name());
        Ok(conn)
    }

    /// Holds the connection's slot until it is back in the idle queue. If this
    /// future is dropped part way, the slot is still given back.
    async fn return_connection(&self, mut conn: Box<dyn Connection>) {
        let slot = Slot::new(self);

        let closed = self.state().closed;
        if closed {
            debug!("pool closed, closing returned connection");
            let _ = conn.close().await;
            return;
        }

        let healthy = match conn.rollback().await {
            Ok(()) => conn.ping().await.is_ok(),
            Err(e) => {
                warn!("rollback of returned connection failed: {}", e);
                false
            }
        };
        if !healthy {
            warn!("discarding dead connection on return: db={}", self.driver.name());
            return;
        }

        let rejected = {
            let mut state = self.state();
            if state.closed {
                Some(conn)
            } else {
                state.idle.push_back(IdleConnection {
                    conn,
                    last_used: Instant::now(),
                });
                None
            }
        };
        match rejected {
            Some(conn) => {
                debug!("pool closed during return, closing connection");
                let _ = conn.close().await;
            }
            None => {
                slot.disarm();
                debug!("connection returned to pool: db={}", self.driver.name());
                self.notify.notify_one();
            }
        }
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Give it back with [`PooledConnection::release`]. If it is dropped instead,
/// the release runs on a spawned task.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    /// Rolls back leftover work, pings, and puts the connection back in the
    /// idle queue, or closes it if it is dead or the pool is closed.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn).await;
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("PooledConnection used after release")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("PooledConnection used after release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let pool = self.pool.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        pool.return_connection(conn).await;
                    });
                }
                Err(_) => {
                    warn!("no tokio runtime to return connection, dropping it");
                    drop(conn);
                    pool.release_slot();
                }
            }
        }
    }
}
