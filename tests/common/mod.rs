#![allow(dead_code)]

use async_trait::async_trait;
use rbac_db::udbc::connection::Connection;
use rbac_db::udbc::driver::Driver;
use rbac_db::{ConnectionPool, DbError, Params, PoolOptions, Row, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Shared {
    /// committed rows of a one-column `users(name)` table
    users: Vec<String>,
    opened: usize,
    closed: usize,
    fail_connect: bool,
    fail_rollback: bool,
    rollback_delay: Option<Duration>,
    liveness: Vec<Arc<AtomicBool>>,
}

/// In-memory stand-in for a MySQL server. Understands just enough SQL for
/// pool tests: `INSERT ...` (takes the `name` parameter, fails on "boom"),
/// `SELECT ...` (optionally `WHERE name = ?`) and nothing else.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    pub fn committed(&self) -> Vec<String> {
        self.lock().users.clone()
    }

    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn set_fail_rollback(&self, fail: bool) {
        self.lock().fail_rollback = fail;
    }

    /// Makes every ROLLBACK take `delay`, like a slow round trip.
    pub fn set_rollback_delay(&self, delay: Option<Duration>) {
        self.lock().rollback_delay = delay;
    }

    /// Simulates the server dropping every session opened so far.
    pub fn kill_all(&self) {
        for alive in &self.lock().liveness {
            alive.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn r#type(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let mut shared = self.lock();
        if shared.fail_connect {
            return Err(DbError::ConnectionOpen("Access denied for user 'root'".into()));
        }
        shared.opened += 1;
        let alive = Arc::new(AtomicBool::new(true));
        shared.liveness.push(alive.clone());
        Ok(Box::new(MemoryConnection {
            shared: self.shared.clone(),
            alive,
            pending: Vec::new(),
        }))
    }
}

struct MemoryConnection {
    shared: Arc<Mutex<Shared>>,
    alive: Arc<AtomicBool>,
    pending: Vec<String>,
}

impl MemoryConnection {
    fn check_alive(&self) -> Result<(), DbError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DbError::Database("MySQL server has gone away".into()))
        }
    }

    fn name_param(params: &Params) -> Option<String> {
        match params {
            Params::Named(_) => params.get("name").and_then(Value::as_str).map(str::to_string),
            Params::Positional(values) => values.first().and_then(Value::as_str).map(str::to_string),
            Params::Empty => None,
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>, DbError> {
        self.check_alive()?;
        if !sql.trim_start().to_uppercase().starts_with("SELECT") {
            return Err(DbError::Database(format!("You have an error in your SQL syntax near '{}'", sql)));
        }
        let filter = if sql.contains("WHERE name") {
            Self::name_param(params)
        } else {
            None
        };
        let shared = self.shared.lock().unwrap();
        Ok(shared
            .users
            .iter()
            .chain(self.pending.iter())
            .filter(|name| filter.as_ref().is_none_or(|f| f == *name))
            .map(|name| {
                let mut row = Row::new();
                row.insert("name".to_string(), Value::Bytes(name.as_bytes().to_vec()));
                row
            })
            .collect())
    }

    async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64, DbError> {
        self.check_alive()?;
        if !sql.trim_start().to_uppercase().starts_with("INSERT") {
            return Err(DbError::Database(format!("You have an error in your SQL syntax near '{}'", sql)));
        }
        let name = Self::name_param(params)
            .ok_or_else(|| DbError::Database("Column 'name' cannot be null".into()))?;
        if name == "boom" {
            return Err(DbError::Database("Duplicate entry 'boom' for key 'name'".into()));
        }
        self.pending.push(name);
        Ok(1)
    }

    async fn last_insert_id(&mut self) -> Result<u64, DbError> {
        self.check_alive()?;
        Ok(self.shared.lock().unwrap().users.len() as u64 + self.pending.len() as u64)
    }

    async fn ping(&mut self) -> Result<(), DbError> {
        self.check_alive()
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        self.check_alive()
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.check_alive()?;
        let mut shared = self.shared.lock().unwrap();
        shared.users.append(&mut self.pending);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.check_alive()?;
        let (fail, delay) = {
            let shared = self.shared.lock().unwrap();
            (shared.fail_rollback, shared.rollback_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(DbError::Database("Lock wait timeout exceeded".into()));
        }
        self.pending.clear();
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.shared.lock().unwrap().closed += 1;
        Ok(())
    }
}

pub async fn pool(driver: &MemoryDriver, min: usize, max: usize) -> ConnectionPool {
    pool_with(driver, PoolOptions::new(min, max)).await
}

pub async fn pool_with(driver: &MemoryDriver, options: PoolOptions) -> ConnectionPool {
    ConnectionPool::connect(Arc::new(driver.clone()), options)
        .await
        .unwrap()
}

pub const SHORT: Duration = Duration::from_millis(200);
pub const LONG: Duration = Duration::from_secs(1);
