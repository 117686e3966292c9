use clap::Parser;
use rbac_db::{DatabaseConfig, DatabaseManager, PoolOptions};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Smoke and load check for the RBAC database pool.
#[derive(Parser, Debug)]
#[command(name = "rbac-db", version, about, long_about = None)]
struct Cli {
    /// Number of concurrent tasks issuing queries
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Queries issued by each task
    #[arg(long, default_value_t = 100)]
    iterations: usize,

    /// Overrides DB_MIN_CONNECTIONS
    #[arg(long)]
    min: Option<usize>,

    /// Overrides DB_MAX_CONNECTIONS
    #[arg(long)]
    max: Option<usize>,

    /// Statement each task runs
    #[arg(long, default_value = "SELECT 1 AS ok")]
    sql: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = DatabaseConfig::from_env()?;
    let mut options = PoolOptions::from_env()?;
    if let Some(min) = cli.min {
        options.min_connections = min;
    }
    if let Some(max) = cli.max {
        options.max_connections = max;
    }

    let manager = DatabaseManager::connect(config, options).await?;

    let start = Instant::now();
    let mut handles = Vec::with_capacity(cli.workers);
    for worker in 0..cli.workers {
        let manager = manager.clone();
        let sql = cli.sql.clone();
        let iterations = cli.iterations;
        handles.push(tokio::spawn(async move {
            let mut failures = 0usize;
            for _ in 0..iterations {
                if let Err(e) = manager.execute_query(&sql, &()).await {
                    error!("worker {} query failed: {}", worker, e);
                    failures += 1;
                }
            }
            failures
        }));
    }

    let mut failures = 0;
    for handle in handles {
        failures += handle.await?;
    }
    let elapsed = start.elapsed();
    let total = cli.workers * cli.iterations;

    info!(
        "finished {} queries in {:?} ({:.1} qps), failures={}",
        total,
        elapsed,
        total as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        failures
    );
    println!("{}", serde_json::to_string_pretty(&manager.stats())?);

    manager.close().await;
    Ok(())
}
