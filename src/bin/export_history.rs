use anyhow::{Context, Result};
use balloon_sync::config::SyncConfig;
use balloon_sync::csv_export::{write_charges, write_gifts, write_months};
use balloon_sync::domain::repository::load_state;
use balloon_sync::infra::sqlite::repo::SqliteCacheStore;
use sqlx::SqlitePool;
use std::fs::File;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = SyncConfig::from_env()?;
    let pool = SqlitePool::connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    let store = SqliteCacheStore::new(pool);
    store.migrate().await?;

    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| ".".to_string()));
    std::fs::create_dir_all(&out_dir)?;

    let snapshot = load_state(&store)
        .await?
        .and_then(|s| s.data)
        .context("no synced history in the cache yet")?;

    write_charges(File::create(out_dir.join("charges.csv"))?, &snapshot.charge_history)?;
    write_gifts(File::create(out_dir.join("gifts.csv"))?, &snapshot.gift_history)?;
    write_months(File::create(out_dir.join("months.csv"))?, &snapshot.summary)?;

    println!(
        "Exported {} charges, {} gifts, {} months to {}",
        snapshot.charge_history.len(),
        snapshot.gift_history.len(),
        snapshot.summary.by_month.len(),
        out_dir.display()
    );
    Ok(())
}
