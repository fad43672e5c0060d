use anyhow::Result;
use rollcall_store::SqliteEnrollmentStore;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = config::Config::from_env();
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Fail fast if storage is unusable; session state is memory-only.
    let store = SqliteEnrollmentStore::open(&config.db_path)?;
    let engine = engine::spawn_engine(store, config.match_threshold, config.tracker_config());

    let service = dbus_interface::RollcallService::new(engine);
    let _conn = zbus::connection::Builder::session()?
        .name("org.rollcall.Rollcall1")?
        .serve_at("/org/rollcall/Rollcall1", service)?
        .build()
        .await?;

    tracing::info!(
        db = %config.db_path.display(),
        threshold = config.match_threshold,
        "rollcalld ready on org.rollcall.Rollcall1"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
