use corsgate::{Config, Proxy};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = match std::env::var("CORSGATE_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::load()?,
    };

    let mut proxy = Proxy::new(cfg.proxy)?;
    proxy.listen(cfg.port).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    proxy.close().await;

    Ok(())
}
