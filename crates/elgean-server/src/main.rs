mod proxy;

use elgean_proto::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,elgean_server=debug")),
        )
        .init();

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    info!("Serving static files from {:?}", config.server.static_dir);

    let shutdown = CancellationToken::new();
    let server = proxy::start_server(&config.server, shutdown.clone()).await?;

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    shutdown.cancel();
    server.await?;

    Ok(())
}
