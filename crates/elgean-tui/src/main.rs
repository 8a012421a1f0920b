mod app;
mod theme;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use elgean_listener::fingerprint::SystemProbe;
use elgean_listener::identity::IdentitySource;
use elgean_listener::{
    FileStore, IdentityCache, ListenerSession, MemoryStore, ServerClient, SessionCommand,
    SessionSnapshot,
};
use elgean_proto::config::Config;

/// A tracing layer that forwards WARN and ERROR lines to the UI log strip.
struct UiLogLayer {
    sender: broadcast::Sender<String>,
}

impl UiLogLayer {
    fn new(sender: broadcast::Sender<String>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for UiLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // no receivers yet is fine
        let _ = self.sender.send(message);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

fn spawn_session<I>(
    client: ServerClient,
    identity: I,
    poll_interval: Duration,
    commands: mpsc::Receiver<SessionCommand>,
    cancel: CancellationToken,
) -> (watch::Receiver<SessionSnapshot>, tokio::task::JoinHandle<()>)
where
    I: IdentitySource + 'static,
{
    let client = Arc::new(client);
    let (session, snapshots) =
        ListenerSession::new(Arc::clone(&client), client, identity, poll_interval);
    let handle = tokio::spawn(async move {
        if let Err(e) = session.run(commands, cancel).await {
            error!("listener session exited with error: {:#}", e);
        }
    });
    (snapshots, handle)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Session-only identity: nothing is read from or written to disk.
    let ephemeral = std::env::args().skip(1).any(|a| a == "--ephemeral");

    let data_dir = elgean_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("elgean.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let (log_tx, log_rx) = broadcast::channel::<String>(100);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(UiLogLayer::new(log_tx))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,elgean=debug,elgean_listener=debug,hyper_util=warn,reqwest=warn",
                )
            }),
        )
        .init();

    eprintln!("elgean log: {}", log_path.display());
    info!("elgean starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let config = Config::load().unwrap_or_else(|e| {
        warn!("config unreadable, using defaults: {:#}", e);
        Config::default()
    });
    let listener = &config.listener;

    let client = ServerClient::new(&listener.server_url, listener.request_timeout())?;
    info!("server at {}", listener.server_url);

    // ── Device probe, with the terminal standing in for the screen ───────────
    let mut probe = SystemProbe::new();
    if let Ok((cols, rows)) = ratatui::crossterm::terminal::size() {
        probe = probe.with_screen(u32::from(cols), u32::from(rows));
    }

    // ── Listener session ─────────────────────────────────────────────────────
    let poll_interval = listener.poll_interval();
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(32);
    let cancel = CancellationToken::new();

    let (snapshots, session) = if ephemeral {
        info!("ephemeral identity, nothing will be persisted");
        let identity = IdentityCache::new(MemoryStore::new(), client.clone(), probe);
        spawn_session(client, identity, poll_interval, cmd_rx, cancel.clone())
    } else {
        let store = FileStore::new(&listener.identity_file);
        info!("listener id stored at {:?}", store.path());
        let identity = IdentityCache::new(store, client.clone(), probe);
        spawn_session(client, identity, poll_interval, cmd_rx, cancel.clone())
    };

    // ── Run TUI ──────────────────────────────────────────────────────────────
    let result = app::App::new(config.stream.clone(), cmd_tx)
        .run(snapshots, log_rx)
        .await;

    cancel.cancel();
    if let Err(e) = session.await {
        warn!("listener session task failed: {}", e);
    }
    result
}
