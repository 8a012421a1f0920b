//! Listener identity cache.
//!
//! Resolution order, first hit wins:
//!   1. the id already held in memory for this session
//!   2. the id persisted by an earlier session
//!   3. a freshly computed composite id (then persisted, best effort)
//!
//! None of the steps can fail the caller. A missing client address gives a
//! device-only id; a store that cannot be read or written gives an id that
//! is only stable for the current session.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::fingerprint::{compute_device_fingerprint, rolling_hash, DeviceProbe, ListenerIdentity};

/// Hashed in place of the address when the server answers without one.
pub const NO_IP: &str = "no-ip";

// ── Storage ───────────────────────────────────────────────────────────────────

/// Durable slot for the composite listener id.
pub trait IdentityStore: Send {
    fn load(&self) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
    fn save(&self, id: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// One plain-text file holding the id.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl IdentityStore for FileStore {
    async fn load(&self) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let id = content.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, id: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, id).await?;
        Ok(())
    }
}

/// Session-only store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(id.into())),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl IdentityStore for MemoryStore {
    async fn load(&self) -> anyhow::Result<Option<String>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("identity slot poisoned"))?;
        Ok(slot.clone())
    }

    async fn save(&self, id: &str) -> anyhow::Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("identity slot poisoned"))?;
        *slot = Some(id.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Address lookup ────────────────────────────────────────────────────────────

/// Trusted reporter of the caller's network address (the proxy server).
pub trait AddressReporter: Send + Sync {
    /// `Ok(None)` when the reporter answered without an address.
    fn client_address(&self) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// Anything that can hand the session a listener id.
pub trait IdentitySource: Send {
    fn get_or_create(&mut self) -> impl Future<Output = String> + Send;
}

pub struct IdentityCache<S, A, P> {
    store: S,
    reporter: A,
    probe: P,
    current: Option<String>,
}

impl<S, A, P> IdentityCache<S, A, P>
where
    S: IdentityStore + Sync,
    A: AddressReporter,
    P: DeviceProbe + Send + Sync,
{
    pub fn new(store: S, reporter: A, probe: P) -> Self {
        Self {
            store,
            reporter,
            probe,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn compute(&self) -> ListenerIdentity {
        let device_hash = compute_device_fingerprint(&self.probe);
        let network_hash = match self.reporter.client_address().await {
            Ok(ip) => Some(rolling_hash(ip.as_deref().unwrap_or(NO_IP))),
            Err(e) => {
                warn!("could not fetch client address, using device fingerprint only: {:#}", e);
                None
            }
        };
        ListenerIdentity {
            network_hash,
            device_hash,
        }
    }
}

impl<S, A, P> IdentitySource for IdentityCache<S, A, P>
where
    S: IdentityStore + Sync,
    A: AddressReporter,
    P: DeviceProbe + Send + Sync,
{
    async fn get_or_create(&mut self) -> String {
        if let Some(id) = &self.current {
            return id.clone();
        }

        match self.store.load().await {
            Ok(Some(id)) => {
                debug!("listener id restored from store");
                self.current = Some(id.clone());
                return id;
            }
            Ok(None) => {}
            Err(e) => warn!("could not read stored listener id: {:#}", e),
        }

        let id = self.compute().await.composite_id();
        info!("generated listener id {}", id);
        if let Err(e) = self.store.save(&id).await {
            warn!("could not persist listener id, it will not survive this session: {:#}", e);
        }
        self.current = Some(id.clone());
        id
    }
}
