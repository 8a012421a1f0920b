//! ListenerSession: the async event loop around [`LikeCoordinator`].
//!
//! One task owns the coordinator. Metadata polls and like calls run as
//! spawned tasks and report back over an internal channel, so a slow server
//! never blocks key handling. Every turn of the loop publishes a fresh
//! [`SessionSnapshot`] on a `watch` channel for the front end to render.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use elgean_proto::metadata::NowPlaying;
use elgean_proto::protocol::{LikeRequest, LikeStatus};

use crate::coordinator::{LikeCall, LikeCoordinator, LikeOp, LikeView};
use crate::identity::IdentitySource;
use crate::likes::{LikeError, LikeService};
use crate::now_playing::MetadataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// The like control was pressed.
    ToggleLike,
    /// Poll metadata now instead of waiting for the next tick.
    Refresh,
    Shutdown,
}

/// Everything the front end needs to draw one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub now_playing: Option<NowPlaying>,
    pub like: LikeView,
    pub listener_id: Option<String>,
    /// The last poll failed; `now_playing` is from an earlier one.
    pub metadata_stale: bool,
}

enum Completion {
    Metadata(anyhow::Result<NowPlaying>),
    Like(LikeCall, Result<LikeStatus, LikeError>),
}

pub struct ListenerSession<M, L, I> {
    metadata: Arc<M>,
    likes: Arc<L>,
    identity: I,
    coordinator: LikeCoordinator,
    poll_interval: Duration,
    fetching: bool,

    now_playing: Option<NowPlaying>,
    listener_id: Option<String>,
    metadata_stale: bool,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<M, L, I> ListenerSession<M, L, I>
where
    M: MetadataSource,
    L: LikeService,
    I: IdentitySource,
{
    pub fn new(
        metadata: Arc<M>,
        likes: Arc<L>,
        identity: I,
        poll_interval: Duration,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let session = Self {
            metadata,
            likes,
            identity,
            coordinator: LikeCoordinator::new(),
            poll_interval,
            fetching: false,
            now_playing: None,
            listener_id: None,
            metadata_stale: false,
            snapshot_tx,
        };
        (session, snapshot_rx)
    }

    /// Run until `Shutdown`, the command channel closing, or `cancel`.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        info!("listener session started, polling every {:?}", self.poll_interval);

        let (done_tx, mut done_rx) = mpsc::channel::<Completion>(32);

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("listener session cancelled");
                    break;
                }

                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::ToggleLike) => {
                        if let Some(call) = self.coordinator.request_toggle() {
                            self.dispatch(call, &done_tx).await;
                        }
                    }
                    Some(SessionCommand::Refresh) => self.poll_metadata(&done_tx),
                    Some(SessionCommand::Shutdown) | None => break,
                },

                _ = poll.tick() => self.poll_metadata(&done_tx),

                Some(done) = done_rx.recv() => self.on_completion(done, &done_tx).await,
            }

            self.publish();
        }

        info!("listener session stopped");
        Ok(())
    }

    fn poll_metadata(&mut self, done_tx: &mpsc::Sender<Completion>) {
        if self.fetching {
            debug!("metadata poll skipped: previous one still running");
            return;
        }
        self.fetching = true;

        let metadata = Arc::clone(&self.metadata);
        let tx = done_tx.clone();
        tokio::spawn(async move {
            let result = metadata.fetch().await;
            let _ = tx.send(Completion::Metadata(result)).await;
        });
    }

    async fn dispatch(&mut self, call: LikeCall, done_tx: &mpsc::Sender<Completion>) {
        let listener_id = self.identity.get_or_create().await;
        self.listener_id = Some(listener_id.clone());
        let request = LikeRequest::new(call.track.as_str(), listener_id);

        debug!("{} → {}", call.op, call.track);
        let likes = Arc::clone(&self.likes);
        let tx = done_tx.clone();
        tokio::spawn(async move {
            let result = match call.op {
                LikeOp::Check => likes.is_liked(&request).await,
                LikeOp::Toggle => likes.toggle(&request).await,
            };
            let _ = tx.send(Completion::Like(call, result)).await;
        });
    }

    async fn on_completion(&mut self, done: Completion, done_tx: &mpsc::Sender<Completion>) {
        match done {
            Completion::Metadata(Ok(now_playing)) => {
                self.fetching = false;
                self.metadata_stale = false;
                let check = self.coordinator.on_metadata(&now_playing);
                self.now_playing = Some(now_playing);
                if let Some(call) = check {
                    self.dispatch(call, done_tx).await;
                }
            }
            Completion::Metadata(Err(e)) => {
                self.fetching = false;
                if !self.metadata_stale {
                    warn!("metadata poll failed: {:#}", e);
                }
                self.metadata_stale = true;
            }
            Completion::Like(call, result) => {
                self.coordinator.on_response(&call, result);
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            now_playing: self.now_playing.clone(),
            like: self.coordinator.view(),
            listener_id: self.listener_id.clone(),
            metadata_stale: self.metadata_stale,
        });
    }
}
