//! The like service as seen from a listener.

use std::future::Future;

use elgean_proto::protocol::{LikeRequest, LikeStatus};

#[derive(Debug, thiserror::Error)]
pub enum LikeError {
    #[error("like service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("like service returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("like service rejected the request: {0}")]
    Rejected(String),
    #[error("malformed like response: {0}")]
    Malformed(String),
}

/// Two operations against the per-listener, per-track like state.
pub trait LikeService: Send + Sync + 'static {
    /// Read the listener's like and the track's like count.
    fn is_liked(
        &self,
        request: &LikeRequest,
    ) -> impl Future<Output = Result<LikeStatus, LikeError>> + Send;

    /// Flip the listener's like and return the new authoritative state.
    fn toggle(
        &self,
        request: &LikeRequest,
    ) -> impl Future<Output = Result<LikeStatus, LikeError>> + Send;
}
