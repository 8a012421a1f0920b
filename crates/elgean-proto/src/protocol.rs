use serde::{Deserialize, Serialize};

/// `status` value the like API uses for accepted requests.
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

pub const USER_IP_PATH: &str = "/api/user-ip";
pub const METADATA_PATH: &str = "/api/metadata";
pub const DATA_PATH: &str = "/api/data";
pub const LIKE_PATH: &str = "/api/tracks/like";
pub const IS_LIKED_PATH: &str = "/api/tracks/is-liked";

/// Body of both like operations: `like` flips the listener's like for the
/// track, `is-liked` only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeRequest {
    #[serde(default)]
    pub track_identifier: String,
    #[serde(default)]
    pub user_fingerprint: String,
}

impl LikeRequest {
    pub fn new(track_identifier: impl Into<String>, user_fingerprint: impl Into<String>) -> Self {
        Self {
            track_identifier: track_identifier.into(),
            user_fingerprint: user_fingerprint.into(),
        }
    }

    /// Message for the 400 response when a field is empty, `None` otherwise.
    pub fn validation_error(&self) -> Option<&'static str> {
        if self.track_identifier.trim().is_empty() || self.user_fingerprint.trim().is_empty() {
            Some("Missing track_identifier or user_fingerprint")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Authoritative like state for one listener and track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LikeStatus {
    pub liked: bool,
    pub count: u64,
}

/// Why a [`LikeResponse`] carries no usable [`LikeStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeRejection {
    /// `status` was not `"success"`; the server's message, or the status itself.
    Refused(String),
    /// `"success"` without `liked` or `like_count`.
    Incomplete,
}

impl LikeResponse {
    pub fn into_status(self) -> Result<LikeStatus, LikeRejection> {
        if self.status != STATUS_SUCCESS {
            return Err(LikeRejection::Refused(self.message.unwrap_or(self.status)));
        }
        match (self.liked, self.like_count) {
            (Some(liked), Some(count)) => Ok(LikeStatus { liked, count }),
            _ => Err(LikeRejection::Incomplete),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIpResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

/// Failure body shared by the proxy routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
        }
    }
}
