//! HTTP client for the same-origin proxy server.
//!
//! One `ServerClient` covers every listener call: the address lookup that
//! seeds the network hash, the two like operations and the metadata poll.
//! The underlying `reqwest::Client` carries a bounded timeout so no call can
//! leave the like control disabled indefinitely.

use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use tracing::debug;

use elgean_proto::metadata::NowPlaying;
use elgean_proto::protocol::{
    LikeRejection, LikeRequest, LikeResponse, LikeStatus, UserIpResponse, IS_LIKED_PATH, LIKE_PATH,
    METADATA_PATH, USER_IP_PATH,
};

use crate::identity::AddressReporter;
use crate::likes::{LikeError, LikeService};
use crate::now_playing::MetadataSource;

#[derive(Debug, Clone)]
pub struct ServerClient {
    base_url: String,
    client: Client,
}

impl ServerClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("elgean/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_like(&self, path: &str, request: &LikeRequest) -> Result<LikeStatus, LikeError> {
        debug!("POST {} track={}", path, request.track_identifier);
        let response = self.client.post(self.url(path)).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LikeError::Status(status));
        }

        let body = response.bytes().await?;
        let parsed: LikeResponse =
            serde_json::from_slice(&body).map_err(|e| LikeError::Malformed(e.to_string()))?;
        parsed.into_status().map_err(|rejection| match rejection {
            LikeRejection::Refused(message) => LikeError::Rejected(message),
            LikeRejection::Incomplete => {
                LikeError::Malformed("success without liked or like_count".to_string())
            }
        })
    }
}

impl LikeService for ServerClient {
    async fn is_liked(&self, request: &LikeRequest) -> Result<LikeStatus, LikeError> {
        self.post_like(IS_LIKED_PATH, request).await
    }

    async fn toggle(&self, request: &LikeRequest) -> Result<LikeStatus, LikeError> {
        self.post_like(LIKE_PATH, request).await
    }
}

impl AddressReporter for ServerClient {
    async fn client_address(&self) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .get(self.url(USER_IP_PATH))
            .send()
            .await
            .context("address lookup failed")?;

        if !response.status().is_success() {
            anyhow::bail!("address lookup returned status: {}", response.status());
        }

        let data: UserIpResponse = response
            .json()
            .await
            .context("failed to parse address lookup response")?;
        Ok(data.ip.filter(|ip| !ip.trim().is_empty()))
    }
}

impl MetadataSource for ServerClient {
    async fn fetch(&self) -> anyhow::Result<NowPlaying> {
        let response = self
            .client
            .get(self.url(METADATA_PATH))
            .header("Accept", "application/json")
            .send()
            .await
            .context("failed to fetch now-playing metadata")?;

        if !response.status().is_success() {
            anyhow::bail!("metadata endpoint returned status: {}", response.status());
        }

        response
            .json()
            .await
            .context("failed to parse now-playing metadata")
    }
}
