use std::future::Future;

use elgean_proto::metadata::NowPlaying;

/// Source of the station's current now-playing payload.
pub trait MetadataSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = anyhow::Result<NowPlaying>> + Send;
}
