//! Listener-side core of the Radio Elgean client: who the listener is, and
//! what the like control should show for the track on air.

pub mod client;
pub mod coordinator;
pub mod fingerprint;
pub mod identity;
pub mod likes;
pub mod now_playing;
pub mod session;

pub use client::ServerClient;
pub use coordinator::{LikeCoordinator, LikeView, Phase};
pub use identity::{FileStore, IdentityCache, MemoryStore};
pub use session::{ListenerSession, SessionCommand, SessionSnapshot};
