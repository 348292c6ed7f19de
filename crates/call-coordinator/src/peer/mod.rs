use std::sync::Arc;

use async_trait::async_trait;
use signal_proto::{IceCandidateRecord, SessionDescription};
use tokio::sync::mpsc;

use crate::error::CallError;
use crate::media::LocalMedia;

pub mod rtc;

pub use rtc::{WebRtcConnector, WebRtcPeer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Locally gathered candidate, to be trickled to the other side.
    LocalCandidate(IceCandidateRecord),
    StateChanged(PeerState),
}

#[async_trait]
pub trait PeerSession: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, CallError>;
    async fn create_answer(&self) -> Result<SessionDescription, CallError>;
    async fn set_local_description(&self, description: &SessionDescription)
        -> Result<(), CallError>;
    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), CallError>;
    /// Fails while the remote description is unknown; callers retry.
    async fn add_ice_candidate(&self, candidate: &IceCandidateRecord) -> Result<(), CallError>;
    async fn close(&self) -> Result<(), CallError>;
}

pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

/// Builds a peer connection with local media attached.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        ice_servers: &[String],
        media: &LocalMedia,
    ) -> Result<(Arc<dyn PeerSession>, PeerEvents), CallError>;
}
