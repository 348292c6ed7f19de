//! Client side of a two-party call: picks offerer or answerer from the
//! mailbox state, exchanges descriptions, trickles ICE candidates by polling
//! and tears everything down on hang-up.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod mailbox;
pub mod media;
pub mod peer;
pub mod recording;

pub use config::CoordinatorConfig;
pub use coordinator::{choose_role, CallPhase, Coordinator, Role};
pub use error::CallError;
pub use ledger::CandidateLedger;
pub use mailbox::{HttpMailbox, SignalingMailbox};
pub use media::{LocalMedia, LocalTrack, MediaSource, TrackHandle, TrackKind, WebRtcMedia};
pub use peer::{PeerConnector, PeerEvent, PeerEvents, PeerSession, PeerState, WebRtcConnector};
pub use recording::RecordingSink;
