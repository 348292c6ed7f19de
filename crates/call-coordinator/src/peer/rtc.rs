use std::sync::Arc;

use async_trait::async_trait;
use signal_proto::{IceCandidateRecord, SessionDescription, ANSWER_TYPE, OFFER_TYPE};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use super::{PeerConnector, PeerEvent, PeerEvents, PeerSession, PeerState};
use crate::error::CallError;
use crate::media::LocalMedia;

/// `webrtc`-crate peer connection.
pub struct WebRtcPeer {
    connection: Arc<RTCPeerConnection>,
}

impl WebRtcPeer {
    pub fn connection(&self) -> &Arc<RTCPeerConnection> {
        &self.connection
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcConnector;

fn build_api() -> Result<API, CallError> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

fn peer_state(state: RTCPeerConnectionState) -> PeerState {
    match state {
        RTCPeerConnectionState::Connecting => PeerState::Connecting,
        RTCPeerConnectionState::Connected => PeerState::Connected,
        RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
        RTCPeerConnectionState::Failed => PeerState::Failed,
        RTCPeerConnectionState::Closed => PeerState::Closed,
        _ => PeerState::New,
    }
}

fn to_rtc_description(
    description: &SessionDescription,
) -> Result<RTCSessionDescription, CallError> {
    let sdp = description.sdp.clone();
    match description.typ.as_str() {
        OFFER_TYPE => Ok(RTCSessionDescription::offer(sdp)?),
        ANSWER_TYPE => Ok(RTCSessionDescription::answer(sdp)?),
        other => Err(CallError::Malformed(format!(
            "unsupported description type {other}"
        ))),
    }
}

fn candidate_record(init: RTCIceCandidateInit) -> IceCandidateRecord {
    IceCandidateRecord {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(
        &self,
        ice_servers: &[String],
        media: &LocalMedia,
    ) -> Result<(Arc<dyn PeerSession>, PeerEvents), CallError> {
        let api = build_api()?;
        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let connection = Arc::new(api.new_peer_connection(config).await?);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let candidate_tx = events_tx.clone();
        connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = candidate_tx.clone();
            Box::pin(async move {
                // `None` marks the end of gathering.
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(PeerEvent::LocalCandidate(candidate_record(init)));
                    }
                    Err(err) => warn!(error = %err, "failed to serialize local candidate"),
                }
            })
        }));

        let state_tx = events_tx;
        connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    debug!(?state, "peer connection state changed");
                    let _ = tx.send(PeerEvent::StateChanged(peer_state(state)));
                })
            },
        ));

        for track in &media.tracks {
            let Some(rtc_track) = track.handle.rtc_track() else {
                continue;
            };
            let sender = connection.add_track(rtc_track).await?;
            let kind = track.kind;
            // Drain RTCP so interceptors keep running.
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
                trace!(?kind, "rtcp reader finished");
            });
        }

        let peer: Arc<dyn PeerSession> = Arc::new(WebRtcPeer { connection });
        Ok((peer, events_rx))
    }
}

#[async_trait]
impl PeerSession for WebRtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription, CallError> {
        let offer = self.connection.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, CallError> {
        let answer = self.connection.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), CallError> {
        let description = to_rtc_description(description)?;
        self.connection.set_local_description(description).await?;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), CallError> {
        let description = to_rtc_description(description)?;
        self.connection.set_remote_description(description).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidateRecord) -> Result<(), CallError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment.clone(),
        };
        self.connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), CallError> {
        self.connection.close().await?;
        Ok(())
    }
}
