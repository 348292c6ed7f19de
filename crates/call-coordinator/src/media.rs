use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A captured track the coordinator can stop on hang-up.
pub trait TrackHandle: Send + Sync {
    fn stop(&self);
    fn is_stopped(&self) -> bool;

    /// The sending side handed to the peer connection, when backed by one.
    fn rtc_track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        None
    }
}

#[derive(Clone)]
pub struct LocalTrack {
    pub kind: TrackKind,
    pub id: String,
    pub handle: Arc<dyn TrackHandle>,
}

#[derive(Clone, Default)]
pub struct LocalMedia {
    pub tracks: Vec<LocalTrack>,
}

impl LocalMedia {
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.handle.stop();
        }
    }
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire camera/microphone. A denial is not retried.
    async fn acquire(&self) -> Result<LocalMedia, CallError>;
}

/// Sample-fed tracks. A capture pipeline outside this crate writes encoded
/// frames into [`SampleTrack::track`].
pub struct SampleTrack {
    track: Arc<TrackLocalStaticSample>,
    stopped: AtomicBool,
}

impl SampleTrack {
    pub fn track(&self) -> &Arc<TrackLocalStaticSample> {
        &self.track
    }
}

impl TrackHandle for SampleTrack {
    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!(track = self.track.id(), "local track stopped");
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn rtc_track(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        Some(Arc::clone(&self.track) as Arc<dyn TrackLocal + Send + Sync>)
    }
}

#[derive(Debug, Clone)]
pub struct WebRtcMedia {
    pub audio: bool,
    pub video: bool,
    pub stream_id: String,
}

impl Default for WebRtcMedia {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            stream_id: "call".to_string(),
        }
    }
}

impl WebRtcMedia {
    fn sample_track(&self, kind: TrackKind) -> LocalTrack {
        let (mime_type, id) = match kind {
            TrackKind::Audio => (MIME_TYPE_OPUS, "audio"),
            TrackKind::Video => (MIME_TYPE_VP8, "video"),
        };
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_string(),
                ..Default::default()
            },
            id.to_string(),
            self.stream_id.clone(),
        ));
        LocalTrack {
            kind,
            id: id.to_string(),
            handle: Arc::new(SampleTrack {
                track,
                stopped: AtomicBool::new(false),
            }),
        }
    }
}

#[async_trait]
impl MediaSource for WebRtcMedia {
    async fn acquire(&self) -> Result<LocalMedia, CallError> {
        let mut tracks = Vec::new();
        if self.audio {
            tracks.push(self.sample_track(TrackKind::Audio));
        }
        if self.video {
            tracks.push(self.sample_track(TrackKind::Video));
        }
        if tracks.is_empty() {
            return Err(CallError::MediaUnavailable(
                "no audio or video source enabled".into(),
            ));
        }
        Ok(LocalMedia { tracks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::tokio_timeout_test]
    async fn disabled_sources_are_unavailable() {
        let media = WebRtcMedia {
            audio: false,
            video: false,
            ..WebRtcMedia::default()
        };
        let err = media.acquire().await.err().expect("no tracks");
        assert!(err.is_user_actionable());
    }

    #[test_timeout::tokio_timeout_test]
    async fn stopping_is_idempotent() {
        let media = WebRtcMedia::default().acquire().await.unwrap();
        assert_eq!(media.tracks.len(), 2);
        media.stop_all();
        media.stop_all();
        assert!(media.tracks.iter().all(|t| t.handle.is_stopped()));
        assert!(media.tracks.iter().all(|t| t.handle.rtc_track().is_some()));
    }
}
