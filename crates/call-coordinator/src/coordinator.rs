use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use signal_proto::{RoomStatus, SessionDescription, SignalingRoom};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::CoordinatorConfig;
use crate::error::CallError;
use crate::ledger::CandidateLedger;
use crate::mailbox::SignalingMailbox;
use crate::media::{LocalMedia, MediaSource, WebRtcMedia};
use crate::peer::{PeerConnector, PeerEvent, PeerEvents, PeerSession, PeerState, WebRtcConnector};
use crate::recording::RecordingSink;

pub use signal_proto::SignalRole as Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    AcquiringMedia,
    RoleProbing,
    Offering,
    Answering,
    Polling,
    Connected,
    Ended,
}

/// Answerer only over a live offer nobody answered yet. Missing rooms, ended
/// rooms and stale answered handshakes all mean a fresh offer.
pub fn choose_role(room: Option<&SignalingRoom>) -> Role {
    match room {
        Some(room) if room.awaiting_answer() => Role::Answer,
        _ => Role::Offer,
    }
}

struct ActiveCall {
    role: Role,
    peer: Arc<dyn PeerSession>,
    media: LocalMedia,
    cancel: CancellationToken,
    _tasks: Vec<JoinHandle<()>>,
}

/// Drives one participant's side of a call through the signaling mailbox.
pub struct Coordinator {
    session_id: String,
    config: CoordinatorConfig,
    mailbox: Arc<dyn SignalingMailbox>,
    media: Arc<dyn MediaSource>,
    connector: Arc<dyn PeerConnector>,
    phase: Arc<watch::Sender<CallPhase>>,
    remote_ended: Arc<watch::Sender<bool>>,
    active: Mutex<Option<ActiveCall>>,
    /// Cancels an in-flight `start_call`. Lives outside `active` so hang-up
    /// never waits behind setup.
    setup: StdMutex<Option<CancellationToken>>,
    /// Set once this side may have written an offer or answer.
    published: AtomicBool,
    recordings: Option<Arc<dyn RecordingSink>>,
}

impl Coordinator {
    pub fn new(
        session_id: impl Into<String>,
        mailbox: Arc<dyn SignalingMailbox>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            config,
            mailbox,
            media: Arc::new(WebRtcMedia::default()),
            connector: Arc::new(WebRtcConnector),
            phase: Arc::new(watch::channel(CallPhase::Idle).0),
            remote_ended: Arc::new(watch::channel(false).0),
            active: Mutex::new(None),
            setup: StdMutex::new(None),
            published: AtomicBool::new(false),
            recordings: None,
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaSource>) -> Self {
        self.media = media;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_recording_sink(mut self, sink: Arc<dyn RecordingSink>) -> Self {
        self.recordings = Some(sink);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> CallPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<CallPhase> {
        self.phase.subscribe()
    }

    /// Flips to `true` once the other participant ends the room. Teardown is
    /// still the caller's job via [`hang_up`](Self::hang_up).
    pub fn subscribe_remote_ended(&self) -> watch::Receiver<bool> {
        self.remote_ended.subscribe()
    }

    pub async fn role(&self) -> Option<Role> {
        self.active.lock().await.as_ref().map(|call| call.role)
    }

    fn set_phase(&self, phase: CallPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(session = %self.session_id, from = ?previous, to = ?phase, "call phase");
        }
    }

    pub async fn start_call(&self) -> Result<Role, CallError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(CallError::AlreadyActive);
        }
        self.remote_ended.send_replace(false);
        self.published.store(false, Ordering::SeqCst);
        let setup = CancellationToken::new();
        *lock_setup(&self.setup) = Some(setup.clone());

        let result = self.set_up(&setup).await;
        lock_setup(&self.setup).take();
        match result {
            Ok(call) => {
                let role = call.role;
                info!(session = %self.session_id, ?role, "call negotiation started");
                *active = Some(call);
                Ok(role)
            }
            Err(err) => {
                if !matches!(err, CallError::HungUp) {
                    warn!(session = %self.session_id, error = %err, "call setup failed");
                }
                self.set_phase(CallPhase::Ended);
                Err(err)
            }
        }
    }

    async fn set_up(&self, setup: &CancellationToken) -> Result<ActiveCall, CallError> {
        self.set_phase(CallPhase::AcquiringMedia);
        let media = guarded(setup, self.media.acquire())
            .await
            .inspect_err(|err| {
                if err.is_user_actionable() {
                    warn!(session = %self.session_id, error = %err, "local media unavailable");
                }
            })?;

        match self.negotiate(media.clone(), setup).await {
            // A hang-up that lands after the handshake still wins.
            Ok(call) if setup.is_cancelled() => {
                call.cancel.cancel();
                call.media.stop_all();
                close_quietly(&self.session_id, call.peer.as_ref()).await;
                Err(CallError::HungUp)
            }
            Ok(call) => Ok(call),
            Err(err) => {
                media.stop_all();
                Err(err)
            }
        }
    }

    async fn negotiate(
        &self,
        media: LocalMedia,
        setup: &CancellationToken,
    ) -> Result<ActiveCall, CallError> {
        let (peer, events) =
            guarded(setup, self.connector.connect(&self.config.ice_servers, &media)).await?;
        match self.open_handshake(peer.as_ref(), setup).await {
            Ok(handshake) => Ok(self.spawn_call(handshake, peer, events, media)),
            Err(err) => {
                close_quietly(&self.session_id, peer.as_ref()).await;
                Err(err)
            }
        }
    }

    async fn open_handshake(
        &self,
        peer: &dyn PeerSession,
        setup: &CancellationToken,
    ) -> Result<Handshake, CallError> {
        self.set_phase(CallPhase::RoleProbing);
        let room = guarded(setup, self.mailbox.get_room()).await?;
        let role = choose_role(room.as_ref());

        match role {
            Role::Offer => {
                self.set_phase(CallPhase::Offering);
                let offer = guarded(setup, peer.create_offer()).await?;
                guarded(setup, peer.set_local_description(&offer)).await?;
                self.published.store(true, Ordering::SeqCst);
                guarded(setup, self.mailbox.post_offer(&offer)).await?;
                Ok(Handshake {
                    role,
                    local: offer,
                    generation: None,
                })
            }
            Role::Answer => {
                self.set_phase(CallPhase::Answering);
                let room = room.ok_or_else(|| CallError::Malformed("room vanished".into()))?;
                let offer = room
                    .offer
                    .as_ref()
                    .ok_or_else(|| CallError::Malformed("room has no offer".into()))?;
                guarded(setup, peer.set_remote_description(offer)).await?;
                let answer = guarded(setup, peer.create_answer()).await?;
                guarded(setup, peer.set_local_description(&answer)).await?;
                self.published.store(true, Ordering::SeqCst);
                guarded(setup, self.mailbox.post_answer(&answer)).await?;
                Ok(Handshake {
                    role,
                    local: answer,
                    generation: Some(room.generation),
                })
            }
        }
    }

    fn spawn_call(
        &self,
        handshake: Handshake,
        peer: Arc<dyn PeerSession>,
        events: PeerEvents,
        media: LocalMedia,
    ) -> ActiveCall {
        let cancel = CancellationToken::new();
        self.set_phase(CallPhase::Polling);

        let forwarder = tokio::spawn(forward_events(
            self.session_id.clone(),
            handshake.role,
            Arc::clone(&self.mailbox),
            Arc::clone(&self.phase),
            events,
            cancel.clone(),
        ));

        let poller = PollLoop {
            session_id: self.session_id.clone(),
            role: handshake.role,
            mailbox: Arc::clone(&self.mailbox),
            peer: Arc::clone(&peer),
            // The answerer set the remote offer during the handshake.
            remote_applied: handshake.role == Role::Answer,
            local: handshake.local,
            generation: handshake.generation,
            ledger: CandidateLedger::new(),
            remote_ended: Arc::clone(&self.remote_ended),
            seen_room: false,
            superseded: false,
        };
        let poller = tokio::spawn(poller.run(cancel.clone(), self.config.poll_interval));

        ActiveCall {
            role: handshake.role,
            peer,
            media,
            cancel,
            _tasks: vec![forwarder, poller],
        }
    }

    /// Stops polling right away and releases local media and the peer, then
    /// tells the other side. Never fails: an unreachable or stalled mailbox
    /// only gets logged once `hang_up_grace` runs out.
    pub async fn hang_up(&self) {
        let setup = lock_setup(&self.setup).take();
        if let Some(setup) = setup {
            setup.cancel();
        }
        let call = self.active.lock().await.take();
        let had_call = call.is_some();
        if let Some(call) = call {
            call.cancel.cancel();
            call.media.stop_all();
            close_quietly(&self.session_id, call.peer.as_ref()).await;
            info!(session = %self.session_id, role = ?call.role, "call ended");
        }
        self.set_phase(CallPhase::Ended);

        let published = self.published.swap(false, Ordering::SeqCst);
        if had_call || published {
            self.end_room_within_grace().await;
        }
    }

    async fn end_room_within_grace(&self) {
        match tokio::time::timeout(self.config.hang_up_grace, self.mailbox.end_room()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(session = %self.session_id, error = %err, "failed to end room");
            }
            Err(_) => {
                warn!(
                    session = %self.session_id,
                    grace = ?self.config.hang_up_grace,
                    "mailbox did not acknowledge end in time"
                );
            }
        }
    }

    /// Hands a finished recording to the configured sink. `None` when no sink
    /// is set.
    pub async fn store_recording(&self, blob: Vec<u8>) -> Result<Option<String>, CallError> {
        let Some(sink) = &self.recordings else {
            return Ok(None);
        };
        let url = sink.store(&self.session_id, blob).await?;
        info!(session = %self.session_id, %url, "recording stored");
        Ok(Some(url))
    }
}

/// Races one setup step against hang-up.
async fn guarded<T>(
    setup: &CancellationToken,
    step: impl Future<Output = Result<T, CallError>>,
) -> Result<T, CallError> {
    tokio::select! {
        biased;
        _ = setup.cancelled() => Err(CallError::HungUp),
        result = step => result,
    }
}

async fn close_quietly(session_id: &str, peer: &dyn PeerSession) {
    if let Err(err) = peer.close().await {
        debug!(session = %session_id, error = %err, "peer close failed");
    }
}

fn lock_setup(
    setup: &StdMutex<Option<CancellationToken>>,
) -> MutexGuard<'_, Option<CancellationToken>> {
    setup.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(setup) = lock_setup(&self.setup).take() {
            setup.cancel();
        }
        if let Some(call) = self.active.get_mut().take() {
            call.cancel.cancel();
            call.media.stop_all();
        }
    }
}

struct Handshake {
    role: Role,
    local: SessionDescription,
    /// Room generation the answer was written against.
    generation: Option<u64>,
}

async fn forward_events(
    session_id: String,
    role: Role,
    mailbox: Arc<dyn SignalingMailbox>,
    phase: Arc<watch::Sender<CallPhase>>,
    mut events: PeerEvents,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                trace!(session = %session_id, ?role, "sending local candidate");
                if let Err(err) = mailbox.add_candidate(role, &candidate).await {
                    warn!(session = %session_id, error = %err, "failed to publish local candidate");
                }
            }
            PeerEvent::StateChanged(PeerState::Connected) => {
                let changed = phase.send_if_modified(|current| {
                    if matches!(*current, CallPhase::Ended | CallPhase::Connected) {
                        return false;
                    }
                    *current = CallPhase::Connected;
                    true
                });
                if changed {
                    info!(session = %session_id, ?role, "peer connected");
                }
            }
            PeerEvent::StateChanged(PeerState::Failed) => {
                warn!(session = %session_id, "peer connection failed");
            }
            PeerEvent::StateChanged(state) => {
                debug!(session = %session_id, ?state, "peer state");
            }
        }
    }
}

enum Tick {
    Continue,
    RemoteEnded,
}

struct PollLoop {
    session_id: String,
    role: Role,
    mailbox: Arc<dyn SignalingMailbox>,
    peer: Arc<dyn PeerSession>,
    local: SessionDescription,
    remote_applied: bool,
    generation: Option<u64>,
    ledger: CandidateLedger,
    remote_ended: Arc<watch::Sender<bool>>,
    seen_room: bool,
    superseded: bool,
}

impl PollLoop {
    async fn run(mut self, cancel: CancellationToken, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.tick() => outcome,
            };
            if let Tick::RemoteEnded = outcome {
                info!(session = %self.session_id, "room ended by the other participant");
                self.remote_ended.send_replace(true);
                break;
            }
        }
        trace!(session = %self.session_id, "poll loop stopped");
    }

    async fn tick(&mut self) -> Tick {
        let room = match self.mailbox.get_room().await {
            Ok(Some(room)) => room,
            Ok(None) if self.seen_room => return Tick::RemoteEnded,
            Ok(None) => {
                trace!(session = %self.session_id, "room not published yet");
                return Tick::Continue;
            }
            Err(err) => {
                debug!(session = %self.session_id, error = %err, "room poll failed, retrying");
                return Tick::Continue;
            }
        };
        self.seen_room = true;
        if room.status == RoomStatus::Ended {
            return Tick::RemoteEnded;
        }
        if !self.is_current(&room) {
            if !self.superseded {
                // Glare or a rejoin replaced our negotiation. Keep serving the
                // peer we already have.
                warn!(
                    session = %self.session_id,
                    role = ?self.role,
                    generation = room.generation,
                    "room now carries a different negotiation"
                );
                self.superseded = true;
            }
            return Tick::Continue;
        }

        if !self.remote_applied {
            self.apply_answer(&room).await;
        }
        let fresh = self.ledger.observe(room.candidates_for(self.role.opposite()));
        if fresh > 0 {
            debug!(session = %self.session_id, fresh, "remote candidates queued");
        }
        self.drain_candidates().await;
        Tick::Continue
    }

    fn is_current(&self, room: &SignalingRoom) -> bool {
        match self.role {
            Role::Offer => room
                .offer
                .as_ref()
                .is_some_and(|offer| offer.sdp == self.local.sdp),
            Role::Answer => self.generation == Some(room.generation),
        }
    }

    async fn apply_answer(&mut self, room: &SignalingRoom) {
        let Some(answer) = room.answer.as_ref() else {
            return;
        };
        match self.peer.set_remote_description(answer).await {
            Ok(()) => {
                self.remote_applied = true;
                self.generation = Some(room.generation);
                info!(
                    session = %self.session_id,
                    answered_by = room.answered_by.as_deref().unwrap_or_default(),
                    "remote answer applied"
                );
            }
            Err(err) => {
                warn!(session = %self.session_id, error = %err, "failed to apply answer, retrying");
            }
        }
    }

    async fn drain_candidates(&mut self) {
        for candidate in self.ledger.take_pending() {
            match self.peer.add_ice_candidate(&candidate).await {
                Ok(()) => self.ledger.mark_applied(&candidate),
                Err(err) => {
                    trace!(session = %self.session_id, error = %err, "candidate deferred");
                    self.ledger.requeue(candidate);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_proto::{IceCandidateRecord, SessionDescription};

    fn room(status: RoomStatus, offer: bool, answer: bool) -> SignalingRoom {
        SignalingRoom {
            session_id: "s".into(),
            status,
            offered_by: offer.then(|| "t".to_string()),
            answered_by: answer.then(|| "l".to_string()),
            offer: offer.then(|| SessionDescription::offer("v=0 o")),
            answer: answer.then(|| SessionDescription::answer("v=0 a")),
            offer_candidates: vec![IceCandidateRecord::new("c1")],
            answer_candidates: Vec::new(),
            generation: 1,
            updated_at: 0,
        }
    }

    #[test_timeout::timeout]
    fn live_unanswered_offer_always_means_answerer() {
        assert_eq!(choose_role(Some(&room(RoomStatus::Open, true, false))), Role::Answer);
    }

    #[test_timeout::timeout]
    fn everything_else_means_offerer() {
        assert_eq!(choose_role(None), Role::Offer);
        assert_eq!(choose_role(Some(&room(RoomStatus::Answered, true, true))), Role::Offer);
        assert_eq!(choose_role(Some(&room(RoomStatus::Ended, true, false))), Role::Offer);
        assert_eq!(choose_role(Some(&room(RoomStatus::Ended, true, true))), Role::Offer);
    }
}
