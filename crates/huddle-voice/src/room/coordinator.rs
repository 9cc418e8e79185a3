use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use huddle_common::{new_correlation_id, EventBus, ParticipantId, RoomId, VoiceError};

use crate::audio::AudioDeviceController;
use crate::detector::SpeechActivityDetector;
use crate::events::{JoinOutcome, LeaveReason, VoiceEvent};
use crate::identity::Identity;
use crate::peer::PeerSessionManager;
use crate::ports::{
    AudioBackend, DevicePreferences, InboundSignal, Member, MembershipStore, PeerConnector, SignalRelay,
};
use crate::settings::VoiceSettings;

use super::session::Session;
use super::state::JoinState;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// External collaborators a client is built from.
pub struct Collaborators {
    pub membership: Arc<dyn MembershipStore>,
    pub relay: Arc<dyn SignalRelay>,
    pub connector: Arc<dyn PeerConnector>,
    pub audio: Arc<dyn AudioBackend>,
    pub preferences: Arc<dyn DevicePreferences>,
}

/// One row of the participant list.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantView {
    pub participant_id: ParticipantId,
    pub is_local: bool,
    pub speaking: bool,
    /// Playback volume override, or microphone gain for the local row.
    pub volume: f32,
    pub streaming: bool,
}

/// Delivers relayed signals to the peer manager until cancelled.
struct SignalPump {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SignalPump {
    fn spawn(peers: Arc<PeerSessionManager>, mut inbound: mpsc::Receiver<InboundSignal>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = inbound.recv() => match next {
                        Some(InboundSignal { from, signal }) => {
                            if let Err(e) = peers.accept_signal(&from, signal).await {
                                debug!(from = %from, error = %e, "Inbound signal not applied");
                            }
                        }
                        None => {
                            warn!("Signal subscription ended");
                            break;
                        }
                    },
                }
            }
        });
        Self { cancel, handle }
    }

    /// Returns once the pump has finished handling its current signal.
    async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Serialises join and leave and exposes the session controls.
///
/// At most one join or leave runs at a time. A join requested while another
/// operation is in flight, or while already in a room, returns
/// [`JoinOutcome::AlreadyActive`] without side effects. A leave waits for
/// an in-flight join and then undoes it.
///
/// Must be created inside a Tokio runtime.
pub struct RoomJoinCoordinator {
    identity: RwLock<Identity>,
    settings: VoiceSettings,
    membership: Arc<dyn MembershipStore>,
    relay: Arc<dyn SignalRelay>,
    audio: Arc<AudioDeviceController>,
    detector: Arc<SpeechActivityDetector>,
    peers: Arc<PeerSessionManager>,
    events: EventBus<VoiceEvent>,
    state: Mutex<JoinState>,
    op_lock: Mutex<()>,
    session: RwLock<Option<Session>>,
    pump: Mutex<Option<SignalPump>>,
}

impl RoomJoinCoordinator {
    pub fn new(identity: Identity, settings: VoiceSettings, collaborators: Collaborators) -> Self {
        let events = EventBus::new(256);
        let audio = Arc::new(AudioDeviceController::new(
            collaborators.audio,
            collaborators.preferences,
            settings.mic_gain,
            settings.master_volume,
            settings.output_device.clone(),
        ));
        let detector = Arc::new(SpeechActivityDetector::new(
            settings.detector.clone(),
            audio.capture_state(),
            events.clone(),
        ));
        let peers = PeerSessionManager::new(
            collaborators.connector,
            Arc::clone(&collaborators.relay),
            Arc::clone(&audio),
            Arc::clone(&detector),
            events.clone(),
        );

        Self {
            identity: RwLock::new(identity),
            settings,
            membership: collaborators.membership,
            relay: collaborators.relay,
            audio,
            detector,
            peers,
            events,
            state: Mutex::new(JoinState::Idle),
            op_lock: Mutex::new(()),
            session: RwLock::new(None),
            pump: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &VoiceSettings {
        &self.settings
    }

    pub async fn state(&self) -> JoinState {
        *self.state.lock().await
    }

    pub async fn identity(&self) -> Identity {
        self.identity.read().await.clone()
    }

    /// Takes effect on the next join.
    pub async fn set_identity(&self, identity: Identity) {
        *self.identity.write().await = identity;
    }

    pub async fn can_join(&self) -> bool {
        self.state().await.is_idle() && self.identity.read().await.is_ready()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn local_participant(&self) -> Option<ParticipantId> {
        self.session
            .read()
            .await
            .as_ref()
            .and_then(|s| s.local_id.clone())
    }

    // -- Join ---------------------------------------------------------------

    pub async fn join(&self, room: &RoomId) -> Result<JoinOutcome, VoiceError> {
        let Ok(_op) = self.op_lock.try_lock() else {
            debug!(room_id = %room, "Join ignored: another operation is in flight");
            return Ok(JoinOutcome::AlreadyActive);
        };
        if !self.state.lock().await.begin_join() {
            debug!(room_id = %room, "Join ignored: already in a room");
            return Ok(JoinOutcome::AlreadyActive);
        }

        let cid = new_correlation_id();
        info!(cid, room_id = %room, "Joining room");
        match self.run_join(room, &cid).await {
            Ok(local) => {
                self.state.lock().await.complete_join();
                info!(cid, room_id = %room, participant = %local, "Joined room");
                self.events.publish(VoiceEvent::Joined {
                    room_id: room.clone(),
                    participant_id: local.clone(),
                });
                Ok(JoinOutcome::Joined(local))
            }
            Err(e) => {
                *self.session.write().await = None;
                self.state.lock().await.abort_join();
                warn!(cid, room_id = %room, error = %e, "Join failed");
                self.events.publish(VoiceEvent::JoinFailed {
                    room_id: room.clone(),
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    async fn run_join(&self, room: &RoomId, cid: &str) -> Result<ParticipantId, VoiceError> {
        let identity = self.identity.read().await.clone();
        if !identity.is_ready() {
            return Err(VoiceError::NotReady("choose a display name before joining".into()));
        }

        let mut session = Session::new(room.clone(), self.settings.start_muted);
        session.mic_gain = self.audio.mic_gain().await;
        session.master_volume = self.audio.master_volume().await;
        session.speaker_muted = self.audio.speaker_muted().await;

        let capture = self.audio.acquire_microphone(None, session.muted).await?;
        session.input_device = Some(capture.device_id.clone());
        *self.session.write().await = Some(session.clone());

        let members = match self.occupancy(room, &identity).await {
            Ok(members) => members,
            Err(e) => {
                self.audio.release_all().await;
                return Err(e);
            }
        };

        for stale in &members.stale {
            match self.membership.remove(room, &stale.participant_id).await {
                Ok(()) => info!(cid, participant = %stale.participant_id, "Removed stale registration"),
                Err(e) => {
                    warn!(cid, participant = %stale.participant_id, error = %e, "Failed to remove stale registration")
                }
            }
        }

        let local = match self.membership.register(room, &identity.profile(session.muted)).await {
            Ok(local) => local,
            Err(e) => {
                self.audio.release_all().await;
                return Err(e);
            }
        };
        if let Some(session) = self.session.write().await.as_mut() {
            session.local_id = Some(local.clone());
        }

        if let Err(e) = self.membership.arm_auto_remove(room, &local).await {
            self.unregister(room, &local, cid).await;
            return Err(e);
        }

        self.peers.bind(room.clone(), local.clone()).await;
        let inbound = match self.relay.subscribe(room, &local).await {
            Ok(inbound) => inbound,
            Err(e) => {
                self.peers.unbind().await;
                if let Err(e) = self.membership.cancel_auto_remove(room, &local).await {
                    warn!(cid, error = %e, "Failed to cancel auto-removal");
                }
                self.unregister(room, &local, cid).await;
                return Err(e);
            }
        };
        *self.pump.lock().await = Some(SignalPump::spawn(Arc::clone(&self.peers), inbound));

        self.detector.set_local_source(local.clone(), capture.analysis).await;
        self.detector.start().await;

        for member in &members.others {
            if let Err(e) = self.peers.connect_to(&member.participant_id).await {
                warn!(cid, participant = %member.participant_id, error = %e, "Could not connect to participant");
            }
        }
        Ok(local)
    }

    /// Current members split into our own leftover registrations and
    /// everyone else. Fails with `RoomFull` when there is no free slot.
    async fn occupancy(&self, room: &RoomId, identity: &Identity) -> Result<Occupancy, VoiceError> {
        let snapshot = self.membership.snapshot(room).await?;
        let count = self.membership.count(room).await?;
        let (stale, others): (Vec<Member>, Vec<Member>) = snapshot
            .into_iter()
            .partition(|m| m.profile.user_id == identity.user_id);

        let occupied = count.saturating_sub(stale.len());
        if occupied >= self.settings.max_participants {
            return Err(VoiceError::RoomFull {
                capacity: self.settings.max_participants,
            });
        }
        Ok(Occupancy { stale, others })
    }

    /// Join rollback after registration: best-effort deregistration, then
    /// release the microphone.
    async fn unregister(&self, room: &RoomId, local: &ParticipantId, cid: &str) {
        if let Err(e) = self.membership.remove(room, local).await {
            warn!(cid, participant = %local, error = %e, "Rollback could not remove registration");
        }
        self.audio.release_all().await;
    }

    // -- Leave --------------------------------------------------------------

    /// Leaves the current room. Returns `false` when there was nothing to
    /// leave. Always ends `Idle` once started; individual cleanup failures
    /// are logged and reported as [`VoiceEvent::Error`].
    pub async fn leave(&self, reason: LeaveReason) -> bool {
        let _op = self.op_lock.lock().await;
        if !self.state.lock().await.begin_leave() {
            debug!(%reason, "Leave ignored: not in a room");
            return false;
        }

        self.peers.set_closing(true);
        let session = self.session.write().await.take();
        if let Some(pump) = self.pump.lock().await.take() {
            pump.stop().await;
        }

        if let Some(Session {
            room_id,
            local_id: Some(local),
            ..
        }) = &session
        {
            if let Err(e) = self.membership.cancel_auto_remove(room_id, local).await {
                warn!(room_id = %room_id, error = %e, "Failed to cancel auto-removal");
            }
            if reason != LeaveReason::RemovedRemotely {
                if let Err(e) = self.membership.remove(room_id, local).await {
                    warn!(room_id = %room_id, participant = %local, error = %e, "Deregistration failed");
                    self.events
                        .publish(VoiceEvent::Error(format!("could not leave {room_id} cleanly: {e}")));
                }
            }
        }

        self.detector.stop().await;
        self.detector.reset().await;
        let closed = self.peers.close_all().await;
        self.peers.unbind().await;
        self.peers.set_closing(false);
        self.audio.release_all().await;
        self.state.lock().await.finish_leave();

        if let Some(session) = session {
            info!(room_id = %session.room_id, %reason, links = closed, "Left room");
            self.events.publish(VoiceEvent::Left {
                room_id: session.room_id,
                reason,
            });
        }
        true
    }

    pub async fn shutdown(&self) {
        self.leave(LeaveReason::Shutdown).await;
    }

    // -- Session controls ---------------------------------------------------

    /// Flips local mute and publishes it to the membership store.
    pub async fn toggle_local_mute(&self) -> bool {
        let muted = self.audio.toggle_local_mute().await;
        let registration = {
            let mut session = self.session.write().await;
            session.as_mut().and_then(|s| {
                s.muted = muted;
                s.local_id.clone().map(|local| (s.room_id.clone(), local))
            })
        };
        if let Some((room, local)) = registration {
            if let Err(e) = self.membership.set_muted(&room, &local, muted).await {
                warn!(room_id = %room, error = %e, "Failed to publish mute state");
            }
        }
        self.events.publish(VoiceEvent::MuteChanged { muted });
        muted
    }

    pub async fn toggle_speaker_mute(&self) -> bool {
        let muted = self.audio.toggle_speaker_mute().await;
        if let Some(session) = self.session.write().await.as_mut() {
            session.speaker_muted = muted;
        }
        self.events.publish(VoiceEvent::SpeakerMuteChanged { muted });
        muted
    }

    pub async fn set_microphone_gain(&self, gain: f32) -> f32 {
        let gain = self.audio.set_microphone_gain(gain).await;
        if let Some(session) = self.session.write().await.as_mut() {
            session.mic_gain = gain;
        }
        self.events.publish(VoiceEvent::MicGainChanged { gain });
        gain
    }

    pub async fn set_master_volume(&self, volume: f32) -> f32 {
        let volume = self.audio.set_master_volume(volume).await;
        if let Some(session) = self.session.write().await.as_mut() {
            session.master_volume = volume;
        }
        self.events.publish(VoiceEvent::VolumeChanged {
            participant_id: None,
            volume,
        });
        volume
    }

    pub async fn set_participant_volume(&self, participant: &ParticipantId, volume: f32) -> f32 {
        let volume = self.audio.set_participant_volume(participant, volume).await;
        if let Some(session) = self.session.write().await.as_mut() {
            session.volume_overrides.insert(participant.clone(), volume);
        }
        self.events.publish(VoiceEvent::VolumeChanged {
            participant_id: Some(participant.clone()),
            volume,
        });
        volume
    }

    /// Moves capture to another input device without dropping any link.
    /// Outside a room the device is only remembered for the next join.
    pub async fn switch_microphone_device(&self, device_id: &str) -> Result<(), VoiceError> {
        let switched = self
            .audio
            .switch_microphone_device(device_id, self.peers.as_ref())
            .await?;
        let device_id = match switched {
            Some(capture) => {
                if let Some(local) = self.local_participant().await {
                    self.detector.set_local_source(local, capture.analysis).await;
                }
                capture.device_id
            }
            None => device_id.to_string(),
        };
        if let Some(session) = self.session.write().await.as_mut() {
            session.input_device = Some(device_id.clone());
        }
        info!(device = %device_id, "Input device switched");
        self.events.publish(VoiceEvent::DeviceSwitched { device_id });
        Ok(())
    }

    /// Records a remote participant's published mute flag.
    pub async fn update_remote_mute(&self, participant: &ParticipantId, muted: bool) {
        self.detector.set_participant_muted(participant, muted).await;
    }

    /// The local participant followed by every linked remote one.
    pub async fn participants(&self) -> Vec<ParticipantView> {
        let speaking = self.detector.speaking_snapshot().await;
        let is_speaking = |id: &ParticipantId| speaking.get(id).copied().unwrap_or(false);
        let mut views = Vec::new();

        if let Some(local) = self.local_participant().await {
            views.push(ParticipantView {
                speaking: is_speaking(&local),
                volume: self.audio.mic_gain().await,
                streaming: self.audio.outbound_track().await.is_some(),
                participant_id: local,
                is_local: true,
            });
        }
        for link in self.peers.links().await {
            views.push(ParticipantView {
                speaking: is_speaking(&link.participant_id),
                volume: self.audio.participant_volume(&link.participant_id).await,
                streaming: link.streaming,
                participant_id: link.participant_id,
                is_local: false,
            });
        }
        views
    }

    pub fn peers(&self) -> &PeerSessionManager {
        &self.peers
    }
}

struct Occupancy {
    stale: Vec<Member>,
    others: Vec<Member>,
}
