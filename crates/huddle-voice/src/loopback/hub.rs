use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use huddle_common::{ParticipantId, RoomId, VoiceError};

use crate::ports::{InboundSignal, Member, MembershipStore, Profile, SignalRelay};
use crate::protocol::VoiceSignal;

use super::lock;

/// Hub operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubOperation {
    Register,
    Remove,
    Snapshot,
    ArmAutoRemove,
    Subscribe,
    Send,
}

type SubscriberKey = (RoomId, ParticipantId);

#[derive(Default)]
struct HubState {
    rooms: HashMap<RoomId, Vec<Member>>,
    armed: HashSet<SubscriberKey>,
    subscribers: HashMap<SubscriberKey, mpsc::Sender<InboundSignal>>,
    faults: HashMap<HubOperation, String>,
    register_delay: Duration,
}

/// Shared membership store and signal relay.
#[derive(Default)]
pub struct LoopbackHub {
    state: Mutex<HubState>,
    registrations: AtomicUsize,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `operation` fail with `reason` until [`heal`](Self::heal).
    pub fn fail(&self, operation: HubOperation, reason: &str) {
        lock(&self.state).faults.insert(operation, reason.to_string());
    }

    pub fn heal(&self, operation: HubOperation) {
        lock(&self.state).faults.remove(&operation);
    }

    /// Slows every registration down, widening the join window.
    pub fn set_register_delay(&self, delay: Duration) {
        lock(&self.state).register_delay = delay;
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn members(&self, room: &RoomId) -> Vec<Member> {
        lock(&self.state).rooms.get(room).cloned().unwrap_or_default()
    }

    pub fn is_armed(&self, room: &RoomId, participant: &ParticipantId) -> bool {
        lock(&self.state)
            .armed
            .contains(&(room.clone(), participant.clone()))
    }

    pub fn is_subscribed(&self, room: &RoomId, participant: &ParticipantId) -> bool {
        lock(&self.state)
            .subscribers
            .get(&(room.clone(), participant.clone()))
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Inserts a registration directly, bypassing faults and delays.
    pub fn seed_member(&self, room: &RoomId, profile: Profile) -> ParticipantId {
        let participant_id = ParticipantId::new();
        lock(&self.state)
            .rooms
            .entry(room.clone())
            .or_default()
            .push(Member {
                participant_id: participant_id.clone(),
                profile,
            });
        participant_id
    }

    /// Simulates a client vanishing. The registration is dropped only if
    /// auto-removal was armed. Returns whether it was dropped.
    pub fn drop_client(&self, room: &RoomId, participant: &ParticipantId) -> bool {
        let mut state = lock(&self.state);
        let key = (room.clone(), participant.clone());
        state.subscribers.remove(&key);
        if !state.armed.remove(&key) {
            return false;
        }
        remove_member(&mut state, room, participant);
        true
    }

    fn check(&self, operation: HubOperation) -> Result<(), VoiceError> {
        match lock(&self.state).faults.get(&operation) {
            Some(reason) => Err(VoiceError::SignalingFailure(reason.clone())),
            None => Ok(()),
        }
    }
}

fn remove_member(state: &mut HubState, room: &RoomId, participant: &ParticipantId) {
    if let Some(members) = state.rooms.get_mut(room) {
        members.retain(|m| &m.participant_id != participant);
        if members.is_empty() {
            state.rooms.remove(room);
        }
    }
}

#[async_trait]
impl MembershipStore for LoopbackHub {
    async fn register(&self, room: &RoomId, profile: &Profile) -> Result<ParticipantId, VoiceError> {
        let delay = lock(&self.state).register_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check(HubOperation::Register)?;
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(self.seed_member(room, profile.clone()))
    }

    async fn remove(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), VoiceError> {
        self.check(HubOperation::Remove)?;
        let mut state = lock(&self.state);
        state.armed.remove(&(room.clone(), participant.clone()));
        remove_member(&mut state, room, participant);
        Ok(())
    }

    async fn snapshot(&self, room: &RoomId) -> Result<Vec<Member>, VoiceError> {
        self.check(HubOperation::Snapshot)?;
        Ok(self.members(room))
    }

    async fn count(&self, room: &RoomId) -> Result<usize, VoiceError> {
        self.check(HubOperation::Snapshot)?;
        Ok(self.members(room).len())
    }

    async fn arm_auto_remove(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), VoiceError> {
        self.check(HubOperation::ArmAutoRemove)?;
        lock(&self.state)
            .armed
            .insert((room.clone(), participant.clone()));
        Ok(())
    }

    async fn cancel_auto_remove(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), VoiceError> {
        lock(&self.state)
            .armed
            .remove(&(room.clone(), participant.clone()));
        Ok(())
    }

    async fn set_muted(&self, room: &RoomId, participant: &ParticipantId, muted: bool) -> Result<(), VoiceError> {
        let mut state = lock(&self.state);
        let member = state
            .rooms
            .get_mut(room)
            .and_then(|members| members.iter_mut().find(|m| &m.participant_id == participant));
        match member {
            Some(member) => {
                member.profile.muted = muted;
                Ok(())
            }
            None => Err(VoiceError::SignalingFailure(format!("{participant} is not registered"))),
        }
    }
}

#[async_trait]
impl SignalRelay for LoopbackHub {
    async fn send(
        &self,
        room: &RoomId,
        from: &ParticipantId,
        to: &ParticipantId,
        signal: VoiceSignal,
    ) -> Result<(), VoiceError> {
        self.check(HubOperation::Send)?;
        let key = (room.clone(), to.clone());
        let tx = lock(&self.state).subscribers.get(&key).cloned();
        let Some(tx) = tx else {
            debug!(to = %to, "No subscriber, signal dropped");
            return Ok(());
        };
        if tx
            .send(InboundSignal {
                from: from.clone(),
                signal,
            })
            .await
            .is_err()
        {
            lock(&self.state).subscribers.remove(&key);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        room: &RoomId,
        local: &ParticipantId,
    ) -> Result<mpsc::Receiver<InboundSignal>, VoiceError> {
        self.check(HubOperation::Subscribe)?;
        let (tx, rx) = mpsc::channel(256);
        lock(&self.state)
            .subscribers
            .insert((room.clone(), local.clone()), tx);
        Ok(rx)
    }
}
