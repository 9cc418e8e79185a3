use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use huddle_common::{EventBus, ParticipantId};

use crate::audio::CaptureState;
use crate::events::VoiceEvent;
use crate::ports::AnalysisTap;
use crate::settings::DetectorSettings;

use super::hysteresis::{next_speaking, Thresholds};
use super::levels::Levels;

struct LocalSource {
    id: ParticipantId,
    tap: Option<Box<dyn AnalysisTap>>,
}

#[derive(Default)]
struct DetectorState {
    local: Option<LocalSource>,
    remotes: HashMap<ParticipantId, Box<dyn AnalysisTap>>,
    /// Remote participants known to be muted. They are not sampled.
    muted: HashSet<ParticipantId>,
    speaking: HashMap<ParticipantId, bool>,
}

/// Periodically samples every registered source and reports speaking
/// transitions.
///
/// One sampling task runs while started. Only changes are published, as
/// [`VoiceEvent::SpeakingChanged`].
pub struct SpeechActivityDetector {
    settings: DetectorSettings,
    state: Arc<Mutex<DetectorState>>,
    capture: watch::Receiver<CaptureState>,
    events: EventBus<VoiceEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechActivityDetector {
    pub fn new(
        settings: DetectorSettings,
        capture: watch::Receiver<CaptureState>,
        events: EventBus<VoiceEvent>,
    ) -> Self {
        Self {
            settings,
            state: Arc::new(Mutex::new(DetectorState::default())),
            capture,
            events,
            task: Mutex::new(None),
        }
    }

    // -- Sources ------------------------------------------------------------

    /// Sets the local source. `tap` may be `None` when analysis is
    /// unavailable; the participant is then never reported as speaking.
    pub async fn set_local_source(&self, id: ParticipantId, tap: Option<Box<dyn AnalysisTap>>) {
        let mut state = self.state.lock().await;
        if let Some(mut old) = state.local.take() {
            if let Some(tap) = old.tap.as_mut() {
                tap.close();
            }
            if old.id != id {
                state.speaking.remove(&old.id);
            }
        }
        state.speaking.entry(id.clone()).or_insert(false);
        state.local = Some(LocalSource { id, tap });
    }

    /// Adds a speaking entry for a participant before its audio arrives.
    pub async fn track(&self, id: &ParticipantId) {
        self.state.lock().await.speaking.entry(id.clone()).or_insert(false);
    }

    pub async fn register_remote(&self, id: ParticipantId, tap: Box<dyn AnalysisTap>) {
        let mut state = self.state.lock().await;
        state.speaking.entry(id.clone()).or_insert(false);
        if let Some(mut old) = state.remotes.insert(id, tap) {
            old.close();
        }
    }

    /// Closes the participant's tap and forgets its speaking and mute
    /// state. No event is published.
    pub async fn unregister_remote(&self, id: &ParticipantId) {
        let mut state = self.state.lock().await;
        if let Some(mut tap) = state.remotes.remove(id) {
            tap.close();
        }
        state.speaking.remove(id);
        state.muted.remove(id);
    }

    /// Refreshes the cached mute flag of a remote participant.
    pub async fn set_participant_muted(&self, id: &ParticipantId, muted: bool) {
        let mut state = self.state.lock().await;
        if muted {
            state.muted.insert(id.clone());
        } else {
            state.muted.remove(id);
        }
    }

    pub async fn is_speaking(&self, id: &ParticipantId) -> bool {
        self.state.lock().await.speaking.get(id).copied().unwrap_or(false)
    }

    pub async fn speaking_snapshot(&self) -> HashMap<ParticipantId, bool> {
        self.state.lock().await.speaking.clone()
    }

    /// Closes every tap and clears all state.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut local) = state.local.take() {
            if let Some(tap) = local.tap.as_mut() {
                tap.close();
            }
        }
        for (_, mut tap) in state.remotes.drain() {
            tap.close();
        }
        state.muted.clear();
        state.speaking.clear();
    }

    // -- Sampling -----------------------------------------------------------

    /// Runs one sampling pass immediately.
    pub async fn poll_once(&self) {
        sample_and_publish(&self.state, &self.capture, &self.settings.thresholds, &self.events).await;
    }

    /// Starts the sampling task. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        let state = Arc::clone(&self.state);
        let capture = self.capture.clone();
        let events = self.events.clone();
        let thresholds = self.settings.thresholds;
        let period = self.settings.interval;

        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                sample_and_publish(&state, &capture, &thresholds, &events).await;
            }
        }));
        info!(interval_ms = period.as_millis() as u64, "Speaking detector started");
    }

    /// Stops the sampling task and waits for it to finish, so no event is
    /// published after this returns. Safe to call repeatedly.
    pub async fn stop(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            info!("Speaking detector stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }
}

impl Drop for SpeechActivityDetector {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

async fn sample_and_publish(
    state: &Mutex<DetectorState>,
    capture: &watch::Receiver<CaptureState>,
    thresholds: &Thresholds,
    events: &EventBus<VoiceEvent>,
) {
    let capture = *capture.borrow();
    let changes = {
        let mut state = state.lock().await;
        sample_all(&mut state, capture, thresholds)
    };
    for (participant_id, speaking) in changes {
        debug!(participant = %participant_id, speaking, "Speaking state changed");
        events.publish(VoiceEvent::SpeakingChanged {
            participant_id,
            speaking,
        });
    }
}

fn sample_all(
    state: &mut DetectorState,
    capture: CaptureState,
    thresholds: &Thresholds,
) -> Vec<(ParticipantId, bool)> {
    let DetectorState {
        local,
        remotes,
        muted,
        speaking,
    } = state;
    let mut changes = Vec::new();

    if let Some(source) = local {
        let was = speaking.get(&source.id).copied().unwrap_or(false);
        let now = if !capture.is_live() {
            false
        } else {
            match source.tap.as_mut().and_then(|tap| tap.sample()) {
                Some(frame) => next_speaking(was, Levels::measure(&frame), thresholds),
                None => was,
            }
        };
        record(speaking, &source.id, was, now, &mut changes);
    }

    for (id, tap) in remotes.iter_mut() {
        if muted.contains(id) {
            continue;
        }
        let Some(frame) = tap.sample() else {
            continue;
        };
        let was = speaking.get(id).copied().unwrap_or(false);
        let now = next_speaking(was, Levels::measure(&frame), thresholds);
        record(speaking, id, was, now, &mut changes);
    }

    changes
}

fn record(
    speaking: &mut HashMap<ParticipantId, bool>,
    id: &ParticipantId,
    was: bool,
    now: bool,
    changes: &mut Vec<(ParticipantId, bool)>,
) {
    speaking.insert(id.clone(), now);
    if was != now {
        changes.push((id.clone(), now));
    }
}
