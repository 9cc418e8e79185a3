use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use huddle_common::{ParticipantId, VoiceError};

use crate::media::{LocalTrack, MediaStream};
use crate::ports::{AnalysisInput, AnalysisTap, AudioBackend, AudioSink, CaptureStream, DevicePreferences};

use super::mixer::{clamp_unit, VolumeMixer};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Local capture flags, published for the speaking detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureState {
    pub active: bool,
    pub track_enabled: bool,
    pub muted: bool,
}

impl CaptureState {
    /// Whether local speech can possibly reach the room.
    pub fn is_live(&self) -> bool {
        self.active && self.track_enabled && !self.muted
    }
}

/// Result of acquiring the microphone.
pub struct AcquiredCapture {
    pub device_id: String,
    pub track: LocalTrack,
    /// Tap on the post-gain signal. `None` when analysis could not be set
    /// up; capture still works without it.
    pub analysis: Option<Box<dyn AnalysisTap>>,
}

impl std::fmt::Debug for AcquiredCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredCapture")
            .field("device_id", &self.device_id)
            .field("track", &self.track)
            .field("analysis", &self.analysis.is_some())
            .finish()
    }
}

/// Whatever carries the outbound track to remote peers.
#[async_trait]
pub trait OutboundTrackTarget: Send + Sync {
    /// Substitutes `track` on every live connection. Returns how many
    /// connections were updated.
    async fn replace_outbound_track(&self, track: LocalTrack) -> Result<usize, VoiceError>;
}

struct AudioState {
    capture: Option<Box<dyn CaptureStream>>,
    muted: bool,
    mic_gain: f32,
    mixer: VolumeMixer,
    sinks: HashMap<ParticipantId, Box<dyn AudioSink>>,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns the microphone capture, every render sink and the volume settings.
pub struct AudioDeviceController {
    backend: Arc<dyn AudioBackend>,
    preferences: Arc<dyn DevicePreferences>,
    output_device: Option<String>,
    state: Mutex<AudioState>,
    capture_tx: watch::Sender<CaptureState>,
}

impl AudioDeviceController {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        preferences: Arc<dyn DevicePreferences>,
        mic_gain: f32,
        master_volume: f32,
        output_device: Option<String>,
    ) -> Self {
        let (capture_tx, _) = watch::channel(CaptureState::default());
        Self {
            backend,
            preferences,
            output_device,
            state: Mutex::new(AudioState {
                capture: None,
                muted: false,
                mic_gain: clamp_unit(mic_gain),
                mixer: VolumeMixer::new(master_volume),
                sinks: HashMap::new(),
            }),
            capture_tx,
        }
    }

    pub fn capture_state(&self) -> watch::Receiver<CaptureState> {
        self.capture_tx.subscribe()
    }

    fn publish_capture_state(&self, state: &AudioState) {
        let track_enabled = state.capture.as_ref().is_some_and(|c| c.track_enabled());
        self.capture_tx.send_replace(CaptureState {
            active: state.capture.is_some(),
            track_enabled,
            muted: state.muted,
        });
    }

    // -- Capture ------------------------------------------------------------

    /// Opens the microphone and builds the gain, analysis and send path.
    ///
    /// `device_id` falls back to the stored preference and then to the
    /// system default. Any previous capture is stopped first. On failure
    /// nothing stays allocated.
    pub async fn acquire_microphone(
        &self,
        device_id: Option<&str>,
        start_muted: bool,
    ) -> Result<AcquiredCapture, VoiceError> {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.capture.take() {
            previous.stop();
        }

        let requested = device_id
            .map(str::to_owned)
            .or_else(|| self.preferences.preferred_input());
        let capture = match self.backend.open_capture(requested.as_deref()).await {
            Ok(capture) => capture,
            Err(e) => {
                self.publish_capture_state(&state);
                warn!(device = ?requested, error = %e, "Microphone acquisition failed");
                return Err(device_unavailable(e));
            }
        };

        capture.set_gain(state.mic_gain);
        capture.set_track_enabled(!start_muted);
        let acquired = self.finish_capture(capture.as_ref());
        state.muted = start_muted;
        state.capture = Some(capture);
        self.publish_capture_state(&state);

        info!(device = %acquired.device_id, muted = start_muted, "Microphone acquired");
        Ok(acquired)
    }

    /// Switches capture to another device while connected.
    ///
    /// The new capture keeps the current mute state. Its track replaces the
    /// old one on every connection through `target`; the old capture is
    /// stopped only once every replacement succeeded. If any replacement
    /// fails the old track is put back and the new capture is discarded.
    ///
    /// Without an active capture the choice is only stored for the next
    /// acquisition and `None` is returned.
    pub async fn switch_microphone_device(
        &self,
        device_id: &str,
        target: &dyn OutboundTrackTarget,
    ) -> Result<Option<AcquiredCapture>, VoiceError> {
        let mut state = self.state.lock().await;
        let Some(previous) = state.capture.take() else {
            self.preferences.store_input(device_id)?;
            debug!(device = device_id, "No active capture, device preference stored");
            return Ok(None);
        };

        let capture = match self.backend.open_capture(Some(device_id)).await {
            Ok(capture) => capture,
            Err(e) => {
                state.capture = Some(previous);
                warn!(device = device_id, error = %e, "Device switch failed to open capture");
                return Err(device_unavailable(e));
            }
        };
        capture.set_gain(state.mic_gain);
        capture.set_track_enabled(!state.muted);

        if let Err(e) = target.replace_outbound_track(capture.outbound_track()).await {
            warn!(device = device_id, error = %e, "Track replacement failed, restoring previous device");
            if let Err(restore) = target.replace_outbound_track(previous.outbound_track()).await {
                warn!(error = %restore, "Restoring previous track failed");
            }
            capture.stop();
            state.capture = Some(previous);
            return Err(e);
        }

        previous.stop();
        let acquired = self.finish_capture(capture.as_ref());
        state.capture = Some(capture);
        self.publish_capture_state(&state);

        info!(device = %acquired.device_id, "Microphone switched");
        Ok(Some(acquired))
    }

    /// Opens the local analysis tap and records the resolved device.
    fn finish_capture(&self, capture: &dyn CaptureStream) -> AcquiredCapture {
        let device_id = capture.device_id().to_string();
        let analysis = match self.backend.open_analyser(AnalysisInput::Capture(capture)) {
            Ok(tap) => Some(tap),
            Err(e) => {
                warn!(device = %device_id, error = %e, "Local analysis unavailable");
                None
            }
        };
        if let Err(e) = self.preferences.store_input(&device_id) {
            warn!(device = %device_id, error = %e, "Failed to persist input device");
        }
        AcquiredCapture {
            device_id,
            track: capture.outbound_track(),
            analysis,
        }
    }

    pub async fn outbound_track(&self) -> Option<LocalTrack> {
        self.state.lock().await.capture.as_ref().map(|c| c.outbound_track())
    }

    pub async fn active_device(&self) -> Option<String> {
        self.state.lock().await.capture.as_ref().map(|c| c.device_id().to_string())
    }

    // -- Mute and gain ------------------------------------------------------

    pub async fn is_muted(&self) -> bool {
        self.state.lock().await.muted
    }

    /// Local mute disables the outbound track; the capture keeps running.
    pub async fn set_local_muted(&self, muted: bool) {
        let mut state = self.state.lock().await;
        state.muted = muted;
        if let Some(capture) = &state.capture {
            capture.set_track_enabled(!muted);
        }
        self.publish_capture_state(&state);
    }

    pub async fn toggle_local_mute(&self) -> bool {
        let muted = !self.is_muted().await;
        self.set_local_muted(muted).await;
        muted
    }

    pub async fn mic_gain(&self) -> f32 {
        self.state.lock().await.mic_gain
    }

    /// Applies to the live gain stage immediately. Returns the clamped gain.
    pub async fn set_microphone_gain(&self, gain: f32) -> f32 {
        let mut state = self.state.lock().await;
        state.mic_gain = clamp_unit(gain);
        if let Some(capture) = &state.capture {
            capture.set_gain(state.mic_gain);
        }
        state.mic_gain
    }

    // -- Render volume ------------------------------------------------------

    pub async fn speaker_muted(&self) -> bool {
        self.state.lock().await.mixer.speaker_muted()
    }

    pub async fn set_speaker_muted(&self, muted: bool) {
        let mut state = self.state.lock().await;
        state.mixer.set_speaker_muted(muted);
        apply_all(&state);
    }

    pub async fn toggle_speaker_mute(&self) -> bool {
        let mut state = self.state.lock().await;
        let muted = !state.mixer.speaker_muted();
        state.mixer.set_speaker_muted(muted);
        apply_all(&state);
        muted
    }

    pub async fn master_volume(&self) -> f32 {
        self.state.lock().await.mixer.master()
    }

    pub async fn set_master_volume(&self, volume: f32) -> f32 {
        let mut state = self.state.lock().await;
        let volume = state.mixer.set_master(volume);
        apply_all(&state);
        volume
    }

    pub async fn participant_volume(&self, participant: &ParticipantId) -> f32 {
        self.state.lock().await.mixer.participant(participant)
    }

    /// Stores the override even when no sink exists yet; it is applied when
    /// the participant's stream attaches.
    pub async fn set_participant_volume(&self, participant: &ParticipantId, volume: f32) -> f32 {
        let mut state = self.state.lock().await;
        let volume = state.mixer.set_participant(participant, volume);
        if let Some(sink) = state.sinks.get(participant) {
            apply(participant, sink.as_ref(), state.mixer.effective(participant));
        }
        volume
    }

    pub async fn effective_volume(&self, participant: &ParticipantId) -> f32 {
        self.state.lock().await.mixer.effective(participant)
    }

    // -- Remote streams -----------------------------------------------------

    /// Routes a remote stream to a render sink at the participant's
    /// effective volume. Replaces an existing sink for the same participant.
    pub async fn attach_remote_stream(
        &self,
        participant: &ParticipantId,
        stream: &MediaStream,
    ) -> Result<f32, VoiceError> {
        let sink = self.backend.open_sink(stream, self.output_device.as_deref())?;
        let mut state = self.state.lock().await;
        let volume = state.mixer.effective(participant);
        if let Err(e) = sink.set_volume(volume) {
            if let Err(release) = sink.release() {
                warn!(participant = %participant, error = %release, "Releasing rejected sink failed");
            }
            return Err(e);
        }
        if let Some(old) = state.sinks.insert(participant.clone(), sink) {
            if let Err(e) = old.release() {
                warn!(participant = %participant, error = %e, "Releasing replaced sink failed");
            }
        }
        debug!(participant = %participant, volume, "Remote stream attached");
        Ok(volume)
    }

    /// Releases the participant's sink. Returns whether one existed.
    pub async fn detach_remote_stream(&self, participant: &ParticipantId) -> Result<bool, VoiceError> {
        let sink = self.state.lock().await.sinks.remove(participant);
        match sink {
            Some(sink) => sink.release().map(|_| true),
            None => Ok(false),
        }
    }

    pub fn open_remote_analyser(&self, stream: &MediaStream) -> Result<Box<dyn AnalysisTap>, VoiceError> {
        self.backend.open_analyser(AnalysisInput::Remote(stream))
    }

    pub async fn sink_count(&self) -> usize {
        self.state.lock().await.sinks.len()
    }

    // -- Teardown -----------------------------------------------------------

    /// Stops capture and releases every remaining sink. Participant volume
    /// overrides are dropped since participant ids do not outlive a
    /// session; master volume and microphone gain are kept. Idempotent.
    pub async fn release_all(&self) {
        let mut state = self.state.lock().await;
        if let Some(capture) = state.capture.take() {
            capture.stop();
            info!(device = capture.device_id(), "Microphone released");
        }
        for (participant, sink) in state.sinks.drain() {
            if let Err(e) = sink.release() {
                warn!(participant = %participant, error = %e, "Sink release failed");
            }
        }
        state.mixer.clear_overrides();
        state.muted = false;
        self.publish_capture_state(&state);
    }
}

fn apply(participant: &ParticipantId, sink: &dyn AudioSink, volume: f32) {
    if let Err(e) = sink.set_volume(volume) {
        warn!(participant = %participant, error = %e, "Failed to apply volume");
    }
}

fn apply_all(state: &AudioState) {
    for (participant, sink) in &state.sinks {
        apply(participant, sink.as_ref(), state.mixer.effective(participant));
    }
}

fn device_unavailable(err: VoiceError) -> VoiceError {
    match err {
        VoiceError::DeviceUnavailable(_) => err,
        other => VoiceError::DeviceUnavailable(other.to_string()),
    }
}
