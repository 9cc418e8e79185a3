use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use huddle_common::{ParticipantId, VoiceError};

use super::*;
use crate::loopback::LoopbackAudio;
use crate::media::{LocalTrack, MediaStream};
use crate::ports::DevicePreferences;
use crate::prefs::MemoryPreferences;

fn controller(audio: &LoopbackAudio) -> (AudioDeviceController, Arc<MemoryPreferences>) {
    let prefs = Arc::new(MemoryPreferences::default());
    let controller = AudioDeviceController::new(Arc::new(audio.clone()), prefs.clone(), 1.0, 1.0, None);
    (controller, prefs)
}

/// Records replaced tracks. With `fail` set, the first replacement fails.
#[derive(Default)]
struct RecordingTarget {
    tracks: Mutex<Vec<String>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl OutboundTrackTarget for RecordingTarget {
    async fn replace_outbound_track(&self, track: LocalTrack) -> Result<usize, VoiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 && self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::peer(&ParticipantId::from("bob"), "rejected"));
        }
        self.tracks.lock().unwrap().push(track.id().to_string());
        Ok(1)
    }
}

#[tokio::test]
async fn acquire_uses_preference_and_persists_resolved_device() {
    let audio = LoopbackAudio::with_devices(&["built-in", "usb"]);
    let (controller, prefs) = controller(&audio);
    prefs.store_input("usb").unwrap();

    let capture = controller.acquire_microphone(None, false).await.unwrap();
    assert_eq!(capture.device_id, "usb");
    assert!(capture.analysis.is_some());
    assert_eq!(controller.active_device().await.as_deref(), Some("usb"));

    let state = *controller.capture_state().borrow();
    assert!(state.is_live());
}

#[tokio::test]
async fn acquire_failure_leaves_nothing_allocated() {
    let audio = LoopbackAudio::new();
    audio.deny_capture(true);
    let (controller, _) = controller(&audio);

    let err = controller.acquire_microphone(None, false).await.unwrap_err();
    assert!(matches!(err, VoiceError::DeviceUnavailable(_)));
    assert_eq!(audio.live_captures(), 0);
    assert!(controller.outbound_track().await.is_none());
    assert!(!controller.capture_state().borrow().active);
}

#[tokio::test]
async fn analysis_failure_does_not_fail_capture() {
    let audio = LoopbackAudio::new();
    audio.fail_analysers(true);
    let (controller, _) = controller(&audio);

    let capture = controller.acquire_microphone(None, false).await.unwrap();
    assert!(capture.analysis.is_none());
    assert_eq!(audio.live_captures(), 1);
}

#[tokio::test]
async fn start_muted_disables_track() {
    let audio = LoopbackAudio::new();
    let (controller, _) = controller(&audio);
    controller.acquire_microphone(None, true).await.unwrap();

    let state = *controller.capture_state().borrow();
    assert!(state.muted);
    assert!(!state.track_enabled);

    assert!(!controller.toggle_local_mute().await);
    assert!(controller.capture_state().borrow().is_live());
}

#[tokio::test]
async fn volumes_are_clamped_and_applied() {
    let audio = LoopbackAudio::new();
    let (controller, _) = controller(&audio);
    let bob = ParticipantId::from("bob");
    let stream = MediaStream::new("stream-bob", ());

    assert_eq!(controller.set_participant_volume(&bob, 1.5).await, 1.0);
    assert_eq!(controller.set_participant_volume(&bob, 0.5).await, 0.5);
    assert_eq!(controller.set_master_volume(-2.0).await, 0.0);
    assert_eq!(controller.set_master_volume(0.8).await, 0.8);
    assert_eq!(controller.set_microphone_gain(7.0).await, 1.0);

    // The override set before the stream existed applies on attach.
    let applied = controller.attach_remote_stream(&bob, &stream).await.unwrap();
    assert!((applied - 0.4).abs() < 1e-6);
    assert_eq!(audio.sink_volume("stream-bob"), Some(applied));

    controller.set_master_volume(1.0).await;
    assert_eq!(audio.sink_volume("stream-bob"), Some(0.5));
}

#[tokio::test]
async fn speaker_mute_overrides_volumes() {
    let audio = LoopbackAudio::new();
    let (controller, _) = controller(&audio);
    let bob = ParticipantId::from("bob");
    controller
        .attach_remote_stream(&bob, &MediaStream::new("stream-bob", ()))
        .await
        .unwrap();

    assert!(controller.toggle_speaker_mute().await);
    assert_eq!(audio.sink_volume("stream-bob"), Some(0.0));

    controller.set_participant_volume(&bob, 0.7).await;
    assert_eq!(audio.sink_volume("stream-bob"), Some(0.0));

    assert!(!controller.toggle_speaker_mute().await);
    assert_eq!(audio.sink_volume("stream-bob"), Some(0.7));
}

#[tokio::test]
async fn mic_gain_reaches_live_capture() {
    let audio = LoopbackAudio::new();
    let (controller, _) = controller(&audio);
    controller.acquire_microphone(None, false).await.unwrap();

    controller.set_microphone_gain(0.3).await;
    assert_eq!(audio.capture_gain("default"), Some(0.3));
}

#[tokio::test]
async fn detach_is_idempotent() {
    let audio = LoopbackAudio::new();
    let (controller, _) = controller(&audio);
    let bob = ParticipantId::from("bob");
    controller
        .attach_remote_stream(&bob, &MediaStream::new("stream-bob", ()))
        .await
        .unwrap();

    assert!(controller.detach_remote_stream(&bob).await.unwrap());
    assert!(!controller.detach_remote_stream(&bob).await.unwrap());
    assert_eq!(audio.live_sinks(), 0);
}

#[tokio::test]
async fn rejected_volume_releases_the_new_sink() {
    let audio = LoopbackAudio::new();
    let (controller, _) = controller(&audio);
    let bob = ParticipantId::from("bob");
    controller
        .attach_remote_stream(&bob, &MediaStream::new("stream-bob", ()))
        .await
        .unwrap();

    audio.fail_sink_volume(true);
    let err = controller
        .attach_remote_stream(&bob, &MediaStream::new("stream-bob-2", ()))
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::DeviceUnavailable(_)));

    // The earlier sink stays in place and the rejected one is gone.
    assert_eq!(audio.live_sinks(), 1);
    assert_eq!(controller.sink_count().await, 1);
    assert_eq!(audio.sink_volume("stream-bob"), Some(1.0));
    assert_eq!(audio.sink_volume("stream-bob-2"), None);
}

#[tokio::test]
async fn failed_sink_release_still_forgets_the_sink() {
    let audio = LoopbackAudio::new();
    let (controller, _) = controller(&audio);
    let bob = ParticipantId::from("bob");
    controller
        .attach_remote_stream(&bob, &MediaStream::new("stream-bob", ()))
        .await
        .unwrap();

    audio.fail_sink_release(true);
    assert!(controller.detach_remote_stream(&bob).await.is_err());
    assert_eq!(controller.sink_count().await, 0);
    assert!(!controller.detach_remote_stream(&bob).await.unwrap());
}

#[tokio::test]
async fn switch_replaces_track_and_keeps_mute() {
    let audio = LoopbackAudio::with_devices(&["built-in", "usb"]);
    let (controller, prefs) = controller(&audio);
    let target = RecordingTarget::default();
    controller.acquire_microphone(None, true).await.unwrap();

    let switched = controller
        .switch_microphone_device("usb", &target)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(switched.device_id, "usb");
    assert_eq!(target.tracks.lock().unwrap().as_slice(), [switched.track.id().to_string()]);
    assert_eq!(audio.live_captures(), 1);
    assert_eq!(prefs.preferred_input().as_deref(), Some("usb"));

    let state = *controller.capture_state().borrow();
    assert!(state.muted && !state.track_enabled);
}

#[tokio::test]
async fn failed_switch_rolls_back() {
    let audio = LoopbackAudio::with_devices(&["built-in", "usb"]);
    let (controller, _) = controller(&audio);
    let target = RecordingTarget::default();
    target.fail.store(true, Ordering::SeqCst);
    let original = controller.acquire_microphone(None, false).await.unwrap();

    let err = controller.switch_microphone_device("usb", &target).await.unwrap_err();
    assert!(matches!(err, VoiceError::PeerConnectionError { .. }));

    // Old track restored, new capture stopped.
    assert_eq!(target.tracks.lock().unwrap().as_slice(), [original.track.id().to_string()]);
    assert_eq!(audio.live_captures(), 1);
    assert_eq!(controller.active_device().await.as_deref(), Some("built-in"));
}

#[tokio::test]
async fn switch_to_missing_device_keeps_current_capture() {
    let audio = LoopbackAudio::new();
    let (controller, _) = controller(&audio);
    let target = RecordingTarget::default();
    controller.acquire_microphone(None, false).await.unwrap();

    let err = controller.switch_microphone_device("ghost", &target).await.unwrap_err();
    assert!(matches!(err, VoiceError::DeviceUnavailable(_)));
    assert_eq!(target.calls.load(Ordering::SeqCst), 0);
    assert_eq!(controller.active_device().await.as_deref(), Some("default"));
}

#[tokio::test]
async fn switch_without_capture_only_stores_preference() {
    let audio = LoopbackAudio::with_devices(&["built-in", "usb"]);
    let (controller, prefs) = controller(&audio);
    let target = RecordingTarget::default();

    assert!(controller.switch_microphone_device("usb", &target).await.unwrap().is_none());
    assert_eq!(prefs.preferred_input().as_deref(), Some("usb"));
    assert_eq!(audio.live_captures(), 0);
}

#[tokio::test]
async fn release_all_is_idempotent() {
    let audio = LoopbackAudio::new();
    let (controller, _) = controller(&audio);
    let bob = ParticipantId::from("bob");
    controller.acquire_microphone(None, false).await.unwrap();
    controller.set_participant_volume(&bob, 0.2).await;
    controller
        .attach_remote_stream(&bob, &MediaStream::new("stream-bob", ()))
        .await
        .unwrap();

    controller.release_all().await;
    controller.release_all().await;

    assert_eq!(audio.live_captures(), 0);
    assert_eq!(audio.live_sinks(), 0);
    assert_eq!(controller.participant_volume(&bob).await, 1.0);
    assert!(!controller.capture_state().borrow().active);
}
