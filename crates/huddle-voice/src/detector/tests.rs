use std::time::Duration;

use tokio::sync::watch;

use huddle_common::{EventBus, ParticipantId};

use super::*;
use crate::audio::CaptureState;
use crate::events::VoiceEvent;
use crate::settings::DetectorSettings;
use crate::test_support::{drain, scripted_tap};

const LIVE: CaptureState = CaptureState {
    active: true,
    track_enabled: true,
    muted: false,
};

fn detector() -> (SpeechActivityDetector, watch::Sender<CaptureState>, EventBus<VoiceEvent>) {
    let (capture_tx, capture_rx) = watch::channel(LIVE);
    let events = EventBus::new(64);
    let detector = SpeechActivityDetector::new(DetectorSettings::default(), capture_rx, events.clone());
    (detector, capture_tx, events)
}

fn speaking(id: &str, speaking: bool) -> VoiceEvent {
    VoiceEvent::SpeakingChanged {
        participant_id: ParticipantId::from(id),
        speaking,
    }
}

#[tokio::test]
async fn publishes_only_transitions() {
    let (detector, _capture, events) = detector();
    let mut rx = events.subscribe();
    let (tap, control) = scripted_tap();
    detector.register_remote(ParticipantId::from("bob"), tap).await;

    control.loud();
    detector.poll_once().await;
    detector.poll_once().await;
    assert_eq!(drain(&mut rx), vec![speaking("bob", true)]);

    // In the hysteresis band: still speaking, nothing published.
    control.set(0.03, 0.25);
    detector.poll_once().await;
    assert!(drain(&mut rx).is_empty());

    control.quiet();
    detector.poll_once().await;
    assert_eq!(drain(&mut rx), vec![speaking("bob", false)]);
    assert!(!detector.is_speaking(&ParticipantId::from("bob")).await);
}

#[tokio::test]
async fn muted_remote_is_skipped() {
    let (detector, _capture, events) = detector();
    let mut rx = events.subscribe();
    let bob = ParticipantId::from("bob");
    let (tap, control) = scripted_tap();
    detector.register_remote(bob.clone(), tap).await;

    control.loud();
    detector.poll_once().await;
    drain(&mut rx);

    detector.set_participant_muted(&bob, true).await;
    control.quiet();
    detector.poll_once().await;
    assert!(drain(&mut rx).is_empty());
    assert!(detector.is_speaking(&bob).await);

    detector.set_participant_muted(&bob, false).await;
    detector.poll_once().await;
    assert_eq!(drain(&mut rx), vec![speaking("bob", false)]);
}

#[tokio::test]
async fn local_source_is_gated_by_capture_state() {
    let (detector, capture, events) = detector();
    let mut rx = events.subscribe();
    let (tap, control) = scripted_tap();
    detector.set_local_source(ParticipantId::from("me"), Some(tap)).await;

    control.loud();
    detector.poll_once().await;
    assert_eq!(drain(&mut rx), vec![speaking("me", true)]);

    capture.send_replace(CaptureState { muted: true, ..LIVE });
    detector.poll_once().await;
    assert_eq!(drain(&mut rx), vec![speaking("me", false)]);

    capture.send_replace(CaptureState { track_enabled: false, ..LIVE });
    detector.poll_once().await;
    assert!(drain(&mut rx).is_empty());

    capture.send_replace(CaptureState { active: false, ..LIVE });
    detector.poll_once().await;
    assert!(drain(&mut rx).is_empty());

    capture.send_replace(LIVE);
    detector.poll_once().await;
    assert_eq!(drain(&mut rx), vec![speaking("me", true)]);
}

#[tokio::test]
async fn local_without_analysis_never_speaks() {
    let (detector, _capture, events) = detector();
    let mut rx = events.subscribe();
    let me = ParticipantId::from("me");
    detector.set_local_source(me.clone(), None).await;
    detector.poll_once().await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(detector.speaking_snapshot().await.get(&me), Some(&false));
}

#[tokio::test]
async fn unregister_closes_tap_and_forgets_entry() {
    let (detector, _capture, events) = detector();
    let mut rx = events.subscribe();
    let bob = ParticipantId::from("bob");
    let (tap, control) = scripted_tap();
    detector.register_remote(bob.clone(), tap).await;
    control.loud();
    detector.poll_once().await;
    drain(&mut rx);

    detector.unregister_remote(&bob).await;
    assert!(control.is_closed());
    assert!(!detector.speaking_snapshot().await.contains_key(&bob));

    detector.poll_once().await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn reset_closes_everything() {
    let (detector, _capture, _events) = detector();
    let (local, local_control) = scripted_tap();
    let (remote, remote_control) = scripted_tap();
    detector.set_local_source(ParticipantId::from("me"), Some(local)).await;
    detector.register_remote(ParticipantId::from("bob"), remote).await;

    detector.reset().await;
    assert!(local_control.is_closed());
    assert!(remote_control.is_closed());
    assert!(detector.speaking_snapshot().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn sampling_task_runs_until_stopped() {
    let (detector, _capture, events) = detector();
    let mut rx = events.subscribe();
    let (tap, control) = scripted_tap();
    detector.register_remote(ParticipantId::from("bob"), tap).await;

    detector.start().await;
    detector.start().await;
    assert!(detector.is_running().await);

    control.loud();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(drain(&mut rx), vec![speaking("bob", true)]);

    detector.stop().await;
    assert!(!detector.is_running().await);

    control.quiet();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(drain(&mut rx).is_empty());

    detector.stop().await;
}
