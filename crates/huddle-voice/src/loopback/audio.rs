use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use huddle_common::VoiceError;

use crate::detector::Levels;
use crate::media::{AnalysisFrame, LocalTrack, MediaStream};
use crate::ports::{AnalysisInput, AnalysisTap, AudioBackend, AudioSink, CaptureStream};

use super::lock;

const FRAME_LEN: usize = 64;

#[derive(Default)]
struct Shared {
    devices: Mutex<Vec<String>>,
    deny_capture: AtomicBool,
    fail_sinks: AtomicBool,
    fail_sink_volume: AtomicBool,
    fail_sink_release: AtomicBool,
    fail_analysers: AtomicBool,
    levels: Mutex<HashMap<String, Levels>>,
    gains: Mutex<HashMap<String, f32>>,
    sinks: Mutex<HashMap<u64, (String, f32)>>,
    live_captures: AtomicUsize,
    live_analysers: AtomicUsize,
    next_id: AtomicU64,
}

/// Synthetic audio backend.
///
/// Analysis taps report levels set with [`set_levels`](Self::set_levels),
/// keyed by remote stream id or by [`capture_source`](Self::capture_source)
/// for the microphone.
#[derive(Clone)]
pub struct LoopbackAudio {
    shared: Arc<Shared>,
}

impl Default for LoopbackAudio {
    fn default() -> Self {
        Self::with_devices(&["default"])
    }
}

impl LoopbackAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with the given input devices. The first one is the default.
    pub fn with_devices(devices: &[&str]) -> Self {
        let shared = Shared::default();
        *lock(&shared.devices) = devices.iter().map(|d| d.to_string()).collect();
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn add_device(&self, device_id: &str) {
        lock(&self.shared.devices).push(device_id.to_string());
    }

    /// Simulates the user denying microphone access.
    pub fn deny_capture(&self, deny: bool) {
        self.shared.deny_capture.store(deny, Ordering::SeqCst);
    }

    pub fn fail_sinks(&self, fail: bool) {
        self.shared.fail_sinks.store(fail, Ordering::SeqCst);
    }

    /// Makes volume changes on open sinks fail.
    pub fn fail_sink_volume(&self, fail: bool) {
        self.shared.fail_sink_volume.store(fail, Ordering::SeqCst);
    }

    /// Makes sink release report an error. The sink is still torn down.
    pub fn fail_sink_release(&self, fail: bool) {
        self.shared.fail_sink_release.store(fail, Ordering::SeqCst);
    }

    pub fn fail_analysers(&self, fail: bool) {
        self.shared.fail_analysers.store(fail, Ordering::SeqCst);
    }

    pub fn capture_source(device_id: &str) -> String {
        format!("mic:{device_id}")
    }

    pub fn set_levels(&self, source: &str, rms: f32, peak: f32) {
        lock(&self.shared.levels).insert(source.to_string(), Levels::new(rms, peak));
    }

    /// Gain currently applied to the capture of `device_id`.
    pub fn capture_gain(&self, device_id: &str) -> Option<f32> {
        lock(&self.shared.gains).get(device_id).copied()
    }

    pub fn live_captures(&self) -> usize {
        self.shared.live_captures.load(Ordering::SeqCst)
    }

    pub fn live_sinks(&self) -> usize {
        lock(&self.shared.sinks).len()
    }

    pub fn live_analysers(&self) -> usize {
        self.shared.live_analysers.load(Ordering::SeqCst)
    }

    /// Volume of the sink playing `stream_id`, if one is open.
    pub fn sink_volume(&self, stream_id: &str) -> Option<f32> {
        lock(&self.shared.sinks)
            .values()
            .find(|(stream, _)| stream == stream_id)
            .map(|(_, volume)| *volume)
    }

    fn next_id(&self) -> u64 {
        self.shared.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl AudioBackend for LoopbackAudio {
    async fn open_capture(&self, device_id: Option<&str>) -> Result<Box<dyn CaptureStream>, VoiceError> {
        if self.shared.deny_capture.load(Ordering::SeqCst) {
            return Err(VoiceError::DeviceUnavailable("permission denied".into()));
        }
        let device = {
            let devices = lock(&self.shared.devices);
            match device_id {
                Some(id) if devices.iter().any(|d| d == id) => id.to_string(),
                Some(id) => return Err(VoiceError::DeviceUnavailable(format!("no such device: {id}"))),
                None => devices
                    .first()
                    .cloned()
                    .ok_or_else(|| VoiceError::DeviceUnavailable("no input devices".into()))?,
            }
        };

        self.shared.live_captures.fetch_add(1, Ordering::SeqCst);
        lock(&self.shared.gains).insert(device.clone(), 1.0);
        let track = LocalTrack::new(format!("{device}#{}", self.next_id()), ());
        Ok(Box::new(LoopbackCapture {
            device,
            track,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn open_sink(&self, stream: &MediaStream, _output_device: Option<&str>) -> Result<Box<dyn AudioSink>, VoiceError> {
        if self.shared.fail_sinks.load(Ordering::SeqCst) {
            return Err(VoiceError::DeviceUnavailable("output device busy".into()));
        }
        let id = self.next_id();
        lock(&self.shared.sinks).insert(id, (stream.id().to_string(), 1.0));
        Ok(Box::new(LoopbackSink {
            id,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn open_analyser(&self, input: AnalysisInput<'_>) -> Result<Box<dyn AnalysisTap>, VoiceError> {
        if self.shared.fail_analysers.load(Ordering::SeqCst) {
            return Err(VoiceError::DeviceUnavailable("analysis unavailable".into()));
        }
        let (source, gain_of) = match input {
            AnalysisInput::Capture(capture) => (
                Self::capture_source(capture.device_id()),
                Some(capture.device_id().to_string()),
            ),
            AnalysisInput::Remote(stream) => (stream.id().to_string(), None),
        };
        self.shared.live_analysers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoopbackTap {
            source,
            gain_of,
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }
}

struct LoopbackCapture {
    device: String,
    track: LocalTrack,
    enabled: AtomicBool,
    stopped: AtomicBool,
    shared: Arc<Shared>,
}

impl CaptureStream for LoopbackCapture {
    fn device_id(&self) -> &str {
        &self.device
    }

    fn set_track_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn track_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_gain(&self, gain: f32) {
        lock(&self.shared.gains).insert(self.device.clone(), gain);
    }

    fn outbound_track(&self) -> LocalTrack {
        self.track.clone()
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.shared.live_captures.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for LoopbackCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopbackSink {
    id: u64,
    shared: Arc<Shared>,
}

impl AudioSink for LoopbackSink {
    fn set_volume(&self, volume: f32) -> Result<(), VoiceError> {
        if self.shared.fail_sink_volume.load(Ordering::SeqCst) {
            return Err(VoiceError::DeviceUnavailable("output volume rejected".into()));
        }
        match lock(&self.shared.sinks).get_mut(&self.id) {
            Some(entry) => {
                entry.1 = volume;
                Ok(())
            }
            None => Err(VoiceError::DeviceUnavailable("sink released".into())),
        }
    }

    fn release(&self) -> Result<(), VoiceError> {
        lock(&self.shared.sinks).remove(&self.id);
        if self.shared.fail_sink_release.load(Ordering::SeqCst) {
            return Err(VoiceError::DeviceUnavailable("output device vanished".into()));
        }
        Ok(())
    }
}

struct LoopbackTap {
    source: String,
    /// Capture taps sit after the gain stage of this device.
    gain_of: Option<String>,
    shared: Arc<Shared>,
    closed: bool,
}

impl AnalysisTap for LoopbackTap {
    fn sample(&mut self) -> Option<AnalysisFrame> {
        if self.closed {
            return None;
        }
        let mut levels = lock(&self.shared.levels).get(&self.source).copied().unwrap_or_default();
        if let Some(device) = &self.gain_of {
            let gain = lock(&self.shared.gains).get(device).copied().unwrap_or(1.0);
            levels.rms *= gain;
            levels.peak *= gain;
        }
        Some(AnalysisFrame {
            time_domain: vec![levels.rms; FRAME_LEN],
            frequency: vec![levels.peak; FRAME_LEN / 2],
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.live_analysers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for LoopbackTap {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_resolves_default_and_rejects_unknown() {
        let audio = LoopbackAudio::with_devices(&["built-in", "usb"]);
        let capture = audio.open_capture(None).await.unwrap();
        assert_eq!(capture.device_id(), "built-in");
        assert!(audio.open_capture(Some("bluetooth")).await.is_err());

        assert_eq!(audio.live_captures(), 1);
        capture.stop();
        capture.stop();
        assert_eq!(audio.live_captures(), 0);
    }

    #[tokio::test]
    async fn denied_capture() {
        let audio = LoopbackAudio::new();
        audio.deny_capture(true);
        let err = audio.open_capture(None).await.err().unwrap();
        assert!(matches!(err, VoiceError::DeviceUnavailable(_)));
        assert_eq!(audio.live_captures(), 0);
    }

    #[test]
    fn taps_report_configured_levels() {
        let audio = LoopbackAudio::new();
        let stream = MediaStream::new("stream-bob", ());
        let mut tap = audio.open_analyser(AnalysisInput::Remote(&stream)).unwrap();
        audio.set_levels("stream-bob", 0.2, 0.6);

        let levels = Levels::measure(&tap.sample().unwrap());
        assert!((levels.rms - 0.2).abs() < 1e-4);
        assert_eq!(levels.peak, 0.6);

        tap.close();
        assert!(tap.sample().is_none());
        assert_eq!(audio.live_analysers(), 0);
    }

    #[tokio::test]
    async fn capture_taps_are_post_gain() {
        let audio = LoopbackAudio::new();
        let capture = audio.open_capture(None).await.unwrap();
        let mut tap = audio.open_analyser(AnalysisInput::Capture(capture.as_ref())).unwrap();
        audio.set_levels(&LoopbackAudio::capture_source("default"), 0.0, 0.8);

        capture.set_gain(0.5);
        assert_eq!(audio.capture_gain("default"), Some(0.5));
        let levels = Levels::measure(&tap.sample().unwrap());
        assert_eq!(levels.peak, 0.4);
    }

    #[test]
    fn sinks_track_volume_until_released() {
        let audio = LoopbackAudio::new();
        let stream = MediaStream::new("stream-bob", ());
        let sink = audio.open_sink(&stream, None).unwrap();
        sink.set_volume(0.4).unwrap();
        assert_eq!(audio.sink_volume("stream-bob"), Some(0.4));

        sink.release().unwrap();
        sink.release().unwrap();
        assert_eq!(audio.live_sinks(), 0);
        assert!(sink.set_volume(0.5).is_err());
    }
}
