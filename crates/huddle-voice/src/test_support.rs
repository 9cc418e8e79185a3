//! Shared helpers for unit tests.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::detector::Levels;
use crate::events::VoiceEvent;
use crate::media::AnalysisFrame;
use crate::ports::AnalysisTap;

/// Tap that reports whatever level the test last set.
pub struct ScriptedTap {
    level: Arc<Mutex<Option<Levels>>>,
    closed: Arc<Mutex<bool>>,
}

#[derive(Clone)]
pub struct TapControl {
    level: Arc<Mutex<Option<Levels>>>,
    closed: Arc<Mutex<bool>>,
}

impl TapControl {
    pub fn set(&self, rms: f32, peak: f32) {
        *self.level.lock().unwrap() = Some(Levels::new(rms, peak));
    }

    pub fn loud(&self) {
        self.set(0.3, 0.8);
    }

    pub fn quiet(&self) {
        self.set(0.0, 0.0);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

pub fn scripted_tap() -> (Box<dyn AnalysisTap>, TapControl) {
    let level = Arc::new(Mutex::new(None));
    let closed = Arc::new(Mutex::new(false));
    let tap = ScriptedTap {
        level: Arc::clone(&level),
        closed: Arc::clone(&closed),
    };
    (Box::new(tap), TapControl { level, closed })
}

impl AnalysisTap for ScriptedTap {
    fn sample(&mut self) -> Option<AnalysisFrame> {
        let level = (*self.level.lock().unwrap())?;
        Some(AnalysisFrame {
            time_domain: vec![level.rms; 32],
            frequency: vec![level.peak],
        })
    }

    fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }
}

/// Polls `check` until it returns true or two seconds pass.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Every event currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<VoiceEvent>) -> Vec<VoiceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
