//! In-process implementations of every collaborator.
//!
//! A [`LoopbackHub`] plays membership store and signal relay for any number
//! of clients in one process, a [`LoopbackNetwork`] pairs their connection
//! primitives, and [`LoopbackAudio`] stands in for audio hardware. Each has
//! hooks to inject failures.

mod audio;
mod hub;
mod network;

pub use audio::LoopbackAudio;
pub use hub::{HubOperation, LoopbackHub};
pub use network::{LoopbackConnection, LoopbackConnector, LoopbackNetwork};

use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
