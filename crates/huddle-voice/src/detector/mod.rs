//! Speaking detection with hysteresis over periodic level sampling.

mod hysteresis;
mod levels;
mod sampler;

pub use hysteresis::{next_speaking, Thresholds};
pub use levels::{peak, rms, Levels};
pub use sampler::SpeechActivityDetector;

#[cfg(test)]
mod tests;
