use crate::media::AnalysisFrame;

/// Root-mean-square of time-domain samples. Empty input is silence.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Largest frequency-bin magnitude.
pub fn peak(bins: &[f32]) -> f32 {
    bins.iter().copied().fold(0.0, f32::max)
}

/// Measured loudness of one analysis frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Levels {
    pub rms: f32,
    pub peak: f32,
}

impl Levels {
    pub fn new(rms: f32, peak: f32) -> Self {
        Self { rms, peak }
    }

    pub fn measure(frame: &AnalysisFrame) -> Self {
        Self {
            rms: rms(&frame.time_domain),
            peak: peak(&frame.frequency),
        }
    }
}
