use super::levels::Levels;

/// ON/OFF thresholds for the two level measures.
///
/// `rms` thresholds apply to time-domain RMS in [0, 1], `peak` thresholds
/// to the loudest normalised frequency bin in [0, 1]. Each ON threshold
/// must exceed its OFF counterpart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub on_rms: f32,
    pub off_rms: f32,
    pub on_peak: f32,
    pub off_peak: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            on_rms: 0.04,
            off_rms: 0.02,
            on_peak: 0.35,
            off_peak: 0.2,
        }
    }
}

/// Applies the hysteresis law to one sample.
///
/// A silent source starts speaking once both measures exceed their ON
/// thresholds. A speaking source keeps speaking while both measures exceed
/// their OFF thresholds. Samples between the bands keep the previous state.
pub fn next_speaking(was_speaking: bool, levels: Levels, thresholds: &Thresholds) -> bool {
    if was_speaking {
        levels.rms > thresholds.off_rms && levels.peak > thresholds.off_peak
    } else {
        levels.rms > thresholds.on_rms && levels.peak > thresholds.on_peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn starts_only_when_both_measures_are_loud() {
        assert!(next_speaking(false, Levels::new(0.05, 0.4), &t()));
        assert!(!next_speaking(false, Levels::new(0.5, 0.0), &t()));
        assert!(!next_speaking(false, Levels::new(0.0, 0.9), &t()));
        assert!(!next_speaking(false, Levels::new(0.03, 0.3), &t()));
    }

    #[test]
    fn stops_when_either_measure_drops_below_off() {
        assert!(next_speaking(true, Levels::new(0.03, 0.25), &t()));
        assert!(!next_speaking(true, Levels::new(0.0, 0.9), &t()));
        assert!(!next_speaking(true, Levels::new(0.5, 0.1), &t()));
        assert!(!next_speaking(true, Levels::new(0.01, 0.1), &t()));
    }

    #[test]
    fn band_between_thresholds_holds_state() {
        let mid = Levels::new(0.03, 0.25);
        assert!(next_speaking(true, mid, &t()));
        assert!(!next_speaking(false, mid, &t()));
    }

    #[test]
    fn thresholds_are_exclusive() {
        let th = t();
        assert!(!next_speaking(false, Levels::new(th.on_rms, th.on_peak), &th));
        assert!(!next_speaking(true, Levels::new(th.off_rms, th.off_peak), &th));
    }

    #[test]
    fn loud_mid_quiet_sequence() {
        let th = t();
        let samples = [
            Levels::new(0.1, 0.5),
            Levels::new(0.03, 0.25),
            Levels::new(0.01, 0.1),
        ];
        let mut speaking = false;
        let seen: Vec<bool> = samples
            .iter()
            .map(|levels| {
                speaking = next_speaking(speaking, *levels, &th);
                speaking
            })
            .collect();
        assert_eq!(seen, vec![true, true, false]);
    }
}
