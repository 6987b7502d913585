//! The startup "bong".
//!
//! After a successful power-on self test the boards play their
//! distinctive chime: a 195 Hz square wave under an exponential decay
//! envelope, lasting about 750 ms per repetition.

/// Square-wave generator with an exponential decay envelope. The
/// envelope attenuates by 0x7F80/0x8000 (about 0.996) every 31 samples
/// (roughly 1 ms); the sign flips every 80 samples, giving a 160-sample
/// period, just over 195 Hz at the fixed sample rate.
pub(crate) struct Bong {
    envelope_samples: u32,
    sign_samples: u32,
    level: u16,
    sign: i32,
}

impl Bong {
    pub fn new() -> Self {
        Self {
            envelope_samples: 0,
            sign_samples: 0,
            level: 0,
            sign: -1,
        }
    }

    /// Rearm the waveform at full amplitude.
    pub fn start(&mut self) {
        self.envelope_samples = 0;
        self.sign_samples = 0;
        self.level = 0x0FFF;
    }

    /// Generate the next sample. The waveform never stops on its own;
    /// the state machine decides when the bong's time is up.
    pub fn next_sample(&mut self) -> i16 {
        self.envelope_samples += 1;
        if self.envelope_samples >= 31 {
            // 1.15 fixed-point multiply by 0x7F80/0x8000, as the boot
            // code computed it
            self.level = (((u32::from(self.level) * 0x7F80) << 1) >> 16) as u16;
            self.envelope_samples = 0;
        }

        self.sign_samples += 1;
        if self.sign_samples >= 80 {
            self.sign = -self.sign;
            self.sign_samples = 0;
        }

        (self.sign * i32::from(self.level)) as i16
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
