use std::cmp;

use emulator::time::{EmuDuration, EmuTime};

/// A clock ticking at a chip frequency, anchored at a point in virtual time.
///
/// Peripherals count in their own cycles; this converts between those
/// cycles and `EmuTime` without rounding drift, since every tick is the
/// same integer number of master ticks.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DynamicClock {
    last_tick: EmuTime,
    step: EmuDuration,
}

impl DynamicClock {
    pub fn new(time: EmuTime, freq: u64) -> DynamicClock {
        DynamicClock {
            last_tick: time,
            step: period_of(freq),
        }
    }

    /// Time of the last tick.
    pub fn time(&self) -> EmuTime {
        self.last_tick
    }

    pub fn period(&self) -> EmuDuration {
        self.step
    }

    /// Change the frequency. Ticks already counted keep their timing.
    pub fn set_freq(&mut self, freq: u64) {
        self.step = period_of(freq);
    }

    pub fn reset(&mut self, time: EmuTime) {
        self.last_tick = time;
    }

    /// Whole ticks between the last tick and `time`.
    pub fn ticks_till(&self, time: EmuTime) -> u64 {
        (time - self.last_tick) / self.step
    }

    /// Time of the `n`th tick after the last one.
    pub fn add(&self, n: u64) -> EmuTime {
        self.last_tick + self.step * n
    }

    pub fn advance_ticks(&mut self, n: u64) {
        self.last_tick = self.add(n);
    }

    /// Move to the last tick at or before `time`.
    pub fn advance(&mut self, time: EmuTime) {
        let n = self.ticks_till(time);
        self.advance_ticks(n);
    }
}

// Frequencies above MAIN_FREQ are clamped to one master tick.
fn period_of(freq: u64) -> EmuDuration {
    cmp::max(EmuDuration::hz(freq), EmuDuration::from_ticks(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use emulator::time::MAIN_FREQ;

    #[test]
    fn test_ticks_till() {
        let clock = DynamicClock::new(EmuTime::from_ticks(100), MAIN_FREQ / 10);
        assert_eq!(clock.period().ticks(), 10);
        assert_eq!(clock.ticks_till(EmuTime::from_ticks(100)), 0);
        assert_eq!(clock.ticks_till(EmuTime::from_ticks(129)), 2);
        assert_eq!(clock.ticks_till(EmuTime::from_ticks(50)), 0);
    }

    #[test]
    fn test_advance_stops_at_last_tick() {
        let mut clock = DynamicClock::new(EmuTime::zero(), MAIN_FREQ / 10);
        clock.advance(EmuTime::from_ticks(35));
        assert_eq!(clock.time(), EmuTime::from_ticks(30));
        clock.advance_ticks(2);
        assert_eq!(clock.time(), EmuTime::from_ticks(50));
        assert_eq!(clock.add(3), EmuTime::from_ticks(80));
    }

    #[test]
    fn test_set_freq() {
        let mut clock = DynamicClock::new(EmuTime::from_ticks(20), MAIN_FREQ / 10);
        clock.set_freq(MAIN_FREQ / 4);
        assert_eq!(clock.time(), EmuTime::from_ticks(20));
        assert_eq!(clock.add(1), EmuTime::from_ticks(24));
    }
}
