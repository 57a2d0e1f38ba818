//! Thermal runaway detection.
//!
//! While the heater is powered and the tip is above its set temperature, the overshoot is classified into levels.
//! Each level has a grace period, after which the overshoot is considered a runaway, and fatal.

use embassy_time::{Duration, Instant};

use super::{FatalError, Iron};
use crate::hal::{Board, Regulator};
use crate::settings::TemperatureUnit;

/// The number of power samples that are averaged.
const POWER_HISTORY_LENGTH: usize = 4;

/// Overshoot levels, by multiples of the unit's step, checked from the highest.
const OVERSHOOT_LEVELS: [(u16, RunawayLevel); 4] = [
    (4, RunawayLevel::Over100),
    (3, RunawayLevel::Over75),
    (2, RunawayLevel::Over50),
    (1, RunawayLevel::Over25),
];

/// Severity of a tip overshoot.
#[derive(Debug, Eq, PartialEq, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunawayLevel {
    /// No significant overshoot.
    Ok,
    /// More than 25 °C above the set temperature.
    Over25,
    /// More than 50 °C above the set temperature.
    Over50,
    /// More than 75 °C above the set temperature.
    Over75,
    /// More than 100 °C above the set temperature.
    Over100,
    /// Above the absolute limit of 500 °C.
    OverLimit,
}

impl RunawayLevel {
    /// The time an overshoot of this level is tolerated, if any.
    pub fn grace_period(self) -> Option<Duration> {
        match self {
            RunawayLevel::Ok => None,
            RunawayLevel::Over25 => Some(Duration::from_secs(20)),
            RunawayLevel::Over50 => Some(Duration::from_secs(10)),
            RunawayLevel::Over75 => Some(Duration::from_secs(3)),
            RunawayLevel::Over100 | RunawayLevel::OverLimit => Some(Duration::from_secs(1)),
        }
    }
}

/// The detector's verdict.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunawayStatus {
    /// No runaway.
    Ok,
    /// A runaway was detected.
    Triggered,
}

/// Step and absolute limit per temperature unit.
fn unit_thresholds(unit: TemperatureUnit) -> (u16, u16) {
    match unit {
        TemperatureUnit::Celsius => (25, 500),
        TemperatureUnit::Fahrenheit => (45, 950),
    }
}

/// Classify how far a tip is above its set temperature.
pub fn classify_overshoot(temperature: i16, set_temperature: u16, unit: TemperatureUnit) -> RunawayLevel {
    let (step, limit) = unit_thresholds(unit);
    let temperature = temperature as i32;

    if temperature > limit as i32 {
        return RunawayLevel::OverLimit;
    }

    OVERSHOOT_LEVELS
        .iter()
        .find(|(steps, _)| temperature > set_temperature as i32 + (step * steps) as i32)
        .map_or(RunawayLevel::Ok, |&(_, level)| level)
}

/// The state of thermal runaway detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunawayState {
    /// The verdict.
    status: RunawayStatus,
    /// The latest classification.
    level: RunawayLevel,
    /// The level whose grace period is running.
    timed_level: RunawayLevel,
    /// When the grace period started.
    timer: Instant,
    /// Recent heater power in percent.
    power_history: [u8; POWER_HISTORY_LENGTH],
    /// The next slot to write in the power history.
    position: usize,
}

impl RunawayState {
    /// No runaway.
    pub(super) fn new(now: Instant) -> Self {
        Self {
            status: RunawayStatus::Ok,
            level: RunawayLevel::Ok,
            timed_level: RunawayLevel::Ok,
            timer: now,
            power_history: [0; POWER_HISTORY_LENGTH],
            position: 0,
        }
    }

    /// The detector's verdict.
    pub fn status(&self) -> RunawayStatus {
        self.status
    }

    /// The latest overshoot classification.
    pub fn level(&self) -> RunawayLevel {
        self.level
    }

    /// Record a power sample, and return the average power.
    fn record_power(&mut self, power_percent: u8) -> u8 {
        self.power_history[self.position] = power_percent;
        self.position = (self.position + 1) % POWER_HISTORY_LENGTH;

        let sum: u32 = self.power_history.iter().map(|&power| power as u32).sum();
        (sum / POWER_HISTORY_LENGTH as u32) as u8
    }
}

impl<B: Board, R: Regulator> Iron<B, R> {
    /// Check for thermal runaway and consistency of the heater PWM.
    ///
    /// Meant to be called periodically, independent of the control loop. Any detection is fatal: the heater is
    /// switched off and stays off until reboot.
    pub fn check_runaway(&mut self) -> Result<(), FatalError> {
        self.ensure_not_fatal()?;

        let now = self.board.now();
        let tip_temperature = self.board.tip_temperature();

        let error = self.state.error;
        if self.config.system.setup_mode || (error.safe_mode() && error.active) {
            return Ok(());
        }

        let average_power = self.state.runaway.record_power(self.state.power_percent);

        let pwm = self.state.pwm;
        if pwm.output as u32 > pwm.period as u32 + 1 {
            return Err(self.latch_fatal(FatalError::PwmExceedsPeriod));
        }
        if pwm.output != self.board.compare() {
            return Err(self.latch_fatal(FatalError::PwmMismatch));
        }

        let set_temperature = self.state.set_temperature;
        let runaway = &mut self.state.runaway;

        if average_power > 0
            && runaway.status == RunawayStatus::Ok
            && !self.state.debug.enabled
            && tip_temperature as i32 > set_temperature as i32
        {
            let unit = self.config.settings.temperature_unit;
            let level = classify_overshoot(tip_temperature, set_temperature, unit);
            runaway.level = level;

            if let Some(grace_period) = level.grace_period() {
                if runaway.timed_level == RunawayLevel::Ok {
                    debug!("Overshoot {:?} at {}, set {}", level, tip_temperature, set_temperature);
                    runaway.timed_level = level;
                    runaway.timer = now;
                } else if now.saturating_duration_since(runaway.timer) > grace_period {
                    runaway.status = RunawayStatus::Triggered;
                    return Err(self.latch_fatal(FatalError::Runaway(level)));
                }
            }

            return Ok(());
        }

        runaway.level = RunawayLevel::Ok;
        runaway.timed_level = RunawayLevel::Ok;
        runaway.timer = now;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overshoot_levels_celsius() {
        let unit = TemperatureUnit::Celsius;
        assert_eq!(classify_overshoot(320, 320, unit), RunawayLevel::Ok);
        assert_eq!(classify_overshoot(345, 320, unit), RunawayLevel::Ok);
        assert_eq!(classify_overshoot(346, 320, unit), RunawayLevel::Over25);
        assert_eq!(classify_overshoot(371, 320, unit), RunawayLevel::Over50);
        assert_eq!(classify_overshoot(396, 320, unit), RunawayLevel::Over75);
        assert_eq!(classify_overshoot(421, 320, unit), RunawayLevel::Over100);
        assert_eq!(classify_overshoot(500, 320, unit), RunawayLevel::Over100);
        assert_eq!(classify_overshoot(501, 320, unit), RunawayLevel::OverLimit);
    }

    #[test]
    fn overshoot_levels_fahrenheit() {
        let unit = TemperatureUnit::Fahrenheit;
        assert_eq!(classify_overshoot(645, 600, unit), RunawayLevel::Ok);
        assert_eq!(classify_overshoot(646, 600, unit), RunawayLevel::Over25);
        assert_eq!(classify_overshoot(781, 600, unit), RunawayLevel::Over100);
        assert_eq!(classify_overshoot(951, 900, unit), RunawayLevel::OverLimit);
    }

    #[test]
    fn grace_periods_shrink_with_severity() {
        assert_eq!(RunawayLevel::Ok.grace_period(), None);
        let levels = [
            RunawayLevel::Over25,
            RunawayLevel::Over50,
            RunawayLevel::Over75,
            RunawayLevel::Over100,
            RunawayLevel::OverLimit,
        ];
        for pair in levels.windows(2) {
            assert!(pair[0].grace_period() >= pair[1].grace_period());
        }
        assert_eq!(RunawayLevel::Over50.grace_period(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn power_is_averaged() {
        let mut state = RunawayState::new(Instant::from_millis(0));
        assert_eq!(state.record_power(100), 25);
        assert_eq!(state.record_power(100), 50);
        assert_eq!(state.record_power(0), 50);
        assert_eq!(state.record_power(0), 50);
        assert_eq!(state.record_power(0), 25);
        assert_eq!(state.record_power(0), 0);
    }
}
