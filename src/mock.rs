//! A scriptable board and regulator for host tests.

use std::vec::Vec;

use embassy_time::Instant;

use crate::control::Iron;
use crate::hal::{Clock, Feedback, PinState, PwmDriver, Regulator, Sensors};
use crate::settings::{Config, TemperatureUnit};

/// A board with directly settable readings and a manual clock.
#[derive(Debug)]
pub struct MockBoard {
    /// The clock, in ms since boot.
    pub now_ms: u64,
    /// The tip temperature in the system unit.
    pub tip_temperature: i16,
    /// The filtered tip reading.
    pub tip_average: u16,
    /// The last raw tip reading.
    pub tip_raw: u16,
    /// The cold junction temperature (x10), in any unit.
    pub cold_junction_x10: i16,
    /// The supply voltage (x10).
    pub supply_voltage_x10: u16,
    /// The programmed PWM period.
    pub period: u16,
    /// The programmed compare value.
    pub compare: u16,
    /// Simulates a timer that does not latch compare values.
    pub stuck_compare: Option<u16>,
    /// The heater pin state.
    pub pin: PinState,
    /// The number of long beeps.
    pub long_beeps: u32,
    /// The alarm sounds.
    pub alarm: bool,
    /// The number of alarm starts.
    pub alarm_starts: u32,
    /// All compare values, in order of writing.
    pub compare_writes: Vec<u16>,
}

impl Default for MockBoard {
    fn default() -> Self {
        Self {
            now_ms: 5_000,
            tip_temperature: 250,
            tip_average: 250,
            tip_raw: 1_000,
            cold_junction_x10: 250,
            supply_voltage_x10: 240,
            period: 0,
            compare: 0,
            stuck_compare: None,
            pin: PinState::Low,
            long_beeps: 0,
            alarm: false,
            alarm_starts: 0,
            compare_writes: Vec::new(),
        }
    }
}

impl PwmDriver for MockBoard {
    fn set_period(&mut self, ticks: u16) {
        self.period = ticks;
    }

    fn set_compare(&mut self, ticks: u16) {
        self.compare = ticks;
        self.compare_writes.push(ticks);
    }

    fn compare(&mut self) -> u16 {
        self.stuck_compare.unwrap_or(self.compare)
    }

    fn set_pin_state(&mut self, state: PinState) {
        self.pin = state;
    }
}

impl Sensors for MockBoard {
    fn tip_temperature(&mut self) -> i16 {
        self.tip_temperature
    }

    fn tip_average(&self) -> u16 {
        self.tip_average
    }

    fn tip_raw(&self) -> u16 {
        self.tip_raw
    }

    fn cold_junction_x10(&self, _unit: TemperatureUnit) -> i16 {
        self.cold_junction_x10
    }

    fn supply_voltage_x10(&self) -> u16 {
        self.supply_voltage_x10
    }

    fn to_sensor_scale(&self, temperature: u16) -> u16 {
        temperature
    }
}

impl Feedback for MockBoard {
    fn long_beep(&mut self) {
        self.long_beeps += 1;
    }

    fn alarm_start(&mut self) {
        self.alarm = true;
        self.alarm_starts += 1;
    }

    fn alarm_stop(&mut self) {
        self.alarm = false;
    }
}

impl Clock for MockBoard {
    fn now(&self) -> Instant {
        Instant::from_millis(self.now_ms)
    }
}

/// A regulator that outputs a fixed value.
#[derive(Debug, Default)]
pub struct MockRegulator {
    /// The output, capped to the maximum unless `unbounded`.
    pub output: u16,
    /// Ignore the maximum output.
    pub unbounded: bool,
    /// The number of resets.
    pub resets: u32,
    /// The last (setpoint, measured, max_output) arguments.
    pub last_call: Option<(u16, u16, u16)>,
}

impl Regulator for MockRegulator {
    fn compute(&mut self, setpoint: u16, measured: u16, max_output: u16) -> u16 {
        self.last_call = Some((setpoint, measured, max_output));

        if self.unbounded {
            self.output
        } else {
            self.output.min(max_output)
        }
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

/// An iron in run mode, with default configuration and healthy readings.
pub fn iron() -> Iron<MockBoard, MockRegulator> {
    iron_with(Config::default())
}

/// An iron with the given configuration and healthy readings.
pub fn iron_with(config: Config) -> Iron<MockBoard, MockRegulator> {
    Iron::new(MockBoard::default(), MockRegulator::default(), config, false)
}

impl Iron<MockBoard, MockRegulator> {
    /// Advance the clock.
    pub fn advance_ms(&mut self, ms: u64) {
        self.board_mut().now_ms += ms;
    }
}
