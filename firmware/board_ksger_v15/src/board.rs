//! The KSGER v1.5 board, as seen by the control core.

use embassy_time::Instant;
use ironctl::hal::{Clock, Feedback, PinState, PwmDriver, Sensors};
use ironctl::settings::TemperatureUnit;

use crate::buzzer::{self, BuzzerCommand};
use crate::heater::HeaterPwm;
use crate::sensing::Sensing;

/// The board's heater, sensing and feedback.
pub struct KsgerBoard {
    /// The heater PWM.
    pub heater: HeaterPwm,
    /// Filtered measurements.
    pub sensing: Sensing,
}

impl PwmDriver for KsgerBoard {
    fn set_period(&mut self, ticks: u16) {
        self.heater.set_period(ticks);
    }

    fn set_compare(&mut self, ticks: u16) {
        self.heater.set_compare(ticks);
    }

    fn compare(&mut self) -> u16 {
        self.heater.compare()
    }

    fn set_pin_state(&mut self, state: PinState) {
        self.heater.set_pin_state(state);
    }
}

impl Sensors for KsgerBoard {
    fn tip_temperature(&mut self) -> i16 {
        self.sensing.tip_temperature()
    }

    fn tip_average(&self) -> u16 {
        self.sensing.tip_average()
    }

    fn tip_raw(&self) -> u16 {
        self.sensing.tip_raw()
    }

    fn cold_junction_x10(&self, unit: TemperatureUnit) -> i16 {
        self.sensing.cold_junction_x10(unit)
    }

    fn supply_voltage_x10(&self) -> u16 {
        self.sensing.supply_voltage_x10()
    }

    fn to_sensor_scale(&self, temperature: u16) -> u16 {
        self.sensing.to_sensor_scale(temperature)
    }
}

impl Feedback for KsgerBoard {
    fn long_beep(&mut self) {
        buzzer::request(BuzzerCommand::LongBeep);
    }

    fn alarm_start(&mut self) {
        buzzer::request(BuzzerCommand::AlarmStart);
    }

    fn alarm_stop(&mut self) {
        buzzer::request(BuzzerCommand::AlarmStop);
    }
}

impl Clock for KsgerBoard {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
