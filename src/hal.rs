//! Interfaces to the hardware and the services around the control core.
//!
//! A board implements [`PwmDriver`], [`Sensors`], [`Feedback`] and [`Clock`] (together: [`Board`]), the control
//! loop drives a [`Regulator`].

use embassy_time::Instant;

use crate::settings::TemperatureUnit;

/// The state of the heater output pin.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinState {
    /// Driven by the PWM timer.
    Pwm,
    /// Driven low (heater off).
    Low,
    /// Driven high (heater fully on).
    High,
}

/// The heater PWM timer.
pub trait PwmDriver {
    /// Set the timer period in ticks.
    fn set_period(&mut self, ticks: u16);

    /// Set the compare (duty) value in ticks.
    fn set_compare(&mut self, ticks: u16);

    /// The compare value that is currently latched in the timer, read back from the hardware.
    fn compare(&mut self) -> u16;

    /// Configure how the heater pin is driven.
    fn set_pin_state(&mut self, state: PinState);
}

/// Filtered readings of the tip, cold junction and supply.
pub trait Sensors {
    /// The compensated tip temperature, in the system's temperature unit.
    fn tip_temperature(&mut self) -> i16;

    /// The filtered tip reading in sensor units, as used by the regulator.
    fn tip_average(&self) -> u16;

    /// The last unfiltered tip reading in sensor units (used for tip detection).
    fn tip_raw(&self) -> u16;

    /// The cold junction (ambient) temperature in tenths of a degree.
    fn cold_junction_x10(&self, unit: TemperatureUnit) -> i16;

    /// The supply voltage in tenths of a Volt.
    fn supply_voltage_x10(&self) -> u16;

    /// Convert a temperature in the system's unit to sensor units.
    fn to_sensor_scale(&self, temperature: u16) -> u16;
}

/// Audible feedback.
///
/// All calls are fire-and-forget.
pub trait Feedback {
    /// Confirm a mode change.
    fn long_beep(&mut self);

    /// Start the error alarm.
    fn alarm_start(&mut self);

    /// Stop the error alarm.
    fn alarm_stop(&mut self);
}

/// A monotonic clock.
pub trait Clock {
    /// The current instant since boot.
    fn now(&self) -> Instant;
}

/// Maps a setpoint and a measurement (both in sensor units) to a PWM output.
pub trait Regulator {
    /// Compute the next output, bounded to `0..=max_output`.
    fn compute(&mut self, setpoint: u16, measured: u16, max_output: u16) -> u16;

    /// Forget all accumulated state.
    fn reset(&mut self);
}

/// Everything a board provides to the control core.
pub trait Board: PwmDriver + Sensors + Feedback + Clock {}

impl<T: PwmDriver + Sensors + Feedback + Clock> Board for T {}
