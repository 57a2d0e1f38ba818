//! Recoverable errors (sensor faults, safe mode) and fatal errors.

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

use embassy_time::{Duration, Instant};

use super::{Iron, Mode, RunawayLevel};
use crate::hal::{Board, PinState, Regulator};
use crate::settings::TemperatureUnit;

/// Cold junction temperatures above this (°C x10) are faulty.
const AMBIENT_HIGH_X10: i16 = 800;

/// Cold junction temperatures below this (°C x10) are faulty.
const AMBIENT_LOW_X10: i16 = -200;

/// Sensor faults are ignored during this time after boot, while the filters settle.
const SENSOR_SETTLE_MS: u64 = 1000;

/// A set of fault conditions.
#[derive(Debug, Default, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultFlags(u8);

impl FaultFlags {
    /// Heating is refused, e.g. due to invalid settings or the setup menu.
    pub const SAFE_MODE: Self = Self(1 << 0);
    /// The cold junction reads too hot.
    pub const AMBIENT_HIGH: Self = Self(1 << 1);
    /// The cold junction reads too cold (or is disconnected).
    pub const AMBIENT_LOW: Self = Self(1 << 2);
    /// The supply voltage is below the low voltage threshold.
    pub const VOLTAGE_LOW: Self = Self(1 << 3);
    /// No tip is inserted.
    pub const NO_TIP: Self = Self(1 << 4);

    /// No faults.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether there are no faults.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether all faults of `other` are present.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Add the faults of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Remove the faults of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Add or remove the faults of `other`.
    pub fn set(&mut self, other: Self, present: bool) {
        if present {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for FaultFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FaultFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FaultFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for FaultFlags {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

/// The aggregated recoverable error state.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorState {
    /// An error is active, heating is disabled.
    pub active: bool,
    /// The faults seen since the error was raised.
    pub faults: FaultFlags,
    /// When a fault was last seen.
    pub last_fault: Instant,
}

impl ErrorState {
    /// No error.
    pub(super) fn new(now: Instant) -> Self {
        Self {
            active: false,
            faults: FaultFlags::empty(),
            last_fault: now,
        }
    }

    /// Whether safe mode was requested.
    pub fn safe_mode(&self) -> bool {
        self.faults.contains(FaultFlags::SAFE_MODE)
    }
}

/// Errors that disable the heater until reboot.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalError {
    /// The tip overshot its set temperature for too long.
    Runaway(RunawayLevel),
    /// The PWM output exceeds the timer period.
    PwmExceedsPeriod,
    /// The PWM output does not match the timer's compare value.
    PwmMismatch,
    /// The regulator's output exceeds the power limit.
    PwmAboveLimit,
}

impl<B: Board, R: Regulator> Iron<B, R> {
    /// Aggregate the sensor faults and safe mode into the error state.
    ///
    /// A new fault raises the error: the iron sleeps, its heater pin is driven low, and the alarm sounds. Missing
    /// tips are tolerated while sleeping. Once no fault was seen for the error delay, the error clears and the iron
    /// resumes in run mode.
    pub(super) fn check_errors(&mut self, now: Instant) {
        let mut faults = FaultFlags::empty();
        faults.set(FaultFlags::SAFE_MODE, self.state.error.safe_mode());

        let ambient_x10 = self.board.cold_junction_x10(TemperatureUnit::Celsius);
        faults.set(FaultFlags::AMBIENT_HIGH, ambient_x10 > AMBIENT_HIGH_X10);
        faults.set(FaultFlags::AMBIENT_LOW, ambient_x10 < AMBIENT_LOW_X10);
        faults.set(
            FaultFlags::VOLTAGE_LOW,
            self.board.supply_voltage_x10() < self.config.settings.low_voltage_x10,
        );
        faults.set(
            FaultFlags::NO_TIP,
            self.board.tip_raw() > self.config.profile.no_iron_value,
        );

        if now.as_millis() < SENSOR_SETTLE_MS || self.config.system.setup_mode {
            faults &= FaultFlags::SAFE_MODE;
        }

        let error = &mut self.state.error;
        if !faults.is_empty() {
            error.faults |= faults;
            error.last_fault = now;

            if !error.active {
                if faults == FaultFlags::NO_TIP && self.state.mode == Mode::Sleep {
                    return;
                }
                self.raise_error();
            }
        } else if error.active {
            let quiet_time = Duration::from_millis(self.config.settings.error_delay_ms as u64);
            if now.saturating_duration_since(error.last_fault) > quiet_time {
                self.clear_error();
            }
        } else {
            error.faults = FaultFlags::empty();
        }
    }

    /// Enable or disable safe mode.
    ///
    /// Enabling drives the heater pin low immediately. Disabling clears the error right away, if safe mode was its
    /// only cause. Has no effect once a fatal error latched.
    pub fn set_safe_mode(&mut self, enable: bool) {
        if self.state.fatal.is_some() {
            return;
        }

        let error = self.state.error;
        if !enable && error.active && error.faults == FaultFlags::SAFE_MODE {
            self.clear_error();
            return;
        }

        if enable {
            self.board.set_pin_state(PinState::Low);
        }
        self.state.error.faults.set(FaultFlags::SAFE_MODE, enable);

        let now = self.board.now();
        self.check_errors(now);
    }

    /// Disable heating, after a fault was seen.
    fn raise_error(&mut self) {
        warn!("Error raised, faults {:?}", self.state.error.faults);

        self.state.error.active = true;
        self.set_mode(Mode::Sleep);
        self.state.pwm.output = 0;
        self.board.set_compare(0);
        self.board.set_pin_state(PinState::Low);
        self.board.alarm_start();
    }

    /// Resume heating, after the faults disappeared.
    ///
    /// A fatal error is never cleared.
    fn clear_error(&mut self) {
        if self.state.fatal.is_some() {
            return;
        }

        info!("Error cleared, faults were {:?}", self.state.error.faults);

        self.state.error.faults = FaultFlags::empty();
        self.state.error.active = false;
        self.board.alarm_stop();
        self.set_mode(Mode::Run);
        self.board.set_pin_state(PinState::Pwm);
    }

    /// Whether a recoverable error is active.
    pub fn is_error_active(&self) -> bool {
        self.state.error.active
    }

    /// Whether safe mode is active.
    pub fn is_safe_mode(&self) -> bool {
        self.state.error.safe_mode() && self.state.error.active
    }

    /// The faults seen since the active error was raised.
    pub fn faults(&self) -> FaultFlags {
        self.state.error.faults
    }

    /// The recoverable error state.
    pub fn error_state(&self) -> ErrorState {
        self.state.error
    }
}
