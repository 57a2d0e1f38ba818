//! Settings and the active thermal profile.
//!
//! Loading and storing these is up to the settings store, the control core only reads them (and applies the
//! setters that are part of its interface).

use crate::control::Mode;

/// The number of selectable profiles (T12, C245, C210).
pub const PROFILE_COUNT: u8 = 3;

/// A temperature unit.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TemperatureUnit {
    /// Degrees Celsius.
    Celsius,
    /// Degrees Fahrenheit.
    Fahrenheit,
}

impl TemperatureUnit {
    /// Convert a temperature given in `self` into the unit `to`, rounded to the nearest degree.
    pub fn convert(self, temperature: u16, to: TemperatureUnit) -> u16 {
        let temperature = temperature as i32;
        let converted = match (self, to) {
            (TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit) => {
                (temperature * 18 + 5) / 10 + 32
            }
            (TemperatureUnit::Fahrenheit, TemperatureUnit::Celsius) => {
                ((temperature - 32) * 10 + 9) / 18
            }
            _ => temperature,
        };

        converted.clamp(0, u16::MAX as i32) as u16
    }
}

/// Round to the closest multiple of 10, halves round up.
///
/// E.g. 640 °F are 338 °C, which shows as 340 °C.
pub fn round_10(value: u16) -> u16 {
    let remainder = value % 10;
    if remainder >= 5 {
        value.saturating_add(10 - remainder)
    } else {
        value - remainder
    }
}

/// What the wake input is wired to.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeInputMode {
    /// A shake (tilt) sensor inside the handle.
    Shake,
    /// A stand switch that reports whether the iron is resting.
    Stand,
}

/// Profile temperatures from before a unit conversion.
///
/// Converting back restores them (rounded), instead of rounding twice, as long as the converted values were not
/// changed in between.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct UnitOrigin {
    /// The unit before the conversion.
    unit: TemperatureUnit,
    /// The temperatures before the conversion.
    original: [u16; 4],
    /// The temperatures after the conversion.
    converted: [u16; 4],
}

/// The active thermal profile.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Profile {
    /// The profile's identifier, must match the selected profile index.
    pub id: u8,
    /// If false, the profile was never written and holds no valid data.
    pub initialized: bool,
    /// Minutes in run mode before entering standby. Zero disables standby.
    pub standby_timeout_min: u8,
    /// Minutes before entering sleep (from standby, or from run when standby is disabled).
    pub sleep_timeout_min: u8,
    /// Heater power limit in W.
    pub power_w: u16,
    /// Heater impedance in tenths of an Ohm.
    pub impedance_x10: u16,
    /// Raw tip reading above which no tip is considered to be present.
    pub no_iron_value: u16,
    /// The unit of all temperatures in this profile.
    pub temperature_unit: TemperatureUnit,
    /// Number of PWM periods per read period.
    pub pwm_mul: u16,
    /// The read (control) period in timer ticks of 5 µs.
    pub read_period: u16,
    /// The delay between switching off the heater and sampling the tip, in timer ticks of 5 µs.
    pub read_delay: u16,
    /// The user set temperature.
    pub user_set_temperature: u16,
    /// The set temperature in standby.
    pub standby_temperature: u16,
    /// The lowest selectable set temperature.
    pub min_set_temperature: u16,
    /// The highest selectable set temperature.
    pub max_set_temperature: u16,
    /// The temperatures before the last unit conversion.
    unit_origin: Option<UnitOrigin>,
}

impl Profile {
    /// Default profile (T12 tips).
    pub const fn default() -> Self {
        Self {
            id: 0,
            initialized: true,
            standby_timeout_min: 5,
            sleep_timeout_min: 5,
            power_w: 80,
            impedance_x10: 80,
            no_iron_value: 4000,
            temperature_unit: TemperatureUnit::Celsius,
            pwm_mul: 1,
            read_period: 39_999,
            read_delay: 3_999,
            user_set_temperature: 320,
            standby_temperature: 180,
            min_set_temperature: 180,
            max_set_temperature: 450,
            unit_origin: None,
        }
    }

    /// The user, standby, min. and max. set temperatures.
    fn temperatures(&self) -> [u16; 4] {
        [
            self.user_set_temperature,
            self.standby_temperature,
            self.min_set_temperature,
            self.max_set_temperature,
        ]
    }

    /// Replace the user, standby, min. and max. set temperatures.
    fn set_temperatures(&mut self, [user, standby, min, max]: [u16; 4]) {
        self.user_set_temperature = user;
        self.standby_temperature = standby;
        self.min_set_temperature = min;
        self.max_set_temperature = max;
    }

    /// Convert all profile temperatures to a new unit.
    ///
    /// Values are rounded to the nearest multiple of 10. Switching back to the previous unit restores the values
    /// from before the conversion (rounded to 10), unless they were changed in between.
    fn convert_to(&mut self, unit: TemperatureUnit) {
        let from = self.temperature_unit;
        let current = self.temperatures();

        let restored = self
            .unit_origin
            .filter(|origin| origin.unit == unit && origin.converted == current);

        match restored {
            Some(origin) => {
                self.set_temperatures(origin.original.map(round_10));
                self.unit_origin = None;
            }
            None => {
                let converted = current.map(|value| round_10(from.convert(value, unit)));
                self.set_temperatures(converted);
                self.unit_origin = Some(UnitOrigin {
                    unit: from,
                    original: current,
                    converted,
                });
            }
        }

        self.temperature_unit = unit;
    }
}

/// Global (profile independent) settings.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    /// If false, the settings were never written and hold no valid data.
    pub initialized: bool,
    /// The selected profile index.
    pub current_profile: u8,
    /// The displayed temperature unit.
    pub temperature_unit: TemperatureUnit,
    /// Wake from standby/sleep when the shake sensor triggers.
    pub wake_on_shake: bool,
    /// Wake from standby/sleep when the encoder button is pressed.
    pub wake_on_button: bool,
    /// What the wake input is wired to.
    pub wake_input_mode: WakeInputMode,
    /// The mode to start in, when using a shake sensor.
    pub init_mode: Mode,
    /// The mode to enter when the iron rests in its stand.
    pub stand_mode: Mode,
    /// Quiet time in ms after the last fault, before a recoverable error clears.
    pub error_delay_ms: u32,
    /// Low voltage protection threshold in tenths of a Volt.
    pub low_voltage_x10: u16,
}

impl Settings {
    /// Default settings.
    pub const fn default() -> Self {
        Self {
            initialized: true,
            current_profile: 0,
            temperature_unit: TemperatureUnit::Celsius,
            wake_on_shake: true,
            wake_on_button: true,
            wake_input_mode: WakeInputMode::Shake,
            init_mode: Mode::Run,
            stand_mode: Mode::Sleep,
            error_delay_ms: 500,
            low_voltage_x10: 100,
        }
    }
}

/// Volatile system state that belongs to the settings store.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemState {
    /// The setup menu is open, heating is not allowed.
    pub setup_mode: bool,
}

impl SystemState {
    /// Default system state.
    pub const fn default() -> Self {
        Self { setup_mode: false }
    }
}

/// Everything the control core reads from the settings store.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Global settings.
    pub settings: Settings,
    /// The active profile.
    pub profile: Profile,
    /// Volatile system state.
    pub system: SystemState,
}

impl Config {
    /// Default configuration.
    pub const fn default() -> Self {
        Self {
            settings: Settings::default(),
            profile: Profile::default(),
            system: SystemState::default(),
        }
    }

    /// Whether the configuration forces safe mode.
    ///
    /// This is the case in setup mode, with uninitialized settings or profile, or if the loaded profile does not
    /// belong to a valid selected profile index.
    pub fn forces_safe_mode(&self) -> bool {
        self.system.setup_mode
            || !self.settings.initialized
            || !self.profile.initialized
            || self.profile.id != self.settings.current_profile
            || self.settings.current_profile >= PROFILE_COUNT
    }

    /// The PWM timer period in ticks, derived from the read period and the PWM multiplier.
    pub fn pwm_period(&self) -> u16 {
        let pwm_mul = self.profile.pwm_mul.max(1) as u32;
        ((self.profile.read_period as u32 + 1) / pwm_mul).saturating_sub(1) as u16
    }

    /// The read timer period in ticks, i.e. the read period minus the read delay.
    pub fn read_timer_period(&self) -> u16 {
        self.profile
            .read_period
            .saturating_sub(self.profile.read_delay.saturating_add(1))
    }

    /// Switch the temperature unit.
    ///
    /// If the profile uses a different unit, its temperatures are converted and rounded to the nearest 10.
    pub(crate) fn set_temperature_unit(&mut self, unit: TemperatureUnit) {
        if self.profile.temperature_unit != unit {
            self.profile.convert_to(unit);
        }

        self.settings.temperature_unit = unit;
    }
}
