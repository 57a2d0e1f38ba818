//! Drives the tip's heating element, based on target and actual temperature.
//!
//! [`Iron`] is the single owner of all heater drive decisions. It is ticked periodically by the board
//! ([`Iron::tick`], the control loop), checked for thermal runaway at its own cadence ([`Iron::check_runaway`]), and
//! receives wake and stand events asynchronously.

mod error;
mod mode;
mod observers;
mod power;
mod regulator;
mod runaway;

pub use error::{ErrorState, FatalError, FaultFlags};
pub use mode::{Mode, WakeSource};
pub use observers::{
    ModeChangedObserver, OBSERVER_CAPACITY, RegistryFull, TemperatureReachedObserver,
};
pub use power::pwm_limit;
pub use regulator::{PidParameters, PidRegulator};
pub use runaway::{RunawayLevel, RunawayState, RunawayStatus, classify_overshoot};

use embassy_time::{Duration, Instant};

use crate::hal::{Board, PinState, Regulator};
use crate::settings::{Config, TemperatureUnit, WakeInputMode};
use mode::PendingMode;
use observers::Observers;

/// Margin around the set temperature for reporting that it was reached.
const TEMPERATURE_REACHED_MARGIN: i32 = 2;

/// The PWM state, in timer ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmState {
    /// The current duty (compare value).
    pub output: u16,
    /// The power limited maximum duty.
    pub max: u16,
    /// The timer period.
    pub period: u16,
    /// A new period was configured and must be committed on the next tick.
    pub update_pending: bool,
}

/// Debug mode, which overrides the set temperature.
#[derive(Debug, Clone, Copy, Default)]
struct DebugMode {
    /// Debug mode is active.
    enabled: bool,
    /// The set temperature in sensor units.
    setpoint: u16,
}

impl DebugMode {
    /// The override set temperature in sensor units, if debug mode is active.
    fn setpoint(&self) -> Option<u16> {
        self.enabled.then_some(self.setpoint)
    }
}

/// The last wake-up activity (shake).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Activity {
    /// When the activity happened.
    pub time: Instant,
    /// There was any activity since boot.
    pub seen: bool,
}

/// The operational state of the iron.
struct IronState {
    /// The active operating mode.
    mode: Mode,
    /// The set temperature for the active mode.
    set_temperature: u16,
    /// When the active mode was last (re-)entered.
    mode_timer: Instant,
    /// A debounced mode change request from the stand.
    pending: PendingMode,
    /// The last wake activity.
    activity: Activity,
    /// The heater PWM.
    pwm: PwmState,
    /// The heater power in percent of the power limited maximum.
    power_percent: u8,
    /// The aggregated recoverable errors.
    error: ErrorState,
    /// Thermal runaway detection.
    runaway: RunawayState,
    /// A latched fatal error, which keeps the heater off until reboot.
    fatal: Option<FatalError>,
    /// Calibration is running, which suppresses idle timeouts.
    calibrating: bool,
    /// The set temperature was reached (reported once per approach).
    temperature_reached: bool,
    /// Debug mode.
    debug: DebugMode,
}

impl IronState {
    /// Initial state, in sleep mode with the heater off.
    fn new(now: Instant, pwm_period: u16) -> Self {
        Self {
            mode: Mode::Sleep,
            set_temperature: 0,
            mode_timer: now,
            pending: PendingMode::new(Mode::Sleep, now),
            activity: Activity {
                time: now,
                seen: false,
            },
            pwm: PwmState {
                output: 0,
                max: 0,
                period: pwm_period,
                update_pending: false,
            },
            power_percent: 0,
            error: ErrorState::new(now),
            runaway: RunawayState::new(now),
            fatal: None,
            calibrating: false,
            temperature_reached: false,
            debug: DebugMode::default(),
        }
    }
}

/// The soldering iron: heater control, operating modes and safety supervision.
pub struct Iron<B: Board, R: Regulator> {
    /// The board's peripherals and services.
    board: B,
    /// The temperature regulator.
    regulator: R,
    /// Settings, profile and system state.
    config: Config,
    /// Operational state.
    state: IronState,
    /// Registered observers.
    observers: Observers,
}

impl<B: Board, R: Regulator> Iron<B, R> {
    /// Create and initialize the iron.
    ///
    /// Sets up the heater PWM with zero output and enters the initial mode. With a stand switch, `wake_input_active`
    /// reports whether the iron was lifted at power-up.
    pub fn new(board: B, regulator: R, config: Config, wake_input_active: bool) -> Self {
        let now = board.now();
        let mut iron = Self {
            board,
            regulator,
            config,
            state: IronState::new(now, config.pwm_period()),
            observers: Observers::new(),
        };

        iron.board.set_period(iron.state.pwm.period);
        iron.board.set_compare(0);
        iron.board.set_pin_state(PinState::Pwm);

        let initial_mode = match config.settings.wake_input_mode {
            WakeInputMode::Shake => config.settings.init_mode,
            WakeInputMode::Stand if wake_input_active => Mode::Run,
            WakeInputMode::Stand => config.settings.stand_mode,
        };
        iron.set_mode(initial_mode);
        iron.state.pending = PendingMode::new(initial_mode, now);

        info!(
            "Iron initialized in {:?}, PWM period {} ticks",
            initial_mode,
            iron.state.pwm.period
        );
        iron
    }

    /// Runs one control loop iteration.
    ///
    /// - Supervises errors and safe mode
    /// - Commits debounced mode changes and idle timeouts
    /// - Runs the regulator within the supply's power limit and drives the heater PWM
    ///
    /// Returns an error, if a fatal condition was detected (now or earlier). The heater is off in that case.
    pub fn tick(&mut self) -> Result<(), FatalError> {
        self.ensure_not_fatal()?;

        let now = self.board.now();
        let tip_temperature = self.board.tip_temperature();

        if !self.state.error.safe_mode() && self.config.forces_safe_mode() {
            warn!("Configuration forces safe mode");
            self.state.error.faults.insert(FaultFlags::SAFE_MODE);
        }

        self.check_errors(now);
        self.service_pending_mode(now);

        // For safety, force the heater off on every tick while sleeping or in error.
        if self.heater_must_be_off() {
            self.switch_heater_off();
            return Ok(());
        }

        self.check_idle_timeouts(now);
        if self.heater_must_be_off() {
            self.switch_heater_off();
            return Ok(());
        }

        let pwm = &mut self.state.pwm;
        if pwm.update_pending {
            pwm.period = self.config.pwm_period();
        }

        pwm.max = pwm_limit(
            self.board.supply_voltage_x10(),
            self.config.profile.impedance_x10,
            self.config.profile.power_w,
            pwm.period,
        );

        let setpoint = match self.state.debug.setpoint() {
            Some(setpoint) => setpoint,
            None => self.board.to_sensor_scale(self.state.set_temperature),
        };
        let output = self
            .regulator
            .compute(setpoint, self.board.tip_average(), pwm.max);
        pwm.output = output;

        self.state.power_percent = self.compute_power_percent()?;

        let pwm = &mut self.state.pwm;
        if pwm.update_pending {
            pwm.update_pending = false;
            self.board.set_period(pwm.period);
        }
        self.board.set_compare(pwm.output);

        trace!(
            "Tip {} (set {}): PWM {}/{} ({}%)",
            tip_temperature,
            self.state.set_temperature,
            pwm.output,
            pwm.max,
            self.state.power_percent
        );

        self.check_temperature_reached(tip_temperature);

        Ok(())
    }

    /// Whether the heater must not be driven (sleeping, error, or fatal error).
    fn heater_must_be_off(&self) -> bool {
        self.state.mode == Mode::Sleep || self.state.error.active || self.state.fatal.is_some()
    }

    /// Switch the heater off and clear the displayed power.
    fn switch_heater_off(&mut self) {
        self.state.pwm.output = 0;
        self.board.set_compare(0);
        self.state.power_percent = 0;
    }

    /// Enter standby or sleep after the profile's idle timeouts.
    fn check_idle_timeouts(&mut self, now: Instant) {
        if self.state.calibrating {
            return;
        }

        let profile = &self.config.profile;
        let mode_time = now.saturating_duration_since(self.state.mode_timer);
        let standby_enabled = profile.standby_timeout_min > 0;
        let standby_time = Duration::from_secs(profile.standby_timeout_min as u64 * 60);
        let sleep_time = Duration::from_secs(profile.sleep_timeout_min as u64 * 60);

        match self.state.mode {
            Mode::Run if standby_enabled && mode_time > standby_time => {
                debug!("Standby timeout");
                self.set_mode(Mode::Standby);
            }
            Mode::Run if !standby_enabled && mode_time > sleep_time => {
                debug!("Sleep timeout");
                self.set_mode(Mode::Sleep);
            }
            Mode::Standby if standby_enabled && mode_time > sleep_time => {
                debug!("Sleep timeout");
                self.set_mode(Mode::Sleep);
            }
            _ => (),
        }
    }

    /// The heater power in percent of the power limited maximum.
    ///
    /// An output above the maximum violates the regulator's contract and is fatal.
    fn compute_power_percent(&mut self) -> Result<u8, FatalError> {
        let PwmState { output, max, .. } = self.state.pwm;

        if output == 0 {
            Ok(0)
        } else if output == max {
            Ok(100)
        } else if output < max {
            Ok((output as u32 * 100 / max as u32) as u8)
        } else {
            Err(self.latch_fatal(FatalError::PwmAboveLimit))
        }
    }

    /// Notify observers once, when the tip is within a small margin around the set temperature.
    fn check_temperature_reached(&mut self, tip_temperature: i16) {
        let set_temperature = self.state.set_temperature as i32;
        let margin = set_temperature - TEMPERATURE_REACHED_MARGIN..=set_temperature + TEMPERATURE_REACHED_MARGIN;

        if margin.contains(&(tip_temperature as i32)) && !self.state.temperature_reached {
            debug!("Set temperature {} reached", self.state.set_temperature);
            self.observers
                .notify_temperature_reached(self.state.set_temperature);
            self.state.temperature_reached = true;
        }
    }

    /// Fail if a fatal error was latched, keeping the heater off.
    fn ensure_not_fatal(&mut self) -> Result<(), FatalError> {
        match self.state.fatal {
            Some(fatal) => {
                self.switch_heater_off();
                Err(fatal)
            }
            None => Ok(()),
        }
    }

    /// Latch a fatal error.
    ///
    /// The heater is switched off and its pin driven low, before reporting. The iron is put to sleep with an active
    /// error, and stays there until reboot.
    fn latch_fatal(&mut self, fatal: FatalError) -> FatalError {
        self.switch_heater_off();
        self.board.set_pin_state(PinState::Low);
        self.state.fatal = Some(fatal);
        self.state.error.active = true;
        self.set_mode(Mode::Sleep);

        error!("Fatal error: {:?}", fatal);
        self.board.alarm_start();

        fatal
    }

    /// Set the user set temperature.
    ///
    /// Always re-arms the temperature reached notification. In run mode, the new value applies immediately.
    pub fn set_user_temperature(&mut self, temperature: u16) {
        self.state.temperature_reached = false;

        if self.config.profile.user_set_temperature != temperature {
            self.config.profile.user_set_temperature = temperature;

            if self.state.mode == Mode::Run {
                self.state.set_temperature = temperature;
                self.regulator.reset();
            }
        }
    }

    /// Switch the system temperature unit, converting the profile's temperatures if needed.
    pub fn set_temperature_unit(&mut self, unit: TemperatureUnit) {
        self.config.set_temperature_unit(unit);

        // Reload set temperatures.
        self.set_mode(self.state.mode);
    }

    /// Set the delay between switching off the heater and sampling, in timer ticks.
    pub fn set_read_delay(&mut self, delay: u16) {
        self.config.profile.read_delay = delay;
    }

    /// Set the read period in timer ticks. The PWM period follows on the next tick.
    pub fn set_read_period(&mut self, period: u16) {
        self.config.profile.read_period = period;
        self.state.pwm.update_pending = true;
    }

    /// Set the number of PWM periods per read period. The PWM period follows on the next tick.
    pub fn set_pwm_mul(&mut self, pwm_mul: u16) {
        self.config.profile.pwm_mul = pwm_mul;
        self.state.pwm.update_pending = true;
    }

    /// Set the raw tip reading above which no tip is detected.
    pub fn set_no_iron_value(&mut self, value: u16) {
        self.config.profile.no_iron_value = value;
    }

    /// Enable or disable debug mode.
    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.state.debug.enabled = enabled;
    }

    /// Set the debug mode set temperature in sensor units.
    pub fn set_debug_temperature(&mut self, setpoint: u16) {
        self.state.debug.setpoint = setpoint;
    }

    /// Start or stop calibration, which suppresses idle timeouts.
    pub fn set_calibrating(&mut self, calibrating: bool) {
        self.state.calibrating = calibrating;
    }

    /// Register an observer for mode changes.
    pub fn add_mode_changed_observer(
        &mut self,
        observer: ModeChangedObserver,
    ) -> Result<(), RegistryFull> {
        self.observers.add_mode_changed(observer)
    }

    /// Register an observer for reaching the set temperature.
    pub fn add_temperature_reached_observer(
        &mut self,
        observer: TemperatureReachedObserver,
    ) -> Result<(), RegistryFull> {
        self.observers.add_temperature_reached(observer)
    }

    /// The active operating mode.
    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    /// The user set temperature.
    pub fn user_temperature(&self) -> u16 {
        self.config.profile.user_set_temperature
    }

    /// The set temperature of the active mode.
    pub fn current_set_temperature(&self) -> u16 {
        self.state.set_temperature
    }

    /// The heater power in percent.
    pub fn power_percent(&self) -> u8 {
        self.state.power_percent
    }

    /// The heater PWM state.
    pub fn pwm(&self) -> PwmState {
        self.state.pwm
    }

    /// The last wake activity.
    pub fn last_activity(&self) -> Activity {
        self.state.activity
    }

    /// The thermal runaway detector's state.
    pub fn runaway(&self) -> RunawayState {
        self.state.runaway
    }

    /// The latched fatal error, if any.
    pub fn fatal(&self) -> Option<FatalError> {
        self.state.fatal
    }

    /// The settings, profile and system state in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access to the configuration, for the settings store.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// The board.
    pub fn board(&self) -> &B {
        &self.board
    }

    /// Mutable access to the board, e.g. for feeding new sensor readings.
    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }
}
