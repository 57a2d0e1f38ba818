//! Operating modes, wake-up and stand handling.

use embassy_time::{Duration, Instant};

use super::Iron;
use crate::hal::{Board, Regulator};
use crate::settings::WakeInputMode;

/// Stand requests must persist this long, before they apply.
const STAND_DEBOUNCE: Duration = Duration::from_millis(100);

/// The operating mode of the iron.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Regulating to the user set temperature.
    Run,
    /// Regulating to the (lower) standby temperature.
    Standby,
    /// The heater is off.
    Sleep,
}

/// The source of a wake-up event.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeSource {
    /// The shake sensor triggered.
    Shake,
    /// The encoder button was pressed.
    Button,
}

/// A mode change request from the stand, awaiting its debounce time.
#[derive(Debug, Clone, Copy)]
pub(super) struct PendingMode {
    /// The requested mode.
    mode: Mode,
    /// A request is pending.
    needs_update: bool,
    /// When the requested mode last changed.
    since: Instant,
}

impl PendingMode {
    /// No pending request, with `mode` as the last requested mode.
    pub(super) fn new(mode: Mode, now: Instant) -> Self {
        Self {
            mode,
            needs_update: false,
            since: now,
        }
    }
}

impl<B: Board, R: Regulator> Iron<B, R> {
    /// Enter a mode.
    ///
    /// Always restarts the mode's idle timer and reloads the set temperature. An actual change resets the regulator,
    /// beeps and notifies the mode change observers.
    ///
    /// After a fatal error, the iron cannot leave sleep mode.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.state.fatal.is_some() && mode != Mode::Sleep {
            return;
        }

        self.state.mode_timer = self.board.now();
        self.state.set_temperature = match mode {
            Mode::Standby => self.config.profile.standby_temperature,
            Mode::Run | Mode::Sleep => self.config.profile.user_set_temperature,
        };

        if mode == self.state.mode {
            return;
        }

        info!("Mode {:?} -> {:?}", self.state.mode, mode);
        self.regulator.reset();
        self.board.long_beep();
        self.state.mode = mode;
        self.observers.notify_mode_changed(mode);

        if mode == Mode::Run {
            self.state.temperature_reached = false;
        }
    }

    /// Request a mode from the stand switch.
    ///
    /// The request applies after it persisted for the debounce time, and is dropped if an error becomes active
    /// meanwhile. A sleeping iron is not put into standby by the stand.
    pub fn request_mode_from_stand(&mut self, mode: Mode) {
        let now = self.board.now();

        if self.heating_blocked()
            || (self.state.pending.mode == mode && self.state.mode == mode)
            || (self.state.mode == Mode::Sleep && mode == Mode::Standby)
        {
            return;
        }

        let pending = &mut self.state.pending;
        if pending.mode != mode {
            pending.mode = mode;
            pending.since = now;
        }
        pending.needs_update = true;
    }

    /// Apply a pending stand request, once debounced.
    pub(super) fn service_pending_mode(&mut self, now: Instant) {
        let pending = self.state.pending;
        if !pending.needs_update {
            return;
        }

        if self.heating_blocked() {
            debug!("Dropping stand request for {:?}", pending.mode);
            self.state.pending.needs_update = false;
        } else if now.saturating_duration_since(pending.since) > STAND_DEBOUNCE {
            self.state.pending.needs_update = false;
            self.set_mode(pending.mode);
        }
    }

    /// Handle a wake-up event.
    ///
    /// In run mode, this only refreshes the idle timer. Otherwise, the settings decide whether the source may wake
    /// the iron. Shakes are recorded as activity.
    pub fn wake(&mut self, source: WakeSource) {
        if self.heating_blocked() {
            return;
        }

        let settings = &self.config.settings;
        if self.state.mode != Mode::Run {
            let rejected = match source {
                WakeSource::Button => {
                    !settings.wake_on_button || settings.wake_input_mode == WakeInputMode::Stand
                }
                WakeSource::Shake => !settings.wake_on_shake,
            };

            if rejected {
                return;
            }
        }

        if source == WakeSource::Shake {
            self.state.activity.seen = true;
            self.state.activity.time = self.board.now();
        }

        self.set_mode(Mode::Run);
    }

    /// Whether mode changes toward heating are currently refused.
    fn heating_blocked(&self) -> bool {
        self.state.error.active || self.state.fatal.is_some()
    }
}
