//! Drives the heater through TIM4 channel 3.

use embassy_stm32::peripherals;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use ironctl::hal::{PinState, PwmDriver};

/// The type for the PWM heater channel.
type PwmHeaterChannel<'d> = embassy_stm32::timer::simple_pwm::SimplePwmChannel<'d, peripherals::TIM4>;

/// Logical timer ticks per second (5 µs per tick).
const TICK_HZ: u32 = 200_000;

/// The heater PWM, in logical ticks of 5 µs.
///
/// The hardware timer runs at whatever resolution the requested frequency allows. Logical compare values are scaled
/// to it, and scaled back on read-back.
pub struct HeaterPwm {
    /// The PWM timer.
    pwm: SimplePwm<'static, peripherals::TIM4>,
    /// The period in logical ticks.
    period: u16,
    /// The compare value in logical ticks.
    compare: u16,
    /// How the output pin is driven.
    pin_state: PinState,
    /// The heater is off for sampling the tip.
    suspended: bool,
}

impl HeaterPwm {
    /// Create the heater driver, with its output off.
    pub fn new(pwm: SimplePwm<'static, peripherals::TIM4>) -> Self {
        let mut heater = Self {
            pwm,
            period: 0,
            compare: 0,
            pin_state: PinState::Low,
            suspended: false,
        };

        heater.channel().set_duty_cycle_fully_off();
        heater.channel().enable();
        heater
    }

    /// Get the PWM heater channel.
    fn channel(&mut self) -> PwmHeaterChannel<'_> {
        self.pwm.ch3()
    }

    /// The hardware duty cycle for a logical compare value.
    fn hardware_duty(&self, compare: u16) -> u16 {
        let max_duty = self.pwm.max_duty_cycle() as u32;
        let duty = compare as u32 * max_duty / (self.period as u32 + 1);

        duty.min(max_duty) as u16
    }

    /// Program the hardware for the current state.
    fn apply(&mut self) {
        let duty = match self.pin_state {
            _ if self.suspended => 0,
            PinState::Low => 0,
            PinState::High => self.pwm.max_duty_cycle() as u16,
            PinState::Pwm => self.hardware_duty(self.compare),
        };

        self.channel().set_duty_cycle(duty);
    }

    /// Switch the heater off for sampling, keeping the configured output.
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.apply();
    }

    /// Restore the configured output after sampling.
    pub fn resume(&mut self) {
        self.suspended = false;
        self.apply();
    }
}

impl PwmDriver for HeaterPwm {
    fn set_period(&mut self, ticks: u16) {
        self.period = ticks;
        let frequency_hz = (TICK_HZ / (ticks as u32 + 1)).max(1);

        self.pwm.set_frequency(Hertz(frequency_hz));
        self.apply();
    }

    fn set_compare(&mut self, ticks: u16) {
        self.compare = ticks;
        self.apply();
    }

    fn compare(&mut self) -> u16 {
        // Only a driven output reflects the compare value.
        if self.suspended || self.pin_state != PinState::Pwm {
            return self.compare;
        }

        let expected_duty = self.hardware_duty(self.compare) as u32;
        let duty = self.channel().current_duty_cycle() as u32;
        if duty == expected_duty {
            return self.compare;
        }

        let max_duty = (self.pwm.max_duty_cycle() as u32).max(1);
        (duty * (self.period as u32 + 1) / max_duty).min(u16::MAX as u32) as u16
    }

    fn set_pin_state(&mut self, state: PinState) {
        self.pin_state = state;
        self.apply();
    }
}
