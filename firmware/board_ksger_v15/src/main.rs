//! Firmware for the KSGER v1.5 T12 soldering station controller (STM32F103C8).
//!
//! Pins:
//! - PB8: heater MOSFET (TIM4 CH3)
//! - PA1: tip thermocouple amplifier (ADC1 CH1)
//! - PA3: cold junction NTC (ADC1 CH3)
//! - PA4: supply voltage divider (ADC1 CH4)
//! - PA5: shake sensor or stand switch
//! - PB0: encoder button
//! - PB9: buzzer
#![no_std]
#![no_main]
#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

mod board;
mod buzzer;
mod control;
mod heater;
mod sensing;

use assign_resources::assign_resources;
use defmt::{error, info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_stm32::adc::{self, Adc};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{AfioRemap, Level, Output, OutputType, Pull, Speed};
use embassy_stm32::time::{Hertz, khz};
use embassy_stm32::timer::Ch3;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::{Peri, bind_interrupts, peripherals};
use ironctl::Config;
use ironctl::control::{PidParameters, PidRegulator};
use {defmt_rtt as _, panic_probe as _};

use crate::board::KsgerBoard;
use crate::control::IRON;
use crate::heater::HeaterPwm;
use crate::sensing::{AdcInputs, Sensing, TipCalibration};

bind_interrupts!(struct Irqs {
    ADC1_2 => adc::InterruptHandler<peripherals::ADC1>;
});

assign_resources! {
    #[allow(missing_docs)]
    heater: HeaterResources {
        tim: TIM4,
        pin: PB8,
    }
    #[allow(missing_docs)]
    sensing: SensingResources {
        adc: ADC1,
        pin_tip: PA1,
        pin_ntc: PA3,
        pin_supply: PA4,
    }
    #[allow(missing_docs)]
    inputs: InputResources {
        pin_wake: PA5,
        exti_wake: EXTI5,
        pin_button: PB0,
        exti_button: EXTI0,
    }
    #[allow(missing_docs)]
    buzzer: BuzzerResources {
        pin: PB9,
    }
}

/// Regulator gains for T12 tips, in PWM ticks per ADC count.
const PID_PARAMETERS: PidParameters = PidParameters {
    p: 25.0,
    i: 2.0,
    d: 0.0,
};

/// The initial PWM frequency, before the iron programs its period.
const PWM_INITIAL_FREQUENCY_KHZ: u32 = 1;

/// Set up the heater timer, with its output off.
fn heater_pwm(r: HeaterResources) -> HeaterPwm {
    let pin: PwmPin<'_, peripherals::TIM4, Ch3, AfioRemap<0>> = PwmPin::new(r.pin, OutputType::PushPull);
    let pwm = SimplePwm::new(
        r.tim,
        None,
        None,
        Some(pin),
        None,
        khz(PWM_INITIAL_FREQUENCY_KHZ),
        Default::default(),
    );

    HeaterPwm::new(pwm)
}

/// Set up the ADC and its inputs.
fn adc_inputs(r: SensingResources) -> AdcInputs {
    AdcInputs {
        adc: Adc::new(r.adc),
        pin_tip: r.pin_tip,
        pin_ntc: r.pin_ntc,
        pin_supply: r.pin_supply,
    }
}

/// The buzzer output, initially silent.
fn buzzer_output(pin: Peri<'static, peripherals::PB9>) -> Output<'static> {
    Output::new(pin, Level::Low, Speed::Low)
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut config = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::*;
        config.rcc.hse = Some(Hse {
            freq: Hertz::mhz(8),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll = Some(Pll {
            src: PllSource::HSE,
            prediv: PllPreDiv::DIV1,
            mul: PllMul::MUL9, // 72 MHz system clock
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV2;
        config.rcc.apb2_pre = APBPrescaler::DIV1;
        config.rcc.adc_pre = ADCPrescaler::DIV6; // 12 MHz ADC clock
    }
    let p = embassy_stm32::init(config);
    let r = split_resources!(p);

    info!("KSGER v1.5 controller");

    let Ok(sensing) = Sensing::new(TipCalibration::default()) else {
        error!("Invalid tip filter parameters");
        return;
    };

    let wake_input = ExtiInput::new(r.inputs.pin_wake, r.inputs.exti_wake, Pull::Up);
    let button_input = ExtiInput::new(r.inputs.pin_button, r.inputs.exti_button, Pull::Up);

    let board = KsgerBoard {
        heater: heater_pwm(r.heater),
        sensing,
    };

    let mut iron = ironctl::Iron::new(
        board,
        PidRegulator::new(PID_PARAMETERS),
        Config::default(),
        wake_input.is_high(),
    );

    if iron.add_mode_changed_observer(control::log_mode_change).is_err()
        || iron
            .add_temperature_reached_observer(control::log_temperature_reached)
            .is_err()
    {
        warn!("Observer registry full");
    }

    if IRON.install(iron).is_some() {
        warn!("Replaced an installed iron");
    }

    spawner.spawn(unwrap!(buzzer::buzzer_task(buzzer_output(r.buzzer.pin))));
    spawner.spawn(unwrap!(control::control_task(adc_inputs(r.sensing))));
    spawner.spawn(unwrap!(control::runaway_task()));
    spawner.spawn(unwrap!(control::wake_task(wake_input)));
    spawner.spawn(unwrap!(control::button_task(button_input)));
}
