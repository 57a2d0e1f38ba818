//! The control and supervision tasks around the shared iron.

use defmt::{error, info};
use embassy_stm32::exti::ExtiInput;
use embassy_time::{Duration, Ticker, Timer};
use ironctl::control::PidRegulator;
use ironctl::settings::WakeInputMode;
use ironctl::{Iron, Mode, Shared, WakeSource};

use crate::board::KsgerBoard;
use crate::sensing::AdcInputs;

/// The iron, as used on this board.
pub type BoardIron = Iron<KsgerBoard, PidRegulator>;

/// The iron, shared between all tasks.
pub static IRON: Shared<BoardIron> = Shared::new();

/// The runaway check period.
const RUNAWAY_CHECK_PERIOD_MS: u64 = 100;

/// The duration of a timer period, in logical ticks of 5 µs. The timer counts from zero.
fn period_to_duration(period: u16) -> Duration {
    Duration::from_micros((period as u64 + 1) * 5)
}

/// Report mode changes.
pub fn log_mode_change(mode: Mode) {
    info!("Mode: {}", mode);
}

/// Report reaching the set temperature.
pub fn log_temperature_reached(temperature: u16) {
    info!("Reached {}", temperature);
}

/// Run the control loop, once per read period.
///
/// The heater is switched off for the read delay before sampling the tip, then the iron is ticked with the new
/// readings. A fatal error parks the heater for good.
#[embassy_executor::task]
pub async fn control_task(mut adc_inputs: AdcInputs) {
    loop {
        let Some((heat_period, read_delay)) = IRON.lock(|iron| {
            let config = iron.config();
            (config.read_timer_period(), config.profile.read_delay)
        }) else {
            Timer::after_millis(10).await;
            continue;
        };

        Timer::after(period_to_duration(heat_period)).await;

        IRON.lock(|iron| iron.board_mut().heater.suspend());
        Timer::after(period_to_duration(read_delay)).await;

        let sample = adc_inputs.sample().await;

        let result = IRON.lock(|iron| {
            let unit = iron.config().settings.temperature_unit;
            let sensing = &mut iron.board_mut().sensing;
            sensing.set_unit(unit);
            sensing.update(sample);

            let result = iron.tick();
            iron.board_mut().heater.resume();
            result
        });

        if let Some(Err(fatal)) = result {
            error!("Heater parked after fatal error: {}", fatal);
            break;
        }
    }

    IRON.lock(|iron| iron.board_mut().heater.suspend());
}

/// Check for thermal runaway, independent of the control loop.
#[embassy_executor::task]
pub async fn runaway_task() {
    let mut ticker = Ticker::every(Duration::from_millis(RUNAWAY_CHECK_PERIOD_MS));

    loop {
        ticker.next().await;

        if let Some(Err(fatal)) = IRON.lock(|iron| iron.check_runaway()) {
            error!("Runaway check failed: {}", fatal);
            break;
        }
    }
}

/// Forward the wake input (shake sensor or stand switch) to the iron.
///
/// A stand switch is high while the iron is lifted.
#[embassy_executor::task]
pub async fn wake_task(mut input: ExtiInput<'static>) {
    loop {
        input.wait_for_any_edge().await;
        let lifted = input.is_high();

        IRON.lock(|iron| {
            let settings = iron.config().settings;

            match settings.wake_input_mode {
                WakeInputMode::Shake => iron.wake(WakeSource::Shake),
                WakeInputMode::Stand if lifted => iron.request_mode_from_stand(Mode::Run),
                WakeInputMode::Stand => iron.request_mode_from_stand(settings.stand_mode),
            }
        });
    }
}

/// Forward encoder button presses to the iron.
#[embassy_executor::task]
pub async fn button_task(mut input: ExtiInput<'static>) {
    loop {
        input.wait_for_falling_edge().await;
        IRON.lock(|iron| iron.wake(WakeSource::Button));
    }
}
