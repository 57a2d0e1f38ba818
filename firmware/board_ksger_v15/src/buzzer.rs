//! Audible feedback.

use defmt::{Format, debug};
use embassy_futures::select::{Either, select};
use embassy_stm32::gpio::Output;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

/// The duration of a long beep.
const LONG_BEEP: Duration = Duration::from_millis(250);
/// The on/off time of the alarm tone.
const ALARM_TOGGLE: Duration = Duration::from_millis(200);

/// A request for the buzzer.
#[derive(Debug, Format, Clone, Copy, PartialEq, Eq)]
pub enum BuzzerCommand {
    /// Beep once.
    LongBeep,
    /// Start the alarm (until stopped).
    AlarmStart,
    /// Stop the alarm.
    AlarmStop,
}

/// Pending beeps.
static BEEP_REQUESTS: Channel<CriticalSectionRawMutex, (), 4> = Channel::new();

/// The requested alarm state. Only the latest request matters.
static ALARM_SIG: Signal<CriticalSectionRawMutex, bool> = Signal::new();

/// Request buzzer output, without waiting.
///
/// Beeps are dropped, if too many are pending. Alarm requests always apply.
pub fn request(command: BuzzerCommand) {
    match command {
        BuzzerCommand::LongBeep => {
            if BEEP_REQUESTS.try_send(()).is_err() {
                debug!("Buzzer busy, dropped beep");
            }
        }
        BuzzerCommand::AlarmStart => ALARM_SIG.signal(true),
        BuzzerCommand::AlarmStop => ALARM_SIG.signal(false),
    }
}

/// Plays beeps and the alarm.
#[embassy_executor::task]
pub async fn buzzer_task(mut pin: Output<'static>) {
    let mut alarm = false;

    loop {
        if alarm {
            pin.toggle();

            if let Either::First(on) = select(ALARM_SIG.wait(), Timer::after(ALARM_TOGGLE)).await {
                alarm = on;
            }

            // No beeps during the alarm.
            while BEEP_REQUESTS.try_receive().is_ok() {}
            continue;
        }

        pin.set_low();

        match select(ALARM_SIG.wait(), BEEP_REQUESTS.receive()).await {
            Either::First(on) => alarm = on,
            Either::Second(()) => {
                pin.set_high();
                Timer::after(LONG_BEEP).await;
                pin.set_low();
            }
        }
    }
}
